//! Host bodies of the packing, gather and scatter kernels.
//!
//! All complex data is interleaved `[re, im, re, im, ...]`. Each function
//! mirrors what one device launch does over a [`LaunchGeometry`]: work item
//! `i` handles element `i`, and items past the logical count are idle.
//! Offsets in an index table are trusted; range checks happen before a
//! table reaches a kernel.

use rayon::prelude::*;

use crate::launch::LaunchGeometry;

/// `complex[i] = (real[i], 0)` for `i < n`.
pub fn expand(geom: &LaunchGeometry, real: &[f64], complex: &mut [f64], n: usize) {
    debug_assert!(geom.capacity() >= n);
    let threads = geom.threads as usize;
    complex[..2 * n]
        .par_chunks_mut(2 * threads)
        .enumerate()
        .for_each(|(group, chunk)| {
            let base = group * threads;
            for (tx, pair) in chunk.chunks_exact_mut(2).enumerate() {
                pair[0] = real[base + tx];
                pair[1] = 0.0;
            }
        });
}

/// `real[i] = complex[i].re` for `i < n`.
pub fn contract(geom: &LaunchGeometry, complex: &[f64], real: &mut [f64], n: usize) {
    debug_assert!(geom.capacity() >= n);
    let threads = geom.threads as usize;
    real[..n]
        .par_chunks_mut(threads)
        .enumerate()
        .for_each(|(group, chunk)| {
            let base = group * threads;
            for (tx, value) in chunk.iter_mut().enumerate() {
                *value = complex[2 * (base + tx)];
            }
        });
}

/// `compact[k] = scale * dense[map[k]]` for `k < ngpts`.
pub fn gather(
    geom: &LaunchGeometry,
    dense: &[f64],
    compact: &mut [f64],
    scale: f64,
    ngpts: usize,
    map: &[i32],
) {
    debug_assert!(geom.capacity() >= ngpts);
    let threads = geom.threads as usize;
    compact[..2 * ngpts]
        .par_chunks_mut(2 * threads)
        .enumerate()
        .for_each(|(group, chunk)| {
            let base = group * threads;
            for (tx, pair) in chunk.chunks_exact_mut(2).enumerate() {
                let src = map[base + tx] as usize;
                pair[0] = scale * dense[2 * src];
                pair[1] = scale * dense[2 * src + 1];
            }
        });
}

/// `dense[map[k]] = scale * compact[k]`, and with `nmaps == 2` also
/// `dense[map[k + ngpts]] = conj(scale * compact[k])`.
///
/// Only the indexed entries are written; zeroing the rest of `dense` is a
/// separate launch.
pub fn scatter(
    geom: &LaunchGeometry,
    compact: &[f64],
    dense: &mut [f64],
    scale: f64,
    ngpts: usize,
    nmaps: usize,
    map: &[i32],
) {
    debug_assert!(geom.capacity() >= ngpts);
    for k in geom.indices(ngpts) {
        let re = scale * compact[2 * k];
        let im = scale * compact[2 * k + 1];
        let dst = map[k] as usize;
        dense[2 * dst] = re;
        dense[2 * dst + 1] = im;
        if nmaps == 2 {
            let partner = map[k + ngpts] as usize;
            dense[2 * partner] = re;
            dense[2 * partner + 1] = -im;
        }
    }
}

/// Multiplies the leading `len` scalars of `data` by `factor`.
pub fn scale_in_place(data: &mut [f64], len: usize, factor: f64) {
    data[..len].par_iter_mut().for_each(|value| *value *= factor);
}
