//! Coefficient index tables.
//!
//! A [`CoefficientMap`] names which entries of a dense reciprocal-space grid
//! are active. With `nmaps == 2` the table carries a second half holding,
//! for each active coefficient, the dense offset of its conjugate partner
//! (`F(-G) = conj(F(G))` for a real field).

use crate::error::{EngineError, EngineResult};
use crate::shape::GridShape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientMap {
    offsets: Vec<i32>,
    ngpts: usize,
    nmaps: usize,
}

impl CoefficientMap {
    /// A table without conjugate partners.
    pub fn single(offsets: Vec<i32>) -> EngineResult<Self> {
        Self::from_raw(offsets, 1)
    }

    /// A table whose `partners[k]` is the conjugate partner of `primary[k]`.
    pub fn paired(primary: &[i32], partners: &[i32]) -> EngineResult<Self> {
        if primary.len() != partners.len() {
            return Err(EngineError::invalid(format!(
                "partner table has {} entries, primary table has {}",
                partners.len(),
                primary.len()
            )));
        }
        let mut offsets = Vec::with_capacity(2 * primary.len());
        offsets.extend_from_slice(primary);
        offsets.extend_from_slice(partners);
        Self::from_raw(offsets, 2)
    }

    /// Builds a table from its flat layout: `nmaps` consecutive blocks of `ngpts` offsets.
    pub fn from_raw(offsets: Vec<i32>, nmaps: usize) -> EngineResult<Self> {
        if nmaps != 1 && nmaps != 2 {
            return Err(EngineError::invalid(format!(
                "nmaps must be 1 or 2, got {nmaps}"
            )));
        }
        if offsets.len() % nmaps != 0 {
            return Err(EngineError::invalid(format!(
                "{} offsets do not split into {nmaps} equal tables",
                offsets.len()
            )));
        }
        if let Some(pos) = offsets.iter().position(|&o| o < 0) {
            return Err(EngineError::invalid(format!(
                "negative offset {} at position {pos}",
                offsets[pos]
            )));
        }
        let ngpts = offsets.len() / nmaps;
        if nmaps == 2 {
            let (primary, partners) = offsets.split_at(ngpts);
            if let Some(k) = primary.iter().zip(partners).position(|(a, b)| a == b) {
                return Err(EngineError::invalid(format!(
                    "coefficient {k} at offset {} is its own conjugate partner",
                    primary[k]
                )));
            }
        }
        Ok(Self {
            offsets,
            ngpts,
            nmaps,
        })
    }

    /// Every grid point within `cutoff` of the origin, in dense order.
    ///
    /// `cutoff` is a fraction of the Nyquist frequency, measured per axis.
    pub fn spherical(shape: GridShape, cutoff: f64) -> EngineResult<Self> {
        let mut offsets = Vec::new();
        for_each_point(shape, |lin, freq| {
            if within_cutoff(shape, freq, cutoff) {
                offsets.push(lin);
            }
        })?;
        Self::from_raw(offsets, 1)
    }

    /// One representative of each conjugate pair within `cutoff`, with its partner.
    ///
    /// Self-conjugate points (the origin and pure Nyquist points) cannot be
    /// expressed as a pair and are left out.
    pub fn hermitian_half(shape: GridShape, cutoff: f64) -> EngineResult<Self> {
        let mut primary = Vec::new();
        let mut partners = Vec::new();
        for_each_point(shape, |lin, freq| {
            if !within_cutoff(shape, freq, cutoff) {
                return;
            }
            let partner = conjugate_index(shape, freq);
            if (lin as usize) < partner {
                primary.push(lin);
                partners.push(partner as i32);
            }
        })?;
        Self::paired(&primary, &partners)
    }

    pub fn ngpts(&self) -> usize {
        self.ngpts
    }

    pub fn nmaps(&self) -> usize {
        self.nmaps
    }

    pub fn is_empty(&self) -> bool {
        self.ngpts == 0
    }

    /// The full flat table (`nmaps * ngpts` offsets).
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn primary(&self) -> &[i32] {
        &self.offsets[..self.ngpts]
    }

    pub fn partners(&self) -> Option<&[i32]> {
        (self.nmaps == 2).then(|| &self.offsets[self.ngpts..])
    }

    /// Fails if any offset addresses an element at or past `dense_len`.
    pub fn check_bounds(&self, dense_len: usize) -> EngineResult<()> {
        match self.offsets.iter().position(|&o| o as usize >= dense_len) {
            Some(pos) => Err(EngineError::invalid(format!(
                "offset {} at position {pos} is outside a dense grid of {dense_len} points",
                self.offsets[pos]
            ))),
            None => Ok(()),
        }
    }
}

fn for_each_point(shape: GridShape, mut visit: impl FnMut(i32, [i64; 3])) -> EngineResult<()> {
    if shape.len() > i32::MAX as usize {
        return Err(EngineError::invalid(format!(
            "grid of {} points cannot be indexed with 32-bit offsets",
            shape.len()
        )));
    }
    let [n0, n1, n2] = shape.npts;
    for i2 in 0..n2 {
        for i1 in 0..n1 {
            for i0 in 0..n0 {
                let freq = [
                    shape.frequency(0, i0),
                    shape.frequency(1, i1),
                    shape.frequency(2, i2),
                ];
                visit(shape.idx(i0, i1, i2) as i32, freq);
            }
        }
    }
    Ok(())
}

fn within_cutoff(shape: GridShape, freq: [i64; 3], cutoff: f64) -> bool {
    let radius_sq: f64 = freq
        .iter()
        .zip(shape.npts)
        .map(|(&f, n)| {
            let nyquist = n as f64 / 2.0;
            let r = f as f64 / nyquist;
            r * r
        })
        .sum();
    radius_sq <= cutoff * cutoff
}

fn conjugate_index(shape: GridShape, freq: [i64; 3]) -> usize {
    let wrap = |axis: usize| -> usize {
        let n = shape.npts[axis] as i64;
        (-freq[axis]).rem_euclid(n) as usize
    };
    shape.idx(wrap(0), wrap(1), wrap(2))
}
