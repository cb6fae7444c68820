//! Interleaved views of complex host buffers.

use num_complex::Complex64;

/// Views complex values as interleaved `[re, im, re, im, ...]` scalars.
pub fn as_scalars(data: &[Complex64]) -> &[f64] {
    // SAFETY: Complex64 is repr(C) with exactly two f64 fields and no padding.
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f64, data.len() * 2) }
}

pub fn as_scalars_mut(data: &mut [Complex64]) -> &mut [f64] {
    // SAFETY: as above; the returned slice reborrows `data` exclusively.
    unsafe { std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f64, data.len() * 2) }
}
