//! Device tests; each one skips when no CUDA device can be opened.

#![cfg(all(test, feature = "cuda"))]

use num_complex::Complex64;
use pwfft_core::device::Device;
use pwfft_core::{CoefficientMap, Direction, Engine, GridShape};

use crate::CudaDevice;

fn open() -> Option<CudaDevice> {
    match CudaDevice::try_new(0) {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping: no CUDA device ({err})");
            None
        }
    }
}

#[test]
fn limits_come_from_the_device() {
    let Some(device) = open() else { return };
    let limits = device.launch_limits();
    assert!(limits.max_threads_per_group >= 32);
    assert!(limits.max_groups_per_dim >= 65535);
    assert!(device.memory_info().is_some());
}

#[test]
fn projection_round_trip_on_device() {
    let Some(device) = open() else { return };
    let mut engine = Engine::new(device).unwrap();
    let shape = GridShape::new(8, 6, 4);
    let n = shape.len();
    let din: Vec<f64> = (0..n).map(|i| (0.3 * i as f64).sin()).collect();
    let map = CoefficientMap::single((0..n as i32).collect()).unwrap();
    let mut coeffs = vec![Complex64::default(); n];
    let mut back = vec![0.0; n];

    engine
        .forward_gather(&din, &mut coeffs, &map, shape, 1.0 / n as f64)
        .unwrap();
    engine
        .scatter_backward(&coeffs, &mut back, &map, shape, 1.0)
        .unwrap();
    for (a, e) in back.iter().zip(&din) {
        assert!((a - e).abs() < 1e-10, "{a} vs {e}");
    }
}

#[test]
fn batched_lines_scale_by_length_after_round_trip() {
    let Some(device) = open() else { return };
    let mut engine = Engine::new(device).unwrap();
    let (len, batch) = (16, 5);
    let zin: Vec<Complex64> = (0..len * batch)
        .map(|i| Complex64::new(i as f64, -(i as f64) * 0.5))
        .collect();
    let mut spectrum = vec![Complex64::default(); len * batch];
    let mut back = vec![Complex64::default(); len * batch];
    engine
        .fft_1d(&zin, &mut spectrum, Direction::Forward, len, batch)
        .unwrap();
    engine
        .fft_1d(&spectrum, &mut back, Direction::Inverse, len, batch)
        .unwrap();
    for (a, e) in back.iter().zip(&zin) {
        assert!((a - e * len as f64).norm() < 1e-8, "{a} vs {e}");
    }
}
