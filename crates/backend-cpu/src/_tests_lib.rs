//! Unit tests for the host-emulated device: streams, events, memory
//! accounting and strided plans.

#![cfg(test)]

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use num_complex::Complex64;
use pwfft_core::device::Device;
use pwfft_core::plan::PlanKey;
use pwfft_core::{Direction, ErrorKind, GridShape};

use crate::stream::{CpuEvent, CpuStream};
use crate::CpuDevice;

fn naive_dft(input: &[Complex64], sign: f64) -> Vec<Complex64> {
    let n = input.len();
    (0..n)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(j, x)| {
                    let phase = sign * 2.0 * PI * (j * k) as f64 / n as f64;
                    x * Complex64::new(phase.cos(), phase.sin())
                })
                .sum()
        })
        .collect()
}

fn interleave(values: &[Complex64]) -> Vec<f64> {
    values.iter().flat_map(|c| [c.re, c.im]).collect()
}

fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < tol, "scalar {i}: got {a}, expected {e}");
    }
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn stream_runs_commands_in_submission_order() {
    let stream = CpuStream::spawn("order".into()).unwrap();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for i in 0..16 {
        let log = Arc::clone(&log);
        stream
            .submit(move || {
                log.lock().push(i);
                Ok(())
            })
            .unwrap();
    }
    stream.synchronize().unwrap();
    assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
}

#[test]
fn failed_command_faults_the_stream() {
    let stream = CpuStream::spawn("faulty".into()).unwrap();
    stream.submit(|| Err("boom".to_string())).unwrap();
    let err = stream.synchronize().unwrap_err();
    assert!(err.to_string().contains("boom"), "{err}");
    assert_eq!(stream.fault().as_deref(), Some("boom"));
    assert!(stream.submit(|| Ok(())).is_err());
}

#[test]
fn panicking_command_faults_the_stream() {
    let stream = CpuStream::spawn("panicky".into()).unwrap();
    stream.submit(|| panic!("kernel fell over")).unwrap();
    assert!(stream.synchronize().is_err());
    let fault = stream.fault().unwrap();
    assert!(fault.contains("kernel fell over"), "{fault}");
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn waiting_on_unrecorded_event_is_a_no_op() {
    let stream = CpuStream::spawn("idle".into()).unwrap();
    let event = CpuEvent::default();
    event.wait_on(&stream).unwrap();
    stream.synchronize().unwrap();
    assert_eq!(event.completed(), 0);
}

#[test]
fn event_orders_work_across_streams() {
    let producer = CpuStream::spawn("producer".into()).unwrap();
    let consumer = CpuStream::spawn("consumer".into()).unwrap();
    let event = CpuEvent::default();
    let value = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(usize::MAX));

    let writer = Arc::clone(&value);
    producer
        .submit(move || {
            thread::sleep(Duration::from_millis(50));
            writer.store(7, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    event.record_on(&producer).unwrap();
    event.wait_on(&consumer).unwrap();

    let (reader, sink) = (Arc::clone(&value), Arc::clone(&seen));
    consumer
        .submit(move || {
            sink.store(reader.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    consumer.synchronize().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 7);
    assert_eq!(event.completed(), 1);
}

#[test]
fn fault_on_recording_stream_reaches_the_waiter() {
    let producer = CpuStream::spawn("producer".into()).unwrap();
    let consumer = CpuStream::spawn("consumer".into()).unwrap();
    let event = CpuEvent::default();

    producer.submit(|| Err("copy failed".to_string())).unwrap();
    // The record may be accepted before the worker notices the fault.
    let _ = event.record_on(&producer);
    event.wait_on(&consumer).unwrap();

    let err = consumer.synchronize().unwrap_err();
    assert!(err.to_string().contains("awaited event faulted"), "{err}");
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn allocations_are_accounted_and_released() {
    let device = CpuDevice::new().with_memory_limit(1024);
    let first = device.alloc(64).unwrap();
    assert_eq!(device.allocated_bytes(), 512);
    let info = device.memory_info().unwrap();
    assert_eq!((info.free, info.total), (512, 1024));

    let err = device.alloc(65).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    assert_eq!(err.memory().map(|m| m.free), Some(512));
    assert!(err.location().is_some());

    drop(first);
    assert_eq!(device.allocated_bytes(), 0);
    assert!(device.alloc(128).is_ok());
}

#[test]
fn unlimited_device_reports_no_memory_info() {
    let device = CpuDevice::new();
    assert!(device.memory_info().is_none());
    let _buffer = device.alloc(16).unwrap();
    let _index = device.alloc_index(16).unwrap();
    assert_eq!(device.allocated_bytes(), 16 * 8 + 16 * 4);
}

#[test]
fn oversized_upload_is_rejected_before_queueing() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let mut buffer = device.alloc(4).unwrap();
    let err = device.upload(&stream, &[1.0; 6], &mut buffer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PrimitiveFailure);
    assert!(err.to_string().contains("upload"), "{err}");
}

#[test]
fn upload_then_download_round_trips_leading_scalars() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let mut buffer = device.alloc(8).unwrap();
    device.upload(&stream, &[1.0, 2.0, 3.0], &mut buffer).unwrap();
    let mut out = [0.0; 4];
    device.download_blocking(&stream, &buffer, &mut out).unwrap();
    assert_eq!(out, [1.0, 2.0, 3.0, 0.0]);
}

// ============================================================================
// Plans
// ============================================================================

#[test]
fn volume_impulse_transforms_to_constant() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let shape = GridShape::new(2, 3, 4);
    let layout = PlanKey::volume_3d(shape).layout();
    let plan = device.create_plan(&layout, &stream).unwrap();

    let mut data = device.alloc(2 * shape.len()).unwrap();
    device.upload(&stream, &[1.0, 0.0], &mut data).unwrap();
    device
        .execute_in_place(&plan, &stream, &mut data, Direction::Forward)
        .unwrap();
    let mut out = vec![0.0; 2 * shape.len()];
    device.download_blocking(&stream, &data, &mut out).unwrap();

    let expected: Vec<f64> = (0..shape.len()).flat_map(|_| [1.0, 0.0]).collect();
    assert_close(&out, &expected, 1e-12);
}

#[test]
fn volume_transform_matches_separable_dft() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let shape = GridShape::new(3, 2, 2);
    let plan = device
        .create_plan(&PlanKey::volume_3d(shape).layout(), &stream)
        .unwrap();

    // A plane wave along axis 0 with frequency 1 lands on (1, 0, 0).
    let input: Vec<Complex64> = (0..shape.len())
        .map(|lin| {
            let i0 = lin % 3;
            let phase = 2.0 * PI * i0 as f64 / 3.0;
            Complex64::new(phase.cos(), phase.sin())
        })
        .collect();
    let mut data = device.alloc(2 * shape.len()).unwrap();
    device.upload(&stream, &interleave(&input), &mut data).unwrap();
    device
        .execute_in_place(&plan, &stream, &mut data, Direction::Forward)
        .unwrap();
    let mut out = vec![0.0; 2 * shape.len()];
    device.download_blocking(&stream, &data, &mut out).unwrap();

    let mut expected = vec![0.0; 2 * shape.len()];
    expected[2 * shape.idx(1, 0, 0)] = shape.len() as f64;
    assert_close(&out, &expected, 1e-9);
}

#[test]
fn strided_batched_line_transform_matches_naive_dft() {
    let (n, m) = (5, 3);
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let layout = PlanKey::batched_1d(n, m, Direction::Forward).layout();
    let plan = device.create_plan(&layout, &stream).unwrap();

    // Input element j of line b sits at b + j * m.
    let input: Vec<Complex64> = (0..n * m)
        .map(|p| Complex64::new(p as f64 * 0.5, 1.0 - p as f64 * 0.25))
        .collect();
    let mut src = device.alloc(2 * n * m).unwrap();
    let mut dst = device.alloc(2 * n * m).unwrap();
    device.upload(&stream, &interleave(&input), &mut src).unwrap();
    device
        .execute(&plan, &stream, &src, &mut dst, Direction::Forward)
        .unwrap();
    let mut out = vec![0.0; 2 * n * m];
    device.download_blocking(&stream, &dst, &mut out).unwrap();

    let mut expected = Vec::with_capacity(n * m);
    for b in 0..m {
        let line: Vec<Complex64> = (0..n).map(|j| input[b + j * m]).collect();
        expected.extend(naive_dft(&line, -1.0));
    }
    assert_close(&out, &interleave(&expected), 1e-9);
}

#[test]
fn in_place_execution_needs_matching_layouts() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let layout = PlanKey::batched_1d(4, 2, Direction::Forward).layout();
    let plan = device.create_plan(&layout, &stream).unwrap();
    let mut data = device.alloc(16).unwrap();
    let err = device
        .execute_in_place(&plan, &stream, &mut data, Direction::Forward)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PrimitiveFailure);
}

#[test]
fn degenerate_plan_is_rejected() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let layout = PlanKey::volume_3d(GridShape::new(4, 0, 4)).layout();
    let err = device.create_plan(&layout, &stream).unwrap_err();
    assert!(err.to_string().contains("plan_create"), "{err}");
}

#[test]
fn plan_debug_output_shows_its_layout() {
    let device = CpuDevice::new();
    let stream = device.create_stream().unwrap();
    let layout = PlanKey::batched_1d(8, 3, Direction::Inverse).layout();
    let plan = device.create_plan(&layout, &stream).unwrap();
    let text = format!("{plan:?}");
    assert!(text.starts_with("CpuPlan"), "{text}");
    assert!(text.contains(&format!("{:?}", layout.dims)), "{text}");
}
