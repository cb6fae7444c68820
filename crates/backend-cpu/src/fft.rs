//! Strided, batched FFT plans on top of rustfft.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use pwfft_core::plan::{PlanLayout, Stride};
use pwfft_core::Direction;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::error::CpuDeviceError;

/// One plan: a 1-D FFT per axis in each direction plus the strided layout
/// it reads and writes. Cheap to clone; streams hold clones while queued.
#[derive(Clone)]
pub struct CpuPlan {
    inner: Arc<PlanInner>,
}

struct PlanInner {
    layout: PlanLayout,
    forward: Vec<Arc<dyn Fft<f64>>>,
    inverse: Vec<Arc<dyn Fft<f64>>>,
}

impl fmt::Debug for CpuPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuPlan")
            .field("layout", &self.inner.layout)
            .finish_non_exhaustive()
    }
}

impl CpuPlan {
    pub(crate) fn build(planner: &mut FftPlanner<f64>, layout: &PlanLayout) -> Result<Self, CpuDeviceError> {
        if layout.dims.is_empty() || layout.dims.contains(&0) {
            return Err(CpuDeviceError::InvalidPlan(format!(
                "transform extents {:?} must be non-empty and positive",
                layout.dims
            )));
        }
        if layout.batch == 0 {
            return Err(CpuDeviceError::InvalidPlan("batch count is zero".into()));
        }
        let forward = layout.dims.iter().map(|&n| planner.plan_fft_forward(n)).collect();
        let inverse = layout.dims.iter().map(|&n| planner.plan_fft_inverse(n)).collect();
        Ok(Self {
            inner: Arc::new(PlanInner {
                layout: layout.clone(),
                forward,
                inverse,
            }),
        })
    }

    pub fn layout(&self) -> &PlanLayout {
        &self.inner.layout
    }

    /// Transforms `src` into `dst`, both interleaved scalars.
    pub(crate) fn run(&self, src: &[f64], dst: &mut [f64], direction: Direction) {
        let layout = &self.inner.layout;
        let mut work = load(src, layout.input, layout);
        self.transform_all(&mut work, direction);
        store(&work, dst, layout.output, layout);
    }

    /// Same as [`CpuPlan::run`] over one buffer; the input and output
    /// layouts must coincide.
    pub(crate) fn run_in_place(&self, data: &mut [f64], direction: Direction) {
        let layout = &self.inner.layout;
        let mut work = load(data, layout.input, layout);
        self.transform_all(&mut work, direction);
        store(&work, data, layout.output, layout);
    }

    fn transform_all(&self, work: &mut [Complex64], direction: Direction) {
        let ffts = match direction {
            Direction::Forward => &self.inner.forward,
            Direction::Inverse => &self.inner.inverse,
        };
        let dims = &self.inner.layout.dims;
        let len = self.inner.layout.transform_len();
        work.par_chunks_mut(len)
            .for_each(|transform| transform_dense(transform, dims, ffts));
    }
}

/// Collects every transform of the batch into one contiguous row-major block.
fn load(src: &[f64], stride: Stride, layout: &PlanLayout) -> Vec<Complex64> {
    let len = layout.transform_len();
    let mut work = Vec::with_capacity(layout.total_len());
    for b in 0..layout.batch {
        work.extend((0..len).map(|lin| {
            let p = PlanLayout::position(stride, b, lin);
            Complex64::new(src[2 * p], src[2 * p + 1])
        }));
    }
    work
}

fn store(work: &[Complex64], dst: &mut [f64], stride: Stride, layout: &PlanLayout) {
    let len = layout.transform_len();
    for (b, transform) in work.chunks_exact(len).enumerate() {
        for (lin, value) in transform.iter().enumerate() {
            let p = PlanLayout::position(stride, b, lin);
            dst[2 * p] = value.re;
            dst[2 * p + 1] = value.im;
        }
    }
}

/// Multi-dimensional FFT of one row-major transform, one axis at a time.
fn transform_dense(data: &mut [Complex64], dims: &[usize], ffts: &[Arc<dyn Fft<f64>>]) {
    let rank = dims.len();
    for (axis, fft) in ffts.iter().enumerate() {
        let n = dims[axis];
        if n == 1 {
            continue;
        }
        let inner: usize = dims[axis + 1..rank].iter().product();
        if inner == 1 {
            fft.process(data);
            continue;
        }
        let outer: usize = dims[..axis].iter().product();
        let mut line = vec![Complex64::default(); n];
        let mut scratch = vec![Complex64::default(); fft.get_inplace_scratch_len()];
        for o in 0..outer {
            let base = o * n * inner;
            for i in 0..inner {
                for (j, value) in line.iter_mut().enumerate() {
                    *value = data[base + j * inner + i];
                }
                fft.process_with_scratch(&mut line, &mut scratch);
                for (j, value) in line.iter().enumerate() {
                    data[base + j * inner + i] = *value;
                }
            }
        }
    }
}
