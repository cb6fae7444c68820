//! Packing, gather and scatter kernels compiled with NVRTC.
//!
//! Complex data is interleaved `[re, im, ...]`. Every kernel runs over a
//! 2-D grid of 1-D groups and derives its work item from
//! `(gridDim.x * blockIdx.y + blockIdx.x) * blockDim.x + threadIdx.x`.

use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, LaunchConfig, PushKernelArg};
use pwfft_core::launch::LaunchGeometry;

use crate::error::CudaDeviceError;

const KERNEL_SOURCE: &str = r#"
extern "C" {

__device__ __forceinline__ size_t pw_item() {
    return ((size_t)gridDim.x * blockIdx.y + blockIdx.x) * blockDim.x + threadIdx.x;
}

__global__ void pw_expand(
    const double* __restrict__ real,
    double* __restrict__ cplx,
    size_t n
) {
    size_t i = pw_item();
    if (i < n) {
        cplx[2*i] = real[i];
        cplx[2*i + 1] = 0.0;
    }
}

__global__ void pw_contract(
    const double* __restrict__ cplx,
    double* __restrict__ real,
    size_t n
) {
    size_t i = pw_item();
    if (i < n) {
        real[i] = cplx[2*i];
    }
}

__global__ void pw_gather(
    const double* __restrict__ dense,
    double* __restrict__ compact,
    double scale,
    size_t ngpts,
    const int* __restrict__ map
) {
    size_t k = pw_item();
    if (k < ngpts) {
        size_t g = (size_t)map[k];
        compact[2*k] = scale * dense[2*g];
        compact[2*k + 1] = scale * dense[2*g + 1];
    }
}

// With nmaps == 2 the second table names each point's conjugate partner.
__global__ void pw_scatter(
    const double* __restrict__ compact,
    double* __restrict__ dense,
    double scale,
    size_t ngpts,
    int nmaps,
    const int* __restrict__ map
) {
    size_t k = pw_item();
    if (k < ngpts) {
        double re = scale * compact[2*k];
        double im = scale * compact[2*k + 1];
        size_t g = (size_t)map[k];
        dense[2*g] = re;
        dense[2*g + 1] = im;
        if (nmaps == 2) {
            size_t p = (size_t)map[k + ngpts];
            dense[2*p] = re;
            dense[2*p + 1] = -im;
        }
    }
}

} // extern "C"
"#;

fn launch_config(geom: &LaunchGeometry) -> LaunchConfig {
    LaunchConfig {
        grid_dim: geom.grid_dim(),
        block_dim: geom.block_dim(),
        shared_mem_bytes: 0,
    }
}

pub struct PwKernels {
    _module: Arc<CudaModule>,
    expand: CudaFunction,
    contract: CudaFunction,
    gather: CudaFunction,
    scatter: CudaFunction,
}

impl PwKernels {
    pub fn compile(ctx: &Arc<CudaContext>) -> Result<Self, CudaDeviceError> {
        log::debug!("compiling plane-wave kernels");
        let ptx = cudarc::nvrtc::compile_ptx(KERNEL_SOURCE)?;
        let module = ctx.load_module(ptx)?;
        Ok(Self {
            expand: module.load_function("pw_expand")?,
            contract: module.load_function("pw_contract")?,
            gather: module.load_function("pw_gather")?,
            scatter: module.load_function("pw_scatter")?,
            _module: module,
        })
    }

    /// # Safety
    /// `real` holds at least `n` scalars and `cplx` at least `2 * n`.
    pub unsafe fn expand(
        &self,
        stream: &CudaStream,
        geom: &LaunchGeometry,
        real: &CudaSlice<f64>,
        cplx: &mut CudaSlice<f64>,
        n: usize,
    ) -> Result<(), CudaDeviceError> {
        stream
            .launch_builder(&self.expand)
            .arg(real)
            .arg(cplx)
            .arg(&n)
            .launch(launch_config(geom))?;
        Ok(())
    }

    /// # Safety
    /// `cplx` holds at least `2 * n` scalars and `real` at least `n`.
    pub unsafe fn contract(
        &self,
        stream: &CudaStream,
        geom: &LaunchGeometry,
        cplx: &CudaSlice<f64>,
        real: &mut CudaSlice<f64>,
        n: usize,
    ) -> Result<(), CudaDeviceError> {
        stream
            .launch_builder(&self.contract)
            .arg(cplx)
            .arg(real)
            .arg(&n)
            .launch(launch_config(geom))?;
        Ok(())
    }

    /// # Safety
    /// Every offset in the first `ngpts` entries of `map` addresses a
    /// complex element of `dense`.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn gather(
        &self,
        stream: &CudaStream,
        geom: &LaunchGeometry,
        dense: &CudaSlice<f64>,
        compact: &mut CudaSlice<f64>,
        scale: f64,
        ngpts: usize,
        map: &CudaSlice<i32>,
    ) -> Result<(), CudaDeviceError> {
        stream
            .launch_builder(&self.gather)
            .arg(dense)
            .arg(compact)
            .arg(&scale)
            .arg(&ngpts)
            .arg(map)
            .launch(launch_config(geom))?;
        Ok(())
    }

    /// # Safety
    /// Every offset in the first `nmaps * ngpts` entries of `map` addresses
    /// a complex element of `dense`.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn scatter(
        &self,
        stream: &CudaStream,
        geom: &LaunchGeometry,
        compact: &CudaSlice<f64>,
        dense: &mut CudaSlice<f64>,
        scale: f64,
        ngpts: usize,
        nmaps: i32,
        map: &CudaSlice<i32>,
    ) -> Result<(), CudaDeviceError> {
        stream
            .launch_builder(&self.scatter)
            .arg(compact)
            .arg(dense)
            .arg(&scale)
            .arg(&ngpts)
            .arg(&nmaps)
            .arg(map)
            .launch(launch_config(geom))?;
        Ok(())
    }
}
