//! RAII wrapper over a batched, strided Z2Z cuFFT plan.

use std::ffi::c_int;
use std::sync::Arc;

use cudarc::driver::{CudaSlice, CudaStream, DevicePtr, DevicePtrMut};
use pwfft_core::plan::PlanLayout;
use pwfft_core::Direction;

use crate::cufft_sys::{
    cudaStream_t, cufftDestroy, cufftDoubleComplex, cufftExecZ2Z, cufftHandle, cufftPlanMany,
    cufftSetStream, cufftType, CufftError, CUFFT_FORWARD, CUFFT_INVERSE,
};
use crate::error::CudaDeviceError;

/// A plan bound to the stream it was built for. Destroyed on drop.
pub struct CufftPlan {
    handle: cufftHandle,
    layout: PlanLayout,
}

// Execution is issued from the thread owning the engine; creation and
// destruction never overlap for one handle.
unsafe impl Send for CufftPlan {}

fn as_int(value: usize, what: &str) -> Result<c_int, CudaDeviceError> {
    c_int::try_from(value)
        .map_err(|_| CudaDeviceError::InvalidPlan(format!("{what} {value} exceeds cuFFT's int range")))
}

impl CufftPlan {
    pub fn new(layout: &PlanLayout, stream: &Arc<CudaStream>) -> Result<Self, CudaDeviceError> {
        if layout.dims.is_empty() || layout.dims.contains(&0) || layout.batch == 0 {
            return Err(CudaDeviceError::InvalidPlan(format!(
                "cannot plan {:?} x {}",
                layout.dims, layout.batch
            )));
        }
        let mut dims = layout
            .dims
            .iter()
            .map(|&n| as_int(n, "extent"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut inembed = dims.clone();
        let mut onembed = dims.clone();
        let rank = as_int(dims.len(), "rank")?;

        let mut handle: cufftHandle = 0;
        unsafe {
            cufftPlanMany(
                &mut handle,
                rank,
                dims.as_mut_ptr(),
                inembed.as_mut_ptr(),
                as_int(layout.input.stride, "input stride")?,
                as_int(layout.input.distance, "input distance")?,
                onembed.as_mut_ptr(),
                as_int(layout.output.stride, "output stride")?,
                as_int(layout.output.distance, "output distance")?,
                cufftType::CUFFT_Z2Z,
                as_int(layout.batch, "batch")?,
            )
            .to_result()?;
        }
        let plan = Self {
            handle,
            layout: layout.clone(),
        };
        let stream_ptr = stream.cu_stream() as cudaStream_t;
        unsafe { cufftSetStream(plan.handle, stream_ptr) }.to_result()?;
        Ok(plan)
    }

    pub fn layout(&self) -> &PlanLayout {
        &self.layout
    }

    fn exec(
        &self,
        src: *mut cufftDoubleComplex,
        dst: *mut cufftDoubleComplex,
        direction: Direction,
    ) -> Result<(), CufftError> {
        let sign = match direction {
            Direction::Forward => CUFFT_FORWARD,
            Direction::Inverse => CUFFT_INVERSE,
        };
        unsafe { cufftExecZ2Z(self.handle, src, dst, sign) }.to_result()
    }

    /// Out-of-place execution; `src` is left unchanged.
    pub fn execute(
        &self,
        stream: &Arc<CudaStream>,
        src: &CudaSlice<f64>,
        dst: &mut CudaSlice<f64>,
        direction: Direction,
    ) -> Result<(), CufftError> {
        let (src_ptr, _src_sync) = src.device_ptr(stream);
        let (dst_ptr, _dst_sync) = dst.device_ptr_mut(stream);
        self.exec(
            src_ptr as *mut cufftDoubleComplex,
            dst_ptr as *mut cufftDoubleComplex,
            direction,
        )
    }

    pub fn execute_in_place(
        &self,
        stream: &Arc<CudaStream>,
        data: &mut CudaSlice<f64>,
        direction: Direction,
    ) -> Result<(), CufftError> {
        let (ptr, _sync) = data.device_ptr_mut(stream);
        let ptr = ptr as *mut cufftDoubleComplex;
        self.exec(ptr, ptr, direction)
    }
}

impl Drop for CufftPlan {
    fn drop(&mut self) {
        if let Err(err) = unsafe { cufftDestroy(self.handle) }.to_result() {
            log::warn!("failed to destroy cuFFT plan {}: {err}", self.handle);
        }
    }
}
