use cudarc::cublas::result::CublasError;
use cudarc::driver::{sys, DriverError};
use cudarc::nvrtc::CompileError;
use pwfft_core::EngineError;

use crate::cufft_sys::CufftError;

#[derive(Debug, thiserror::Error)]
pub enum CudaDeviceError {
    #[error("driver: {0}")]
    Driver(#[from] DriverError),

    #[error("kernel compilation: {0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Cufft(#[from] CufftError),

    #[error("cuBLAS: {0:?}")]
    Blas(#[from] CublasError),

    #[error("buffer of {capacity} elements cannot hold {needed}")]
    Overflow { needed: usize, capacity: usize },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl CudaDeviceError {
    fn out_of_memory(&self) -> bool {
        matches!(self, Self::Driver(DriverError(sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY)))
    }

    #[track_caller]
    pub fn into_engine(self, op: &'static str) -> EngineError {
        EngineError::primitive(op, self)
    }

    /// Out-of-memory becomes resource exhaustion of `requested` bytes.
    #[track_caller]
    pub fn into_alloc_error(self, what: &'static str, requested: usize) -> EngineError {
        if self.out_of_memory() {
            EngineError::exhausted(what, requested)
        } else {
            EngineError::primitive("alloc", self)
        }
    }
}
