//! Raw bindings to the cuFFT entry points the plans use.
//!
//! cuFFT documentation: https://docs.nvidia.com/cuda/cufft/

#![allow(non_camel_case_types)]
#![allow(dead_code)]

use std::ffi::c_int;

pub type cufftHandle = c_int;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum cufftResult {
    CUFFT_SUCCESS = 0,
    CUFFT_INVALID_PLAN = 1,
    CUFFT_ALLOC_FAILED = 2,
    CUFFT_INVALID_TYPE = 3,
    CUFFT_INVALID_VALUE = 4,
    CUFFT_INTERNAL_ERROR = 5,
    CUFFT_EXEC_FAILED = 6,
    CUFFT_SETUP_FAILED = 7,
    CUFFT_INVALID_SIZE = 8,
    CUFFT_UNALIGNED_DATA = 9,
    CUFFT_INCOMPLETE_PARAMETER_LIST = 10,
    CUFFT_INVALID_DEVICE = 11,
    CUFFT_PARSE_ERROR = 12,
    CUFFT_NO_WORKSPACE = 13,
    CUFFT_NOT_IMPLEMENTED = 14,
    CUFFT_LICENSE_ERROR = 15,
    CUFFT_NOT_SUPPORTED = 16,
}

impl cufftResult {
    pub fn to_result(self) -> Result<(), CufftError> {
        match self {
            cufftResult::CUFFT_SUCCESS => Ok(()),
            other => Err(CufftError(other)),
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum cufftType {
    CUFFT_R2C = 0x2a,
    CUFFT_C2R = 0x2c,
    CUFFT_C2C = 0x29,
    CUFFT_D2Z = 0x6a,
    CUFFT_Z2D = 0x6c,
    /// Double-complex to double-complex, interleaved.
    CUFFT_Z2Z = 0x69,
}

pub const CUFFT_FORWARD: c_int = -1;
pub const CUFFT_INVERSE: c_int = 1;

/// Same layout as `cuDoubleComplex` and as two consecutive `f64`s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct cufftDoubleComplex {
    pub x: f64,
    pub y: f64,
}

pub type cudaStream_t = *mut std::ffi::c_void;

#[link(name = "cufft")]
extern "C" {
    /// Batched, strided plan. Element `e` of transform `b` lives at
    /// `b * idist + e * istride` where `e` is row-major over `n` bounded by
    /// `inembed`.
    pub fn cufftPlanMany(
        plan: *mut cufftHandle,
        rank: c_int,
        n: *mut c_int,
        inembed: *mut c_int,
        istride: c_int,
        idist: c_int,
        onembed: *mut c_int,
        ostride: c_int,
        odist: c_int,
        fft_type: cufftType,
        batch: c_int,
    ) -> cufftResult;

    /// Unnormalized: a forward then inverse pass scales by the transform length.
    pub fn cufftExecZ2Z(
        plan: cufftHandle,
        idata: *mut cufftDoubleComplex,
        odata: *mut cufftDoubleComplex,
        direction: c_int,
    ) -> cufftResult;

    pub fn cufftSetStream(plan: cufftHandle, stream: cudaStream_t) -> cufftResult;

    pub fn cufftDestroy(plan: cufftHandle) -> cufftResult;
}

#[derive(Debug, Clone, Copy)]
pub struct CufftError(pub cufftResult);

impl std::fmt::Display for CufftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cuFFT error: {:?}", self.0)
    }
}

impl std::error::Error for CufftError {}
