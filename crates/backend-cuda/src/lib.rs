//! CUDA device for the plane-wave FFT engine, built on cudarc.
//!
//! Streams and events are driver streams and events, the packing and
//! gather/scatter kernels are compiled with NVRTC on first use of a device,
//! transforms are cuFFT plans and the output scale is a cuBLAS `Dscal`.
//! Without the `cuda` feature the crate only reports that no device is
//! available.

#[cfg(feature = "cuda")]
mod cufft;
#[cfg(feature = "cuda")]
mod cufft_sys;
#[cfg(feature = "cuda")]
mod error;
#[cfg(feature = "cuda")]
mod kernels;

#[cfg(feature = "cuda")]
pub use device::CudaDevice;
#[cfg(feature = "cuda")]
pub use error::CudaDeviceError;

/// Whether a CUDA device can be opened by this build.
#[cfg(feature = "cuda")]
pub fn is_available() -> bool {
    cudarc::driver::CudaContext::new(0).is_ok()
}

#[cfg(not(feature = "cuda"))]
pub fn is_available() -> bool {
    false
}

#[cfg(feature = "cuda")]
mod device {
    use std::sync::Arc;

    use cudarc::cublas::sys::{cublasDscal_v2, cublasStatus_t};
    use cudarc::cublas::CudaBlas;
    use cudarc::driver::{sys, CudaContext, CudaEvent, CudaSlice, CudaStream, DevicePtrMut};
    use log::{debug, info};
    use pwfft_core::device::Device;
    use pwfft_core::launch::{LaunchGeometry, LaunchLimits};
    use pwfft_core::plan::PlanLayout;
    use pwfft_core::{Direction, EngineError, EngineResult, MemoryInfo};

    use crate::cufft::CufftPlan;
    use crate::error::CudaDeviceError;
    use crate::kernels::PwKernels;

    pub struct CudaDevice {
        ctx: Arc<CudaContext>,
        /// Allocations and BLAS calls; synchronized before their results are used.
        host_stream: Arc<CudaStream>,
        blas: CudaBlas,
        kernels: PwKernels,
        limits: LaunchLimits,
        name: String,
    }

    #[track_caller]
    fn ensure_fits(op: &'static str, needed: usize, capacity: usize) -> EngineResult<()> {
        if needed > capacity {
            return Err(CudaDeviceError::Overflow { needed, capacity }.into_engine(op));
        }
        Ok(())
    }

    #[track_caller]
    fn lift<T, E: Into<CudaDeviceError>>(op: &'static str, result: Result<T, E>) -> EngineResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(Into::<CudaDeviceError>::into(err).into_engine(op)),
        }
    }

    impl CudaDevice {
        /// Opens device `ordinal`, compiles the kernels and reads its launch limits.
        pub fn try_new(ordinal: usize) -> EngineResult<Self> {
            let ctx = lift("context_create", CudaContext::new(ordinal))?;
            let host_stream = lift("stream_create", ctx.new_stream())?;
            let blas = lift("cublas_create", CudaBlas::new(Arc::clone(&host_stream)))?;
            let kernels = PwKernels::compile(&ctx).map_err(|e| e.into_engine("kernel_compile"))?;

            let attribute = |attr| lift("device_attribute", ctx.attribute(attr));
            let threads = attribute(sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?;
            let grid_x = attribute(sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?;
            let grid_y = attribute(sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Y)?;
            let limits = LaunchLimits {
                max_threads_per_group: threads.max(1) as u32,
                max_groups_per_dim: grid_x.min(grid_y).max(1) as u32,
            };
            let name = format!("cuda:{ordinal}");
            info!("opened {name} with {limits:?}");
            Ok(Self {
                ctx,
                host_stream,
                blas,
                kernels,
                limits,
                name,
            })
        }

        fn alloc_slice<T>(&self, what: &'static str, len: usize) -> EngineResult<CudaSlice<T>>
        where
            T: cudarc::driver::DeviceRepr + cudarc::driver::ValidAsZeroBits,
        {
            let bytes = len.saturating_mul(std::mem::size_of::<T>());
            let slice = self
                .host_stream
                .alloc_zeros::<T>(len.max(1))
                .map_err(|e| CudaDeviceError::from(e).into_alloc_error(what, bytes))?;
            lift("stream_synchronize", self.host_stream.synchronize())?;
            Ok(slice)
        }
    }

    impl Device for CudaDevice {
        type Stream = Arc<CudaStream>;
        type Event = CudaEvent;
        type Buffer = CudaSlice<f64>;
        type IndexBuffer = CudaSlice<i32>;
        type Plan = CufftPlan;

        fn name(&self) -> &str {
            &self.name
        }

        fn launch_limits(&self) -> LaunchLimits {
            self.limits
        }

        fn memory_info(&self) -> Option<MemoryInfo> {
            self.ctx.bind_to_thread().ok()?;
            let (free, total) = cudarc::driver::result::mem_get_info().ok()?;
            Some(MemoryInfo { free, total })
        }

        fn create_stream(&self) -> EngineResult<Self::Stream> {
            lift("stream_create", self.ctx.new_stream())
        }

        fn create_event(&self) -> EngineResult<CudaEvent> {
            lift("event_create", self.ctx.new_event(None))
        }

        fn alloc(&self, len: usize) -> EngineResult<CudaSlice<f64>> {
            self.alloc_slice("buffer", len)
        }

        fn alloc_index(&self, len: usize) -> EngineResult<CudaSlice<i32>> {
            self.alloc_slice("index buffer", len)
        }

        fn upload(&self, stream: &Self::Stream, src: &[f64], dst: &mut CudaSlice<f64>) -> EngineResult<()> {
            ensure_fits("memcpy_htod", src.len(), dst.len())?;
            if src.is_empty() {
                return Ok(());
            }
            lift("memcpy_htod", stream.memcpy_htod(src, &mut dst.slice_mut(..src.len())))
        }

        fn upload_index(&self, stream: &Self::Stream, src: &[i32], dst: &mut CudaSlice<i32>) -> EngineResult<()> {
            ensure_fits("memcpy_htod", src.len(), dst.len())?;
            if src.is_empty() {
                return Ok(());
            }
            lift("memcpy_htod", stream.memcpy_htod(src, &mut dst.slice_mut(..src.len())))
        }

        fn download_blocking(
            &self,
            stream: &Self::Stream,
            src: &CudaSlice<f64>,
            dst: &mut [f64],
        ) -> EngineResult<()> {
            ensure_fits("memcpy_dtoh", dst.len(), src.len())?;
            if !dst.is_empty() {
                lift("memcpy_dtoh", stream.memcpy_dtoh(&src.slice(..dst.len()), dst))?;
            }
            lift("stream_synchronize", stream.synchronize())
        }

        fn record(&self, stream: &Self::Stream, event: &CudaEvent) -> EngineResult<()> {
            lift("event_record", event.record(stream))
        }

        fn wait(&self, stream: &Self::Stream, event: &CudaEvent) -> EngineResult<()> {
            lift("stream_wait_event", stream.wait(event))
        }

        fn synchronize(&self, stream: &Self::Stream) -> EngineResult<()> {
            lift("stream_synchronize", stream.synchronize())
        }

        fn zero(&self, stream: &Self::Stream, buffer: &mut CudaSlice<f64>, len: usize) -> EngineResult<()> {
            ensure_fits("memset", len, buffer.len())?;
            if len == 0 {
                return Ok(());
            }
            lift("memset", stream.memset_zeros(&mut buffer.slice_mut(..len)))
        }

        fn expand(
            &self,
            stream: &Self::Stream,
            geom: &LaunchGeometry,
            real: &CudaSlice<f64>,
            complex: &mut CudaSlice<f64>,
            n: usize,
        ) -> EngineResult<()> {
            ensure_fits("expand", n, real.len())?;
            ensure_fits("expand", 2 * n, complex.len())?;
            unsafe { self.kernels.expand(stream, geom, real, complex, n) }.map_err(|e| e.into_engine("expand"))
        }

        fn contract(
            &self,
            stream: &Self::Stream,
            geom: &LaunchGeometry,
            complex: &CudaSlice<f64>,
            real: &mut CudaSlice<f64>,
            n: usize,
        ) -> EngineResult<()> {
            ensure_fits("contract", 2 * n, complex.len())?;
            ensure_fits("contract", n, real.len())?;
            unsafe { self.kernels.contract(stream, geom, complex, real, n) }
                .map_err(|e| e.into_engine("contract"))
        }

        fn gather(
            &self,
            stream: &Self::Stream,
            geom: &LaunchGeometry,
            dense: &CudaSlice<f64>,
            compact: &mut CudaSlice<f64>,
            scale: f64,
            ngpts: usize,
            map: &CudaSlice<i32>,
        ) -> EngineResult<()> {
            ensure_fits("gather", ngpts, map.len())?;
            ensure_fits("gather", 2 * ngpts, compact.len())?;
            unsafe { self.kernels.gather(stream, geom, dense, compact, scale, ngpts, map) }
                .map_err(|e| e.into_engine("gather"))
        }

        fn scatter(
            &self,
            stream: &Self::Stream,
            geom: &LaunchGeometry,
            compact: &CudaSlice<f64>,
            dense: &mut CudaSlice<f64>,
            scale: f64,
            ngpts: usize,
            nmaps: usize,
            map: &CudaSlice<i32>,
        ) -> EngineResult<()> {
            ensure_fits("scatter", nmaps * ngpts, map.len())?;
            ensure_fits("scatter", 2 * ngpts, compact.len())?;
            let nmaps = i32::try_from(nmaps).map_err(|_| EngineError::invalid("nmaps exceeds i32"))?;
            unsafe {
                self.kernels
                    .scatter(stream, geom, compact, dense, scale, ngpts, nmaps, map)
            }
            .map_err(|e| e.into_engine("scatter"))
        }

        fn create_plan(&self, layout: &PlanLayout, stream: &Self::Stream) -> EngineResult<CufftPlan> {
            let plan = CufftPlan::new(layout, stream).map_err(|e| e.into_engine("plan_create"))?;
            debug!(
                "built cuFFT rank-{} plan over {:?} x {}",
                layout.rank(),
                layout.dims,
                layout.batch
            );
            Ok(plan)
        }

        fn execute(
            &self,
            plan: &CufftPlan,
            stream: &Self::Stream,
            src: &CudaSlice<f64>,
            dst: &mut CudaSlice<f64>,
            direction: Direction,
        ) -> EngineResult<()> {
            ensure_fits("plan_execute", 2 * plan.layout().input_extent(), src.len())?;
            ensure_fits("plan_execute", 2 * plan.layout().output_extent(), dst.len())?;
            lift("plan_execute", plan.execute(stream, src, dst, direction))
        }

        fn execute_in_place(
            &self,
            plan: &CufftPlan,
            stream: &Self::Stream,
            data: &mut CudaSlice<f64>,
            direction: Direction,
        ) -> EngineResult<()> {
            let layout = plan.layout();
            if layout.input != layout.output {
                return Err(CudaDeviceError::InvalidPlan(
                    "in-place execution needs matching input and output layouts".into(),
                )
                .into_engine("plan_execute"));
            }
            ensure_fits("plan_execute", 2 * layout.input_extent(), data.len())?;
            lift("plan_execute", plan.execute_in_place(stream, data, direction))
        }

        fn scale(&self, data: &mut CudaSlice<f64>, len: usize, factor: f64) -> EngineResult<()> {
            ensure_fits("dscal", len, data.len())?;
            let n = i32::try_from(len).map_err(|_| EngineError::invalid("scale length exceeds i32"))?;
            {
                let (ptr, _sync) = data.device_ptr_mut(&self.host_stream);
                let status = unsafe { cublasDscal_v2(*self.blas.handle(), n, &factor, ptr as *mut f64, 1) };
                if status != cublasStatus_t::CUBLAS_STATUS_SUCCESS {
                    return Err(EngineError::primitive("dscal", format!("{status:?}")));
                }
            }
            lift("stream_synchronize", self.host_stream.synchronize())
        }
    }
}

#[cfg(all(test, feature = "cuda"))]
mod _tests_lib;
