//! Host-emulated accelerator for the plane-wave FFT engine.
//!
//! Streams are worker threads, kernels run the shared host kernel bodies
//! with rayon, and plans are rustfft transforms applied through the plan's
//! strided layout. Enqueued work really is asynchronous, so the engine's
//! event ordering is exercised the same way it is on a GPU.

mod error;
mod fft;
mod memory;
mod stream;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use pwfft_core::device::Device;
use pwfft_core::kernels;
use pwfft_core::launch::{LaunchGeometry, LaunchLimits};
use pwfft_core::plan::PlanLayout;
use pwfft_core::{Direction, EngineResult, MemoryInfo};
use rustfft::FftPlanner;

pub use error::CpuDeviceError;
pub use fft::CpuPlan;
pub use memory::{CpuBuffer, CpuIndexBuffer};
pub use stream::{CpuEvent, CpuStream};

use memory::MemoryPool;

pub struct CpuDevice {
    pool: Arc<MemoryPool>,
    planner: Mutex<FftPlanner<f64>>,
    limits: LaunchLimits,
    next_stream: AtomicUsize,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDevice {
    pub fn new() -> Self {
        Self {
            pool: Arc::new(MemoryPool::new(None)),
            planner: Mutex::new(FftPlanner::new()),
            limits: LaunchLimits::default(),
            next_stream: AtomicUsize::new(0),
        }
    }

    /// Caps the bytes all live buffers may hold; allocations past the cap
    /// fail with a resource-exhaustion error.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.pool = Arc::new(MemoryPool::new(Some(bytes)));
        self
    }

    pub fn with_launch_limits(mut self, limits: LaunchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Bytes currently held by live buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.pool.used()
    }
}

#[track_caller]
fn ensure_fits(op: &'static str, needed: usize, capacity: usize) -> EngineResult<()> {
    if needed > capacity {
        return Err(CpuDeviceError::Overflow { needed, capacity }.into_engine(op));
    }
    Ok(())
}

impl Device for CpuDevice {
    type Stream = CpuStream;
    type Event = CpuEvent;
    type Buffer = CpuBuffer;
    type IndexBuffer = CpuIndexBuffer;
    type Plan = CpuPlan;

    fn name(&self) -> &str {
        "cpu"
    }

    fn launch_limits(&self) -> LaunchLimits {
        self.limits
    }

    fn memory_info(&self) -> Option<MemoryInfo> {
        self.pool.info()
    }

    fn create_stream(&self) -> EngineResult<CpuStream> {
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        CpuStream::spawn(format!("pwfft-stream-{id}")).map_err(|e| e.into_engine("create_stream"))
    }

    fn create_event(&self) -> EngineResult<CpuEvent> {
        Ok(CpuEvent::default())
    }

    fn alloc(&self, len: usize) -> EngineResult<CpuBuffer> {
        CpuBuffer::new(&self.pool, len)
    }

    fn alloc_index(&self, len: usize) -> EngineResult<CpuIndexBuffer> {
        CpuIndexBuffer::new(&self.pool, len)
    }

    fn upload(&self, stream: &CpuStream, src: &[f64], dst: &mut CpuBuffer) -> EngineResult<()> {
        ensure_fits("upload", src.len(), dst.len())?;
        let staged = src.to_vec();
        let data = Arc::clone(&dst.data);
        stream
            .submit(move || {
                data.lock()[..staged.len()].copy_from_slice(&staged);
                Ok(())
            })
            .map_err(|e| e.into_engine("upload"))
    }

    fn upload_index(&self, stream: &CpuStream, src: &[i32], dst: &mut CpuIndexBuffer) -> EngineResult<()> {
        ensure_fits("upload_index", src.len(), dst.len())?;
        let staged = src.to_vec();
        let data = Arc::clone(&dst.data);
        stream
            .submit(move || {
                data.lock()[..staged.len()].copy_from_slice(&staged);
                Ok(())
            })
            .map_err(|e| e.into_engine("upload_index"))
    }

    fn download_blocking(&self, stream: &CpuStream, src: &CpuBuffer, dst: &mut [f64]) -> EngineResult<()> {
        ensure_fits("download", dst.len(), src.len())?;
        let count = dst.len();
        let data = Arc::clone(&src.data);
        let (tx, rx) = crossbeam_channel::bounded(1);
        stream
            .submit(move || {
                let _ = tx.send(data.lock()[..count].to_vec());
                Ok(())
            })
            .map_err(|e| e.into_engine("download"))?;
        let values = rx.recv().map_err(|_| stream.stopped().into_engine("download"))?;
        dst.copy_from_slice(&values);
        Ok(())
    }

    fn record(&self, stream: &CpuStream, event: &CpuEvent) -> EngineResult<()> {
        event.record_on(stream).map_err(|e| e.into_engine("event_record"))
    }

    fn wait(&self, stream: &CpuStream, event: &CpuEvent) -> EngineResult<()> {
        event.wait_on(stream).map_err(|e| e.into_engine("stream_wait_event"))
    }

    fn synchronize(&self, stream: &CpuStream) -> EngineResult<()> {
        stream.synchronize().map_err(|e| e.into_engine("stream_synchronize"))
    }

    fn zero(&self, stream: &CpuStream, buffer: &mut CpuBuffer, len: usize) -> EngineResult<()> {
        ensure_fits("memset", len, buffer.len())?;
        let data = Arc::clone(&buffer.data);
        stream
            .submit(move || {
                data.lock()[..len].fill(0.0);
                Ok(())
            })
            .map_err(|e| e.into_engine("memset"))
    }

    fn expand(
        &self,
        stream: &CpuStream,
        geom: &LaunchGeometry,
        real: &CpuBuffer,
        complex: &mut CpuBuffer,
        n: usize,
    ) -> EngineResult<()> {
        ensure_fits("expand", n, real.len())?;
        ensure_fits("expand", 2 * n, complex.len())?;
        let (geom, src, dst) = (*geom, Arc::clone(&real.data), Arc::clone(&complex.data));
        stream
            .submit(move || {
                kernels::expand(&geom, &src.lock(), &mut dst.lock(), n);
                Ok(())
            })
            .map_err(|e| e.into_engine("expand"))
    }

    fn contract(
        &self,
        stream: &CpuStream,
        geom: &LaunchGeometry,
        complex: &CpuBuffer,
        real: &mut CpuBuffer,
        n: usize,
    ) -> EngineResult<()> {
        ensure_fits("contract", 2 * n, complex.len())?;
        ensure_fits("contract", n, real.len())?;
        let (geom, src, dst) = (*geom, Arc::clone(&complex.data), Arc::clone(&real.data));
        stream
            .submit(move || {
                kernels::contract(&geom, &src.lock(), &mut dst.lock(), n);
                Ok(())
            })
            .map_err(|e| e.into_engine("contract"))
    }

    fn gather(
        &self,
        stream: &CpuStream,
        geom: &LaunchGeometry,
        dense: &CpuBuffer,
        compact: &mut CpuBuffer,
        scale: f64,
        ngpts: usize,
        map: &CpuIndexBuffer,
    ) -> EngineResult<()> {
        ensure_fits("gather", ngpts, map.len())?;
        ensure_fits("gather", 2 * ngpts, compact.len())?;
        let geom = *geom;
        let (src, dst, map) = (
            Arc::clone(&dense.data),
            Arc::clone(&compact.data),
            Arc::clone(&map.data),
        );
        stream
            .submit(move || {
                kernels::gather(&geom, &src.lock(), &mut dst.lock(), scale, ngpts, &map.lock());
                Ok(())
            })
            .map_err(|e| e.into_engine("gather"))
    }

    fn scatter(
        &self,
        stream: &CpuStream,
        geom: &LaunchGeometry,
        compact: &CpuBuffer,
        dense: &mut CpuBuffer,
        scale: f64,
        ngpts: usize,
        nmaps: usize,
        map: &CpuIndexBuffer,
    ) -> EngineResult<()> {
        ensure_fits("scatter", nmaps * ngpts, map.len())?;
        ensure_fits("scatter", 2 * ngpts, compact.len())?;
        let geom = *geom;
        let (src, dst, map) = (
            Arc::clone(&compact.data),
            Arc::clone(&dense.data),
            Arc::clone(&map.data),
        );
        stream
            .submit(move || {
                kernels::scatter(&geom, &src.lock(), &mut dst.lock(), scale, ngpts, nmaps, &map.lock());
                Ok(())
            })
            .map_err(|e| e.into_engine("scatter"))
    }

    fn create_plan(&self, layout: &PlanLayout, _stream: &CpuStream) -> EngineResult<CpuPlan> {
        let plan = CpuPlan::build(&mut self.planner.lock(), layout)
            .map_err(|e| e.into_engine("plan_create"))?;
        debug!(
            "built rank-{} plan over {:?} x {} (in {:?}, out {:?})",
            layout.rank(),
            layout.dims,
            layout.batch,
            layout.input,
            layout.output
        );
        Ok(plan)
    }

    fn execute(
        &self,
        plan: &CpuPlan,
        stream: &CpuStream,
        src: &CpuBuffer,
        dst: &mut CpuBuffer,
        direction: Direction,
    ) -> EngineResult<()> {
        ensure_fits("plan_execute", 2 * plan.layout().input_extent(), src.len())?;
        ensure_fits("plan_execute", 2 * plan.layout().output_extent(), dst.len())?;
        let (plan, src, dst) = (plan.clone(), Arc::clone(&src.data), Arc::clone(&dst.data));
        stream
            .submit(move || {
                plan.run(&src.lock(), &mut dst.lock(), direction);
                Ok(())
            })
            .map_err(|e| e.into_engine("plan_execute"))
    }

    fn execute_in_place(
        &self,
        plan: &CpuPlan,
        stream: &CpuStream,
        data: &mut CpuBuffer,
        direction: Direction,
    ) -> EngineResult<()> {
        let layout = plan.layout();
        if layout.input != layout.output {
            return Err(CpuDeviceError::InvalidPlan(
                "in-place execution needs matching input and output layouts".into(),
            )
            .into_engine("plan_execute"));
        }
        ensure_fits("plan_execute", 2 * layout.input_extent(), data.len())?;
        let (plan, data) = (plan.clone(), Arc::clone(&data.data));
        stream
            .submit(move || {
                plan.run_in_place(&mut data.lock(), direction);
                Ok(())
            })
            .map_err(|e| e.into_engine("plan_execute"))
    }

    fn scale(&self, data: &mut CpuBuffer, len: usize, factor: f64) -> EngineResult<()> {
        ensure_fits("scale", len, data.len())?;
        kernels::scale_in_place(&mut data.data.lock(), len, factor);
        Ok(())
    }
}

#[cfg(test)]
mod _tests_lib;
