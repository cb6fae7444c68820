//! The accelerator abstraction the engine drives.
//!
//! A [`Device`] owns memory, ordered command streams, events that link
//! streams, data-parallel kernels and FFT plans. Every method that takes a
//! stream only *enqueues* work: it may return before the work has run,
//! and work on one stream runs in submission order. The exceptions are
//! [`Device::download_blocking`], [`Device::synchronize`] and
//! [`Device::scale`], which return only once their work is complete.
//!
//! Buffers hold `f64` scalars; complex data is interleaved `[re, im, ...]`,
//! so a buffer for `n` complex elements has length `2 * n`.

use crate::error::{EngineResult, MemoryInfo};
use crate::launch::{LaunchGeometry, LaunchLimits};
use crate::plan::PlanLayout;
use crate::shape::Direction;

pub trait Device {
    type Stream;
    type Event;
    type Buffer;
    type IndexBuffer;
    type Plan;

    fn name(&self) -> &str;

    fn launch_limits(&self) -> LaunchLimits;

    /// Current free/total memory, if the device can report it.
    fn memory_info(&self) -> Option<MemoryInfo>;

    fn create_stream(&self) -> EngineResult<Self::Stream>;

    fn create_event(&self) -> EngineResult<Self::Event>;

    /// Allocates `len` scalars. The allocation is released on drop.
    fn alloc(&self, len: usize) -> EngineResult<Self::Buffer>;

    fn alloc_index(&self, len: usize) -> EngineResult<Self::IndexBuffer>;

    /// Copies `src` into the leading `src.len()` scalars of `dst`.
    fn upload(&self, stream: &Self::Stream, src: &[f64], dst: &mut Self::Buffer) -> EngineResult<()>;

    fn upload_index(
        &self,
        stream: &Self::Stream,
        src: &[i32],
        dst: &mut Self::IndexBuffer,
    ) -> EngineResult<()>;

    /// Copies the leading `dst.len()` scalars of `src` to the host and waits
    /// for the copy, and everything queued before it on `stream`, to finish.
    fn download_blocking(
        &self,
        stream: &Self::Stream,
        src: &Self::Buffer,
        dst: &mut [f64],
    ) -> EngineResult<()>;

    /// Marks the current end of `stream` on `event`.
    fn record(&self, stream: &Self::Stream, event: &Self::Event) -> EngineResult<()>;

    /// Holds back later work on `stream` until the latest record of `event` completes.
    fn wait(&self, stream: &Self::Stream, event: &Self::Event) -> EngineResult<()>;

    /// Blocks the host until all work on `stream` has run.
    fn synchronize(&self, stream: &Self::Stream) -> EngineResult<()>;

    /// Sets the leading `len` scalars of `buffer` to zero.
    fn zero(&self, stream: &Self::Stream, buffer: &mut Self::Buffer, len: usize) -> EngineResult<()>;

    /// Launches the expand kernel over `n` elements.
    fn expand(
        &self,
        stream: &Self::Stream,
        geom: &LaunchGeometry,
        real: &Self::Buffer,
        complex: &mut Self::Buffer,
        n: usize,
    ) -> EngineResult<()>;

    /// Launches the contract kernel over `n` elements.
    fn contract(
        &self,
        stream: &Self::Stream,
        geom: &LaunchGeometry,
        complex: &Self::Buffer,
        real: &mut Self::Buffer,
        n: usize,
    ) -> EngineResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gather(
        &self,
        stream: &Self::Stream,
        geom: &LaunchGeometry,
        dense: &Self::Buffer,
        compact: &mut Self::Buffer,
        scale: f64,
        ngpts: usize,
        map: &Self::IndexBuffer,
    ) -> EngineResult<()>;

    /// Writes indexed entries of `dense` only; callers zero it first.
    #[allow(clippy::too_many_arguments)]
    fn scatter(
        &self,
        stream: &Self::Stream,
        geom: &LaunchGeometry,
        compact: &Self::Buffer,
        dense: &mut Self::Buffer,
        scale: f64,
        ngpts: usize,
        nmaps: usize,
        map: &Self::IndexBuffer,
    ) -> EngineResult<()>;

    /// Builds a plan whose work is issued on `stream`.
    fn create_plan(&self, layout: &PlanLayout, stream: &Self::Stream) -> EngineResult<Self::Plan>;

    fn execute(
        &self,
        plan: &Self::Plan,
        stream: &Self::Stream,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
        direction: Direction,
    ) -> EngineResult<()>;

    /// Runs a plan whose input and output layouts coincide over a single buffer.
    fn execute_in_place(
        &self,
        plan: &Self::Plan,
        stream: &Self::Stream,
        data: &mut Self::Buffer,
        direction: Direction,
    ) -> EngineResult<()>;

    /// Multiplies the leading `len` scalars of `data` by `factor` and returns
    /// once the result is in place.
    fn scale(&self, data: &mut Self::Buffer, len: usize, factor: f64) -> EngineResult<()>;
}
