//! Three-stage ingest / compute / egress schedule.
//!
//! Host data enters on the ingest stream, all kernels and transforms run on
//! the compute stream, and results leave on the egress stream. The stages
//! are linked only through two events, represented on the host by the
//! [`Staged`] and [`Computed`] tokens: the compute stream cannot be told
//! to wait on ingested data without a `Staged`, and egress cannot start
//! without a `Computed`.

use log::trace;

use crate::device::Device;
use crate::error::EngineResult;
use crate::launch::{partition, LaunchLimits, GATHER_GROUP_SIZE, PACK_GROUP_SIZE};
use crate::plan::PlanCache;
use crate::shape::{Direction, GridShape};
use crate::transform::TransformInvoker;

/// The three ordered streams an engine owns.
pub struct StreamSet<S> {
    pub ingest: S,
    pub compute: S,
    pub egress: S,
}

impl<S> StreamSet<S> {
    pub fn iter(&self) -> impl Iterator<Item = &S> {
        [&self.ingest, &self.compute, &self.egress].into_iter()
    }
}

pub struct EventSet<E> {
    pub staged: E,
    pub computed: E,
}

/// Proof that uploads issued so far have been recorded on the ingest event.
#[must_use = "the compute stream must await staged data before reading it"]
#[derive(Debug)]
pub struct Staged {
    _seal: (),
}

/// Proof that compute work issued so far has been recorded on the compute event.
#[must_use = "a computed result must be handed to egress"]
#[derive(Debug)]
pub struct Computed {
    _seal: (),
}

pub struct Pipeline<'a, D: Device> {
    device: &'a D,
    streams: &'a StreamSet<D::Stream>,
    events: &'a EventSet<D::Event>,
    plans: &'a mut PlanCache<D::Plan>,
    limits: LaunchLimits,
}

impl<'a, D: Device> Pipeline<'a, D> {
    pub fn new(
        device: &'a D,
        streams: &'a StreamSet<D::Stream>,
        events: &'a EventSet<D::Event>,
        plans: &'a mut PlanCache<D::Plan>,
        limits: LaunchLimits,
    ) -> Self {
        Self {
            device,
            streams,
            events,
            plans,
            limits,
        }
    }

    // ------------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------------

    /// Queues a host-to-device copy on the ingest stream.
    pub fn upload(&self, src: &[f64], dst: &mut D::Buffer) -> EngineResult<()> {
        self.device.upload(&self.streams.ingest, src, dst)
    }

    pub fn upload_map(&self, offsets: &[i32], dst: &mut D::IndexBuffer) -> EngineResult<()> {
        self.device.upload_index(&self.streams.ingest, offsets, dst)
    }

    /// Records everything uploaded so far on the ingest event.
    pub fn stage(&self) -> EngineResult<Staged> {
        self.device.record(&self.streams.ingest, &self.events.staged)?;
        trace!("ingest recorded");
        Ok(Staged { _seal: () })
    }

    /// Upload followed by [`Pipeline::stage`].
    pub fn ingest(&self, src: &[f64], dst: &mut D::Buffer) -> EngineResult<Staged> {
        self.upload(src, dst)?;
        self.stage()
    }

    // ------------------------------------------------------------------------
    // Compute
    // ------------------------------------------------------------------------

    /// Holds later compute work until the staged uploads have landed.
    pub fn await_staged(&self, staged: Staged) -> EngineResult<()> {
        let Staged { _seal: () } = staged;
        self.device.wait(&self.streams.compute, &self.events.staged)
    }

    pub fn expand(&self, real: &D::Buffer, complex: &mut D::Buffer, n: usize) -> EngineResult<()> {
        let geom = partition(n, PACK_GROUP_SIZE, &self.limits)?;
        self.device
            .expand(&self.streams.compute, &geom, real, complex, n)
    }

    pub fn contract(&self, complex: &D::Buffer, real: &mut D::Buffer, n: usize) -> EngineResult<()> {
        let geom = partition(n, PACK_GROUP_SIZE, &self.limits)?;
        self.device
            .contract(&self.streams.compute, &geom, complex, real, n)
    }

    pub fn gather(
        &self,
        dense: &D::Buffer,
        compact: &mut D::Buffer,
        scale: f64,
        ngpts: usize,
        map: &D::IndexBuffer,
    ) -> EngineResult<()> {
        let geom = partition(ngpts, GATHER_GROUP_SIZE, &self.limits)?;
        self.device
            .gather(&self.streams.compute, &geom, dense, compact, scale, ngpts, map)
    }

    /// Zeroes the `dense_len` complex elements of `dense`, then scatters into it.
    #[allow(clippy::too_many_arguments)]
    pub fn scatter(
        &self,
        compact: &D::Buffer,
        dense: &mut D::Buffer,
        dense_len: usize,
        scale: f64,
        ngpts: usize,
        nmaps: usize,
        map: &D::IndexBuffer,
    ) -> EngineResult<()> {
        let geom = partition(ngpts, GATHER_GROUP_SIZE, &self.limits)?;
        self.device.zero(&self.streams.compute, dense, 2 * dense_len)?;
        self.device.scatter(
            &self.streams.compute,
            &geom,
            compact,
            dense,
            scale,
            ngpts,
            nmaps,
            map,
        )
    }

    pub fn transform_3d(
        &mut self,
        direction: Direction,
        shape: GridShape,
        data: &mut D::Buffer,
    ) -> EngineResult<()> {
        self.invoker().run_3d(direction, shape, 1.0, data)
    }

    pub fn transform_2d_many(
        &mut self,
        direction: Direction,
        shape: GridShape,
        src: &D::Buffer,
        dst: &mut D::Buffer,
    ) -> EngineResult<()> {
        self.invoker().run_2d_many(direction, shape, 1.0, src, dst)
    }

    pub fn transform_1d_many(
        &mut self,
        direction: Direction,
        n: usize,
        m: usize,
        src: &D::Buffer,
        dst: &mut D::Buffer,
    ) -> EngineResult<()> {
        self.invoker().run_1d_many(direction, n, m, 1.0, src, dst)
    }

    /// Records everything queued on the compute stream.
    pub fn finish_compute(&self) -> EngineResult<Computed> {
        self.device.record(&self.streams.compute, &self.events.computed)?;
        trace!("compute recorded");
        Ok(Computed { _seal: () })
    }

    // ------------------------------------------------------------------------
    // Egress
    // ------------------------------------------------------------------------

    /// Copies the leading `dst.len()` scalars of `src` to the host once the
    /// computed work has finished. Blocks the caller.
    pub fn egress(&self, computed: Computed, src: &D::Buffer, dst: &mut [f64]) -> EngineResult<()> {
        let Computed { _seal: () } = computed;
        self.device.wait(&self.streams.egress, &self.events.computed)?;
        self.device
            .download_blocking(&self.streams.egress, src, dst)
    }

    fn invoker(&mut self) -> TransformInvoker<'_, D> {
        TransformInvoker::new(self.device, &self.streams.compute, &mut *self.plans)
    }
}
