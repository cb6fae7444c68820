//! Runs cached plans on the compute stream and applies the output scale.

use log::trace;

use crate::device::Device;
use crate::error::EngineResult;
use crate::plan::{PlanCache, PlanKey, PlanLease};
use crate::shape::{Direction, GridShape};

pub struct TransformInvoker<'a, D: Device> {
    device: &'a D,
    stream: &'a D::Stream,
    plans: &'a mut PlanCache<D::Plan>,
}

impl<'a, D: Device> TransformInvoker<'a, D> {
    pub fn new(device: &'a D, stream: &'a D::Stream, plans: &'a mut PlanCache<D::Plan>) -> Self {
        Self {
            device,
            stream,
            plans,
        }
    }

    /// In-place transform of the whole grid held in `data`.
    pub fn run_3d(
        &mut self,
        direction: Direction,
        shape: GridShape,
        scale: f64,
        data: &mut D::Buffer,
    ) -> EngineResult<()> {
        let (device, stream) = (self.device, self.stream);
        let lease = self
            .plans
            .acquire(PlanKey::volume_3d(shape), |layout| device.create_plan(layout, stream))?;
        device.execute_in_place(lease.plan(), stream, data, direction)?;
        finish::<D>(device, stream, lease, data, shape.len(), scale)
    }

    /// `npts[0]` planar transforms over axes 1 and 2, written transposed.
    pub fn run_2d_many(
        &mut self,
        direction: Direction,
        shape: GridShape,
        scale: f64,
        src: &D::Buffer,
        dst: &mut D::Buffer,
    ) -> EngineResult<()> {
        let (device, stream) = (self.device, self.stream);
        let lease = self.plans.acquire(PlanKey::batched_2d(shape, direction), |layout| {
            device.create_plan(layout, stream)
        })?;
        device.execute(lease.plan(), stream, src, dst, direction)?;
        finish::<D>(device, stream, lease, dst, shape.len(), scale)
    }

    /// `m` transforms of length `n`, written transposed.
    #[allow(clippy::too_many_arguments)]
    pub fn run_1d_many(
        &mut self,
        direction: Direction,
        n: usize,
        m: usize,
        scale: f64,
        src: &D::Buffer,
        dst: &mut D::Buffer,
    ) -> EngineResult<()> {
        let (device, stream) = (self.device, self.stream);
        let lease = self.plans.acquire(PlanKey::batched_1d(n, m, direction), |layout| {
            device.create_plan(layout, stream)
        })?;
        device.execute(lease.plan(), stream, src, dst, direction)?;
        finish::<D>(device, stream, lease, dst, n * m, scale)
    }
}

fn finish<D: Device>(
    device: &D,
    stream: &D::Stream,
    lease: PlanLease<'_, D::Plan>,
    output: &mut D::Buffer,
    elements: usize,
    scale: f64,
) -> EngineResult<()> {
    if scale != 1.0 {
        device.synchronize(stream)?;
        device.scale(output, 2 * elements, scale)?;
    }
    if let PlanLease::Transient(plan) = lease {
        device.synchronize(stream)?;
        drop(plan);
        trace!("transient plan destroyed");
    }
    Ok(())
}
