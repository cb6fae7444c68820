//! The engine context and its public operations.
//!
//! An [`Engine`] owns one device, three streams, two events and a plan
//! cache. Each operation allocates its own scratch buffers, runs a fixed
//! ingest / compute / egress schedule and returns once the result is in the
//! caller's buffer. Operations take `&mut self`; independent engines may be
//! used side by side.
//!
//! Dense grids are laid out `i0 + n0 * (i1 + n1 * i2)`. Transforms are
//! unnormalized: a forward transform followed by an inverse one multiplies
//! by the number of points transformed.

use log::{debug, error, info};
use num_complex::Complex64;

use crate::coefficients::CoefficientMap;
use crate::complex::{as_scalars, as_scalars_mut};
use crate::config::{EngineConfig, PlanarStrategy};
use crate::device::Device;
use crate::error::{EngineError, EngineResult};
use crate::launch::LaunchLimits;
use crate::pipeline::{EventSet, Pipeline, StreamSet};
use crate::plan::{PlanCache, PlanCacheStats};
use crate::shape::{Direction, GridShape};

pub struct Engine<D: Device> {
    // Field order is drop order: plans go before the streams they run on.
    plans: PlanCache<D::Plan>,
    events: EventSet<D::Event>,
    streams: StreamSet<D::Stream>,
    config: EngineConfig,
    limits: LaunchLimits,
    device: D,
}

impl<D: Device> Engine<D> {
    pub fn new(device: D) -> EngineResult<Self> {
        Self::with_config(device, EngineConfig::default())
    }

    pub fn with_config(device: D, config: EngineConfig) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|err| EngineError::invalid(err.to_string()))?;
        let streams = StreamSet {
            ingest: device.create_stream()?,
            compute: device.create_stream()?,
            egress: device.create_stream()?,
        };
        let events = EventSet {
            staged: device.create_event()?,
            computed: device.create_event()?,
        };
        let limits = config.launch.apply(device.launch_limits());
        info!(
            "engine ready on {} ({:?} planar transforms, {} threads/group, {} groups/dim)",
            device.name(),
            config.planar,
            limits.max_threads_per_group,
            limits.max_groups_per_dim
        );
        Ok(Self {
            plans: PlanCache::new(config.plan_cache.clone()),
            events,
            streams,
            config,
            limits,
            device,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn launch_limits(&self) -> LaunchLimits {
        self.limits
    }

    pub fn plan_cache(&self) -> &PlanCache<D::Plan> {
        &self.plans
    }

    pub fn plan_stats(&self) -> PlanCacheStats {
        self.plans.stats()
    }

    // ========================================================================
    // 3-D projections
    // ========================================================================

    /// Forward-transforms a real dense field and gathers the coefficients
    /// named by `map`, multiplied by `scale`.
    pub fn forward_gather(
        &mut self,
        din: &[f64],
        zout: &mut [Complex64],
        map: &CoefficientMap,
        shape: GridShape,
        scale: f64,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        let ngpts = map.ngpts();
        if nrpts == 0 || ngpts == 0 {
            return Ok(());
        }
        self.guarded("forward_gather", |engine| {
            check_len("dense input", din.len(), nrpts)?;
            check_len("coefficient output", zout.len(), ngpts)?;
            check_fits(ngpts, nrpts)?;
            engine.check_map(map, nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;
            let mut dmap = device.alloc_index(ngpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(din, &mut ptr_1)?;
            pipe.await_staged(staged)?;
            pipe.expand(&ptr_1, &mut ptr_2, nrpts)?;

            pipe.upload_map(map.primary(), &mut dmap)?;
            let map_staged = pipe.stage()?;

            pipe.transform_3d(Direction::Forward, shape, &mut ptr_2)?;
            pipe.await_staged(map_staged)?;
            pipe.gather(&ptr_2, &mut ptr_1, scale, ngpts, &dmap)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, as_scalars_mut(zout))
        })
    }

    /// Scatters coefficients (and their conjugate partners when `map` has
    /// two tables) into a zeroed dense grid, inverse-transforms it and
    /// returns the real part.
    pub fn scatter_backward(
        &mut self,
        zin: &[Complex64],
        dout: &mut [f64],
        map: &CoefficientMap,
        shape: GridShape,
        scale: f64,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        let ngpts = map.ngpts();
        if nrpts == 0 || ngpts == 0 {
            return Ok(());
        }
        self.guarded("scatter_backward", |engine| {
            check_len("coefficient input", zin.len(), ngpts)?;
            check_len("dense output", dout.len(), nrpts)?;
            check_fits(ngpts, nrpts)?;
            engine.check_map(map, nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;
            let mut dmap = device.alloc_index(map.offsets().len())?;

            let mut pipe = engine.pipeline();
            pipe.upload(as_scalars(zin), &mut ptr_1)?;
            pipe.upload_map(map.offsets(), &mut dmap)?;
            let staged = pipe.stage()?;

            pipe.await_staged(staged)?;
            pipe.scatter(&ptr_1, &mut ptr_2, nrpts, scale, ngpts, map.nmaps(), &dmap)?;
            pipe.transform_3d(Direction::Inverse, shape, &mut ptr_2)?;
            pipe.contract(&ptr_2, &mut ptr_1, nrpts)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, dout)
        })
    }

    // ========================================================================
    // Planar and line transforms over a dense grid
    // ========================================================================

    /// Expands a real grid to complex and transforms every plane over axes 1
    /// and 2. Output layout is `k1 + n1 * (k2 + n2 * i0)`.
    pub fn expand_fft_2d(
        &mut self,
        din: &[f64],
        zout: &mut [Complex64],
        shape: GridShape,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        if nrpts == 0 {
            return Ok(());
        }
        let [n0, n1, n2] = shape.npts;
        let planar = self.config.planar;
        self.guarded("expand_fft_2d", |engine| {
            check_len("dense input", din.len(), nrpts)?;
            check_len("planar output", zout.len(), nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(din, &mut ptr_1)?;
            pipe.await_staged(staged)?;
            pipe.expand(&ptr_1, &mut ptr_2, nrpts)?;
            let result = match planar {
                PlanarStrategy::TwoPass1d => {
                    pipe.transform_1d_many(Direction::Forward, n2, n0 * n1, &ptr_2, &mut ptr_1)?;
                    pipe.transform_1d_many(Direction::Forward, n1, n0 * n2, &ptr_1, &mut ptr_2)?;
                    &ptr_2
                }
                PlanarStrategy::Batched2d => {
                    pipe.transform_2d_many(Direction::Forward, shape, &ptr_2, &mut ptr_1)?;
                    &ptr_1
                }
            };
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, result, as_scalars_mut(zout))
        })
    }

    /// Inverse of [`Engine::expand_fft_2d`]: takes the transposed planar
    /// layout back to a real dense grid.
    pub fn fft_2d_contract(
        &mut self,
        zin: &[Complex64],
        dout: &mut [f64],
        shape: GridShape,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        if nrpts == 0 {
            return Ok(());
        }
        let [n0, n1, n2] = shape.npts;
        let planar = self.config.planar;
        self.guarded("fft_2d_contract", |engine| {
            check_len("planar input", zin.len(), nrpts)?;
            check_len("dense output", dout.len(), nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(as_scalars(zin), &mut ptr_1)?;
            pipe.await_staged(staged)?;
            let result = match planar {
                PlanarStrategy::TwoPass1d => {
                    pipe.transform_1d_many(Direction::Inverse, n1, n0 * n2, &ptr_1, &mut ptr_2)?;
                    pipe.transform_1d_many(Direction::Inverse, n2, n0 * n1, &ptr_2, &mut ptr_1)?;
                    pipe.contract(&ptr_1, &mut ptr_2, nrpts)?;
                    &ptr_2
                }
                PlanarStrategy::Batched2d => {
                    pipe.transform_2d_many(Direction::Inverse, shape, &ptr_1, &mut ptr_2)?;
                    pipe.contract(&ptr_2, &mut ptr_1, nrpts)?;
                    &ptr_1
                }
            };
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, result, dout)
        })
    }

    /// Expands a real grid to complex and transforms along axis 2. Output
    /// layout is `k2 + n2 * (i0 + n0 * i1)`.
    pub fn expand_fft_1d(
        &mut self,
        din: &[f64],
        zout: &mut [Complex64],
        shape: GridShape,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        if nrpts == 0 {
            return Ok(());
        }
        let [n0, n1, n2] = shape.npts;
        self.guarded("expand_fft_1d", |engine| {
            check_len("dense input", din.len(), nrpts)?;
            check_len("line output", zout.len(), nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(din, &mut ptr_1)?;
            pipe.await_staged(staged)?;
            pipe.expand(&ptr_1, &mut ptr_2, nrpts)?;
            pipe.transform_1d_many(Direction::Forward, n2, n0 * n1, &ptr_2, &mut ptr_1)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, as_scalars_mut(zout))
        })
    }

    /// Inverse of [`Engine::expand_fft_1d`].
    pub fn fft_1d_contract(
        &mut self,
        zin: &[Complex64],
        dout: &mut [f64],
        shape: GridShape,
    ) -> EngineResult<()> {
        let nrpts = shape.len();
        if nrpts == 0 {
            return Ok(());
        }
        let [n0, n1, n2] = shape.npts;
        self.guarded("fft_1d_contract", |engine| {
            check_len("line input", zin.len(), nrpts)?;
            check_len("dense output", dout.len(), nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(as_scalars(zin), &mut ptr_1)?;
            pipe.await_staged(staged)?;
            pipe.transform_1d_many(Direction::Inverse, n2, n0 * n1, &ptr_1, &mut ptr_2)?;
            pipe.contract(&ptr_2, &mut ptr_1, nrpts)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, dout)
        })
    }

    // ========================================================================
    // Batched line transforms
    // ========================================================================

    /// `m` transforms of length `n`. Forward reads the transform index with
    /// stride `m` and writes it contiguously; inverse does the reverse.
    pub fn fft_1d(
        &mut self,
        zin: &[Complex64],
        zout: &mut [Complex64],
        direction: Direction,
        n: usize,
        m: usize,
    ) -> EngineResult<()> {
        let nrpts = n * m;
        if nrpts == 0 {
            return Ok(());
        }
        self.guarded("fft_1d", |engine| {
            check_len("line input", zin.len(), nrpts)?;
            check_len("line output", zout.len(), nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;

            let mut pipe = engine.pipeline();
            let staged = pipe.ingest(as_scalars(zin), &mut ptr_1)?;
            pipe.await_staged(staged)?;
            pipe.transform_1d_many(direction, n, m, &ptr_1, &mut ptr_2)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_2, as_scalars_mut(zout))
        })
    }

    /// Forward `mmax` transforms of length `n`, then gathers the
    /// coefficients named by `map` with `scale`.
    pub fn fft_1d_gather(
        &mut self,
        zin: &[Complex64],
        zout: &mut [Complex64],
        map: &CoefficientMap,
        n: usize,
        mmax: usize,
        scale: f64,
    ) -> EngineResult<()> {
        let nrpts = n * mmax;
        let ngpts = map.ngpts();
        if nrpts == 0 || ngpts == 0 {
            return Ok(());
        }
        self.guarded("fft_1d_gather", |engine| {
            check_len("line input", zin.len(), nrpts)?;
            check_len("coefficient output", zout.len(), ngpts)?;
            check_fits(ngpts, nrpts)?;
            engine.check_map(map, nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;
            let mut dmap = device.alloc_index(ngpts)?;

            let mut pipe = engine.pipeline();
            pipe.upload_map(map.primary(), &mut dmap)?;
            pipe.upload(as_scalars(zin), &mut ptr_1)?;
            let staged = pipe.stage()?;

            pipe.await_staged(staged)?;
            pipe.transform_1d_many(Direction::Forward, n, mmax, &ptr_1, &mut ptr_2)?;
            pipe.gather(&ptr_2, &mut ptr_1, scale, ngpts, &dmap)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, as_scalars_mut(zout))
        })
    }

    /// Scatters coefficients (with conjugate partners when present) into a
    /// zeroed buffer of `mmax` lines and inverse-transforms each line.
    pub fn scatter_fft_1d(
        &mut self,
        zin: &[Complex64],
        zout: &mut [Complex64],
        map: &CoefficientMap,
        n: usize,
        mmax: usize,
        scale: f64,
    ) -> EngineResult<()> {
        let nrpts = n * mmax;
        let ngpts = map.ngpts();
        if nrpts == 0 || ngpts == 0 {
            return Ok(());
        }
        self.guarded("scatter_fft_1d", |engine| {
            check_len("coefficient input", zin.len(), ngpts)?;
            check_len("line output", zout.len(), nrpts)?;
            check_fits(ngpts, nrpts)?;
            engine.check_map(map, nrpts)?;

            let device = &engine.device;
            let mut ptr_1 = device.alloc(2 * nrpts)?;
            let mut ptr_2 = device.alloc(2 * nrpts)?;
            let mut dmap = device.alloc_index(map.offsets().len())?;

            let mut pipe = engine.pipeline();
            pipe.upload(as_scalars(zin), &mut ptr_1)?;
            pipe.upload_map(map.offsets(), &mut dmap)?;
            let staged = pipe.stage()?;

            pipe.await_staged(staged)?;
            pipe.scatter(&ptr_1, &mut ptr_2, nrpts, scale, ngpts, map.nmaps(), &dmap)?;
            pipe.transform_1d_many(Direction::Inverse, n, mmax, &ptr_2, &mut ptr_1)?;
            let computed = pipe.finish_compute()?;

            pipe.egress(computed, &ptr_1, as_scalars_mut(zout))
        })
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Waits for all streams and destroys every cached plan. Safe to call
    /// when nothing was ever transformed; later operations rebuild plans.
    pub fn release_plans(&mut self) -> EngineResult<()> {
        self.guarded("release_plans", |engine| {
            for stream in engine.streams.iter() {
                engine.device.synchronize(stream)?;
            }
            let released = engine.plans.release_all();
            debug!("release_plans: {released} plans destroyed");
            Ok(())
        })
    }

    // ------------------------------------------------------------------------

    fn pipeline(&mut self) -> Pipeline<'_, D> {
        Pipeline::new(
            &self.device,
            &self.streams,
            &self.events,
            &mut self.plans,
            self.limits,
        )
    }

    fn check_map(&self, map: &CoefficientMap, dense_len: usize) -> EngineResult<()> {
        if self.config.validate_maps {
            map.check_bounds(dense_len)?;
        }
        Ok(())
    }

    /// Runs `body`, logging and annotating any failure once.
    fn guarded<T>(
        &mut self,
        op: &'static str,
        body: impl FnOnce(&mut Self) -> EngineResult<T>,
    ) -> EngineResult<T> {
        body(self).map_err(|err| {
            let err = err.with_memory(self.device.memory_info());
            error!("{op}: {err}");
            err
        })
    }
}

impl<D: Device> Drop for Engine<D> {
    fn drop(&mut self) {
        // Failures are logged by release_plans itself.
        let _ = self.release_plans();
    }
}

/// Compact data shares the dense-sized scratch buffers.
fn check_fits(ngpts: usize, nrpts: usize) -> EngineResult<()> {
    if ngpts > nrpts {
        return Err(EngineError::invalid(format!(
            "{ngpts} coefficients do not fit a dense grid of {nrpts} points"
        )));
    }
    Ok(())
}

fn check_len(what: &str, actual: usize, expected: usize) -> EngineResult<()> {
    if actual != expected {
        return Err(EngineError::invalid(format!(
            "{what} holds {actual} elements, expected {expected}"
        )));
    }
    Ok(())
}
