//! Transform plan keys, stride layouts and the per-engine plan cache.
//!
//! Plans are expensive to build and cheap to reuse. The cache keeps at most
//! one plan per [`PlanKey`] in a small association list with a fixed
//! capacity per rank class. A request that misses a full class is served by
//! a transient plan the caller drops after one use; cached entries are
//! never evicted.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::shape::{Direction, GridShape};

// ============================================================================
// Keys and layouts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RankClass {
    Batched1d,
    Batched2d,
    Volume3d,
}

impl RankClass {
    fn slot(self) -> usize {
        match self {
            RankClass::Batched1d => 0,
            RankClass::Batched2d => 1,
            RankClass::Volume3d => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanShape {
    /// `batch` transforms of length `n`.
    Batched1d { n: usize, batch: usize },
    /// `npts[0]` planar transforms over axes 1 and 2.
    Batched2d { npts: [usize; 3] },
    /// One transform over the whole grid.
    Volume3d { npts: [usize; 3] },
}

/// Identity of a plan. The 3-D class ignores direction, since the same
/// contiguous plan runs both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanKey {
    shape: PlanShape,
    direction: Option<Direction>,
}

impl PlanKey {
    pub fn batched_1d(n: usize, batch: usize, direction: Direction) -> Self {
        Self {
            shape: PlanShape::Batched1d { n, batch },
            direction: Some(direction),
        }
    }

    pub fn batched_2d(shape: GridShape, direction: Direction) -> Self {
        Self {
            shape: PlanShape::Batched2d { npts: shape.npts },
            direction: Some(direction),
        }
    }

    pub fn volume_3d(shape: GridShape) -> Self {
        Self {
            shape: PlanShape::Volume3d { npts: shape.npts },
            direction: None,
        }
    }

    pub fn class(&self) -> RankClass {
        match self.shape {
            PlanShape::Batched1d { .. } => RankClass::Batched1d,
            PlanShape::Batched2d { .. } => RankClass::Batched2d,
            PlanShape::Volume3d { .. } => RankClass::Volume3d,
        }
    }

    pub fn shape(&self) -> PlanShape {
        self.shape
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Stride and batch layout of the plan this key names.
    ///
    /// Forward batched plans read with the batch index fastest and write with
    /// the transform index fastest, so each pass transposes; inverse plans
    /// undo that transposition.
    pub fn layout(&self) -> PlanLayout {
        let forward = self.direction != Some(Direction::Inverse);
        match self.shape {
            PlanShape::Batched1d { n, batch } => {
                let spread = Stride::new(batch, 1);
                let packed = Stride::new(1, n);
                PlanLayout::batched(vec![n], batch, spread, packed, forward)
            }
            PlanShape::Batched2d { npts: [n0, n1, n2] } => {
                let spread = Stride::new(n0, 1);
                let packed = Stride::new(1, n1 * n2);
                PlanLayout::batched(vec![n2, n1], n0, spread, packed, forward)
            }
            PlanShape::Volume3d { npts: [n0, n1, n2] } => {
                let contiguous = Stride::new(1, n0 * n1 * n2);
                PlanLayout {
                    dims: vec![n2, n1, n0],
                    batch: 1,
                    input: contiguous,
                    output: contiguous,
                }
            }
        }
    }
}

/// Element stride within one transform and distance between consecutive
/// transforms of a batch, both in complex elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stride {
    pub stride: usize,
    pub distance: usize,
}

impl Stride {
    pub fn new(stride: usize, distance: usize) -> Self {
        Self { stride, distance }
    }
}

/// Everything a device needs to build a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanLayout {
    /// Transform extents, slowest axis first.
    pub dims: Vec<usize>,
    pub batch: usize,
    pub input: Stride,
    pub output: Stride,
}

impl PlanLayout {
    fn batched(dims: Vec<usize>, batch: usize, spread: Stride, packed: Stride, forward: bool) -> Self {
        let (input, output) = if forward { (spread, packed) } else { (packed, spread) };
        Self {
            dims,
            batch,
            input,
            output,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Elements in one transform.
    pub fn transform_len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Elements across the whole batch.
    pub fn total_len(&self) -> usize {
        self.transform_len() * self.batch
    }

    /// Smallest buffer (in complex elements) the input side addresses.
    pub fn input_extent(&self) -> usize {
        Self::extent(self.transform_len(), self.batch, self.input)
    }

    pub fn output_extent(&self) -> usize {
        Self::extent(self.transform_len(), self.batch, self.output)
    }

    fn extent(len: usize, batch: usize, stride: Stride) -> usize {
        if len == 0 || batch == 0 {
            return 0;
        }
        (batch - 1) * stride.distance + (len - 1) * stride.stride + 1
    }

    /// Position of element `lin` (row-major over `dims`) of transform `b`.
    #[inline]
    pub fn position(stride: Stride, b: usize, lin: usize) -> usize {
        b * stride.distance + lin * stride.stride
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCacheConfig {
    pub capacity_1d: usize,
    pub capacity_2d: usize,
    pub capacity_3d: usize,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            capacity_1d: 30,
            capacity_2d: 30,
            capacity_3d: 30,
        }
    }
}

impl PlanCacheConfig {
    pub fn capacity(&self, class: RankClass) -> usize {
        match class {
            RankClass::Batched1d => self.capacity_1d,
            RankClass::Batched2d => self.capacity_2d,
            RankClass::Volume3d => self.capacity_3d,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub transient: u64,
}

/// A plan handed out by [`PlanCache::acquire`].
pub enum PlanLease<'a, P> {
    Cached(&'a P),
    /// Not stored; the holder drops it once the stream has finished with it.
    Transient(P),
}

impl<P> PlanLease<'_, P> {
    pub fn plan(&self) -> &P {
        match self {
            PlanLease::Cached(plan) => plan,
            PlanLease::Transient(plan) => plan,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PlanLease::Transient(_))
    }
}

pub struct PlanCache<P> {
    config: PlanCacheConfig,
    entries: Vec<(PlanKey, P)>,
    occupancy: [usize; 3],
    stats: PlanCacheStats,
}

impl<P> PlanCache<P> {
    pub fn new(config: PlanCacheConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            occupancy: [0; 3],
            stats: PlanCacheStats::default(),
        }
    }

    /// Returns the plan for `key`, building it with `build` on a miss.
    ///
    /// A freshly built plan is stored when its class has room, and handed
    /// back as [`PlanLease::Transient`] otherwise.
    pub fn acquire<F>(&mut self, key: PlanKey, build: F) -> EngineResult<PlanLease<'_, P>>
    where
        F: FnOnce(&PlanLayout) -> EngineResult<P>,
    {
        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            self.stats.hits += 1;
            return Ok(PlanLease::Cached(&self.entries[index].1));
        }

        self.stats.misses += 1;
        let layout = key.layout();
        debug!("building plan {key:?} with layout {layout:?}");
        let plan = build(&layout)?;

        let class = key.class();
        if self.occupancy[class.slot()] < self.config.capacity(class) {
            self.occupancy[class.slot()] += 1;
            self.entries.push((key, plan));
            let stored = self.entries.len() - 1;
            return Ok(PlanLease::Cached(&self.entries[stored].1));
        }

        self.stats.transient += 1;
        warn!(
            "plan cache for {class:?} is full ({} entries), using a transient plan for {key:?}",
            self.config.capacity(class)
        );
        Ok(PlanLease::Transient(plan))
    }

    pub fn get(&self, key: &PlanKey) -> Option<&P> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, plan)| plan)
    }

    pub fn contains(&self, key: &PlanKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn occupancy(&self, class: RankClass) -> usize {
        self.occupancy[class.slot()]
    }

    pub fn stats(&self) -> PlanCacheStats {
        self.stats
    }

    /// Drops every cached plan and returns how many there were.
    pub fn release_all(&mut self) -> usize {
        let released = self.entries.len();
        self.entries.clear();
        self.occupancy = [0; 3];
        if released > 0 {
            debug!(
                "released {released} cached plans (hits {}, misses {}, transient {})",
                self.stats.hits, self.stats.misses, self.stats.transient
            );
        }
        released
    }
}
