//! Tests for plan keys, layouts and the plan cache.

#![cfg(test)]

use std::cell::Cell;

use crate::error::EngineError;
use crate::plan::{PlanCache, PlanCacheConfig, PlanKey, PlanLayout, RankClass, Stride};
use crate::shape::{Direction, GridShape};

fn small_cache(capacity: usize) -> PlanCache<PlanLayout> {
    PlanCache::new(PlanCacheConfig {
        capacity_1d: capacity,
        capacity_2d: capacity,
        capacity_3d: capacity,
    })
}

// ============================================================================
// Layouts
// ============================================================================

#[test]
fn batched_1d_forward_reads_strided_and_writes_packed() {
    let layout = PlanKey::batched_1d(8, 12, Direction::Forward).layout();
    assert_eq!(layout.dims, vec![8]);
    assert_eq!(layout.batch, 12);
    assert_eq!(layout.input, Stride::new(12, 1));
    assert_eq!(layout.output, Stride::new(1, 8));
}

#[test]
fn batched_1d_inverse_swaps_the_layouts() {
    let layout = PlanKey::batched_1d(8, 12, Direction::Inverse).layout();
    assert_eq!(layout.input, Stride::new(1, 8));
    assert_eq!(layout.output, Stride::new(12, 1));
}

#[test]
fn batched_2d_layout_transforms_axes_one_and_two() {
    let shape = GridShape::new(3, 4, 5);
    let fwd = PlanKey::batched_2d(shape, Direction::Forward).layout();
    assert_eq!(fwd.dims, vec![5, 4]);
    assert_eq!(fwd.batch, 3);
    assert_eq!(fwd.input, Stride::new(3, 1));
    assert_eq!(fwd.output, Stride::new(1, 20));

    let inv = PlanKey::batched_2d(shape, Direction::Inverse).layout();
    assert_eq!(inv.input, fwd.output);
    assert_eq!(inv.output, fwd.input);
}

#[test]
fn volume_layout_is_contiguous_slowest_axis_first() {
    let layout = PlanKey::volume_3d(GridShape::new(2, 3, 4)).layout();
    assert_eq!(layout.dims, vec![4, 3, 2]);
    assert_eq!(layout.batch, 1);
    assert_eq!(layout.input, layout.output);
    assert_eq!(layout.total_len(), 24);
    assert_eq!(layout.input_extent(), 24);
}

#[test]
fn strided_layouts_address_exactly_the_batch() {
    for key in [
        PlanKey::batched_1d(6, 7, Direction::Forward),
        PlanKey::batched_1d(6, 7, Direction::Inverse),
        PlanKey::batched_2d(GridShape::new(2, 3, 4), Direction::Forward),
    ] {
        let layout = key.layout();
        assert_eq!(layout.input_extent(), layout.total_len(), "{key:?}");
        assert_eq!(layout.output_extent(), layout.total_len(), "{key:?}");
    }
}

#[test]
fn volume_key_ignores_direction() {
    let key = PlanKey::volume_3d(GridShape::cubic(4));
    assert_eq!(key.direction(), None);
    assert_eq!(key.class(), RankClass::Volume3d);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn repeated_key_hits_without_rebuilding() {
    let mut cache = small_cache(4);
    let builds = Cell::new(0);
    let key = PlanKey::batched_1d(16, 4, Direction::Forward);
    for _ in 0..3 {
        let lease = cache
            .acquire(key, |layout| {
                builds.set(builds.get() + 1);
                Ok(layout.clone())
            })
            .unwrap();
        assert!(!lease.is_transient());
        assert_eq!(lease.plan().dims, vec![16]);
    }
    assert_eq!(builds.get(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.occupancy(RankClass::Batched1d), 1);
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.transient), (2, 1, 0));
}

#[test]
fn directions_are_distinct_keys_except_for_volumes() {
    let mut cache = small_cache(4);
    let shape = GridShape::cubic(4);
    for direction in [Direction::Forward, Direction::Inverse] {
        let _ = cache
            .acquire(PlanKey::batched_2d(shape, direction), |l| Ok(l.clone()))
            .unwrap();
        let _ = cache
            .acquire(PlanKey::volume_3d(shape), |l| Ok(l.clone()))
            .unwrap();
    }
    assert_eq!(cache.occupancy(RankClass::Batched2d), 2);
    assert_eq!(cache.occupancy(RankClass::Volume3d), 1);
}

#[test]
fn full_class_hands_out_transient_plans() {
    let mut cache = small_cache(1);
    let first = PlanKey::batched_1d(8, 2, Direction::Forward);
    let second = PlanKey::batched_1d(9, 2, Direction::Forward);

    let _ = cache.acquire(first, |l| Ok(l.clone())).unwrap();
    let lease = cache.acquire(second, |l| Ok(l.clone())).unwrap();
    assert!(lease.is_transient());
    assert_eq!(lease.plan().dims, vec![9]);
    drop(lease);

    assert!(cache.contains(&first));
    assert!(!cache.contains(&second));
    assert_eq!(cache.stats().transient, 1);

    // other classes keep their own capacity
    let lease = cache
        .acquire(PlanKey::volume_3d(GridShape::cubic(2)), |l| Ok(l.clone()))
        .unwrap();
    assert!(!lease.is_transient());
}

#[test]
fn zero_capacity_makes_every_plan_transient() {
    let mut cache = small_cache(0);
    let key = PlanKey::volume_3d(GridShape::cubic(2));
    for _ in 0..2 {
        let lease = cache.acquire(key, |l| Ok(l.clone())).unwrap();
        assert!(lease.is_transient());
    }
    assert!(cache.is_empty());
}

#[test]
fn build_failure_leaves_the_cache_untouched() {
    let mut cache = small_cache(2);
    let key = PlanKey::batched_1d(4, 4, Direction::Inverse);
    let result = cache.acquire(key, |_| Err(EngineError::primitive("plan", "no workspace")));
    assert!(result.is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.occupancy(RankClass::Batched1d), 0);
}

#[test]
fn release_all_empties_and_allows_rebuilding() {
    let mut cache = small_cache(2);
    assert_eq!(cache.release_all(), 0);

    let key = PlanKey::batched_1d(4, 4, Direction::Forward);
    let _ = cache.acquire(key, |l| Ok(l.clone())).unwrap();
    assert_eq!(cache.release_all(), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.occupancy(RankClass::Batched1d), 0);

    let lease = cache.acquire(key, |l| Ok(l.clone())).unwrap();
    assert!(!lease.is_transient());
}
