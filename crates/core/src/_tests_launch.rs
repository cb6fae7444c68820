//! Tests for launch geometry partitioning.

#![cfg(test)]

use crate::error::{EngineError, ErrorKind};
use crate::launch::{partition, LaunchLimits, GATHER_GROUP_SIZE, PACK_GROUP_SIZE};

fn defaults() -> LaunchLimits {
    LaunchLimits::default()
}

#[test]
fn single_item_uses_one_group() {
    let geom = partition(1, PACK_GROUP_SIZE, &defaults()).unwrap();
    assert_eq!(geom.threads, 1024);
    assert_eq!((geom.groups_x, geom.groups_y), (1, 1));
    assert!(geom.capacity() >= 1);
}

#[test]
fn capacity_covers_boundary_counts() {
    let limits = defaults();
    for n in [1, 1024, 1025, 32 * 32 + 1, 1_000_003] {
        for group in [GATHER_GROUP_SIZE, PACK_GROUP_SIZE] {
            let geom = partition(n, group, &limits).unwrap();
            assert!(
                geom.capacity() >= n,
                "n={n} group={group}: capacity {} too small",
                geom.capacity()
            );
            assert!(geom.groups_x <= limits.max_groups_per_dim);
            assert!(geom.groups_y <= geom.groups_x);
        }
    }
}

#[test]
fn one_past_a_full_group_needs_two_groups() {
    let geom = partition(1025, PACK_GROUP_SIZE, &defaults()).unwrap();
    // blocks = 2: ceil(sqrt 2) = 2, round(sqrt 2) = 1
    assert_eq!((geom.groups_x, geom.groups_y), (2, 1));
    assert_eq!(geom.capacity(), 2048);
}

#[test]
fn group_size_is_clamped_to_the_device_limit() {
    let limits = LaunchLimits {
        max_threads_per_group: 256,
        max_groups_per_dim: 65535,
    };
    let geom = partition(10_000, 1024, &limits).unwrap();
    assert_eq!(geom.threads, 256);
    assert!(geom.capacity() >= 10_000);
}

#[test]
fn too_many_groups_is_a_configuration_error() {
    let limits = LaunchLimits {
        max_threads_per_group: 32,
        max_groups_per_dim: 4,
    };
    // 32 * 16 items fit exactly in a 4x4 grid
    assert!(partition(32 * 16, 32, &limits).is_ok());

    let err = partition(32 * 16 + 1, 32, &limits).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationViolation);
    match err {
        EngineError::LaunchGeometry {
            groups_x,
            max_groups,
            ..
        } => {
            assert_eq!(groups_x, 5);
            assert_eq!(max_groups, 4);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn indices_enumerate_each_item_once_in_order() {
    let geom = partition(100, 8, &defaults()).unwrap();
    let visited: Vec<usize> = geom.indices(100).collect();
    assert_eq!(visited, (0..100).collect::<Vec<_>>());
}

#[test]
fn flat_index_follows_row_major_groups() {
    let geom = partition(32 * 7, 32, &defaults()).unwrap();
    assert_eq!((geom.groups_x, geom.groups_y), (3, 3));
    assert_eq!(geom.flat_index(0, 0, 5), 5);
    assert_eq!(geom.flat_index(1, 0, 0), 32);
    assert_eq!(geom.flat_index(0, 1, 0), 3 * 32);
    assert_eq!(geom.grid_dim(), (3, 3, 1));
    assert_eq!(geom.block_dim(), (32, 1, 1));
}

#[test]
fn zero_items_produce_an_empty_grid() {
    let geom = partition(0, 32, &defaults()).unwrap();
    assert_eq!(geom.capacity(), 0);
    assert_eq!(geom.indices(0).count(), 0);
}
