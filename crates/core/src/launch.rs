//! Launch geometry for data-parallel kernels.
//!
//! A kernel over `n` work items runs as a 2-D grid of groups. The grid is
//! kept roughly square so that large problems stay within the per-dimension
//! group limit; a work item's flat index is
//! `(groups_x * by + bx) * threads + tx` and items past `n` do nothing.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Group size used by the gather and scatter kernels.
pub const GATHER_GROUP_SIZE: u32 = 32;

/// Group size used by the expand and contract kernels.
pub const PACK_GROUP_SIZE: u32 = 1024;

/// Hardware limits a launch must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchLimits {
    pub max_threads_per_group: u32,
    pub max_groups_per_dim: u32,
}

impl Default for LaunchLimits {
    fn default() -> Self {
        Self {
            max_threads_per_group: 1024,
            max_groups_per_dim: 65535,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub threads: u32,
    pub groups_x: u32,
    pub groups_y: u32,
}

impl LaunchGeometry {
    /// Number of work items the grid can address.
    pub fn capacity(&self) -> usize {
        self.threads as usize * self.groups_x as usize * self.groups_y as usize
    }

    #[inline]
    pub fn flat_index(&self, bx: u32, by: u32, tx: u32) -> usize {
        (self.groups_x as usize * by as usize + bx as usize) * self.threads as usize + tx as usize
    }

    /// Flat indices below `n`, visited in launch order.
    pub fn indices(&self, n: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.groups_y)
            .flat_map(move |by| (0..self.groups_x).map(move |bx| (bx, by)))
            .flat_map(move |(bx, by)| (0..self.threads).map(move |tx| self.flat_index(bx, by, tx)))
            .filter(move |&idx| idx < n)
    }

    pub fn grid_dim(&self) -> (u32, u32, u32) {
        (self.groups_x, self.groups_y, 1)
    }

    pub fn block_dim(&self) -> (u32, u32, u32) {
        (self.threads, 1, 1)
    }
}

/// Lays `items` work items out as a near-square 2-D grid of groups.
///
/// `group_size` is clamped to the device's thread limit. Fails when the
/// grid would need more groups along x than the device allows.
pub fn partition(items: usize, group_size: u32, limits: &LaunchLimits) -> EngineResult<LaunchGeometry> {
    let mut threads = group_size.max(1);
    if threads > limits.max_threads_per_group {
        warn!(
            "group size {threads} exceeds device limit, clamping to {}",
            limits.max_threads_per_group
        );
        threads = limits.max_threads_per_group.max(1);
    }

    let blocks = items.div_ceil(threads as usize);
    let side = (blocks as f64).sqrt();
    let groups_x = side.ceil() as usize;
    let groups_y = side.round() as usize;

    if groups_x > limits.max_groups_per_dim as usize {
        return Err(EngineError::LaunchGeometry {
            items,
            groups_x,
            max_groups: limits.max_groups_per_dim as usize,
        });
    }

    Ok(LaunchGeometry {
        threads,
        groups_x: groups_x as u32,
        groups_y: groups_y as u32,
    })
}
