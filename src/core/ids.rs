//! Identity types for trajectories, nodes and submaps.
//!
//! Trajectory ids are dense `usize` values assigned by the pose graph the
//! first time a [`TrajectoryHandle`] is observed, in first-seen order. Node
//! and submap indices are dense per trajectory.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of a scan node: trajectory plus per-trajectory node index.
///
/// `node_index` is assigned at constraint-computation time, so it can lag
/// the flat insertion index when computation is queued behind an
/// optimization pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub trajectory_id: usize,
    pub node_index: usize,
}

impl NodeId {
    /// Create a new node ID.
    #[inline]
    pub fn new(trajectory_id: usize, node_index: usize) -> Self {
        Self {
            trajectory_id,
            node_index,
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({}, {})", self.trajectory_id, self.node_index)
    }
}

/// Identifier of a submap: trajectory plus per-trajectory submap index.
///
/// Assigned the first time a submap is referenced by an insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmapId {
    pub trajectory_id: usize,
    pub submap_index: usize,
}

impl SubmapId {
    /// Create a new submap ID.
    #[inline]
    pub fn new(trajectory_id: usize, submap_index: usize) -> Self {
        Self {
            trajectory_id,
            submap_index,
        }
    }
}

impl std::fmt::Display for SubmapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Submap({}, {})", self.trajectory_id, self.submap_index)
    }
}

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0);

/// Caller-created identity token for one trajectory (one sensor run).
///
/// Handles are cheap to clone; clones name the same trajectory. The pose
/// graph assigns the dense trajectory id the first time a handle shows up in
/// `add_scan` or `add_imu_data`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrajectoryHandle(usize);

impl TrajectoryHandle {
    /// Mint a fresh handle, distinct from every other handle in the process.
    pub fn new() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TrajectoryHandle {
    fn default() -> Self {
        Self::new()
    }
}
