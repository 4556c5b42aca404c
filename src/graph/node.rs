//! Trajectory nodes: one globally-posed entry per accepted scan.

use std::sync::Arc;

use nalgebra::Isometry3;

use crate::sensor::PointCloud;

/// Immutable per-scan payload, shared between the graph store and the
/// constraint searches that match the scan against submaps.
#[derive(Clone, Debug)]
pub struct ConstantData {
    /// Capture time in microseconds since the epoch.
    pub time_us: u64,
    /// Scan points in the tracking frame.
    pub point_cloud: PointCloud,
    /// Dense id of the trajectory this scan belongs to.
    pub trajectory_id: usize,
    /// Rotation aligning the tracking frame with gravity at capture time.
    pub gravity_alignment: Isometry3<f64>,
}

/// One node of the pose graph: the scan payload plus the current global
/// pose estimate. The pose is rewritten whenever an optimization pass
/// merges its results back into the store.
#[derive(Clone, Debug)]
pub struct TrajectoryNode {
    pub constant_data: Arc<ConstantData>,
    pub pose: Isometry3<f64>,
}

impl TrajectoryNode {
    /// Capture time of the underlying scan.
    #[inline]
    pub fn time_us(&self) -> u64 {
        self.constant_data.time_us
    }
}
