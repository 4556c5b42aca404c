//! Collaborator seams: asynchronous constraint search and the nonlinear
//! solver behind the pose graph.

use std::sync::Arc;

use nalgebra::Isometry3;

use crate::core::{NodeId, SubmapId};
use crate::graph::connectivity::TrajectoryConnectivity;
use crate::graph::constraint::Constraint;
use crate::graph::node::TrajectoryNode;
use crate::graph::submap::Submap;
use crate::sensor::ImuSample;

/// Completion callback handed to [`ConstraintBuilder::when_done`].
pub type WhenDoneCallback = Box<dyn FnOnce(Vec<Constraint>) + Send>;

/// Asynchronous scan-to-submap constraint search.
///
/// The pose graph submits candidate pairs and marks the end of each scan's
/// submissions; the implementation resolves them on its own schedule and
/// reports finished batches through `when_done`.
pub trait ConstraintBuilder: Send + Sync {
    /// Schedules a search for a constraint between `submap` and the node's
    /// scan, seeded with `relative_pose` (node in the submap frame).
    fn maybe_add_constraint(
        &self,
        submap_id: SubmapId,
        submap: &Arc<Submap>,
        node_id: NodeId,
        scan_index: usize,
        nodes: &[TrajectoryNode],
        relative_pose: Isometry3<f64>,
    );

    /// Schedules a full-submap search with no pose prior. On a match the
    /// implementation records the cross-trajectory link in `connectivity`.
    fn maybe_add_global_constraint(
        &self,
        submap_id: SubmapId,
        submap: &Arc<Submap>,
        node_id: NodeId,
        scan_index: usize,
        connectivity: &Arc<TrajectoryConnectivity>,
        nodes: &[TrajectoryNode],
    );

    /// Marks the end of the submissions belonging to one scan. Called once
    /// per scan, in scan order.
    fn notify_end_of_scan(&self, scan_index: usize);

    /// Number of scans whose searches have all resolved.
    fn num_finished_scans(&self) -> usize;

    /// Registers a completion callback, to be invoked exactly once with the
    /// batch of constraints found since the previous callback, from a thread
    /// other than the caller's. Multiple registrations are allowed and fire
    /// in registration order; each callback must return before the next one
    /// starts.
    fn when_done(&self, callback: WhenDoneCallback);
}

/// Solver-side pose estimate for one submap.
#[derive(Clone, Copy, Debug)]
pub struct SubmapData {
    pub pose: Isometry3<f64>,
}

/// Solver-side pose estimate for one trajectory node.
#[derive(Clone, Copy, Debug)]
pub struct NodeData {
    pub time_us: u64,
    pub point_cloud_pose: Isometry3<f64>,
}

/// Nonlinear least-squares problem over submap and node poses.
///
/// Estimates are indexed `[trajectory_id][dense_index]`, mirroring the ids
/// the graph assigns. `solve` refines every estimate added so far against
/// the given constraints and must leave all poses finite.
pub trait OptimizationProblem: Send {
    /// Appends a submap pose variable with the given initial estimate.
    fn add_submap(&mut self, trajectory_id: usize, initial_pose: Isometry3<f64>);

    /// Appends a node pose variable with the given initial estimate.
    fn add_trajectory_node(&mut self, trajectory_id: usize, time_us: u64, pose: Isometry3<f64>);

    /// Feeds an IMU sample into the trajectory's motion model.
    fn add_imu_data(&mut self, trajectory_id: usize, sample: ImuSample);

    /// Runs the solver over all variables added so far.
    fn solve(&mut self, constraints: &[Constraint]);

    /// Current submap pose estimates.
    fn submap_data(&self) -> Vec<Vec<SubmapData>>;

    /// Current node pose estimates.
    fn node_data(&self) -> Vec<Vec<NodeData>>;

    /// Caps the solver iteration count for subsequent `solve` calls.
    fn set_max_num_iterations(&mut self, max_num_iterations: u32);
}
