//! Deterministic fakes for the collaborator seams, used by the crate's
//! tests and benches in place of a real scan matcher and solver.

use std::sync::Arc;
use std::thread;

use nalgebra::{Isometry3, Matrix6};
use parking_lot::{Condvar, Mutex};

use crate::core::{NodeId, SubmapId};
use crate::graph::connectivity::TrajectoryConnectivity;
use crate::graph::constraint::{Constraint, ConstraintKind, ConstraintPose};
use crate::graph::node::TrajectoryNode;
use crate::graph::submap::Submap;
use crate::graph::traits::{
    ConstraintBuilder, NodeData, OptimizationProblem, SubmapData, WhenDoneCallback,
};
use crate::sensor::ImuSample;

#[derive(Default)]
struct BuilderState {
    match_all: bool,
    pending: Vec<Constraint>,
    num_finished_scans: usize,
    local_requests: Vec<(SubmapId, NodeId)>,
    global_requests: Vec<(SubmapId, NodeId)>,
    issued_callbacks: usize,
    fired_callbacks: usize,
}

#[derive(Default)]
struct BuilderShared {
    state: Mutex<BuilderState>,
    fire_order: Condvar,
}

/// Constraint search double.
///
/// Searches resolve synchronously on the caller's thread and are recorded
/// for inspection. With `set_match_all(true)` every search succeeds,
/// producing a loop-closure constraint (and, for global searches, a
/// connectivity link). `when_done` callbacks fire from spawned threads but
/// strictly in registration order, one at a time, so test outcomes do not
/// depend on thread scheduling.
///
/// Clones share state, letting a test keep a handle after moving the fake
/// into a graph.
#[derive(Clone, Default)]
pub struct FakeConstraintBuilder {
    shared: Arc<BuilderShared>,
}

impl FakeConstraintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent search succeed.
    pub fn set_match_all(&self, match_all: bool) {
        self.shared.state.lock().match_all = match_all;
    }

    /// Prior-seeded searches submitted so far, as (submap, node) pairs.
    pub fn local_requests(&self) -> Vec<(SubmapId, NodeId)> {
        self.shared.state.lock().local_requests.clone()
    }

    /// Prior-free searches submitted so far, as (submap, node) pairs.
    pub fn global_requests(&self) -> Vec<(SubmapId, NodeId)> {
        self.shared.state.lock().global_requests.clone()
    }

    /// How many completion callbacks were registered, fired or not.
    pub fn num_when_done_registrations(&self) -> usize {
        self.shared.state.lock().issued_callbacks
    }
}

impl ConstraintBuilder for FakeConstraintBuilder {
    fn maybe_add_constraint(
        &self,
        submap_id: SubmapId,
        _submap: &Arc<Submap>,
        node_id: NodeId,
        _scan_index: usize,
        _nodes: &[TrajectoryNode],
        relative_pose: Isometry3<f64>,
    ) {
        let mut state = self.shared.state.lock();
        state.local_requests.push((submap_id, node_id));
        if state.match_all {
            state.pending.push(Constraint {
                submap_id,
                node_id,
                pose: ConstraintPose {
                    relative_pose,
                    sqrt_information: Matrix6::identity(),
                },
                kind: ConstraintKind::InterSubmap,
            });
        }
    }

    fn maybe_add_global_constraint(
        &self,
        submap_id: SubmapId,
        _submap: &Arc<Submap>,
        node_id: NodeId,
        _scan_index: usize,
        connectivity: &Arc<TrajectoryConnectivity>,
        _nodes: &[TrajectoryNode],
    ) {
        let mut state = self.shared.state.lock();
        state.global_requests.push((submap_id, node_id));
        if state.match_all {
            connectivity.connect(node_id.trajectory_id, submap_id.trajectory_id);
            state.pending.push(Constraint {
                submap_id,
                node_id,
                pose: ConstraintPose {
                    relative_pose: Isometry3::identity(),
                    sqrt_information: Matrix6::identity(),
                },
                kind: ConstraintKind::InterSubmap,
            });
        }
    }

    fn notify_end_of_scan(&self, _scan_index: usize) {
        self.shared.state.lock().num_finished_scans += 1;
    }

    fn num_finished_scans(&self) -> usize {
        self.shared.state.lock().num_finished_scans
    }

    fn when_done(&self, callback: WhenDoneCallback) {
        let ticket = {
            let mut state = self.shared.state.lock();
            let ticket = state.issued_callbacks;
            state.issued_callbacks += 1;
            ticket
        };
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("fake-constraint-builder".into())
            .spawn(move || {
                let batch = {
                    let mut state = shared.state.lock();
                    while state.fired_callbacks != ticket {
                        shared.fire_order.wait(&mut state);
                    }
                    std::mem::take(&mut state.pending)
                };
                callback(batch);
                shared.state.lock().fired_callbacks += 1;
                shared.fire_order.notify_all();
            })
            .expect("Failed to spawn fake constraint builder thread");
    }
}

#[derive(Default)]
struct ProblemState {
    submap_data: Vec<Vec<SubmapData>>,
    node_data: Vec<Vec<NodeData>>,
    imu_samples: Vec<(usize, ImuSample)>,
    staged_submap_poses: Vec<(SubmapId, Isometry3<f64>)>,
    staged_node_poses: Vec<(NodeId, Isometry3<f64>)>,
    iteration_caps: Vec<u32>,
    num_solves: usize,
    last_constraint_count: usize,
}

/// Optimization problem double.
///
/// Variables keep their initial estimates across solves, except where a
/// test staged a replacement pose: the next `solve` writes staged poses and
/// clears the staging area, playing the part of a converged solver.
///
/// Clones share state, letting a test keep a handle after moving the fake
/// into a graph.
#[derive(Clone, Default)]
pub struct FakeOptimizationProblem {
    shared: Arc<Mutex<ProblemState>>,
}

impl FakeOptimizationProblem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a submap pose for the next solve to write.
    pub fn stage_submap_pose(&self, submap_id: SubmapId, pose: Isometry3<f64>) {
        self.shared.lock().staged_submap_poses.push((submap_id, pose));
    }

    /// Stages a node pose for the next solve to write.
    pub fn stage_node_pose(&self, node_id: NodeId, pose: Isometry3<f64>) {
        self.shared.lock().staged_node_poses.push((node_id, pose));
    }

    pub fn num_solves(&self) -> usize {
        self.shared.lock().num_solves
    }

    /// Iteration caps in the order they were set.
    pub fn iteration_caps(&self) -> Vec<u32> {
        self.shared.lock().iteration_caps.clone()
    }

    pub fn imu_samples(&self) -> Vec<(usize, ImuSample)> {
        self.shared.lock().imu_samples.clone()
    }

    /// Number of constraints handed to the most recent solve.
    pub fn last_constraint_count(&self) -> usize {
        self.shared.lock().last_constraint_count
    }
}

impl OptimizationProblem for FakeOptimizationProblem {
    fn add_submap(&mut self, trajectory_id: usize, initial_pose: Isometry3<f64>) {
        let mut state = self.shared.lock();
        if state.submap_data.len() <= trajectory_id {
            state.submap_data.resize_with(trajectory_id + 1, Vec::new);
        }
        state.submap_data[trajectory_id].push(SubmapData { pose: initial_pose });
    }

    fn add_trajectory_node(&mut self, trajectory_id: usize, time_us: u64, pose: Isometry3<f64>) {
        let mut state = self.shared.lock();
        if state.node_data.len() <= trajectory_id {
            state.node_data.resize_with(trajectory_id + 1, Vec::new);
        }
        state.node_data[trajectory_id].push(NodeData {
            time_us,
            point_cloud_pose: pose,
        });
    }

    fn add_imu_data(&mut self, trajectory_id: usize, sample: ImuSample) {
        self.shared.lock().imu_samples.push((trajectory_id, sample));
    }

    fn solve(&mut self, constraints: &[Constraint]) {
        let mut state = self.shared.lock();
        state.num_solves += 1;
        state.last_constraint_count = constraints.len();
        let staged_submap_poses = std::mem::take(&mut state.staged_submap_poses);
        for (submap_id, pose) in staged_submap_poses {
            state.submap_data[submap_id.trajectory_id][submap_id.submap_index].pose = pose;
        }
        let staged_node_poses = std::mem::take(&mut state.staged_node_poses);
        for (node_id, pose) in staged_node_poses {
            state.node_data[node_id.trajectory_id][node_id.node_index].point_cloud_pose = pose;
        }
    }

    fn submap_data(&self) -> Vec<Vec<SubmapData>> {
        self.shared.lock().submap_data.clone()
    }

    fn node_data(&self) -> Vec<Vec<NodeData>> {
        self.shared.lock().node_data.clone()
    }

    fn set_max_num_iterations(&mut self, max_num_iterations: u32) {
        self.shared.lock().iteration_caps.push(max_num_iterations);
    }
}
