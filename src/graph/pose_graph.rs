//! The concurrent pose graph.
//!
//! ```text
//!                 add_scan / add_imu_data
//!                           │
//!                           ▼
//!                  ┌─────────────────┐   Direct: execute now
//!                  │    WorkQueue    │──────────────────────┐
//!                  └─────────────────┘                      │
//!                           │ Queuing                       ▼
//!                           ▼                    compute constraints,
//!                  ┌─────────────────┐           register with solver,
//!                  │  pending items  │           propose loop closures
//!                  └─────────────────┘                      │
//!                           ▲                               │ every N scans
//!             drain in FIFO │                               ▼
//!                           │                  ┌─────────────────────────┐
//!                           └──────────────────│ when_done → solve/merge │
//!                                              └─────────────────────────┘
//! ```
//!
//! Scans arrive on the caller's thread; loop-closure searches resolve on the
//! constraint builder's threads. While an optimization pass is being
//! finalized the store queues new work instead of executing it, so at most
//! one pass is in flight at any time. The drain cycle merges the solved
//! poses, replays the queued items and hands execution back to the caller's
//! thread once it has caught up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nalgebra::{Isometry3, Matrix6};
use parking_lot::{Condvar, Mutex};

use crate::config::PoseGraphConfig;
use crate::core::math::spd_matrix_sqrt_inverse;
use crate::core::{FixedRatioSampler, NodeId, SubmapId, TrajectoryHandle};
use crate::error::Result;
use crate::graph::connectivity::TrajectoryConnectivity;
use crate::graph::constraint::{Constraint, ConstraintKind, ConstraintPose};
use crate::graph::node::{ConstantData, TrajectoryNode};
use crate::graph::submap::{Submap, SubmapState};
use crate::graph::traits::{ConstraintBuilder, OptimizationProblem, SubmapData};
use crate::graph::work_queue::{WorkItem, WorkQueue};
use crate::sensor::{ImuSample, PointCloud};

/// Submaps are owned by the front-end; the store keys them by address.
fn submap_key(submap: &Arc<Submap>) -> usize {
    Arc::as_ptr(submap) as usize
}

/// Everything behind the store mutex.
#[derive(Default)]
struct GraphState {
    /// Dense trajectory ids, in order of first use.
    trajectory_ids: HashMap<TrajectoryHandle, usize>,
    /// All nodes in scan arrival order, across trajectories.
    trajectory_nodes: Vec<TrajectoryNode>,
    /// Registered submaps, keyed by [`submap_key`].
    submap_ids: HashMap<usize, SubmapId>,
    /// Per-trajectory submap bookkeeping, indexed like [`SubmapId`].
    submap_states: Vec<Vec<SubmapState>>,
    constraints: Vec<Constraint>,
    /// Flat scan index to graph node id, in constraint computation order.
    scan_index_to_node_id: Vec<NodeId>,
    num_nodes_in_trajectory: HashMap<usize, usize>,
    /// One global localization sampler per trajectory with scans.
    samplers: HashMap<usize, FixedRatioSampler>,
    /// Submap pose snapshot from the last merged optimization pass.
    optimized_submap_transforms: Vec<Vec<SubmapData>>,
    connected_components: Vec<Vec<usize>>,
    reverse_connected_components: HashMap<usize, usize>,
    work_queue: WorkQueue,
    num_scans_since_last_loop_closure: usize,
    run_loop_closure: bool,
}

impl GraphState {
    fn assign_trajectory_id(&mut self, trajectory: &TrajectoryHandle) -> usize {
        let next_id = self.trajectory_ids.len();
        *self.trajectory_ids.entry(trajectory.clone()).or_insert(next_id)
    }

    fn submap_id(&self, submap: &Arc<Submap>) -> SubmapId {
        match self.submap_ids.get(&submap_key(submap)) {
            Some(&submap_id) => submap_id,
            None => panic!("submap was never registered with the pose graph"),
        }
    }

    /// Global poses for the trajectory's registered submaps: solver results
    /// where available, then rigid composition of local poses past the end
    /// of the solved prefix.
    fn extrapolate_submap_transforms(
        &self,
        source: &[Vec<SubmapData>],
        trajectory_id: usize,
    ) -> Vec<Isometry3<f64>> {
        let submap_states = match self.submap_states.get(trajectory_id) {
            Some(submap_states) => submap_states,
            None => return vec![Isometry3::identity()],
        };
        let solved: &[SubmapData] = source
            .get(trajectory_id)
            .map(|row| row.as_slice())
            .unwrap_or(&[]);

        let mut result: Vec<Isometry3<f64>> = Vec::with_capacity(submap_states.len());
        for submap_state in submap_states {
            if result.len() < solved.len() {
                result.push(solved[result.len()].pose);
            } else if result.is_empty() {
                result.push(Isometry3::identity());
            } else {
                let previous = &submap_states[result.len() - 1];
                let last = result[result.len() - 1];
                result.push(
                    last * previous.submap.local_pose().inverse()
                        * submap_state.submap.local_pose(),
                );
            }
        }
        if result.is_empty() {
            result.push(Isometry3::identity());
        }
        result
    }

    /// Projection from the trajectory's local frame into the global frame,
    /// anchored on the newest registered submap. `fallback_submap` stands in
    /// before the trajectory has registered anything.
    fn local_to_global(
        &self,
        trajectory_id: usize,
        fallback_submap: Option<&Arc<Submap>>,
    ) -> Isometry3<f64> {
        let transforms =
            self.extrapolate_submap_transforms(&self.optimized_submap_transforms, trajectory_id);
        let last = transforms[transforms.len() - 1];
        let anchor = self
            .submap_states
            .get(trajectory_id)
            .and_then(|row| row.get(transforms.len() - 1))
            .map(|submap_state| &submap_state.submap)
            .or(fallback_submap);
        match anchor {
            Some(submap) => last * submap.local_pose().inverse(),
            None => Isometry3::identity(),
        }
    }
}

struct PoseGraphInner<B, P>
where
    B: ConstraintBuilder + 'static,
    P: OptimizationProblem + 'static,
{
    config: PoseGraphConfig,
    constraint_builder: B,
    optimization_problem: Mutex<P>,
    connectivity: Arc<TrajectoryConnectivity>,
    state: Mutex<GraphState>,
    /// Signalled whenever queued work completes, for progress waiters.
    progress: Condvar,
}

impl<B, P> PoseGraphInner<B, P>
where
    B: ConstraintBuilder + 'static,
    P: OptimizationProblem + 'static,
{
    fn execute_work_item(inner: &Arc<Self>, state: &mut GraphState, item: WorkItem) {
        match item {
            WorkItem::ComputeConstraints {
                scan_index,
                matching_submap,
                insertion_submaps,
                finished_submap,
                pose,
                covariance,
            } => Self::compute_constraints_for_scan(
                inner,
                state,
                scan_index,
                &matching_submap,
                &insertion_submaps,
                finished_submap.as_ref(),
                pose,
                covariance,
            ),
            WorkItem::AddImuData { trajectory_id, sample } => {
                inner.optimization_problem.lock().add_imu_data(trajectory_id, sample);
            }
        }
    }

    /// Registers any not-yet-known insertion submaps with the solver. The
    /// first submap of a trajectory anchors the problem at the identity; a
    /// newly started submap is seeded consistently with its predecessor's
    /// current estimate.
    fn grow_submap_transforms_as_needed(
        &self,
        state: &GraphState,
        insertion_submaps: &[Arc<Submap>],
    ) {
        assert!(!insertion_submaps.is_empty());
        let first_submap_id = state.submap_id(&insertion_submaps[0]);
        let trajectory_id = first_submap_id.trajectory_id;

        let mut problem = self.optimization_problem.lock();
        let submap_data = problem.submap_data();
        if insertion_submaps.len() == 1 {
            assert_eq!(
                first_submap_id.submap_index, 0,
                "a lone insertion submap must be the trajectory's first"
            );
            if submap_data
                .get(trajectory_id)
                .map_or(true, |row| row.is_empty())
            {
                problem.add_submap(trajectory_id, Isometry3::identity());
            }
            return;
        }
        assert_eq!(insertion_submaps.len(), 2, "at most two insertion submaps per scan");

        let next_submap_index = submap_data[trajectory_id].len();
        let second_submap_id = state.submap_id(&insertion_submaps[1]);
        assert_eq!(
            second_submap_id.trajectory_id, trajectory_id,
            "insertion submaps must belong to one trajectory"
        );
        assert!(
            second_submap_id.submap_index <= next_submap_index,
            "submap registration indices must stay dense"
        );
        if second_submap_id.submap_index == next_submap_index {
            let first_submap_pose = submap_data[trajectory_id][first_submap_id.submap_index].pose;
            problem.add_submap(
                trajectory_id,
                first_submap_pose
                    * insertion_submaps[0].local_pose().inverse()
                    * insertion_submaps[1].local_pose(),
            );
        }
    }

    /// Decides whether and how to search for a constraint between the scan
    /// and one finished submap, and submits the search to the builder.
    fn compute_constraint(&self, state: &mut GraphState, scan_index: usize, submap_id: SubmapId) {
        let node_id = state.scan_index_to_node_id[scan_index];
        let (submap_pose, node_pose) = {
            let problem = self.optimization_problem.lock();
            let submap_data = problem.submap_data();
            let node_data = problem.node_data();
            (
                submap_data[submap_id.trajectory_id][submap_id.submap_index].pose,
                node_data[node_id.trajectory_id][node_id.node_index].point_cloud_pose,
            )
        };
        let relative_pose = submap_pose.inverse() * node_pose;
        let scan_trajectory_id = state.trajectory_nodes[scan_index].constant_data.trajectory_id;

        // Cross-trajectory pairs occasionally get a full-submap search so
        // that unconnected trajectories can find each other at all.
        let mut run_global_search = false;
        if scan_trajectory_id != submap_id.trajectory_id {
            let sampler = match state.samplers.get_mut(&scan_trajectory_id) {
                Some(sampler) => sampler,
                None => panic!("no global localization sampler for trajectory {scan_trajectory_id}"),
            };
            run_global_search = sampler.pulse();
        }

        let submap_state = &state.submap_states[submap_id.trajectory_id][submap_id.submap_index];
        if run_global_search {
            self.constraint_builder.maybe_add_global_constraint(
                submap_id,
                &submap_state.submap,
                node_id,
                scan_index,
                &self.connectivity,
                &state.trajectory_nodes,
            );
        } else {
            let same_trajectory = scan_trajectory_id == submap_id.trajectory_id;
            let connected = match (
                state.reverse_connected_components.get(&scan_trajectory_id),
                state.reverse_connected_components.get(&submap_id.trajectory_id),
            ) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if same_trajectory || connected {
                self.constraint_builder.maybe_add_constraint(
                    submap_id,
                    &submap_state.submap,
                    node_id,
                    scan_index,
                    &state.trajectory_nodes,
                    relative_pose,
                );
            }
        }
    }

    /// Back-fills searches between a newly finished submap and every scan
    /// that was not inserted into it.
    fn compute_constraints_for_old_scans(&self, state: &mut GraphState, submap: &Arc<Submap>) {
        let submap_id = state.submap_id(submap);
        let num_scans = state.scan_index_to_node_id.len();
        for scan_index in 0..num_scans {
            let node_id = state.scan_index_to_node_id[scan_index];
            if !state.submap_states[submap_id.trajectory_id][submap_id.submap_index]
                .node_ids
                .contains(&node_id)
            {
                self.compute_constraint(state, scan_index, submap_id);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_constraints_for_scan(
        inner: &Arc<Self>,
        state: &mut GraphState,
        scan_index: usize,
        matching_submap: &Arc<Submap>,
        insertion_submaps: &[Arc<Submap>],
        finished_submap: Option<&Arc<Submap>>,
        pose: Isometry3<f64>,
        covariance: Matrix6<f64>,
    ) {
        inner.grow_submap_transforms_as_needed(state, insertion_submaps);

        let matching_id = state.submap_id(matching_submap);
        let optimized_pose = {
            let problem = inner.optimization_problem.lock();
            problem.submap_data()[matching_id.trajectory_id][matching_id.submap_index].pose
        } * matching_submap.local_pose().inverse()
            * pose;

        assert_eq!(
            scan_index,
            state.scan_index_to_node_id.len(),
            "scans must be computed in arrival order"
        );
        let node_index = {
            let counter = state
                .num_nodes_in_trajectory
                .entry(matching_id.trajectory_id)
                .or_insert(0);
            let node_index = *counter;
            *counter += 1;
            node_index
        };
        let node_id = NodeId::new(matching_id.trajectory_id, node_index);
        state.scan_index_to_node_id.push(node_id);

        let scan_data = Arc::clone(&state.trajectory_nodes[scan_index].constant_data);
        assert_eq!(
            scan_data.trajectory_id, matching_id.trajectory_id,
            "scan and matching submap must share a trajectory"
        );
        inner.optimization_problem.lock().add_trajectory_node(
            matching_id.trajectory_id,
            scan_data.time_us,
            optimized_pose,
        );

        for submap in insertion_submaps {
            let submap_id = state.submap_id(submap);
            let submap_state =
                &mut state.submap_states[submap_id.trajectory_id][submap_id.submap_index];
            assert!(
                !submap_state.finished,
                "scan inserted into an already finished submap"
            );
            submap_state.node_ids.insert(node_id);
            let constraint_transform = submap.local_pose().inverse() * pose;
            state.constraints.push(Constraint {
                submap_id,
                node_id,
                pose: ConstraintPose {
                    relative_pose: constraint_transform,
                    sqrt_information: spd_matrix_sqrt_inverse(
                        &covariance,
                        inner.config.lower_covariance_eigenvalue_bound,
                    ),
                },
                kind: ConstraintKind::IntraSubmap,
            });
        }

        // Propose loop closures against every finished submap.
        let mut finished_submap_ids = Vec::new();
        for (trajectory_id, row) in state.submap_states.iter().enumerate() {
            for (submap_index, submap_state) in row.iter().enumerate() {
                if submap_state.finished {
                    assert!(
                        !submap_state.node_ids.contains(&node_id),
                        "a finished submap cannot contain the new node"
                    );
                    finished_submap_ids.push(SubmapId::new(trajectory_id, submap_index));
                }
            }
        }
        for submap_id in finished_submap_ids {
            inner.compute_constraint(state, scan_index, submap_id);
        }

        if let Some(finished) = finished_submap {
            let finished_id = state.submap_id(finished);
            {
                let finished_state =
                    &state.submap_states[finished_id.trajectory_id][finished_id.submap_index];
                assert!(!finished_state.finished, "submap finished twice");
            }
            // The submap just left construction: search it against all
            // earlier scans it never contained.
            inner.compute_constraints_for_old_scans(state, finished);
            state.submap_states[finished_id.trajectory_id][finished_id.submap_index].finished =
                true;
        }
        inner.constraint_builder.notify_end_of_scan(scan_index);

        state.num_scans_since_last_loop_closure += 1;
        if inner.config.optimize_every_n_scans > 0
            && state.num_scans_since_last_loop_closure > inner.config.optimize_every_n_scans
        {
            assert!(
                !state.run_loop_closure,
                "loop closure retriggered while a pass is active"
            );
            state.run_loop_closure = true;
            // With a queue already in place, the active drain cycle picks
            // the flag up on its own.
            if state.work_queue.is_direct() {
                state.work_queue.begin_queuing();
                log::debug!(
                    "Queuing scans after {} since the last optimization",
                    state.num_scans_since_last_loop_closure
                );
                Self::handle_scan_queue(inner);
            }
        }
    }

    /// Finalizes the in-flight pass once the builder reports its batch, then
    /// replays queued work until the queue is empty or a new pass starts.
    fn handle_scan_queue(inner: &Arc<Self>) {
        let graph = Arc::clone(inner);
        inner.constraint_builder.when_done(Box::new(move |batch: Vec<Constraint>| {
            graph.state.lock().constraints.extend(batch);
            graph.run_optimization();

            let mut state = graph.state.lock();
            state.num_scans_since_last_loop_closure = 0;
            state.run_loop_closure = false;
            while !state.run_loop_closure {
                let item = match state.work_queue.pop_front() {
                    Some(item) => item,
                    None => {
                        log::info!("Scan queue drained, resuming direct execution");
                        state.work_queue.resume_direct();
                        graph.progress.notify_all();
                        return;
                    }
                };
                Self::execute_work_item(&graph, &mut state, item);
                graph.progress.notify_all();
            }
            drop(state);
            // A replayed scan crossed the threshold again.
            Self::handle_scan_queue(&graph);
        }));
    }

    /// Re-solves all poses and merges the result into the store: solved
    /// nodes take the solver's estimates, later nodes are carried along by
    /// their trajectory's submap correction.
    fn run_optimization(&self) {
        {
            let problem = self.optimization_problem.lock();
            if problem.submap_data().is_empty() {
                return;
            }
        }
        let constraints = self.state.lock().constraints.clone();
        let (submap_data, node_data) = {
            let mut problem = self.optimization_problem.lock();
            problem.solve(&constraints);
            (problem.submap_data(), problem.node_data())
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let num_solved_scans = state.scan_index_to_node_id.len();
        for scan_index in 0..num_solved_scans {
            let node_id = state.scan_index_to_node_id[scan_index];
            state.trajectory_nodes[scan_index].pose =
                node_data[node_id.trajectory_id][node_id.node_index].point_cloud_pose;
        }
        // Scans added while solving keep their local motion, moved as a
        // block by how much their trajectory's last submap estimate shifted.
        let mut corrections: HashMap<usize, Isometry3<f64>> = HashMap::new();
        for scan_index in num_solved_scans..state.trajectory_nodes.len() {
            let trajectory_id = state.trajectory_nodes[scan_index].constant_data.trajectory_id;
            if !corrections.contains_key(&trajectory_id) {
                let new_transforms =
                    state.extrapolate_submap_transforms(&submap_data, trajectory_id);
                let old_transforms = state.extrapolate_submap_transforms(
                    &state.optimized_submap_transforms,
                    trajectory_id,
                );
                assert_eq!(
                    new_transforms.len(),
                    old_transforms.len(),
                    "submap count changed during the solve"
                );
                let correction = new_transforms[new_transforms.len() - 1]
                    * old_transforms[old_transforms.len() - 1].inverse();
                corrections.insert(trajectory_id, correction);
            }
            state.trajectory_nodes[scan_index].pose =
                corrections[&trajectory_id] * state.trajectory_nodes[scan_index].pose;
        }
        state.optimized_submap_transforms = submap_data;

        state.connected_components = self.connectivity.connected_components();
        state.reverse_connected_components.clear();
        for (component_index, component) in state.connected_components.iter().enumerate() {
            for &trajectory_id in component {
                state
                    .reverse_connected_components
                    .insert(trajectory_id, component_index);
            }
        }
    }

    /// Blocks until every submitted scan has been through constraint
    /// computation, then merges the builder's final batch.
    fn wait_for_all_computations(inner: &Arc<Self>) {
        let mut state = inner.state.lock();
        let num_finished_at_start = inner.constraint_builder.num_finished_scans();
        while inner.constraint_builder.num_finished_scans() < state.trajectory_nodes.len() {
            let result = inner.progress.wait_for(&mut state, Duration::from_secs(1));
            if result.timed_out() {
                let finished = inner
                    .constraint_builder
                    .num_finished_scans()
                    .saturating_sub(num_finished_at_start);
                let remaining = state
                    .trajectory_nodes
                    .len()
                    .saturating_sub(num_finished_at_start);
                if remaining > 0 {
                    log::info!("Optimizing: {:.1}%...", 100.0 * finished as f64 / remaining as f64);
                }
            }
        }
        log::info!("Optimizing: done");
        drop(state);

        let (done_sender, done_receiver) = crossbeam_channel::bounded(1);
        let graph = Arc::clone(inner);
        inner.constraint_builder.when_done(Box::new(move |batch: Vec<Constraint>| {
            graph.state.lock().constraints.extend(batch);
            let _ = done_sender.send(());
        }));
        if done_receiver.recv().is_err() {
            panic!("constraint builder dropped its completion callback without firing it");
        }
    }

    fn run_final_optimization(inner: &Arc<Self>) {
        Self::wait_for_all_computations(inner);
        inner
            .optimization_problem
            .lock()
            .set_max_num_iterations(inner.config.max_num_final_iterations);
        inner.run_optimization();
        inner
            .optimization_problem
            .lock()
            .set_max_num_iterations(inner.config.max_num_iterations);
    }
}

/// Concurrent pose graph over scans, submaps and constraints.
///
/// The graph owns the optimization problem and shares the constraint
/// builder's threads. See the module documentation for the execution model.
pub struct PoseGraph<B, P>
where
    B: ConstraintBuilder + 'static,
    P: OptimizationProblem + 'static,
{
    inner: Arc<PoseGraphInner<B, P>>,
}

impl<B, P> PoseGraph<B, P>
where
    B: ConstraintBuilder + 'static,
    P: OptimizationProblem + 'static,
{
    /// Creates an empty graph. Fails only on an invalid configuration.
    pub fn new(
        config: PoseGraphConfig,
        constraint_builder: B,
        optimization_problem: P,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoseGraphInner {
                config,
                constraint_builder,
                optimization_problem: Mutex::new(optimization_problem),
                connectivity: Arc::new(TrajectoryConnectivity::new()),
                state: Mutex::new(GraphState::default()),
                progress: Condvar::new(),
            }),
        })
    }

    /// Adds a scan with its local-tracking `pose` and covariance.
    ///
    /// `insertion_submaps` are the submaps the scan was inserted into, the
    /// submap under construction first; `matching_submap` is the one local
    /// tracking matched against. Constraint computation runs on this thread
    /// unless an optimization pass is being finalized, in which case it is
    /// queued behind the pass.
    pub fn add_scan(
        &self,
        time_us: u64,
        point_cloud: PointCloud,
        pose: Isometry3<f64>,
        covariance: Matrix6<f64>,
        trajectory: &TrajectoryHandle,
        matching_submap: &Arc<Submap>,
        insertion_submaps: &[Arc<Submap>],
    ) {
        assert!(
            !insertion_submaps.is_empty(),
            "a scan must be inserted into at least one submap"
        );
        let mut state = self.inner.state.lock();
        let trajectory_id = state.assign_trajectory_id(trajectory);
        let optimized_pose = state.local_to_global(trajectory_id, insertion_submaps.first()) * pose;

        let scan_index = state.trajectory_nodes.len();
        state.trajectory_nodes.push(TrajectoryNode {
            constant_data: Arc::new(ConstantData {
                time_us,
                point_cloud,
                trajectory_id,
                // Scans arrive already gravity-aligned by local tracking.
                gravity_alignment: Isometry3::identity(),
            }),
            pose: optimized_pose,
        });
        self.inner.connectivity.add(trajectory_id);

        let newest_submap = &insertion_submaps[insertion_submaps.len() - 1];
        if !state.submap_ids.contains_key(&submap_key(newest_submap)) {
            if state.submap_states.len() <= trajectory_id {
                state.submap_states.resize_with(trajectory_id + 1, Vec::new);
            }
            let submap_index = state.submap_states[trajectory_id].len();
            let submap_id = SubmapId::new(trajectory_id, submap_index);
            state.submap_ids.insert(submap_key(newest_submap), submap_id);
            state.submap_states[trajectory_id].push(SubmapState::new(Arc::clone(newest_submap)));
            log::debug!("Registered {submap_id}");
        }
        let finished_submap = if insertion_submaps[0].is_finished() {
            Some(Arc::clone(&insertion_submaps[0]))
        } else {
            None
        };

        let ratio = self.inner.config.global_sampling_ratio;
        state
            .samplers
            .entry(trajectory_id)
            .or_insert_with(|| FixedRatioSampler::new(ratio));

        let item = WorkItem::ComputeConstraints {
            scan_index,
            matching_submap: Arc::clone(matching_submap),
            insertion_submaps: insertion_submaps.to_vec(),
            finished_submap,
            pose,
            covariance,
        };
        if let Some(item) = state.work_queue.submit(item) {
            PoseGraphInner::execute_work_item(&self.inner, &mut state, item);
            self.inner.progress.notify_all();
        }
    }

    /// Feeds an IMU sample to the optimization problem, assigning the
    /// trajectory an id if this is its first data.
    pub fn add_imu_data(&self, trajectory: &TrajectoryHandle, sample: ImuSample) {
        let mut state = self.inner.state.lock();
        let trajectory_id = state.assign_trajectory_id(trajectory);
        let item = WorkItem::AddImuData { trajectory_id, sample };
        if let Some(item) = state.work_queue.submit(item) {
            PoseGraphInner::execute_work_item(&self.inner, &mut state, item);
        }
    }

    /// Blocks until all submitted scans have been through constraint
    /// computation and their found constraints are merged into the graph.
    pub fn wait_for_all_computations(&self) {
        PoseGraphInner::wait_for_all_computations(&self.inner);
    }

    /// Waits for quiescence, then runs one solve at the final (higher)
    /// iteration cap. Typically called once at the end of a mapping run.
    pub fn run_final_optimization(&self) {
        PoseGraphInner::run_final_optimization(&self.inner);
    }

    /// All nodes grouped by trajectory id, each row in insertion order.
    /// Trajectories known only through IMU data yield empty rows.
    pub fn trajectory_nodes(&self) -> Vec<Vec<TrajectoryNode>> {
        let state = self.inner.state.lock();
        let mut nodes: Vec<Vec<TrajectoryNode>> = vec![Vec::new(); state.trajectory_ids.len()];
        for node in &state.trajectory_nodes {
            nodes[node.constant_data.trajectory_id].push(node.clone());
        }
        nodes
    }

    /// Total number of nodes across all trajectories.
    pub fn num_trajectory_nodes(&self) -> usize {
        self.inner.state.lock().trajectory_nodes.len()
    }

    /// All constraints recorded so far.
    pub fn constraints(&self) -> Vec<Constraint> {
        self.inner.state.lock().constraints.clone()
    }

    /// Components of trajectories tied together by loop closures, as of the
    /// last merged optimization pass.
    pub fn connected_trajectories(&self) -> Vec<Vec<usize>> {
        self.inner.state.lock().connected_components.clone()
    }

    /// Dense id assigned to `trajectory`, if it has submitted any data.
    pub fn trajectory_id(&self, trajectory: &TrajectoryHandle) -> Option<usize> {
        self.inner.state.lock().trajectory_ids.get(trajectory).copied()
    }

    /// Current global submap poses for `trajectory`; `[identity]` for an
    /// unknown trajectory.
    pub fn submap_transforms(&self, trajectory: &TrajectoryHandle) -> Vec<Isometry3<f64>> {
        let state = self.inner.state.lock();
        match state.trajectory_ids.get(trajectory) {
            Some(&trajectory_id) => state
                .extrapolate_submap_transforms(&state.optimized_submap_transforms, trajectory_id),
            None => vec![Isometry3::identity()],
        }
    }

    /// Same as [`submap_transforms`](Self::submap_transforms), addressed by
    /// dense trajectory id.
    pub fn submap_transforms_by_id(&self, trajectory_id: usize) -> Vec<Isometry3<f64>> {
        let state = self.inner.state.lock();
        state.extrapolate_submap_transforms(&state.optimized_submap_transforms, trajectory_id)
    }

    /// Transform taking the trajectory's local frame to the global frame,
    /// following the newest registered submap. Identity until the
    /// trajectory's first submap is registered.
    pub fn local_to_global_transform(&self, trajectory: &TrajectoryHandle) -> Isometry3<f64> {
        let state = self.inner.state.lock();
        match state.trajectory_ids.get(trajectory) {
            Some(&trajectory_id) => state.local_to_global(trajectory_id, None),
            None => Isometry3::identity(),
        }
    }
}

impl<B, P> Drop for PoseGraph<B, P>
where
    B: ConstraintBuilder + 'static,
    P: OptimizationProblem + 'static,
{
    /// Waits out in-flight searches; dropping with work still queued is a
    /// contract violation.
    fn drop(&mut self) {
        // Unwinding may leave a scan half computed; waiting on it would
        // never return.
        if std::thread::panicking() {
            return;
        }
        PoseGraphInner::wait_for_all_computations(&self.inner);
        let state = self.inner.state.lock();
        assert!(
            state.work_queue.is_direct(),
            "pose graph dropped while scans were still queued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state_with_submaps(local_poses: &[Isometry3<f64>]) -> GraphState {
        let mut state = GraphState::default();
        state.submap_states.push(
            local_poses
                .iter()
                .map(|&local_pose| SubmapState::new(Arc::new(Submap::new(local_pose))))
                .collect(),
        );
        state
    }

    #[test]
    fn test_extrapolate_unknown_trajectory_is_identity() {
        let state = GraphState::default();
        let transforms = state.extrapolate_submap_transforms(&[], 0);
        assert_eq!(transforms.len(), 1);
        assert_relative_eq!(transforms[0], Isometry3::identity());
    }

    #[test]
    fn test_extrapolate_without_solver_data_follows_local_poses() {
        let state = state_with_submaps(&[
            Isometry3::identity(),
            Isometry3::translation(1.0, 0.0, 0.0),
        ]);
        let transforms = state.extrapolate_submap_transforms(&[], 0);
        assert_eq!(transforms.len(), 2);
        assert_relative_eq!(transforms[0], Isometry3::identity());
        assert_relative_eq!(transforms[1], Isometry3::translation(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_extrapolate_composes_past_the_solved_prefix() {
        let state = state_with_submaps(&[
            Isometry3::identity(),
            Isometry3::translation(1.0, 0.0, 0.0),
        ]);
        let solved = vec![vec![SubmapData {
            pose: Isometry3::translation(0.0, 0.0, 5.0),
        }]];
        let transforms = state.extrapolate_submap_transforms(&solved, 0);
        assert_eq!(transforms.len(), 2);
        assert_relative_eq!(transforms[0], Isometry3::translation(0.0, 0.0, 5.0));
        assert_relative_eq!(transforms[1], Isometry3::translation(1.0, 0.0, 5.0));
    }

    #[test]
    fn test_local_to_global_identity_without_submaps() {
        let state = GraphState::default();
        assert_relative_eq!(state.local_to_global(0, None), Isometry3::identity());
    }

    #[test]
    fn test_local_to_global_cancels_the_anchor_local_pose() {
        let state = state_with_submaps(&[Isometry3::translation(2.0, 0.0, 0.0)]);
        // No solver data: the anchor maps onto the identity, so a pose equal
        // to the anchor's local pose lands at the identity globally.
        let local_to_global = state.local_to_global(0, None);
        assert_relative_eq!(
            local_to_global * Isometry3::translation(2.0, 0.0, 0.0),
            Isometry3::identity()
        );
    }

    #[test]
    fn test_trajectory_ids_assigned_in_first_use_order() {
        let mut state = GraphState::default();
        let first = TrajectoryHandle::new();
        let second = TrajectoryHandle::new();
        assert_eq!(state.assign_trajectory_id(&first), 0);
        assert_eq!(state.assign_trajectory_id(&second), 1);
        assert_eq!(state.assign_trajectory_id(&first), 0);
    }
}
