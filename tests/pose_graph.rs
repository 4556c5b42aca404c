//! Integration tests for the concurrent pose graph.
//!
//! Every test drives the real store, scheduler and merge machinery; only
//! the constraint search and the solver are replaced by the deterministic
//! fakes from `setu_graph::graph::testing`.
//!
//! Run with: `cargo test --test pose_graph`

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::Isometry3;
use setu_graph::{ConstraintBuilder, ConstraintKind, NodeId, Submap, SubmapId, TrajectoryHandle};

use common::{config, identity_covariance, new_graph, scan_points, translate};

// ============================================================================
// Node bookkeeping
// ============================================================================

#[test]
fn test_nodes_are_stored_per_trajectory_in_insertion_order() {
    let (graph, _builder, _problem) = new_graph(config(0, 0.0));
    let trajectory_a = TrajectoryHandle::new();
    let trajectory_b = TrajectoryHandle::new();
    let submap_a = Arc::new(Submap::new(Isometry3::identity()));
    let submap_b = Arc::new(Submap::new(Isometry3::identity()));

    for (time_us, trajectory, submap) in [
        (10, &trajectory_a, &submap_a),
        (20, &trajectory_b, &submap_b),
        (30, &trajectory_a, &submap_a),
        (40, &trajectory_b, &submap_b),
        (50, &trajectory_a, &submap_a),
    ] {
        graph.add_scan(
            time_us,
            scan_points(),
            Isometry3::identity(),
            identity_covariance(),
            trajectory,
            submap,
            &[Arc::clone(submap)],
        );
    }

    assert_eq!(graph.trajectory_id(&trajectory_a), Some(0));
    assert_eq!(graph.trajectory_id(&trajectory_b), Some(1));
    assert_eq!(graph.num_trajectory_nodes(), 5);

    let nodes = graph.trajectory_nodes();
    assert_eq!(nodes.len(), 2);
    let times_a: Vec<u64> = nodes[0].iter().map(|node| node.time_us()).collect();
    let times_b: Vec<u64> = nodes[1].iter().map(|node| node.time_us()).collect();
    assert_eq!(times_a, vec![10, 30, 50]);
    assert_eq!(times_b, vec![20, 40]);
}

#[test]
fn test_each_scan_records_an_intra_submap_constraint() {
    let (graph, _builder, _problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    let submap = Arc::new(Submap::new(Isometry3::identity()));
    let pose = translate(1.0, 2.0, 3.0);

    graph.add_scan(
        10,
        scan_points(),
        pose,
        identity_covariance(),
        &trajectory,
        &submap,
        &[Arc::clone(&submap)],
    );

    let constraints = graph.constraints();
    assert_eq!(constraints.len(), 1);
    let constraint = &constraints[0];
    assert_eq!(constraint.kind, ConstraintKind::IntraSubmap);
    assert_eq!(constraint.submap_id, SubmapId::new(0, 0));
    assert_eq!(constraint.node_id, NodeId::new(0, 0));
    // Identity submap local pose: the measured relative pose is the scan
    // pose itself, and an identity covariance weighs as the identity.
    assert_relative_eq!(constraint.pose.relative_pose, pose, epsilon = 1e-12);
    assert_relative_eq!(
        constraint.pose.sqrt_information,
        nalgebra::Matrix6::identity(),
        epsilon = 1e-9
    );
}

#[test]
fn test_snapshot_getters_are_stable_between_calls() {
    let (graph, _builder, _problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    let submap = Arc::new(Submap::new(translate(0.5, 0.0, 0.0)));

    for time_us in [10, 20, 30] {
        graph.add_scan(
            time_us,
            scan_points(),
            translate(time_us as f64 * 0.01, 0.0, 0.0),
            identity_covariance(),
            &trajectory,
            &submap,
            &[Arc::clone(&submap)],
        );
    }

    let nodes_first = graph.trajectory_nodes();
    let nodes_second = graph.trajectory_nodes();
    assert_eq!(nodes_first.len(), nodes_second.len());
    for (row_first, row_second) in nodes_first.iter().zip(&nodes_second) {
        assert_eq!(row_first.len(), row_second.len());
        for (first, second) in row_first.iter().zip(row_second) {
            assert_eq!(first.time_us(), second.time_us());
            assert_relative_eq!(first.pose, second.pose);
        }
    }

    let ids_first: Vec<(SubmapId, NodeId)> = graph
        .constraints()
        .iter()
        .map(|constraint| (constraint.submap_id, constraint.node_id))
        .collect();
    let ids_second: Vec<(SubmapId, NodeId)> = graph
        .constraints()
        .iter()
        .map(|constraint| (constraint.submap_id, constraint.node_id))
        .collect();
    assert_eq!(ids_first, ids_second);

    let transforms_first = graph.submap_transforms(&trajectory);
    let transforms_second = graph.submap_transforms(&trajectory);
    assert_eq!(transforms_first.len(), transforms_second.len());
    for (first, second) in transforms_first.iter().zip(&transforms_second) {
        assert_relative_eq!(first, second);
    }
}

// ============================================================================
// Submap lifecycle
// ============================================================================

#[test]
#[should_panic(expected = "already finished submap")]
fn test_inserting_a_scan_into_a_finished_submap_panics() {
    let (graph, _builder, _problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    let first = Arc::new(Submap::new(Isometry3::identity()));
    let second = Arc::new(Submap::new(translate(1.0, 0.0, 0.0)));

    graph.add_scan(
        10,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        &trajectory,
        &first,
        &[Arc::clone(&first)],
    );
    first.finish();
    // This scan back-fills and retires the first submap.
    graph.add_scan(
        20,
        scan_points(),
        translate(0.5, 0.0, 0.0),
        identity_covariance(),
        &trajectory,
        &first,
        &[Arc::clone(&first), Arc::clone(&second)],
    );
    // Inserting into it afterwards violates the submap lifecycle.
    graph.add_scan(
        30,
        scan_points(),
        translate(1.0, 0.0, 0.0),
        identity_covariance(),
        &trajectory,
        &first,
        &[Arc::clone(&first), Arc::clone(&second)],
    );
}

// ============================================================================
// Loop closure proposals
// ============================================================================

#[test]
fn test_cross_trajectory_search_is_gated_by_the_sampler() {
    // Sampling at 1.0: the cross-trajectory candidate gets a global search.
    let (graph, builder, _problem) = new_graph(config(0, 1.0));
    let trajectory_a = TrajectoryHandle::new();
    let trajectory_b = TrajectoryHandle::new();
    common::add_scans_until_first_submap_finished(&graph, &trajectory_a);

    let submap_b = Arc::new(Submap::new(Isometry3::identity()));
    graph.add_scan(
        30,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        &trajectory_b,
        &submap_b,
        &[Arc::clone(&submap_b)],
    );

    assert_eq!(
        builder.global_requests(),
        vec![(SubmapId::new(0, 0), NodeId::new(1, 0))]
    );
    assert!(
        builder.local_requests().is_empty(),
        "unconnected trajectories must not get prior-seeded searches"
    );

    // Sampling at 0.0: the candidate is skipped entirely.
    let (graph, builder, _problem) = new_graph(config(0, 0.0));
    let trajectory_a = TrajectoryHandle::new();
    let trajectory_b = TrajectoryHandle::new();
    common::add_scans_until_first_submap_finished(&graph, &trajectory_a);

    let submap_b = Arc::new(Submap::new(Isometry3::identity()));
    graph.add_scan(
        30,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        &trajectory_b,
        &submap_b,
        &[Arc::clone(&submap_b)],
    );

    assert!(builder.global_requests().is_empty());
    assert!(builder.local_requests().is_empty());
}

#[test]
fn test_same_trajectory_scans_get_prior_seeded_searches() {
    let (graph, builder, _problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    let (_first, second) = common::add_scans_until_first_submap_finished(&graph, &trajectory);
    let third = Arc::new(Submap::new(translate(2.0, 0.0, 0.0)));

    // The next scan sees one finished submap on its own trajectory.
    graph.add_scan(
        30,
        scan_points(),
        translate(1.0, 0.0, 0.0),
        identity_covariance(),
        &trajectory,
        &second,
        &[Arc::clone(&second), Arc::clone(&third)],
    );

    assert_eq!(
        builder.local_requests(),
        vec![(SubmapId::new(0, 0), NodeId::new(0, 2))]
    );
    assert!(builder.global_requests().is_empty());
}

#[test]
fn test_loop_closure_connects_trajectories() {
    let (graph, builder, problem) = new_graph(config(0, 1.0));
    builder.set_match_all(true);
    let trajectory_a = TrajectoryHandle::new();
    let trajectory_b = TrajectoryHandle::new();
    common::add_scans_until_first_submap_finished(&graph, &trajectory_a);

    assert!(
        graph.connected_trajectories().is_empty(),
        "components appear only after an optimization pass merges"
    );

    let submap_b = Arc::new(Submap::new(Isometry3::identity()));
    graph.add_scan(
        30,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        &trajectory_b,
        &submap_b,
        &[Arc::clone(&submap_b)],
    );

    graph.run_final_optimization();

    assert_eq!(graph.connected_trajectories(), vec![vec![0, 1]]);
    let constraints = graph.constraints();
    assert_eq!(constraints.len(), 5, "4 intra-submap + 1 loop closure");
    assert_eq!(
        constraints
            .iter()
            .filter(|constraint| constraint.kind == ConstraintKind::InterSubmap)
            .count(),
        1
    );
    // The final pass runs at the final iteration cap, then restores the
    // background cap.
    assert_eq!(problem.iteration_caps(), vec![200, 50]);
    assert_eq!(problem.num_solves(), 1);
    assert_eq!(problem.last_constraint_count(), 5);
}

// ============================================================================
// Background optimization scheduling
// ============================================================================

#[test]
fn test_no_optimization_at_or_below_the_scan_threshold() {
    let (graph, builder, problem) = new_graph(config(2, 0.0));
    let trajectory = TrajectoryHandle::new();
    let submap = Arc::new(Submap::new(Isometry3::identity()));

    for time_us in [10, 20] {
        graph.add_scan(
            time_us,
            scan_points(),
            Isometry3::identity(),
            identity_covariance(),
            &trajectory,
            &submap,
            &[Arc::clone(&submap)],
        );
    }
    assert_eq!(
        builder.num_when_done_registrations(),
        0,
        "two scans must not reach the every-2-scans trigger"
    );

    graph.wait_for_all_computations();
    assert_eq!(builder.num_when_done_registrations(), 1);
    assert_eq!(builder.num_finished_scans(), 2, "both scans still get computed");
    assert_eq!(problem.num_solves(), 0);
}

#[test]
fn test_threshold_crossing_solves_once_and_replays_queued_scans() {
    let (graph, builder, problem) = new_graph(config(2, 0.0));
    let trajectory = TrajectoryHandle::new();
    let submap = Arc::new(Submap::new(Isometry3::identity()));

    // The solver will move the submap up by 5 and pin the first three
    // nodes to distinctive poses no composition could produce.
    problem.stage_submap_pose(SubmapId::new(0, 0), translate(0.0, 0.0, 5.0));
    for node_index in 0..3 {
        problem.stage_node_pose(
            NodeId::new(0, node_index),
            translate(node_index as f64, 9.0, 0.0),
        );
    }

    // The third scan crosses the threshold and schedules the pass; the
    // last two race it and are either queued or executed directly.
    for scan_index in 0..5 {
        graph.add_scan(
            10 * (scan_index as u64 + 1),
            scan_points(),
            translate(scan_index as f64, 0.0, 0.0),
            identity_covariance(),
            &trajectory,
            &submap,
            &[Arc::clone(&submap)],
        );
    }
    graph.wait_for_all_computations();

    assert_eq!(builder.num_finished_scans(), 5, "all scans must be computed");
    assert_eq!(
        builder.num_when_done_registrations(),
        2,
        "exactly one drain cycle plus the wait's merge"
    );
    assert_eq!(problem.num_solves(), 1);

    let nodes = graph.trajectory_nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].len(), 5);
    let times: Vec<u64> = nodes[0].iter().map(|node| node.time_us()).collect();
    assert_eq!(times, vec![10, 20, 30, 40, 50]);

    // Solved prefix: poses come verbatim from the solver.
    for node_index in 0..3 {
        assert_relative_eq!(
            nodes[0][node_index].pose,
            translate(node_index as f64, 9.0, 0.0),
            epsilon = 1e-9
        );
    }
    // Later scans ride along with the submap's correction regardless of
    // whether they were queued or executed after the drain.
    for node_index in 3..5 {
        assert_relative_eq!(
            nodes[0][node_index].pose,
            translate(node_index as f64, 0.0, 5.0),
            epsilon = 1e-9
        );
    }

    let transforms = graph.submap_transforms(&trajectory);
    assert_eq!(transforms.len(), 1);
    assert_relative_eq!(transforms[0], translate(0.0, 0.0, 5.0), epsilon = 1e-9);
}

// ============================================================================
// Submap transform extrapolation
// ============================================================================

#[test]
fn test_submap_transforms_extrapolate_from_the_solved_prefix() {
    let (graph, _builder, problem) = new_graph(config(1, 0.0));
    let trajectory = TrajectoryHandle::new();
    let first = Arc::new(Submap::new(Isometry3::identity()));
    let second = Arc::new(Submap::new(translate(1.0, 0.0, 0.0)));

    let unknown = TrajectoryHandle::new();
    assert_eq!(graph.submap_transforms(&unknown).len(), 1);
    assert_relative_eq!(graph.submap_transforms(&unknown)[0], Isometry3::identity());

    problem.stage_submap_pose(SubmapId::new(0, 0), translate(0.0, 0.0, 5.0));

    // Two scans cross the every-1-scan threshold and run a pass.
    for time_us in [10, 20] {
        graph.add_scan(
            time_us,
            scan_points(),
            Isometry3::identity(),
            identity_covariance(),
            &trajectory,
            &first,
            &[Arc::clone(&first)],
        );
    }
    graph.wait_for_all_computations();
    let transforms = graph.submap_transforms(&trajectory);
    assert_eq!(transforms.len(), 1);
    assert_relative_eq!(transforms[0], translate(0.0, 0.0, 5.0), epsilon = 1e-9);

    // A scan starts the second submap; it has no solver estimate yet, so
    // its transform extends the solved one by the local-pose delta.
    graph.add_scan(
        30,
        scan_points(),
        translate(1.0, 0.0, 0.0),
        identity_covariance(),
        &trajectory,
        &first,
        &[Arc::clone(&first), Arc::clone(&second)],
    );

    let transforms = graph.submap_transforms(&trajectory);
    assert_eq!(transforms.len(), 2);
    assert_relative_eq!(transforms[0], translate(0.0, 0.0, 5.0), epsilon = 1e-9);
    assert_relative_eq!(transforms[1], translate(1.0, 0.0, 5.0), epsilon = 1e-9);

    let by_id = graph.submap_transforms_by_id(0);
    assert_eq!(by_id.len(), 2);
    assert_relative_eq!(by_id[1], translate(1.0, 0.0, 5.0), epsilon = 1e-9);
}

#[test]
fn test_local_to_global_transform_follows_the_newest_submap() {
    let (graph, _builder, _problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    assert_relative_eq!(
        graph.local_to_global_transform(&trajectory),
        Isometry3::identity()
    );

    let submap = Arc::new(Submap::new(translate(2.0, 0.0, 0.0)));
    graph.add_scan(
        10,
        scan_points(),
        translate(2.0, 0.0, 0.0),
        identity_covariance(),
        &trajectory,
        &submap,
        &[Arc::clone(&submap)],
    );

    // Without solver data the submap anchor maps onto the identity, so the
    // projection cancels its local pose.
    assert_relative_eq!(
        graph.local_to_global_transform(&trajectory),
        translate(-2.0, 0.0, 0.0),
        epsilon = 1e-12
    );
}

// ============================================================================
// IMU plumbing
// ============================================================================

#[test]
fn test_imu_samples_reach_the_optimization_problem() {
    let (graph, _builder, problem) = new_graph(config(0, 0.0));
    let trajectory = TrajectoryHandle::new();
    let imu_only = TrajectoryHandle::new();
    let submap = Arc::new(Submap::new(Isometry3::identity()));

    let first_sample = setu_graph::ImuSample::new(
        5,
        nalgebra::Vector3::new(0.0, 0.0, 9.81),
        nalgebra::Vector3::zeros(),
    );
    let second_sample = setu_graph::ImuSample::new(
        15,
        nalgebra::Vector3::new(0.1, 0.0, 9.81),
        nalgebra::Vector3::new(0.0, 0.0, 0.2),
    );

    graph.add_imu_data(&trajectory, first_sample);
    graph.add_scan(
        10,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        &trajectory,
        &submap,
        &[Arc::clone(&submap)],
    );
    graph.add_imu_data(&trajectory, second_sample);
    graph.add_imu_data(&imu_only, first_sample);

    assert_eq!(
        problem.imu_samples(),
        vec![(0, first_sample), (0, second_sample), (1, first_sample)]
    );

    // A trajectory known only through IMU data has an id and an empty row.
    assert_eq!(graph.trajectory_id(&imu_only), Some(1));
    let nodes = graph.trajectory_nodes();
    assert_eq!(nodes.len(), 2);
    assert!(nodes[1].is_empty());
}
