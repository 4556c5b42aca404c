//! Shared fixtures for the pose graph integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix6, Point3};
use setu_graph::graph::testing::{FakeConstraintBuilder, FakeOptimizationProblem};
use setu_graph::{PointCloud, PoseGraph, PoseGraphConfig, Submap};

/// Config with a pass scheduled once more than `optimize_every_n_scans`
/// scans accumulate (0 disables), and the given global sampling ratio.
pub fn config(optimize_every_n_scans: usize, global_sampling_ratio: f64) -> PoseGraphConfig {
    PoseGraphConfig {
        optimize_every_n_scans,
        global_sampling_ratio,
        ..Default::default()
    }
}

/// A fresh graph plus cloned handles to its fakes.
pub fn new_graph(
    config: PoseGraphConfig,
) -> (
    PoseGraph<FakeConstraintBuilder, FakeOptimizationProblem>,
    FakeConstraintBuilder,
    FakeOptimizationProblem,
) {
    let builder = FakeConstraintBuilder::new();
    let problem = FakeOptimizationProblem::new();
    let graph = PoseGraph::new(config, builder.clone(), problem.clone())
        .expect("test config must validate");
    (graph, builder, problem)
}

/// Two scans on `trajectory`: the first submap is finished in between,
/// leaving the graph with one finished submap and one under construction.
pub fn add_scans_until_first_submap_finished(
    graph: &PoseGraph<FakeConstraintBuilder, FakeOptimizationProblem>,
    trajectory: &setu_graph::TrajectoryHandle,
) -> (Arc<Submap>, Arc<Submap>) {
    let first = Arc::new(Submap::new(Isometry3::identity()));
    let second = Arc::new(Submap::new(translate(1.0, 0.0, 0.0)));
    graph.add_scan(
        10,
        scan_points(),
        Isometry3::identity(),
        identity_covariance(),
        trajectory,
        &first,
        &[Arc::clone(&first)],
    );
    first.finish();
    graph.add_scan(
        20,
        scan_points(),
        translate(0.5, 0.0, 0.0),
        identity_covariance(),
        trajectory,
        &first,
        &[Arc::clone(&first), Arc::clone(&second)],
    );
    (first, second)
}

/// A small scan: three points around the origin.
pub fn scan_points() -> PointCloud {
    vec![
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ]
}

pub fn translate(x: f64, y: f64, z: f64) -> Isometry3<f64> {
    Isometry3::translation(x, y, z)
}

pub fn identity_covariance() -> Matrix6<f64> {
    Matrix6::identity()
}
