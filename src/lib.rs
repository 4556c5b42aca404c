//! SetuGraph - Concurrent pose-graph backend for SLAM
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    graph/                           │  ← Orchestration
//! │   (pose graph store, scheduling, loop closures)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensor/                           │  ← Sensor data
//! │              (point clouds, IMU)                    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    core/                            │  ← Foundation
//! │            (ids, math, sampling)                    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │               config/ + error/                      │  ← Plumbing
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Execution model
//!
//! A front-end (local SLAM) feeds scans and IMU samples to the
//! [`PoseGraph`]; constraint computation normally runs inline on the
//! caller's thread. Loop-closure searches resolve asynchronously inside a
//! [`ConstraintBuilder`], and every N scans the graph schedules a background
//! optimization pass: while the pass is being finalized, incoming work is
//! queued and later replayed in order, so at most one pass is ever in
//! flight. The [`OptimizationProblem`] seam hides the actual solver.
//!
//! Both collaborators are generic parameters of the graph, so tests drive
//! the full concurrent machinery with the deterministic fakes in
//! [`graph::testing`].

// ============================================================================
// Plumbing: configuration and errors
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor data (depends on core)
// ============================================================================
pub mod sensor;

// ============================================================================
// Layer 3: Pose graph (depends on all layers)
// ============================================================================
pub mod graph;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Configuration and errors
pub use config::PoseGraphConfig;
pub use error::{ConfigError, Result};

// Core types
pub use core::{FixedRatioSampler, NodeId, SubmapId, TrajectoryHandle};

// Sensor data
pub use sensor::{ImuSample, PointCloud};

// Pose graph
pub use graph::{
    ConstantData, Constraint, ConstraintBuilder, ConstraintKind, ConstraintPose, NodeData,
    OptimizationProblem, PoseGraph, Submap, SubmapData, TrajectoryConnectivity, TrajectoryNode,
    WhenDoneCallback,
};
