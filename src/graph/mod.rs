//! Pose graph layer.
//!
//! The graph store, its building blocks and the seams it drives.
//!
//! # Contents
//!
//! - [`pose_graph`]: The concurrent graph store and scheduler
//! - [`node`]: Trajectory nodes and their immutable scan payload
//! - [`submap`]: Submap handles and per-submap bookkeeping
//! - [`constraint`]: Weighted relative-pose constraints
//! - [`connectivity`]: Union-find over trajectories
//! - [`traits`]: Constraint builder and optimization problem seams
//! - [`testing`]: Deterministic fakes for tests and benches

pub mod connectivity;
pub mod constraint;
pub mod node;
pub mod pose_graph;
pub mod submap;
pub mod testing;
pub mod traits;

pub(crate) mod work_queue;

pub use connectivity::TrajectoryConnectivity;
pub use constraint::{Constraint, ConstraintKind, ConstraintPose};
pub use node::{ConstantData, TrajectoryNode};
pub use pose_graph::PoseGraph;
pub use submap::Submap;
pub use traits::{ConstraintBuilder, NodeData, OptimizationProblem, SubmapData, WhenDoneCallback};
