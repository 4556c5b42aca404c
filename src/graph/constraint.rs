//! Graph constraints: weighted relative poses between submaps and nodes.

use nalgebra::{Isometry3, Matrix6};

use crate::core::{NodeId, SubmapId};

/// How a constraint was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// The scan was inserted into the submap while it was being built; the
    /// relative pose comes straight from local tracking.
    IntraSubmap,
    /// Loop closure: the scan was matched against an already finished
    /// submap by a constraint search.
    InterSubmap,
}

/// A measured relative pose together with its weight.
#[derive(Clone, Debug)]
pub struct ConstraintPose {
    /// Pose of the node expressed in the submap frame.
    pub relative_pose: Isometry3<f64>,
    /// Square root of the inverse measurement covariance.
    pub sqrt_information: Matrix6<f64>,
}

/// One residual of the optimization problem, tying a node to a submap.
///
/// Constraints are append-only: once recorded they are never mutated or
/// retracted. Duplicates produced by overlapping search paths are valid
/// solver input.
#[derive(Clone, Debug)]
pub struct Constraint {
    pub submap_id: SubmapId,
    pub node_id: NodeId,
    pub pose: ConstraintPose,
    pub kind: ConstraintKind,
}
