//! Submaps and the graph's per-submap bookkeeping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Isometry3;

use crate::core::NodeId;

/// A locally-consistent partial map built by the front-end.
///
/// The pose graph never mutates a submap: it reads `local_pose` (fixed at
/// creation) and polls the finished flag. The owner calls
/// [`finish`](Self::finish) once the submap stops receiving scans, after
/// which it becomes a loop-closure target.
#[derive(Debug)]
pub struct Submap {
    local_pose: Isometry3<f64>,
    finished: AtomicBool,
}

impl Submap {
    pub fn new(local_pose: Isometry3<f64>) -> Self {
        Self {
            local_pose,
            finished: AtomicBool::new(false),
        }
    }

    /// Pose of this submap in its trajectory's local frame.
    #[inline]
    pub fn local_pose(&self) -> Isometry3<f64> {
        self.local_pose
    }

    /// Whether the owner has stopped inserting scans into this submap.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Marks construction as complete. The flag never reverts.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Graph-side state for one registered submap.
#[derive(Debug)]
pub(crate) struct SubmapState {
    pub(crate) submap: Arc<Submap>,
    /// Nodes whose scans were inserted into this submap while it was being
    /// built. Loop-closure searches skip these.
    pub(crate) node_ids: BTreeSet<NodeId>,
    /// Set once back-fill searches against older scans have been submitted.
    /// No further nodes may be inserted afterwards.
    pub(crate) finished: bool,
}

impl SubmapState {
    pub(crate) fn new(submap: Arc<Submap>) -> Self {
        Self {
            submap,
            node_ids: BTreeSet::new(),
            finished: false,
        }
    }
}
