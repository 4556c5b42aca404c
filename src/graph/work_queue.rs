//! Deferred-work scheduling for the graph store.

use std::collections::VecDeque;
use std::sync::Arc;

use nalgebra::{Isometry3, Matrix6};

use crate::graph::submap::Submap;
use crate::sensor::ImuSample;

/// One unit of graph work, with its arguments bound at submission time.
#[derive(Debug)]
pub(crate) enum WorkItem {
    /// Run constraint computation for the scan at `scan_index`.
    ComputeConstraints {
        scan_index: usize,
        matching_submap: Arc<Submap>,
        insertion_submaps: Vec<Arc<Submap>>,
        finished_submap: Option<Arc<Submap>>,
        pose: Isometry3<f64>,
        covariance: Matrix6<f64>,
    },
    /// Forward an IMU sample to the optimization problem.
    AddImuData { trajectory_id: usize, sample: ImuSample },
}

/// Scheduler state: execute immediately, or queue behind an optimization.
///
/// `Queuing` exists exactly while a loop-closure pass is in flight. The
/// drain cycle pops items in FIFO order and hands the scheduler back to
/// `Direct` once it catches up, so at most one pass runs at a time.
#[derive(Debug, Default)]
pub(crate) enum WorkQueue {
    #[default]
    Direct,
    Queuing(VecDeque<WorkItem>),
}

impl WorkQueue {
    /// True while no optimization pass is in flight.
    pub(crate) fn is_direct(&self) -> bool {
        matches!(self, WorkQueue::Direct)
    }

    /// Hands `item` back for immediate execution, or queues it behind the
    /// active optimization pass.
    #[must_use]
    pub(crate) fn submit(&mut self, item: WorkItem) -> Option<WorkItem> {
        match self {
            WorkQueue::Direct => Some(item),
            WorkQueue::Queuing(items) => {
                items.push_back(item);
                None
            }
        }
    }

    /// Switches to queuing. Only legal while direct.
    pub(crate) fn begin_queuing(&mut self) {
        assert!(self.is_direct(), "a work queue already exists");
        *self = WorkQueue::Queuing(VecDeque::new());
    }

    /// Next queued item, oldest first.
    pub(crate) fn pop_front(&mut self) -> Option<WorkItem> {
        match self {
            WorkQueue::Direct => panic!("popped work without an active queue"),
            WorkQueue::Queuing(items) => items.pop_front(),
        }
    }

    /// Drops the drained queue and resumes immediate execution.
    pub(crate) fn resume_direct(&mut self) {
        *self = WorkQueue::Direct;
    }
}
