//! Pending FIFO: admitted-but-not-yet-running job descriptors.
//!
//! Strict submission order. No reordering, no deduplication by key.

use crate::model::JobDescriptor;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    jobs: VecDeque<JobDescriptor>,
}

impl PendingQueue {
    pub(crate) fn push(&mut self, job: JobDescriptor) {
        self.jobs.push_back(job);
    }

    pub(crate) fn front(&self) -> Option<&JobDescriptor> {
        self.jobs.front()
    }

    pub(crate) fn pop(&mut self) -> Option<JobDescriptor> {
        self.jobs.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }
}
