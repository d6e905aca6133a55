//! The weaver's pending-job queue.
//!
//! Jobs are ordered by priority (higher first), FIFO within a priority via
//! a monotonic sequence number. The admissibility scan pops entries, asks
//! each candidate's policies for permission, and re-pushes refused entries,
//! so a blocked job keeps its place without being removed.

use crate::job::{Job, JobId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A queued job with its ordering key.
struct PendingJob {
    job: Job,
    priority: i32,
    seq: u64,
}

impl PartialEq for PendingJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingJob {}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier sequence.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered multiset of pending jobs.
pub(crate) struct PendingQueue {
    heap: BinaryHeap<PendingJob>,
    next_seq: u64,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let priority = job.priority();
        self.heap.push(PendingJob { job, priority, seq });
    }

    /// Removes and returns the highest-priority job whose policies all
    /// grant permission. Refused jobs keep their queue position.
    pub(crate) fn pop_admissible(&mut self) -> Option<Job> {
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(entry) = self.heap.pop() {
            if entry.job.try_acquire_policies() {
                found = Some(entry.job);
                break;
            }
            skipped.push(entry);
        }
        for entry in skipped {
            self.heap.push(entry);
        }
        found
    }

    /// Removes a specific job by id. Returns the removed handle, or `None`
    /// if the job is not queued.
    pub(crate) fn remove(&mut self, id: JobId) -> Option<Job> {
        let entries = std::mem::take(&mut self.heap).into_vec();
        let mut removed = None;
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if removed.is_none() && entry.job.id() == id {
                removed = Some(entry.job);
            } else {
                kept.push(entry);
            }
        }
        self.heap = BinaryHeap::from(kept);
        removed
    }

    /// Removes all pending jobs and returns them.
    pub(crate) fn drain(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.job)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
