//! Admission policies gating job execution.
//!
//! A [`QueuePolicy`] is consulted when a queued job is considered for
//! dequeue. All policies assigned to a job must grant permission (logical
//! AND, in assignment order); if any refuses, the grants already taken for
//! that attempt are rolled back and the job keeps its place in the queue.
//!
//! Policies may be shared between unrelated jobs and weavers, so
//! implementations guard their own state.

use crate::job::Job;

/// A pluggable admission-control predicate consulted before a job may run.
///
/// # Contract
///
/// `can_run` may atomically acquire internal state (a counter slot, for
/// instance). Every successful `can_run` is matched by exactly one
/// `release`: either when the job finishes, or immediately when a later
/// policy in the job's list refuses and the attempt is rolled back.
pub trait QueuePolicy: Send + Sync {
    /// Returns true if the job may run now, acquiring any internal state
    /// the grant requires.
    fn can_run(&self, job: &Job) -> bool;

    /// Releases the state acquired by a successful [`can_run`](Self::can_run).
    fn release(&self, job: &Job);
}
