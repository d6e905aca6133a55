//! Ordered job chains.
//!
//! A [`JobSequence`] is a [`JobCollection`] whose children run strictly in
//! insertion order: every added job gets a dependency edge on the job added
//! before it, wired through a caller-supplied [`DependencyPolicy`]. If a
//! child ends `Failed` or `Aborted`, the remaining children are dequeued
//! and the sequence completes as `Failed` — execution stops at the failure
//! point.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weaver::{DependencyPolicy, Job, JobSequence, Weaver};
//!
//! let deps = Arc::new(DependencyPolicy::new());
//! let sequence = JobSequence::new(deps);
//! sequence.add_job(Job::from_fn(|_| Ok(()) /* step one */))?;
//! sequence.add_job(Job::from_fn(|_| Ok(()) /* step two */))?;
//!
//! let weaver = Weaver::default();
//! weaver.enqueue(sequence.job())?;
//! weaver.finish();
//! ```

use crate::collection::{CollectionError, JobCollection};
use crate::dependency::DependencyPolicy;
use crate::job::{Job, JobStatus};
use std::sync::{Arc, Mutex};

/// A [`JobCollection`] with an enforced linear execution order.
pub struct JobSequence {
    collection: JobCollection,
    policy: Arc<DependencyPolicy>,
    last: Mutex<Option<Job>>,
}

impl JobSequence {
    /// Creates an empty sequence whose ordering edges live in `policy`.
    ///
    /// The policy may be shared with other sequences and with manually
    /// wired dependencies.
    pub fn new(policy: Arc<DependencyPolicy>) -> Self {
        Self {
            collection: JobCollection::with_mode(true, "sequence"),
            policy,
            last: Mutex::new(None),
        }
    }

    /// Appends a job that will run after every previously added job.
    pub fn add_job(&self, job: Job) -> Result<(), CollectionError> {
        let mut last = self.last.lock().unwrap();
        self.collection.add_job(job.clone())?;
        if let Some(previous) = last.as_ref() {
            self.policy
                .add_dependency(&job, previous)
                .expect("sequence children are distinct");
        }
        job.assign_policy(self.policy.clone());
        *last = Some(job);
        Ok(())
    }

    /// Returns the schedulable handle for this sequence.
    pub fn job(&self) -> Job {
        self.collection.job()
    }

    /// Returns the sequence's status.
    pub fn status(&self) -> JobStatus {
        self.collection.status()
    }

    /// Returns the number of children.
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Returns true if the sequence has no children.
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }
}
