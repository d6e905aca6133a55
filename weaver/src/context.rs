//! Execution context passed into a job body.
//!
//! The [`JobContext`] tells a running job which weaver (if any) it was
//! dequeued from. Jobs executed through [`Job::blocking_execute`] run
//! detached, with no weaver attached.
//!
//! [`Job::blocking_execute`]: crate::Job::blocking_execute

use crate::job::Job;
use crate::weaver::{WeaverCore, WeaverError};
use std::sync::Weak;

/// Context handed to [`Work::run`](crate::Work::run).
///
/// Lets a job enqueue follow-up work into the weaver executing it. This is
/// how collections fan their children out, and it is available to any job
/// that wants to spawn more work.
pub struct JobContext {
    job: Job,
    weaver: Option<Weak<WeaverCore>>,
}

impl JobContext {
    pub(crate) fn new(job: Job, weaver: Option<Weak<WeaverCore>>) -> Self {
        Self { job, weaver }
    }

    /// The job this context belongs to.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Returns true if the job is running inside a weaver.
    pub fn is_attached(&self) -> bool {
        self.weaver
            .as_ref()
            .is_some_and(|weaver| weaver.upgrade().is_some())
    }

    /// Enqueues a job into the weaver this job is running in.
    ///
    /// Fails with [`WeaverError::Detached`] when the job runs outside any
    /// weaver (synchronous execution), and with the usual enqueue errors
    /// otherwise.
    pub fn enqueue(&self, job: Job) -> Result<(), WeaverError> {
        match self.weaver.as_ref().and_then(Weak::upgrade) {
            Some(core) => WeaverCore::enqueue(&core, job),
            None => Err(WeaverError::Detached),
        }
    }

    pub(crate) fn weaver_weak(&self) -> Option<Weak<WeaverCore>> {
        self.weaver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;

    #[test]
    fn test_detached_context_rejects_enqueue() {
        let probe = Job::from_fn(|ctx| {
            assert!(!ctx.is_attached());
            let extra = Job::from_fn(|_| Ok(()));
            assert!(matches!(ctx.enqueue(extra), Err(WeaverError::Detached)));
            Ok(())
        });
        assert!(probe.blocking_execute().unwrap().is_success());
    }

    #[test]
    fn test_context_exposes_running_job() {
        let job = Job::from_fn(|ctx| {
            assert_eq!(ctx.job().name(), "lambda");
            Ok(())
        });
        job.blocking_execute().unwrap();
    }
}
