//! Job lifecycle notifications.
//!
//! The engine emits two events per job: started and done. Consumers of
//! these events (UI updates, progress tracking, metrics) decide how to
//! present or marshal them — the engine just invokes the hooks at the right
//! moments, on whichever thread drove the transition. A consumer that needs
//! delivery on its own thread forwards the event from the hook.

use crate::job::Job;
use tracing::debug;

/// Observer for job lifecycle events.
///
/// Both hooks default to doing nothing, so implementations override only
/// what they need.
///
/// # Thread Safety
///
/// Hooks are invoked from worker threads (or from the caller's thread under
/// synchronous execution) and must be thread-safe. They should be fast and
/// non-blocking; expensive reactions belong on the consumer's side of a
/// channel.
pub trait JobListener: Send + Sync {
    /// Called just before the job's body begins executing.
    fn on_started(&self, job: &Job) {
        let _ = job;
    }

    /// Called after the job has reached a terminal status.
    ///
    /// For a collection this fires only once every child has finished.
    fn on_done(&self, job: &Job) {
        let _ = job;
    }
}

/// Listener that logs lifecycle events through the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl JobListener for TracingListener {
    fn on_started(&self, job: &Job) {
        debug!(job_id = %job.id(), name = job.name(), "job event: started");
    }

    fn on_done(&self, job: &Job) {
        debug!(
            job_id = %job.id(),
            name = job.name(),
            status = %job.status(),
            "job event: done"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_hooks_are_no_ops() {
        struct Silent;
        impl JobListener for Silent {}

        let job = Job::from_fn(|_| Ok(()));
        job.add_listener(Arc::new(Silent));
        job.add_listener(Arc::new(TracingListener));
        job.blocking_execute().unwrap();
    }

    #[test]
    fn test_events_fire_in_order() {
        struct Order {
            started_first: AtomicUsize,
            events: AtomicUsize,
        }

        impl JobListener for Order {
            fn on_started(&self, _job: &Job) {
                if self.events.fetch_add(1, Ordering::SeqCst) == 0 {
                    self.started_first.store(1, Ordering::SeqCst);
                }
            }

            fn on_done(&self, _job: &Job) {
                self.events.fetch_add(1, Ordering::SeqCst);
            }
        }

        let order = Arc::new(Order {
            started_first: AtomicUsize::new(0),
            events: AtomicUsize::new(0),
        });
        let job = Job::from_fn(|_| Ok(()));
        job.add_listener(order.clone());
        job.blocking_execute().unwrap();

        assert_eq!(order.events.load(Ordering::SeqCst), 2);
        assert_eq!(order.started_first.load(Ordering::SeqCst), 1);
    }
}
