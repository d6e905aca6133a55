//! The worker thread loop.
//!
//! Each worker repeatedly asks the weaver for the next admissible job,
//! executes it, and signals completion so parked workers and `finish()`
//! waiters re-check. Workers park on the "work available" condition
//! variable when nothing is admissible; the wait carries a timeout so
//! admission policies mutated outside the weaver (a removed dependency,
//! for instance) are re-evaluated on the next pass.

use crate::weaver::{WeaverCore, WeaverState};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// How long a parked worker sleeps before re-scanning the queue.
///
/// Bounds the latency of picking up jobs whose policies were satisfied
/// without an enqueue or a completion happening (e.g. a dependency edge
/// removed by the caller).
const POLICY_RECHECK_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn worker_loop(core: Arc<WeaverCore>, worker: usize) {
    trace!(worker = worker, "worker loop entered");
    loop {
        let job = {
            let mut inner = core.inner.lock().unwrap();
            loop {
                if inner.state == WeaverState::ShuttingDown {
                    inner.threads -= 1;
                    trace!(worker = worker, "worker loop exiting");
                    return;
                }
                if inner.state == WeaverState::Working {
                    if let Some(job) = inner.queue.pop_admissible() {
                        inner.executing += 1;
                        break job;
                    }
                }
                inner.idle_threads += 1;
                let (guard, _timed_out) = core
                    .work_available
                    .wait_timeout(inner, POLICY_RECHECK_INTERVAL)
                    .unwrap();
                inner = guard;
                inner.idle_threads -= 1;
            }
        };

        job.execute(Some(&core));

        let mut inner = core.inner.lock().unwrap();
        inner.executing -= 1;
        if inner.executing == 0 {
            match inner.state {
                WeaverState::SuspendRequested => {
                    inner.state = WeaverState::Suspended;
                    trace!(worker = worker, "weaver suspended");
                }
                WeaverState::Working if inner.queue.is_empty() => {
                    inner.state = WeaverState::Idle;
                }
                _ => {}
            }
        }
        drop(inner);
        // A finished job may have released policies other queued jobs wait
        // on, and finish() waiters need to re-check the drain predicate.
        core.work_available.notify_all();
        core.drained.notify_all();
    }
}
