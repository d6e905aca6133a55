//! Unordered groups of jobs.
//!
//! A [`JobCollection`] is a job that owns other jobs. It occupies exactly
//! one queue slot until a worker runs it; that run (the "enter" phase) fans
//! every child out into the same weaver, after which the children occupy
//! their own slots. The collection reaches a terminal status only once the
//! enter phase and every child have finished — tracked by a counter of
//! outstanding tokens, one per child plus one for the enter phase itself,
//! which also covers the race where a child finishes before the fan-out
//! completes.
//!
//! If the collection is dequeued before it runs, none of its children are
//! ever enqueued. A child that can never run (an unmet dependency, for
//! instance) keeps the collection non-terminal indefinitely; that hazard
//! belongs to the caller who wired the dependency.
//!
//! # Example
//!
//! ```ignore
//! use weaver::{Job, JobCollection, Weaver};
//!
//! let collection = JobCollection::new();
//! collection.add_job(Job::from_fn(|_| Ok(())))?;
//! collection.add_job(Job::from_fn(|_| Ok(())))?;
//!
//! let weaver = Weaver::default();
//! weaver.enqueue(collection.job())?;
//! weaver.finish();
//! assert!(collection.status().is_success());
//! ```

use crate::context::JobContext;
use crate::job::{Job, JobStatus, RunResult, WeakJob, Work};
use crate::listener::JobListener;
use crate::weaver::WeaverCore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use thiserror::Error;
use tracing::debug;

/// Error returned when a collection cannot accept a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// The collection has begun running and is immutable.
    #[error("the collection has already started running")]
    AlreadyStarted,

    /// The job is already a child of this collection.
    #[error("the job is already part of the collection")]
    DuplicateChild,
}

/// An unordered fan-out group of jobs that is itself schedulable.
pub struct JobCollection {
    state: Arc<CollectionState>,
    job: Job,
}

impl JobCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::with_mode(false, "collection")
    }

    pub(crate) fn with_mode(stop_on_failure: bool, label: &'static str) -> Self {
        let state = Arc::new(CollectionState {
            children: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            outstanding: AtomicUsize::new(1), // the enter-phase token
            failures: AtomicUsize::new(0),
            stop_on_failure,
            self_job: OnceLock::new(),
            weaver: Mutex::new(None),
        });
        let job = Job::new_deferred(CollectionWork {
            state: Arc::clone(&state),
            label,
        });
        state
            .self_job
            .set(job.downgrade())
            .unwrap_or_else(|_| unreachable!("self_job is set once, here"));
        Self { state, job }
    }

    /// Appends a child job.
    ///
    /// Rejected once the collection has begun running, and for jobs that
    /// are already children of this collection.
    pub fn add_job(&self, job: Job) -> Result<(), CollectionError> {
        let mut children = self.state.children.lock().unwrap();
        if self.state.started.load(Ordering::Acquire) {
            return Err(CollectionError::AlreadyStarted);
        }
        if children.iter().any(|child| child.id() == job.id()) {
            return Err(CollectionError::DuplicateChild);
        }
        job.add_listener(Arc::new(ChildWatcher {
            state: Arc::clone(&self.state),
        }));
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        children.push(job);
        Ok(())
    }

    /// Returns the schedulable handle for this collection.
    pub fn job(&self) -> Job {
        self.job.clone()
    }

    /// Returns the collection's status.
    ///
    /// Terminal only after the collection ran and every child finished.
    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    /// Returns the number of children.
    pub fn len(&self) -> usize {
        self.state.children.lock().unwrap().len()
    }

    /// Returns true if the collection has no children.
    pub fn is_empty(&self) -> bool {
        self.state.children.lock().unwrap().is_empty()
    }
}

impl Default for JobCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// The collection's own run body: fan the children out.
struct CollectionWork {
    state: Arc<CollectionState>,
    label: &'static str,
}

impl Work for CollectionWork {
    fn run(&self, ctx: &JobContext) -> RunResult {
        self.state.enter(ctx);
        Ok(())
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// Listener a collection attaches to each child.
struct ChildWatcher {
    state: Arc<CollectionState>,
}

impl JobListener for ChildWatcher {
    fn on_done(&self, job: &Job) {
        self.state.child_done(job);
    }
}

/// Shared completion bookkeeping for a collection.
pub(crate) struct CollectionState {
    children: Mutex<Vec<Job>>,
    started: AtomicBool,
    /// Set when a stop-on-failure collection truncated its remaining work.
    stopped: AtomicBool,
    /// Children not yet terminal, plus one token for the enter phase.
    outstanding: AtomicUsize,
    failures: AtomicUsize,
    stop_on_failure: bool,
    self_job: OnceLock<WeakJob>,
    /// The weaver the collection was dequeued from, captured at enter.
    weaver: Mutex<Option<Weak<WeaverCore>>>,
}

impl CollectionState {
    /// Enter phase: marks the collection started and fans the children out.
    ///
    /// Inside a weaver the children are enqueued; under synchronous
    /// execution they run inline, in insertion order.
    fn enter(&self, ctx: &JobContext) {
        let children = {
            let children = self.children.lock().unwrap();
            self.started.store(true, Ordering::Release);
            children.clone()
        };
        *self.weaver.lock().unwrap() = ctx.weaver_weak();

        if ctx.is_attached() {
            for child in children {
                if let Err(error) = ctx.enqueue(child.clone()) {
                    // Already queued elsewhere or already finished; its
                    // listener settles the token either way.
                    debug!(job_id = %child.id(), %error, "child not enqueued by collection");
                }
            }
        } else {
            for child in children {
                if self.stop_on_failure && self.stopped.load(Ordering::Acquire) {
                    self.discharge(1);
                    continue;
                }
                if child.claim().is_ok() {
                    child.execute(None);
                }
            }
        }

        self.discharge(1); // the enter-phase token
    }

    /// Called from each child's done notification.
    fn child_done(&self, child: &Job) {
        if !child.status().is_success() {
            self.failures.fetch_add(1, Ordering::AcqRel);
            if self.stop_on_failure && !self.stopped.swap(true, Ordering::AcqRel) {
                self.stop_remaining();
            }
        }
        self.discharge(1);
    }

    /// Dequeues the not-yet-started children after a failure stopped a
    /// sequence; their tokens are settled here since they will never run.
    fn stop_remaining(&self) {
        let Some(core) = self
            .weaver
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
        else {
            return;
        };
        let children = self.children.lock().unwrap().clone();
        let mut removed = 0;
        for child in children {
            if child.status() == JobStatus::New && core.dequeue_job(child.id()) {
                debug!(job_id = %child.id(), "sequence stopped, child dequeued");
                removed += 1;
            }
        }
        if removed > 0 {
            self.discharge(removed);
        }
    }

    /// Settles `count` outstanding tokens; the last one completes the
    /// collection.
    fn discharge(&self, count: usize) {
        if self.outstanding.fetch_sub(count, Ordering::AcqRel) == count {
            self.complete();
        }
    }

    /// The exactly-once terminal transition for the collection itself.
    fn complete(&self) {
        let failed =
            self.failures.load(Ordering::Acquire) > 0 || self.stopped.load(Ordering::Acquire);
        let status = if failed {
            JobStatus::Failed
        } else {
            JobStatus::Success
        };
        if let Some(job) = self.self_job.get().and_then(WeakJob::upgrade) {
            job.finalize(status);
        }
    }
}
