//! The weaver: pending queue, worker pool and suspend/resume control.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Weaver                              │
//! │  enqueue / dequeue / suspend / resume / finish              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐    │
//! │  │ Pending      │  │ State        │  │ Worker threads  │    │
//! │  │ queue        │  │ machine      │  │ (lazy, bounded) │    │
//! │  └──────────────┘  └──────────────┘  └─────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One mutex protects the pending queue, the state machine and the thread
//! inventory; two condition variables signal "work may be available" (for
//! parked workers) and "a job finished or left the queue" (for
//! [`Weaver::finish`] waiters). Worker threads are created lazily as work
//! arrives, up to the configured maximum, and joined when the weaver is
//! dropped.
//!
//! # State machine
//!
//! - `Idle` ↔ `Working`: automatic on enqueue and drain.
//! - `Working → SuspendRequested` on [`suspend`](Weaver::suspend): running
//!   jobs finish, nothing new is dequeued.
//! - `SuspendRequested → Suspended` once no job is executing.
//! - `Suspended → Working` on [`resume`](Weaver::resume).
//! - any state `→ ShuttingDown` on drop.

use crate::job::{Job, JobId};
use crate::queue::PendingQueue;
use crate::worker;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`Weaver`].
#[derive(Clone, Debug)]
pub struct WeaverConfig {
    /// Maximum number of worker threads (default: number of CPU cores).
    pub max_threads: usize,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            max_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl WeaverConfig {
    /// Sets the maximum number of worker threads.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }
}

// =============================================================================
// State & Errors
// =============================================================================

/// The weaver's scheduling state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeaverState {
    /// No job is pending or running.
    Idle,

    /// At least one job is pending or running.
    Working,

    /// Suspension requested; running jobs finish, nothing new starts.
    SuspendRequested,

    /// No job is executing and nothing is dequeued until resume.
    Suspended,

    /// The weaver is being torn down; workers are exiting.
    ShuttingDown,
}

impl fmt::Display for WeaverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Working => write!(f, "Working"),
            Self::SuspendRequested => write!(f, "SuspendRequested"),
            Self::Suspended => write!(f, "Suspended"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Errors reported by queue operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WeaverError {
    /// The job already reached a terminal status; it can never run again.
    #[error("{0} has already finished and cannot run again")]
    AlreadyFinished(JobId),

    /// The job is already waiting in a queue or currently executing.
    #[error("{0} is already queued or executing")]
    AlreadyQueued(JobId),

    /// The weaver is being torn down and accepts no new work.
    #[error("the weaver is shutting down")]
    ShuttingDown,

    /// The job is not executing inside a weaver.
    #[error("the job is not executing inside a weaver")]
    Detached,
}

// =============================================================================
// Shared core
// =============================================================================

/// State shared between the public handle and the worker threads.
pub(crate) struct WeaverCore {
    pub(crate) inner: Mutex<Inner>,
    /// Signalled when work may have become available (enqueue, policy
    /// release, state change).
    pub(crate) work_available: Condvar,
    /// Signalled when a job finished or left the queue; `finish()` waits
    /// here.
    pub(crate) drained: Condvar,
}

pub(crate) struct Inner {
    pub(crate) queue: PendingQueue,
    pub(crate) state: WeaverState,
    /// Jobs currently executing on worker threads.
    pub(crate) executing: usize,
    /// Live worker threads.
    pub(crate) threads: usize,
    /// Workers parked waiting for an admissible job.
    pub(crate) idle_threads: usize,
    pub(crate) max_threads: usize,
    handles: Vec<JoinHandle<()>>,
    next_worker_id: usize,
}

impl WeaverCore {
    fn new(max_threads: usize) -> Self {
        assert!(max_threads > 0, "max_threads must be > 0");
        Self {
            inner: Mutex::new(Inner {
                queue: PendingQueue::new(),
                state: WeaverState::Idle,
                executing: 0,
                threads: 0,
                idle_threads: 0,
                max_threads,
                handles: Vec::new(),
                next_worker_id: 0,
            }),
            work_available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Inserts a job respecting priority order and makes sure a worker will
    /// pick it up, creating one if none is idle and the cap allows.
    pub(crate) fn enqueue(core: &Arc<Self>, job: Job) -> Result<(), WeaverError> {
        job.claim()?;
        let mut inner = core.inner.lock().unwrap();
        if inner.state == WeaverState::ShuttingDown {
            drop(inner);
            job.unclaim();
            return Err(WeaverError::ShuttingDown);
        }
        debug!(
            job_id = %job.id(),
            name = job.name(),
            priority = job.priority(),
            queue_length = inner.queue.len() + 1,
            "job enqueued"
        );
        inner.queue.push(job);
        if inner.state == WeaverState::Idle {
            inner.state = WeaverState::Working;
        }
        if inner.idle_threads == 0 && inner.threads < inner.max_threads {
            Self::spawn_worker(core, &mut inner);
        }
        core.work_available.notify_one();
        Ok(())
    }

    fn spawn_worker(core: &Arc<Self>, inner: &mut Inner) {
        let worker_id = inner.next_worker_id;
        inner.next_worker_id += 1;
        let core_for_worker = Arc::clone(core);
        let handle = thread::Builder::new()
            .name(format!("weaver-worker-{worker_id}"))
            .spawn(move || worker::worker_loop(core_for_worker, worker_id))
            .expect("failed to spawn weaver worker thread");
        inner.threads += 1;
        inner.handles.push(handle);
        debug!(worker = worker_id, threads = inner.threads, "worker thread created");
    }

    /// Removes a specific not-yet-started job. Returns false if it already
    /// started or is not queued.
    pub(crate) fn dequeue_job(&self, id: JobId) -> bool {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.queue.remove(id);
            if removed.is_some() {
                Self::settle_after_drain(&mut inner);
            }
            removed
        };
        match removed {
            Some(job) => {
                job.unclaim();
                debug!(job_id = %job.id(), "job dequeued");
                self.drained.notify_all();
                true
            }
            None => false,
        }
    }

    /// Clears the pending queue. Running jobs are unaffected.
    pub(crate) fn dequeue_all(&self) -> usize {
        let jobs = {
            let mut inner = self.inner.lock().unwrap();
            let jobs = inner.queue.drain();
            if !jobs.is_empty() {
                Self::settle_after_drain(&mut inner);
            }
            jobs
        };
        for job in &jobs {
            job.unclaim();
        }
        if !jobs.is_empty() {
            debug!(count = jobs.len(), "pending queue cleared");
            self.drained.notify_all();
        }
        jobs.len()
    }

    /// Working → Idle when the queue drains with nothing executing.
    fn settle_after_drain(inner: &mut Inner) {
        if inner.state == WeaverState::Working
            && inner.queue.is_empty()
            && inner.executing == 0
        {
            inner.state = WeaverState::Idle;
        }
    }

    pub(crate) fn suspend(&self) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, WeaverState::Idle | WeaverState::Working) {
            inner.state = if inner.executing == 0 {
                WeaverState::Suspended
            } else {
                WeaverState::SuspendRequested
            };
            info!(state = %inner.state, "weaver suspending");
        }
    }

    pub(crate) fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(
            inner.state,
            WeaverState::Suspended | WeaverState::SuspendRequested
        ) {
            inner.state = if inner.queue.is_empty() && inner.executing == 0 {
                WeaverState::Idle
            } else {
                WeaverState::Working
            };
            info!(state = %inner.state, "weaver resumed");
            self.work_available.notify_all();
        }
    }

    /// Blocks until the queue is empty and no job is executing.
    pub(crate) fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        while !(inner.queue.is_empty() && inner.executing == 0) {
            if inner.state == WeaverState::ShuttingDown {
                break;
            }
            inner = self.drained.wait(inner).unwrap();
        }
    }

    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = WeaverState::ShuttingDown;
            info!(pending = inner.queue.len(), "weaver shutting down");
        }
        self.work_available.notify_all();
        self.drained.notify_all();
        let handles = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

// =============================================================================
// Public handle
// =============================================================================

/// The thread-pool coordinator that owns the pending queue and the worker
/// threads.
///
/// A freshly constructed weaver has zero live threads; workers are created
/// as jobs arrive, up to `max_threads`. Dropping the weaver joins all
/// workers — running jobs complete, queued jobs are abandoned un-run.
pub struct Weaver {
    core: Arc<WeaverCore>,
}

impl Weaver {
    /// Creates a weaver from a configuration.
    pub fn new(config: WeaverConfig) -> Self {
        Self {
            core: Arc::new(WeaverCore::new(config.max_threads)),
        }
    }

    /// Creates a weaver with at most `max_threads` worker threads.
    pub fn with_max_threads(max_threads: usize) -> Self {
        Self::new(WeaverConfig::default().with_max_threads(max_threads))
    }

    /// Enqueues a job for execution.
    ///
    /// Rejects jobs that already finished or are already queued.
    pub fn enqueue(&self, job: Job) -> Result<(), WeaverError> {
        WeaverCore::enqueue(&self.core, job)
    }

    /// Removes a specific not-yet-started job from the queue.
    ///
    /// Returns false if the job already started or is not queued. A
    /// dequeued job is still `New` and may be enqueued again.
    pub fn dequeue(&self, job: &Job) -> bool {
        self.core.dequeue_job(job.id())
    }

    /// Clears the entire pending queue; jobs already running complete
    /// normally. Returns the number of jobs removed.
    pub fn dequeue_all(&self) -> usize {
        self.core.dequeue_all()
    }

    /// Stops dequeuing; currently running jobs are allowed to finish.
    pub fn suspend(&self) {
        self.core.suspend();
    }

    /// Re-enables dequeuing after [`suspend`](Self::suspend).
    pub fn resume(&self) {
        self.core.resume();
    }

    /// Blocks the calling thread until the weaver is idle: the queue is
    /// empty and no job is executing.
    pub fn finish(&self) {
        self.core.finish();
    }

    /// Returns true when no job is pending or executing.
    pub fn is_idle(&self) -> bool {
        let inner = self.core.inner.lock().unwrap();
        inner.queue.is_empty() && inner.executing == 0
    }

    /// Returns true when the pending queue is empty.
    pub fn is_empty(&self) -> bool {
        self.core.inner.lock().unwrap().queue.is_empty()
    }

    /// Returns the number of pending (not yet started) jobs.
    pub fn queue_length(&self) -> usize {
        self.core.inner.lock().unwrap().queue.len()
    }

    /// Returns the number of live worker threads.
    pub fn current_number_of_threads(&self) -> usize {
        self.core.inner.lock().unwrap().threads
    }

    /// Returns the configured thread cap.
    pub fn maximum_number_of_threads(&self) -> usize {
        self.core.inner.lock().unwrap().max_threads
    }

    /// Changes the thread cap. Existing threads above the new cap are not
    /// stopped; the cap applies to future thread creation.
    pub fn set_maximum_number_of_threads(&self, max_threads: usize) {
        assert!(max_threads > 0, "max_threads must be > 0");
        self.core.inner.lock().unwrap().max_threads = max_threads;
    }

    /// Returns the current scheduling state.
    pub fn state(&self) -> WeaverState {
        self.core.inner.lock().unwrap().state
    }
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new(WeaverConfig::default())
    }
}

impl Drop for Weaver {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl fmt::Debug for Weaver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.core.inner.lock().unwrap();
        f.debug_struct("Weaver")
            .field("state", &inner.state)
            .field("queue_length", &inner.queue.len())
            .field("executing", &inner.executing)
            .field(
                "threads",
                &format_args!("{}/{}", inner.threads, inner.max_threads),
            )
            .finish()
    }
}
