//! Jobs and their lifecycle.
//!
//! A [`Job`] is the atomic unit of work the weaver schedules. It wraps a
//! user-supplied [`Work`] implementation together with the state the engine
//! needs: a status that makes exactly one irreversible transition out of
//! [`JobStatus::New`], a priority, the admission policies that gate dequeue,
//! and the listeners notified when the job starts and finishes.
//!
//! Jobs are cheap-to-clone handles. The pending queue, a running worker
//! thread, a parent collection and a dependency graph may all hold clones of
//! the same job at once; the job stays alive as long as any of them does.
//!
//! # Example
//!
//! ```ignore
//! use weaver::{Job, Weaver};
//!
//! let weaver = Weaver::default();
//! let job = Job::from_fn(|_ctx| {
//!     // ... do the work ...
//!     Ok(())
//! });
//! weaver.enqueue(job.clone())?;
//! weaver.finish();
//! assert!(job.status().is_success());
//! ```

use crate::context::JobContext;
use crate::listener::JobListener;
use crate::policy::QueuePolicy;
use crate::weaver::{WeaverCore, WeaverError};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Job Identity
// =============================================================================

/// Unique identifier for a job.
///
/// Every job handle is assigned an ID at construction; clones of the same
/// handle share it. Equality of IDs is equality of jobs.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        Self(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Execution status of a job.
///
/// A job starts `New` and makes exactly one transition to one of the three
/// terminal states. There is no retry state; a terminal job can never run
/// again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    /// Not yet executed (possibly queued or currently running).
    #[default]
    New = 0,

    /// Completed normally.
    Success = 1,

    /// The job's own logic determined it could not complete.
    Failed = 2,

    /// The job was told to stop, or its body panicked.
    Aborted = 3,
}

impl JobStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::New)
    }

    /// Returns true if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Success,
            2 => Self::Failed,
            3 => Self::Aborted,
            _ => Self::New,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

// =============================================================================
// Job Outcome
// =============================================================================

/// The distinguished outcome a job body returns to signal failure.
///
/// Returning `Err(JobFailure::Failed)` marks the job [`JobStatus::Failed`];
/// `Err(JobFailure::Aborted)` marks it [`JobStatus::Aborted`]. A panic
/// inside the body is converted to `Aborted` by the engine so the worker
/// loop never crashes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum JobFailure {
    /// The job could not complete.
    #[error("job failed")]
    Failed,

    /// The job was cancelled cooperatively.
    #[error("job aborted")]
    Aborted,
}

impl From<JobFailure> for JobStatus {
    fn from(failure: JobFailure) -> Self {
        match failure {
            JobFailure::Failed => JobStatus::Failed,
            JobFailure::Aborted => JobStatus::Aborted,
        }
    }
}

/// Result type returned by [`Work::run`].
pub type RunResult = Result<(), JobFailure>;

// =============================================================================
// Work Trait
// =============================================================================

/// A unit of work executed by a [`Job`].
///
/// Implementations perform the work in [`run`](Work::run) and report the
/// outcome through the return value, never by panicking. The context gives
/// access to the weaver the job is running in, so a job may enqueue
/// follow-up work.
pub trait Work: Send + Sync + 'static {
    /// Performs the work.
    fn run(&self, ctx: &JobContext) -> RunResult;

    /// A short human-readable name used in logs.
    fn name(&self) -> &str {
        "job"
    }
}

/// Adapter turning a closure into [`Work`].
struct FnWork<F>(F);

impl<F> Work for FnWork<F>
where
    F: Fn(&JobContext) -> RunResult + Send + Sync + 'static,
{
    fn run(&self, ctx: &JobContext) -> RunResult {
        (self.0)(ctx)
    }

    fn name(&self) -> &str {
        "lambda"
    }
}

// =============================================================================
// Job Handle
// =============================================================================

/// A schedulable unit of work.
///
/// This handle is cloneable; all clones refer to the same underlying job.
/// See the module documentation for the sharing model.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

pub(crate) struct JobInner {
    id: JobId,
    priority: i32,
    work: Box<dyn Work>,
    status: AtomicU8,
    /// Set while the job sits in a queue or runs, to reject double-enqueue.
    claimed: AtomicBool,
    /// Set when the dequeue scan acquired the assigned policies.
    policies_acquired: AtomicBool,
    /// True for composite jobs whose terminal transition is driven by
    /// completion bookkeeping instead of the return of `run`.
    deferred: bool,
    policies: Mutex<Vec<Arc<dyn QueuePolicy>>>,
    listeners: Mutex<Vec<Arc<dyn JobListener>>>,
}

impl Job {
    /// Creates a job with the default priority of 0.
    pub fn new(work: impl Work) -> Self {
        Self::with_priority(work, 0)
    }

    /// Creates a job with the given priority. Higher priorities run first.
    pub fn with_priority(work: impl Work, priority: i32) -> Self {
        Self::build(Box::new(work), priority, false)
    }

    /// Creates a job from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&JobContext) -> RunResult + Send + Sync + 'static,
    {
        Self::new(FnWork(f))
    }

    /// Creates a composite job whose completion is driven externally.
    pub(crate) fn new_deferred(work: impl Work) -> Self {
        Self::build(Box::new(work), 0, true)
    }

    fn build(work: Box<dyn Work>, priority: i32, deferred: bool) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::next(),
                priority,
                work,
                status: AtomicU8::new(JobStatus::New as u8),
                claimed: AtomicBool::new(false),
                policies_acquired: AtomicBool::new(false),
                deferred,
                policies: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the job's unique identifier.
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Returns the job's name.
    pub fn name(&self) -> &str {
        self.inner.work.name()
    }

    /// Returns the job's priority.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Returns the current status.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Returns true once the job has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Appends an admission policy.
    ///
    /// Policies are consulted in assignment order when the job is considered
    /// for dequeue, and all of them must grant permission. Assigning the
    /// same policy instance twice is a no-op.
    pub fn assign_policy(&self, policy: Arc<dyn QueuePolicy>) {
        let mut policies = self.inner.policies.lock().unwrap();
        if !policies.iter().any(|p| Arc::ptr_eq(p, &policy)) {
            policies.push(policy);
        }
    }

    /// Registers a listener for this job's lifecycle events.
    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.inner.listeners.lock().unwrap().push(listener);
    }

    /// Runs the job synchronously on the calling thread, bypassing any
    /// weaver and its admission policies.
    ///
    /// Returns once the job has reached a terminal status. Rejects jobs that
    /// already ran or are currently queued.
    pub fn blocking_execute(&self) -> Result<JobStatus, WeaverError> {
        self.claim()?;
        self.execute(None);
        Ok(self.status())
    }

    pub(crate) fn downgrade(&self) -> WeakJob {
        WeakJob(Arc::downgrade(&self.inner))
    }

    /// Marks the job as owned by a queue or a synchronous execution.
    ///
    /// Rejects terminal jobs permanently and claimed jobs until they are
    /// dequeued again.
    pub(crate) fn claim(&self) -> Result<(), WeaverError> {
        if self.status().is_terminal() {
            return Err(WeaverError::AlreadyFinished(self.id()));
        }
        if self.inner.claimed.swap(true, Ordering::AcqRel) {
            return Err(WeaverError::AlreadyQueued(self.id()));
        }
        Ok(())
    }

    /// Releases the claim taken by [`claim`](Self::claim); called when a
    /// not-yet-started job is removed from a queue.
    pub(crate) fn unclaim(&self) {
        self.inner.claimed.store(false, Ordering::Release);
    }

    /// Consults the assigned policies in order; all must grant.
    ///
    /// A refusal rolls back the grants already taken for this attempt so
    /// that every successful `can_run` is matched by exactly one `release`.
    pub(crate) fn try_acquire_policies(&self) -> bool {
        let policies = self.inner.policies.lock().unwrap().clone();
        for (index, policy) in policies.iter().enumerate() {
            if !policy.can_run(self) {
                for granted in &policies[..index] {
                    granted.release(self);
                }
                return false;
            }
        }
        self.inner.policies_acquired.store(true, Ordering::Release);
        true
    }

    /// Executes the job body on the calling thread.
    ///
    /// `weaver` is the pool the job was dequeued from, or `None` for
    /// synchronous execution. Panics in the body are converted into a
    /// terminal `Aborted` status; the caller's thread survives.
    pub(crate) fn execute(&self, weaver: Option<&Arc<WeaverCore>>) {
        debug!(job_id = %self.id(), name = self.name(), "job started");
        self.notify_started();

        let ctx = JobContext::new(self.clone(), weaver.map(Arc::downgrade));
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.inner.work.run(&ctx))) {
            Ok(result) => result,
            Err(_) => {
                error!(job_id = %self.id(), name = self.name(), "job panicked, marking aborted");
                Err(JobFailure::Aborted)
            }
        };

        if self.inner.deferred {
            // Composite jobs finish through their own completion tracking;
            // an error out of the fan-out phase still terminates them.
            if let Err(failure) = outcome {
                self.finalize(failure.into());
            }
        } else {
            self.finalize(match outcome {
                Ok(()) => JobStatus::Success,
                Err(failure) => failure.into(),
            });
        }
    }

    /// Performs the single irreversible transition out of `New`.
    ///
    /// Exactly one caller wins; later calls are no-ops. Releases the
    /// acquired policies and fires the done notification.
    pub(crate) fn finalize(&self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        if self
            .inner
            .status
            .compare_exchange(
                JobStatus::New as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        if self.inner.policies_acquired.swap(false, Ordering::AcqRel) {
            let policies = self.inner.policies.lock().unwrap().clone();
            for policy in policies {
                policy.release(self);
            }
        }

        match status {
            JobStatus::Success => debug!(job_id = %self.id(), name = self.name(), "job finished"),
            _ => warn!(job_id = %self.id(), name = self.name(), status = %status, "job ended"),
        }

        self.notify_done();
    }

    fn notify_started(&self) {
        let listeners = self.inner.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_started(self);
        }
    }

    fn notify_done(&self) {
        let listeners = self.inner.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_done(self);
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("priority", &self.priority())
            .field("status", &self.status())
            .finish()
    }
}

/// Weak counterpart of [`Job`], used to break reference cycles between a
/// composite job and its completion state.
#[derive(Clone)]
pub(crate) struct WeakJob(Weak<JobInner>);

impl WeakJob {
    pub(crate) fn upgrade(&self) -> Option<Job> {
        self.0.upgrade().map(|inner| Job { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_is_terminal() {
        assert!(!JobStatus::New.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_job_status_is_success() {
        assert!(JobStatus::Success.is_success());
        assert!(!JobStatus::New.is_success());
        assert!(!JobStatus::Failed.is_success());
        assert!(!JobStatus::Aborted.is_success());
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(format!("{}", JobStatus::New), "New");
        assert_eq!(format!("{}", JobStatus::Success), "Success");
        assert_eq!(format!("{}", JobStatus::Failed), "Failed");
        assert_eq!(format!("{}", JobStatus::Aborted), "Aborted");
    }

    #[test]
    fn test_failure_maps_to_status() {
        assert_eq!(JobStatus::from(JobFailure::Failed), JobStatus::Failed);
        assert_eq!(JobStatus::from(JobFailure::Aborted), JobStatus::Aborted);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::from_fn(|_| Ok(()));
        let b = Job::from_fn(|_| Ok(()));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_blocking_execute_success() {
        let job = Job::from_fn(|_| Ok(()));
        assert_eq!(job.status(), JobStatus::New);
        let status = job.blocking_execute().unwrap();
        assert_eq!(status, JobStatus::Success);
        assert!(job.is_finished());
    }

    #[test]
    fn test_blocking_execute_failure() {
        let job = Job::from_fn(|_| Err(JobFailure::Failed));
        assert_eq!(job.blocking_execute().unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_blocking_execute_converts_panic_to_aborted() {
        let job = Job::from_fn(|_| panic!("boom"));
        assert_eq!(job.blocking_execute().unwrap(), JobStatus::Aborted);
    }

    #[test]
    fn test_terminal_job_cannot_run_again() {
        let job = Job::from_fn(|_| Ok(()));
        job.blocking_execute().unwrap();
        assert!(matches!(
            job.blocking_execute(),
            Err(WeaverError::AlreadyFinished(_))
        ));
    }

    #[test]
    fn test_status_transition_is_irreversible() {
        let job = Job::from_fn(|_| Ok(()));
        job.finalize(JobStatus::Failed);
        job.finalize(JobStatus::Success);
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_listener_sees_terminal_status_in_done() {
        use crate::listener::JobListener;
        use std::sync::atomic::AtomicUsize;

        struct Recorder {
            started: AtomicUsize,
            done: AtomicUsize,
        }

        impl JobListener for Recorder {
            fn on_started(&self, job: &Job) {
                assert_eq!(job.status(), JobStatus::New);
                self.started.fetch_add(1, Ordering::SeqCst);
            }

            fn on_done(&self, job: &Job) {
                assert!(job.status().is_terminal());
                self.done.fetch_add(1, Ordering::SeqCst);
            }
        }

        let recorder = Arc::new(Recorder {
            started: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        });
        let job = Job::from_fn(|_| Ok(()));
        job.add_listener(recorder.clone());
        job.blocking_execute().unwrap();

        assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_assign_policy_deduplicates() {
        use crate::resource::ResourceRestrictionPolicy;

        let job = Job::from_fn(|_| Ok(()));
        let policy = Arc::new(ResourceRestrictionPolicy::new(1));
        job.assign_policy(policy.clone());
        job.assign_policy(policy.clone());
        assert_eq!(job.inner.policies.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_policy_rollback_on_refusal() {
        use crate::policy::QueuePolicy;
        use crate::resource::ResourceRestrictionPolicy;

        let job = Job::from_fn(|_| Ok(()));
        let granting = Arc::new(ResourceRestrictionPolicy::new(1));
        let refusing = Arc::new(ResourceRestrictionPolicy::new(1));

        // Exhaust the second policy so acquisition fails after the first grant.
        let blocker = Job::from_fn(|_| Ok(()));
        assert!(refusing.can_run(&blocker));

        job.assign_policy(granting.clone());
        job.assign_policy(refusing.clone());
        assert!(!job.try_acquire_policies());

        // The partial grant must have been rolled back.
        assert_eq!(granting.in_use(), 0);
        assert_eq!(refusing.in_use(), 1);
    }

    #[test]
    fn test_priority_defaults_to_zero() {
        let job = Job::from_fn(|_| Ok(()));
        assert_eq!(job.priority(), 0);
        let urgent = Job::with_priority(FnWork(|_: &JobContext| Ok(())), 5);
        assert_eq!(urgent.priority(), 5);
    }
}
