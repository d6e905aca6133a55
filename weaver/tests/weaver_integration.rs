//! Integration tests for the weaver engine.
//!
//! These tests verify the complete scheduling workflow:
//! - Lazy worker thread creation
//! - Priority-then-FIFO dequeue order
//! - Suspend / resume / finish control
//! - Targeted and full dequeue
//! - Resource-restriction admission
//! - Panic containment in the worker loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use weaver::{
    Job, JobContext, JobStatus, QueuePolicy, ResourceRestrictionPolicy, RunResult, Weaver,
    WeaverState, Work,
};

// =============================================================================
// Test Helpers
// =============================================================================

/// A job body that appends one character to a shared string.
fn append_job(ch: char, out: &Arc<Mutex<String>>) -> Job {
    let out = Arc::clone(out);
    Job::from_fn(move |_| {
        out.lock().unwrap().push(ch);
        Ok(())
    })
}

/// A prioritized job body that records its priority when it runs.
struct RecordingWork {
    priority: i32,
    order: Arc<Mutex<Vec<i32>>>,
}

impl Work for RecordingWork {
    fn run(&self, _ctx: &JobContext) -> RunResult {
        self.order.lock().unwrap().push(self.priority);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Polls a predicate until it holds or the timeout elapses.
fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

// =============================================================================
// Integration Tests
// =============================================================================

#[test]
fn test_lazy_thread_creation() {
    let out = Arc::new(Mutex::new(String::new()));
    let weaver = Weaver::default();

    assert!(weaver.is_idle());
    assert_eq!(weaver.current_number_of_threads(), 0);

    let job = append_job('a', &out);
    weaver.enqueue(job.clone()).unwrap();
    weaver.finish();

    assert!(job.is_finished());
    assert_eq!(weaver.current_number_of_threads(), 1);
    assert!(weaver.is_idle());
    assert_eq!(*out.lock().unwrap(), "a");
}

#[test]
fn test_simple_job() {
    let out = Arc::new(Mutex::new(String::new()));
    let weaver = Weaver::default();

    weaver.enqueue(append_job('1', &out)).unwrap();
    weaver.finish();

    assert_eq!(*out.lock().unwrap(), "1");
}

#[test]
fn test_priority_order_after_resume() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let weaver = Weaver::with_max_threads(1);

    weaver.suspend();
    for priority in [-1, 0, 1] {
        let work = RecordingWork {
            priority,
            order: Arc::clone(&order),
        };
        weaver.enqueue(Job::with_priority(work, priority)).unwrap();
    }
    assert_eq!(weaver.queue_length(), 3);

    weaver.resume();
    weaver.finish();

    // Strictly descending by priority: high, normal, low.
    assert_eq!(*order.lock().unwrap(), vec![1, 0, -1]);
}

#[test]
fn test_fifo_within_equal_priority() {
    let out = Arc::new(Mutex::new(String::new()));
    let weaver = Weaver::with_max_threads(1);

    weaver.suspend();
    for ch in ['x', 'y', 'z'] {
        weaver.enqueue(append_job(ch, &out)).unwrap();
    }
    weaver.resume();
    weaver.finish();

    assert_eq!(*out.lock().unwrap(), "xyz");
}

#[test]
fn test_finish_always_leaves_idle() {
    let weaver = Weaver::with_max_threads(2);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let counter = Arc::clone(&counter);
        weaver
            .enqueue(Job::from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }
    weaver.finish();

    assert!(weaver.is_idle());
    assert_eq!(weaver.queue_length(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 20);
}

#[test]
fn test_many_small_jobs_all_complete() {
    let weaver = Weaver::default();
    let remaining = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let remaining = Arc::clone(&remaining);
        remaining.fetch_add(1, Ordering::SeqCst);
        weaver
            .enqueue(Job::from_fn(move |_| {
                remaining.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }
    weaver.finish();

    assert_eq!(remaining.load(Ordering::SeqCst), 0);
}

#[test]
fn test_jobs_run_in_parallel() {
    let weaver = Weaver::with_max_threads(4);
    let barrier = Arc::new(Barrier::new(4));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let barrier = Arc::clone(&barrier);
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        weaver
            .enqueue(Job::from_fn(move |_| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // All four jobs must be running at once to get past here.
                barrier.wait();
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }
    weaver.finish();

    assert_eq!(peak.load(Ordering::SeqCst), 4);
    assert_eq!(weaver.current_number_of_threads(), 4);
}

#[test]
fn test_dequeue_specific_job() {
    let out = Arc::new(Mutex::new(String::new()));
    let weaver = Weaver::with_max_threads(1);

    weaver.suspend();
    let doomed = append_job('a', &out);
    let survivor = append_job('b', &out);
    weaver.enqueue(doomed.clone()).unwrap();
    weaver.enqueue(survivor.clone()).unwrap();

    assert!(weaver.dequeue(&doomed));
    assert!(!weaver.dequeue(&doomed));
    assert_eq!(weaver.queue_length(), 1);

    weaver.resume();
    weaver.finish();

    assert_eq!(*out.lock().unwrap(), "b");
    assert_eq!(doomed.status(), JobStatus::New);
    assert!(survivor.status().is_success());
}

#[test]
fn test_dequeue_all_clears_queue() {
    let out = Arc::new(Mutex::new(String::new()));
    let weaver = Weaver::with_max_threads(2);

    weaver.suspend();
    for ch in ['a', 'b', 'c'] {
        weaver.enqueue(append_job(ch, &out)).unwrap();
    }
    assert_eq!(weaver.dequeue_all(), 3);
    assert!(weaver.is_empty());

    weaver.resume();
    weaver.finish();

    assert!(out.lock().unwrap().is_empty());
    assert!(weaver.is_idle());
}

#[test]
fn test_suspend_lets_running_job_finish() {
    let weaver = Weaver::with_max_threads(1);
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let blocker = Job::from_fn(move |_| {
        started_tx.lock().unwrap().send(()).ok();
        release_rx.lock().unwrap().recv().ok();
        Ok(())
    });
    let follower = Job::from_fn(|_| Ok(()));

    weaver.enqueue(blocker.clone()).unwrap();
    weaver.enqueue(follower.clone()).unwrap();
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("blocker should start");

    weaver.suspend();
    assert_eq!(weaver.state(), WeaverState::SuspendRequested);

    release_tx.send(()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        weaver.state() == WeaverState::Suspended
    }));

    // The running job finished; nothing new was dequeued.
    assert!(blocker.status().is_success());
    assert_eq!(follower.status(), JobStatus::New);
    assert_eq!(weaver.queue_length(), 1);

    weaver.resume();
    weaver.finish();
    assert!(follower.status().is_success());
}

#[test]
fn test_resource_restriction_caps_concurrency() {
    let weaver = Weaver::with_max_threads(4);
    let policy = Arc::new(ResourceRestrictionPolicy::new(2));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut jobs = Vec::new();

    for _ in 0..7 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let job = Job::from_fn(move |_| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        let admission: Arc<dyn QueuePolicy> = policy.clone();
        job.assign_policy(admission);
        weaver.enqueue(job.clone()).unwrap();
        jobs.push(job);
    }
    weaver.finish();

    assert!(jobs.iter().all(|job| job.status().is_success()));
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(policy.in_use(), 0);
    assert!(policy.peak_in_use() <= policy.cap());
}

#[test]
fn test_panic_becomes_aborted_and_worker_survives() {
    let weaver = Weaver::with_max_threads(1);
    let panicking = Job::from_fn(|_| panic!("job blew up"));
    let normal = Job::from_fn(|_| Ok(()));

    weaver.enqueue(panicking.clone()).unwrap();
    weaver.enqueue(normal.clone()).unwrap();
    weaver.finish();

    assert_eq!(panicking.status(), JobStatus::Aborted);
    assert!(normal.status().is_success());
    assert!(weaver.is_idle());
}

#[test]
fn test_blocking_execute_never_touches_weaver() {
    let weaver = Weaver::default();
    let job = Job::from_fn(|_| Ok(()));

    let status = job.blocking_execute().unwrap();
    assert!(status.is_terminal());
    assert!(weaver.is_empty());
    assert_eq!(weaver.current_number_of_threads(), 0);
}

#[test]
fn test_job_can_enqueue_followup_work() {
    let weaver = Weaver::with_max_threads(2);
    let out = Arc::new(Mutex::new(String::new()));

    let followup = append_job('b', &out);
    let spawner = {
        let out = Arc::clone(&out);
        let followup = followup.clone();
        Job::from_fn(move |ctx| {
            out.lock().unwrap().push('a');
            ctx.enqueue(followup.clone()).map_err(|_| weaver::JobFailure::Failed)?;
            Ok(())
        })
    };

    weaver.enqueue(spawner).unwrap();
    weaver.finish();

    assert_eq!(*out.lock().unwrap(), "ab");
    assert!(followup.status().is_success());
}

#[test]
fn test_thread_cap_is_respected() {
    let weaver = Weaver::with_max_threads(2);
    let barrier = Arc::new(Barrier::new(2));

    for _ in 0..6 {
        let barrier = Arc::clone(&barrier);
        weaver
            .enqueue(Job::from_fn(move |_| {
                barrier.wait();
                Ok(())
            }))
            .unwrap();
    }
    weaver.finish();

    assert_eq!(weaver.current_number_of_threads(), 2);
    assert!(weaver.is_idle());
}
