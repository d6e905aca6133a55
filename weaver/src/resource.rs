//! Resource-cap admission control.
//!
//! A [`ResourceRestrictionPolicy`] bounds how many jobs sharing the policy
//! run at the same time — "at most 2 of these 7 jobs simultaneously". The
//! policy tracks only a count, not which jobs hold a slot, so every
//! successful `can_run` must be matched by exactly one `release`; the
//! engine guarantees this for queued jobs.

use crate::job::Job;
use crate::policy::QueuePolicy;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`QueuePolicy`] capping concurrent holders of a shared resource.
pub struct ResourceRestrictionPolicy {
    cap: usize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

impl ResourceRestrictionPolicy {
    /// Creates a policy allowing at most `cap` concurrent holders.
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "cap must be > 0");
        Self {
            cap,
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
        }
    }

    /// Returns the maximum number of concurrent holders.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Returns the current number of holders.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Returns the peak number of concurrent holders observed.
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::Relaxed)
    }

    /// Resets the peak counter.
    pub fn reset_peak(&self) {
        self.peak_in_use.store(0, Ordering::Relaxed);
    }

    /// Updates the peak counter if current exceeds it.
    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_use.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_use.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }
}

impl QueuePolicy for ResourceRestrictionPolicy {
    /// Atomically tests and increments the holder count.
    fn can_run(&self, _job: &Job) -> bool {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.cap {
                return false;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.update_peak(current + 1);
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self, _job: &Job) {
        let previous = self.in_use.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "release without matching can_run");
    }
}

impl fmt::Debug for ResourceRestrictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRestrictionPolicy")
            .field("in_use", &format_args!("{}/{}", self.in_use(), self.cap))
            .finish()
    }
}
