//! Dependency-based admission control.
//!
//! A [`DependencyPolicy`] holds a many-to-many graph of "dependent waits
//! for dependency" edges between jobs. A dependent becomes admissible only
//! once every one of its dependencies has finished with
//! [`JobStatus::Success`]; a dependency that ends `Failed` or `Aborted`
//! blocks its dependents permanently, until the edge is explicitly removed.
//!
//! The graph is re-evaluated lazily: a blocked job is re-examined on the
//! weaver's next dequeue pass, not pushed eagerly when a dependency
//! resolves.
//!
//! Construct one policy per cooperating group of jobs and share it by
//! `Arc`; there is no process-wide instance.
//!
//! [`JobStatus::Success`]: crate::JobStatus::Success

use crate::job::{Job, JobId};
use crate::policy::QueuePolicy;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Error returned when a dependency edge cannot be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// A job cannot depend on itself.
    #[error("a job cannot depend on itself")]
    SelfDependency,
}

/// A [`QueuePolicy`] enforcing a partial execution order between jobs.
///
/// The policy keeps handles to the dependency jobs so it can observe their
/// status; a completed dependency therefore stays alive as long as an edge
/// refers to it.
#[derive(Default)]
pub struct DependencyPolicy {
    /// Dependent id -> (dependency id -> dependency handle).
    edges: Mutex<HashMap<JobId, HashMap<JobId, Job>>>,
}

impl DependencyPolicy {
    /// Creates an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `dependent` must not run before `dependency` has
    /// finished successfully.
    ///
    /// Duplicate edges are idempotent. Self-dependencies are rejected.
    pub fn add_dependency(&self, dependent: &Job, dependency: &Job) -> Result<(), DependencyError> {
        if dependent.id() == dependency.id() {
            return Err(DependencyError::SelfDependency);
        }
        let mut edges = self.edges.lock().unwrap();
        edges
            .entry(dependent.id())
            .or_default()
            .insert(dependency.id(), dependency.clone());
        debug!(
            dependent = %dependent.id(),
            dependency = %dependency.id(),
            "dependency added"
        );
        Ok(())
    }

    /// Removes one edge. Returns false if the edge did not exist.
    ///
    /// This is the only way to unblock a dependent whose dependency ended
    /// `Failed` or `Aborted`.
    pub fn remove_dependency(&self, dependent: &Job, dependency: &Job) -> bool {
        let mut edges = self.edges.lock().unwrap();
        match edges.entry(dependent.id()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&dependency.id()).is_some();
                if entry.get().is_empty() {
                    entry.remove_entry();
                }
                if removed {
                    debug!(
                        dependent = %dependent.id(),
                        dependency = %dependency.id(),
                        "dependency removed"
                    );
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Returns true if the job has at least one dependency that has not
    /// finished successfully.
    pub fn has_unresolved_dependencies(&self, job: &Job) -> bool {
        let edges = self.edges.lock().unwrap();
        edges
            .get(&job.id())
            .map(|deps| deps.values().any(|dep| !dep.status().is_success()))
            .unwrap_or(false)
    }

    /// Returns the number of dependencies recorded for the job.
    pub fn dependency_count(&self, job: &Job) -> usize {
        let edges = self.edges.lock().unwrap();
        edges.get(&job.id()).map(HashMap::len).unwrap_or(0)
    }
}

impl QueuePolicy for DependencyPolicy {
    fn can_run(&self, job: &Job) -> bool {
        !self.has_unresolved_dependencies(job)
    }

    fn release(&self, _job: &Job) {
        // can_run acquires nothing; there is nothing to release.
    }
}
