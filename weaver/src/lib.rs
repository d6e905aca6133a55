//! Weaver - a thread-pool job execution engine.
//!
//! Weaver runs discrete units of work ([`Job`]s) across a bounded pool of
//! worker threads. Jobs compose into unordered groups ([`JobCollection`])
//! and ordered chains ([`JobSequence`]), admission is controlled by
//! pluggable policies ([`DependencyPolicy`], [`ResourceRestrictionPolicy`]),
//! and the pool supports deterministic suspend, resume and drain.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use weaver::{DependencyPolicy, Job, JobSequence, Weaver};
//!
//! let weaver = Weaver::default();
//!
//! // A chain of jobs that runs strictly in order.
//! let deps = Arc::new(DependencyPolicy::new());
//! let sequence = JobSequence::new(deps);
//! sequence.add_job(Job::from_fn(|_| Ok(()) /* fetch */))?;
//! sequence.add_job(Job::from_fn(|_| Ok(()) /* transform */))?;
//! sequence.add_job(Job::from_fn(|_| Ok(()) /* store */))?;
//!
//! weaver.enqueue(sequence.job())?;
//! weaver.finish();
//! assert!(sequence.status().is_success());
//! ```
//!
//! The engine is content-agnostic: what a job does is entirely up to its
//! [`Work`] implementation. Scheduling is priority-then-FIFO, overridden by
//! whatever partial order the assigned policies enforce.

pub mod collection;
pub mod context;
pub mod dependency;
pub mod job;
pub mod listener;
pub mod policy;
mod queue;
pub mod resource;
pub mod sequence;
pub mod weaver;
mod worker;

pub use collection::{CollectionError, JobCollection};
pub use context::JobContext;
pub use dependency::{DependencyError, DependencyPolicy};
pub use job::{Job, JobFailure, JobId, JobStatus, RunResult, Work};
pub use listener::{JobListener, TracingListener};
pub use policy::QueuePolicy;
pub use resource::ResourceRestrictionPolicy;
pub use sequence::JobSequence;
pub use weaver::{Weaver, WeaverConfig, WeaverError, WeaverState};

/// Version of the weaver library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
