//! Longhand: a durable orchestrator for long-running, chunked text
//! generation jobs.
//!
//! A job assembles a large document by calling a text-generation
//! backend once per chunk. Each chunk is anchored on the tail of the
//! text so far, checked for length (with micro-extension passes),
//! novelty (an n-gram repetition guard), and density (with an optional
//! lossless compression pass). Jobs survive process restarts: the
//! descriptor and an append-only event log are the source of truth,
//! and a resumed job continues from the last completed chunk.
//!
//! # Layers
//!
//! - [`spec`] / [`session`]: what to generate and how it is tuned
//! - [`backend`]: the narrow transport interface to generation backends
//! - [`jobs`]: job model, event log, durable store, submission facade
//! - [`control`]: per-job pause/resume/cancel/next channel
//! - [`exec`]: chunk processor, micro-extension, density control, and
//!   the retry/watchdog executor
//! - [`sched`]: capacity caps, quiet hours, persisted priority queue
//! - [`text`]: anchors, directive markers, similarity, token estimates
//!
//! # Example
//!
//! ```rust,ignore
//! use longhand::jobs::{JobManager, JobStore};
//! use longhand::sched::{Scheduler, SchedulerConfig};
//! use longhand::spec::RunSpec;
//!
//! let store = JobStore::open(".longhand")?.shared();
//! let manager = JobManager::new(store.clone());
//! let job_id = manager.submit(RunSpec::new("A field guide to bogs"),
//!                             system_prompt, Default::default())?;
//!
//! let scheduler = Scheduler::new(store, SchedulerConfig::default());
//! scheduler.submit(&job_id, 0)?;
//! ```

pub mod backend;
pub mod control;
pub mod error;
pub mod exec;
pub mod jobs;
pub mod prompt;
pub mod sched;
pub mod session;
pub mod spec;
pub mod text;

pub use control::ControlMessage;
pub use error::{BackendError, BackendResult, ErrorCode, ExecError, ExecResult};
pub use jobs::{Job, JobEvent, JobEventKind, JobId, JobManager, JobState, JobStore};
pub use sched::{Admission, Scheduler, SchedulerConfig};
pub use session::SessionOverrides;
pub use spec::{LengthPreset, ResolvedSpec, RunSpec, SpanPreset};
