//! Job model.
//!
//! A [`Job`] is the unit of work: one submitted run specification, one
//! output artifact, one event log. Jobs are created on submission,
//! mutated only by the executor and the scheduler, and never deleted;
//! cancellation is a terminal state, not an erasure.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::session::SessionOverrides;
use crate::spec::RunSpec;

/// Unique identifier for jobs.
pub type JobId = String;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submitted or requeued; not yet admitted by the scheduler.
    Pending,
    /// Admitted and executing (a paused job is still Running).
    Running,
    /// All chunks done, or the backend signalled termination.
    Done,
    /// Non-retriable error, or retries exhausted.
    Failed,
    /// Cancel control message observed at a chunk boundary.
    Cancelled,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Last error recorded against a job, queryable without the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub code: ErrorCode,
    pub message: String,
}

/// Progress snapshot updated as chunks complete.
///
/// Informational only; resumability is always computed from the event
/// log, never from these counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub chunks_done: u32,
    pub bytes_written: u64,
    pub last_error: Option<LastError>,
}

/// The unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier.
    pub id: JobId,
    /// Human-readable name, defaulting to the subject.
    pub name: String,
    /// The immutable run specification.
    pub spec: RunSpec,
    /// Backend identifier this job runs against.
    pub backend: String,
    /// Lifecycle state.
    pub state: JobState,
    /// Retry attempts consumed across the whole run.
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Normalized absolute path of the output artifact.
    pub out_path: PathBuf,
    /// Composed system prompt text for every backend call of this job.
    pub system_prompt: String,
    /// Per-job tuning carried with the job.
    pub overrides: SessionOverrides,
    /// Progress snapshot.
    pub progress: Progress,
}

impl Job {
    /// Create a new pending job from a run specification.
    pub fn new(spec: RunSpec, system_prompt: String, overrides: SessionOverrides) -> Self {
        let now = Utc::now();
        let out_path = normalize_path(&spec.artifact_path());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: spec.subject.clone(),
            backend: spec.backend.clone(),
            spec,
            state: JobState::Pending,
            retries: 0,
            created_at: now,
            updated_at: now,
            out_path,
            system_prompt,
            overrides,
            progress: Progress::default(),
        }
    }

    /// Update the lifecycle state and the modification timestamp.
    pub fn set_state(&mut self, state: JobState) {
        self.state = state;
        self.touch();
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a chunk completion in the progress snapshot.
    pub fn record_chunk(&mut self, chunk_idx: u32, bytes: usize) {
        self.progress.chunks_done = self.progress.chunks_done.max(chunk_idx);
        self.progress.bytes_written += bytes as u64;
        self.touch();
    }

    /// Record the most recent error.
    pub fn record_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.progress.last_error = Some(LastError {
            code,
            message: message.into(),
        });
        self.touch();
    }
}

/// Absolute form of `path`, resolved against the current directory.
pub fn normalize_path(path: &std::path::Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
