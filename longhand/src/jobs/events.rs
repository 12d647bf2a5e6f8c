//! Job event records.
//!
//! Events are immutable, appended to the per-job JSONL log, and are the
//! sole source of truth for how far a job got. Resumability scans the
//! log for the highest completed chunk index; the progress counters on
//! the Job are only a convenience snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobId, JobState};
use crate::error::ErrorCode;

/// Density figures attached to metric and compression events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensitySnapshot {
    pub lexical_density: f64,
    pub filler_per_k: f64,
    pub avg_sentence_len: f64,
}

/// Everything that can happen to a job, tagged for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    JobSubmitted,
    JobStarted,
    ChunkDone {
        chunk_idx: u32,
        bytes: usize,
        hint: Option<String>,
    },
    JobPaused,
    JobResumed,
    JobCancelled,
    WaitingForResume,
    ResumePrepared,
    ResumeFromChunk {
        last_completed: u32,
        starting_chunk: u32,
    },
    NextHintApplied {
        chunk_idx: u32,
        hint: String,
    },
    RetryDecision {
        error_code: ErrorCode,
        retriable: bool,
        attempt: u32,
        max_retries: u32,
    },
    Retry {
        attempt: u32,
        error_code: ErrorCode,
    },
    WatchdogTimeout {
        chunk_idx: u32,
        timeout_secs: u64,
    },
    RepetitionGuard {
        chunk_idx: u32,
        pass: u32,
        similarity: f64,
    },
    ExtensionStalled {
        chunk_idx: u32,
        pass: u32,
        growth: usize,
        floor: usize,
    },
    ExtensionFailed {
        chunk_idx: u32,
        pass: u32,
        error_code: ErrorCode,
    },
    DensityMetrics {
        chunk_idx: u32,
        metrics: DensitySnapshot,
    },
    CompressPass {
        chunk_idx: u32,
        before: DensitySnapshot,
        after: DensitySnapshot,
    },
    CompressPassFailed {
        chunk_idx: u32,
    },
    JobCompleted {
        total_chunks: u32,
    },
    JobFailed {
        error_code: ErrorCode,
        message: String,
    },
    JobEnded {
        state: JobState,
    },
    ControlReceived {
        command: String,
    },
}

impl JobEventKind {
    /// Completed chunk index carried by this event, if any.
    pub fn completed_chunk(&self) -> Option<u32> {
        match self {
            JobEventKind::ChunkDone { chunk_idx, .. } => Some(*chunk_idx),
            _ => None,
        }
    }
}

/// One line of the event log: `{ts, job_id, type, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub ts: DateTime<Utc>,
    pub job_id: JobId,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    /// Stamp an event for `job_id` with the current time.
    pub fn now(job_id: impl Into<JobId>, kind: JobEventKind) -> Self {
        Self {
            ts: Utc::now(),
            job_id: job_id.into(),
            kind,
        }
    }
}
