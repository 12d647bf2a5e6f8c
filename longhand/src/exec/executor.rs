//! Per-job execution loop.
//!
//! Owns the job state machine:
//!
//! ```text
//! PENDING --admit--> RUNNING --all chunks done / terminal hint--> DONE
//!                    RUNNING --cancel control--> CANCELLED
//!                    RUNNING --non-retriable / retries exhausted--> FAILED
//!                    RUNNING --retriable, retries remain--> RUNNING (same chunk,
//!                                                           after 2^attempt backoff)
//! ```
//!
//! A paused job stays RUNNING; the pause blocks on the control channel
//! and is not a persisted state. The starting chunk index always comes
//! from the store's event-log scan, so re-running an interrupted job
//! continues instead of restarting.

use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, warn};

use super::chunk::{ChunkOutcome, ChunkProcessor};
use super::{observe_controls, ControlCheck, ExecutorConfig};
use crate::backend::SharedBackend;
use crate::control::ControlReceiver;
use crate::error::{ExecError, ExecResult};
use crate::jobs::{Job, JobEventKind, JobState, SharedJobStore};
use crate::text::directive::terminal_hint;

/// Runs one job to a terminal state.
pub struct JobExecutor {
    store: SharedJobStore,
    config: ExecutorConfig,
}

/// What one chunk attempt produced.
enum ChunkAttempt {
    Completed { hint: Option<String> },
    Cancelled,
    Failed(ExecError),
}

impl JobExecutor {
    pub fn new(store: SharedJobStore, config: ExecutorConfig) -> Self {
        Self { store, config }
    }

    /// Execute `job_id` until it reaches a terminal state.
    ///
    /// Errors from the store or the artifact file propagate; backend
    /// errors are absorbed into the retry policy and end in FAILED.
    pub async fn run(
        &self,
        job_id: &str,
        backend: SharedBackend,
        mut controls: ControlReceiver,
    ) -> ExecResult<JobState> {
        let mut job = self.store.load(job_id)?;
        job.set_state(JobState::Running);
        self.store.save(&job)?;
        self.store.log(job_id, JobEventKind::JobStarted)?;
        info!(job_id, name = %job.name, backend = %job.backend, "Job started");

        if let Some(parent) = job.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let resolved = job.spec.resolved();
        let watchdog = Duration::from_secs(job.spec.watchdog_secs);

        // Resume from wherever the event log says we got to.
        let last_completed = self.store.last_completed_chunk(job_id)?;
        let start_chunk = last_completed + 1;
        if last_completed > 0 {
            self.store.log(
                job_id,
                JobEventKind::ResumeFromChunk {
                    last_completed,
                    starting_chunk: start_chunk,
                },
            )?;
            info!(job_id, start_chunk, "Resuming from event log");
        }

        let mut final_state = JobState::Done;
        let mut total_chunks = resolved.chunks;

        'chunks: for chunk_idx in start_chunk..=resolved.chunks {
            // Honor pause/cancel at the boundary, outside the watchdog,
            // so a long pause cannot masquerade as a timeout. Hints are
            // stashed back for the processor's own drain.
            match observe_controls(&self.store, job_id, &mut controls).await? {
                ControlCheck::Proceed { hint } => {
                    if let Some(h) = hint {
                        controls.stash_hint(h);
                    }
                }
                ControlCheck::Cancelled => {
                    final_state = JobState::Cancelled;
                    self.finish_cancelled(&mut job).await?;
                    break 'chunks;
                }
            }

            let mut attempt: u32 = 0;
            loop {
                let outcome = self
                    .attempt_chunk(&job, &backend, &mut controls, chunk_idx, watchdog)
                    .await?;

                match outcome {
                    ChunkAttempt::Completed { hint } => {
                        if let Some(h) = hint.as_deref() {
                            if terminal_hint(h) {
                                info!(job_id, chunk_idx, hint = h, "Terminal directive");
                                total_chunks = chunk_idx;
                                break 'chunks;
                            }
                        }
                        break;
                    }
                    ChunkAttempt::Cancelled => {
                        final_state = JobState::Cancelled;
                        self.finish_cancelled(&mut job).await?;
                        break 'chunks;
                    }
                    ChunkAttempt::Failed(err) => {
                        let code = err.code();
                        let retriable = code.is_retriable();
                        // The decision goes to the log before we act on
                        // it, so replays explain every retry.
                        self.store.log(
                            job_id,
                            JobEventKind::RetryDecision {
                                error_code: code,
                                retriable,
                                attempt,
                                max_retries: self.config.max_retries,
                            },
                        )?;

                        if retriable && attempt < self.config.max_retries {
                            attempt += 1;
                            job.retries += 1;
                            job.touch();
                            self.store.save(&job)?;
                            self.store.log(
                                job_id,
                                JobEventKind::Retry {
                                    attempt,
                                    error_code: code,
                                },
                            )?;
                            let delay = self.config.backoff_base * 2u32.pow(attempt);
                            warn!(
                                job_id,
                                chunk_idx,
                                attempt,
                                error = %err,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying chunk after backoff"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        let message = err.to_string();
                        error!(job_id, chunk_idx, %code, message, "Job failed");
                        job.record_error(code, &message);
                        job.set_state(JobState::Failed);
                        self.store.save(&job)?;
                        self.store.log(
                            job_id,
                            JobEventKind::JobFailed {
                                error_code: code,
                                message,
                            },
                        )?;
                        final_state = JobState::Failed;
                        break 'chunks;
                    }
                }
            }
        }

        if final_state == JobState::Done {
            job.set_state(JobState::Done);
            self.store.save(&job)?;
            self.store
                .log(job_id, JobEventKind::JobCompleted { total_chunks })?;
            info!(job_id, total_chunks, "Job completed");
        }

        self.store.log(
            job_id,
            JobEventKind::JobEnded { state: final_state },
        )?;
        Ok(final_state)
    }

    /// One watchdog-wrapped chunk attempt, with the artifact append and
    /// chunk_done logging on success.
    async fn attempt_chunk(
        &self,
        job: &Job,
        backend: &SharedBackend,
        controls: &mut ControlReceiver,
        chunk_idx: u32,
        watchdog: Duration,
    ) -> ExecResult<ChunkAttempt> {
        let resolved = job.spec.resolved();
        let processor =
            ChunkProcessor::new(backend.as_ref(), &self.store, job, &self.config, resolved);

        let outcome = match timeout(watchdog, processor.process(chunk_idx, controls)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return Ok(ChunkAttempt::Failed(err)),
            Err(_) => {
                self.store.log(
                    &job.id,
                    JobEventKind::WatchdogTimeout {
                        chunk_idx,
                        timeout_secs: watchdog.as_secs(),
                    },
                )?;
                return Ok(ChunkAttempt::Failed(ExecError::WatchdogTimeout(
                    watchdog.as_secs(),
                )));
            }
        };

        match outcome {
            ChunkOutcome::Cancelled => Ok(ChunkAttempt::Cancelled),
            ChunkOutcome::Completed { text, hint } => {
                let bytes = append_artifact(job, chunk_idx, &text)?;
                self.store.log(
                    &job.id,
                    JobEventKind::ChunkDone {
                        chunk_idx,
                        bytes,
                        hint: hint.clone(),
                    },
                )?;
                let mut updated = self.store.load(&job.id)?;
                updated.record_chunk(chunk_idx, bytes);
                self.store.save(&updated)?;
                info!(job_id = %job.id, chunk_idx, bytes, "Chunk done");
                Ok(ChunkAttempt::Completed { hint })
            }
        }
    }

    async fn finish_cancelled(&self, job: &mut Job) -> ExecResult<()> {
        job.set_state(JobState::Cancelled);
        self.store.save(job)?;
        self.store.log(&job.id, JobEventKind::JobCancelled)?;
        info!(job_id = %job.id, "Job cancelled");
        Ok(())
    }
}

/// Append one chunk to the artifact with flush + fsync.
///
/// The first chunk writes bare; later chunks are separated by a blank
/// line unless the text already begins with one. Returns the chunk's
/// own byte count, excluding the separator.
fn append_artifact(job: &Job, chunk_idx: u32, text: &str) -> std::io::Result<usize> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&job.out_path)?;
    let existing = file.metadata()?.len();

    if existing > 0 && chunk_idx != 1 && !text.starts_with('\n') {
        file.write_all(b"\n\n")?;
    }
    file.write_all(text.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    Ok(text.len())
}
