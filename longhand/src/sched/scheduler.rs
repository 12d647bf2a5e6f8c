//! Bounded-concurrency scheduler.
//!
//! One tokio task per running job. Admission decisions live in the
//! synchronous [`AdmissionState`]; this wrapper owns the lock, spawns
//! executor tasks, persists the queue after every mutation, and routes
//! control messages to running jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::admission::{Admission, AdmissionState, CancelDisposition, CapacityCaps, QueueEntry};
use super::queue::{load_queue, save_queue};
use super::quiet::QuietHours;
use crate::backend::{backend_for, SharedBackend};
use crate::control::{control_channel, ControlHandle, ControlMessage};
use crate::error::{BackendResult, ErrorCode};
use crate::exec::{ExecutorConfig, JobExecutor};
use crate::jobs::{JobEventKind, JobId, JobState, SharedJobStore, StoreResult};

/// Pluggable backend construction, swapped out by tests.
pub type BackendFactory = Arc<dyn Fn(&str) -> BackendResult<SharedBackend> + Send + Sync>;

/// Scheduler tuning.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub caps: CapacityCaps,
    pub quiet: QuietHours,
    pub executor: ExecutorConfig,
}

/// Point-in-time view of the scheduler for status queries.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: Vec<JobId>,
    pub queued: Vec<QueueEntry>,
    pub quiet_now: bool,
}

struct Inner {
    store: SharedJobStore,
    config: SchedulerConfig,
    state: Mutex<AdmissionState>,
    controls: Mutex<HashMap<JobId, ControlHandle>>,
    handles: Mutex<HashMap<JobId, JoinHandle<()>>>,
    queue_path: PathBuf,
    backend_factory: BackendFactory,
}

/// Admission control across jobs.
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: SharedJobStore, config: SchedulerConfig) -> Self {
        let queue_path = store.root().join("queue.json");
        let state = AdmissionState::new(config.caps.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(state),
                controls: Mutex::new(HashMap::new()),
                handles: Mutex::new(HashMap::new()),
                queue_path,
                backend_factory: Arc::new(|id| backend_for(id)),
            }),
        }
    }

    /// Replace the backend factory; tests inject scripted backends here.
    pub fn with_backend_factory(self, factory: BackendFactory) -> Self {
        let inner = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("factory must be set before the scheduler is shared"));
        Self {
            inner: Arc::new(Inner {
                backend_factory: factory,
                ..inner
            }),
        }
    }

    /// Restore the persisted backlog, dropping entries whose job is no
    /// longer pending, then admit into whatever capacity exists.
    pub fn restore(&self) -> StoreResult<()> {
        let entries = load_queue(&self.inner.queue_path);
        let mut kept = Vec::new();
        for entry in entries {
            match self.inner.store.load(&entry.job_id) {
                Ok(job) if job.state == JobState::Pending => kept.push(entry),
                Ok(job) => {
                    debug!(job_id = %entry.job_id, state = %job.state, "Dropping stale queue entry")
                }
                Err(e) => {
                    warn!(job_id = %entry.job_id, error = %e, "Dropping unknown queue entry")
                }
            }
        }

        let quiet = self.inner.config.quiet.is_quiet_now();
        let admitted = {
            let mut state = self.inner.state.lock().unwrap();
            state.restore_queue(kept);
            let admitted = state.refill(quiet);
            self.inner.persist_queue(&state.queue_snapshot());
            admitted
        };
        info!(admitted = admitted.len(), "Scheduler queue restored");
        for entry in admitted {
            self.inner.clone().spawn_job(entry.job_id, entry.backend);
        }
        Ok(())
    }

    /// Submit a job id with a priority (lower = more urgent). Runs it
    /// immediately when admission allows, queues it otherwise.
    pub fn submit(&self, job_id: &str, priority: i32) -> StoreResult<Admission> {
        let job = self.inner.store.load(job_id)?;
        let quiet = self.inner.config.quiet.is_quiet_now();

        let admission = {
            let mut state = self.inner.state.lock().unwrap();
            let admission = state.submit(job_id, &job.backend, priority, quiet);
            self.inner.persist_queue(&state.queue_snapshot());
            admission
        };

        match admission {
            Admission::Run => {
                info!(job_id, backend = %job.backend, "Job admitted");
                self.inner.clone().spawn_job(job_id.to_string(), job.backend);
            }
            Admission::Queued => {
                info!(job_id, priority, quiet, "Job queued");
            }
        }
        Ok(admission)
    }

    /// Deliver a control message to a job.
    ///
    /// Cancelling a queued job removes it from the backlog and marks it
    /// CANCELLED directly; cancelling a running job is cooperative and
    /// takes effect at the job's next chunk boundary.
    pub fn send_control(&self, job_id: &str, msg: ControlMessage) -> StoreResult<bool> {
        self.inner.store.log(
            job_id,
            JobEventKind::ControlReceived {
                command: msg.command().to_string(),
            },
        )?;

        if matches!(msg, ControlMessage::Cancel) {
            let disposition = {
                let mut state = self.inner.state.lock().unwrap();
                let disposition = state.cancel(job_id);
                self.inner.persist_queue(&state.queue_snapshot());
                disposition
            };
            match disposition {
                CancelDisposition::Dequeued => {
                    let mut job = self.inner.store.load(job_id)?;
                    job.set_state(JobState::Cancelled);
                    self.inner.store.save(&job)?;
                    self.inner.store.log(job_id, JobEventKind::JobCancelled)?;
                    info!(job_id, "Queued job cancelled");
                    return Ok(true);
                }
                CancelDisposition::Running => {}
                CancelDisposition::Unknown => return Ok(false),
            }
        }

        let delivered = self
            .inner
            .controls
            .lock()
            .unwrap()
            .get(job_id)
            .map(|handle| handle.send(msg))
            .unwrap_or(false);
        Ok(delivered)
    }

    /// Wait for a running job's task to finish. No-op when the job is
    /// not currently running.
    pub async fn wait(&self, job_id: &str) {
        let handle = self.inner.handles.lock().unwrap().remove(job_id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Current running set, backlog, and quiet flag.
    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock().unwrap();
        SchedulerStatus {
            running: state.running_ids(),
            queued: state.queue_snapshot(),
            quiet_now: self.inner.config.quiet.is_quiet_now(),
        }
    }
}

impl Inner {
    fn persist_queue(&self, snapshot: &[QueueEntry]) {
        if let Err(e) = save_queue(&self.queue_path, snapshot) {
            warn!(error = %e, "Failed to persist scheduler queue");
        }
    }

    /// Spawn the executor task for an admitted job.
    fn spawn_job(self: Arc<Self>, job_id: JobId, backend_name: String) {
        let (handle, receiver) = control_channel();
        self.controls.lock().unwrap().insert(job_id.clone(), handle);

        let inner = self.clone();
        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            inner
                .run_one(&task_job_id, &backend_name, receiver)
                .await;
            inner.clone().job_finished(&task_job_id);
        });
        self.handles.lock().unwrap().insert(job_id, task);
    }

    async fn run_one(
        &self,
        job_id: &str,
        backend_name: &str,
        receiver: crate::control::ControlReceiver,
    ) {
        let backend = match (self.backend_factory)(backend_name) {
            Ok(backend) => backend,
            Err(e) => {
                warn!(job_id, backend = backend_name, error = %e, "Backend construction failed");
                self.fail_job(job_id, e.code, e.to_string());
                return;
            }
        };
        if !backend.health_check().await {
            // Informational only; the executor's retry policy decides
            // what an unreachable backend means for the job.
            warn!(job_id, backend = backend_name, "Backend health check failed");
        }

        let executor = JobExecutor::new(self.store.clone(), self.config.executor.clone());
        match executor.run(job_id, backend, receiver).await {
            Ok(state) => debug!(job_id, %state, "Job task finished"),
            Err(e) => {
                warn!(job_id, error = %e, "Job run aborted");
                self.fail_job(job_id, e.code(), e.to_string());
            }
        }
    }

    /// Completion hook: free the slot and admit queued jobs into the
    /// capacity it releases, honoring priority and quiet hours.
    fn job_finished(self: Arc<Self>, job_id: &str) {
        self.controls.lock().unwrap().remove(job_id);

        let quiet = self.config.quiet.is_quiet_now();
        let admitted = {
            let mut state = self.state.lock().unwrap();
            let admitted = state.release(job_id, quiet);
            self.persist_queue(&state.queue_snapshot());
            admitted
        };
        for entry in admitted {
            info!(job_id = %entry.job_id, "Admitting queued job");
            self.clone().spawn_job(entry.job_id, entry.backend);
        }
    }

    /// Best-effort terminal FAILED transition outside the executor.
    fn fail_job(&self, job_id: &str, code: ErrorCode, message: String) {
        let result = (|| -> StoreResult<()> {
            let mut job = self.store.load(job_id)?;
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
            Ok(())
        })();
        if let Err(e) = result {
            warn!(job_id, error = %e, "Could not record job failure");
        }
    }
}
