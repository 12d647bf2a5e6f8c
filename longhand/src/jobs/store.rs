//! Durable job persistence.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/jobs/<job-id>/job.json      descriptor, replaced atomically
//! <root>/jobs/<job-id>/events.jsonl  append-only event log
//! ```
//!
//! Descriptor writes go through write-temp-then-rename with an fsync
//! before the rename, so a crash never leaves a half-written
//! descriptor. Event appends flush and fsync each line; a crash may
//! leave one truncated trailing line, which readers skip.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::events::{JobEvent, JobEventKind};
use super::job::{normalize_path, Job, JobId};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a JobStore.
pub type SharedJobStore = Arc<JobStore>;

/// File-backed job store.
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open or create a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("jobs"))?;
        Ok(Self { root })
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedJobStore {
        Arc::new(self)
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, id: &str) -> PathBuf {
        self.root.join("jobs").join(id)
    }

    fn descriptor_path(&self, id: &str) -> PathBuf {
        self.job_dir(id).join("job.json")
    }

    fn events_path(&self, id: &str) -> PathBuf {
        self.job_dir(id).join("events.jsonl")
    }

    /// Persist a job descriptor atomically.
    pub fn save(&self, job: &Job) -> StoreResult<()> {
        let dir = self.job_dir(&job.id);
        fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(job)?;
        atomic_replace(&self.descriptor_path(&job.id), &bytes)?;
        debug!(job_id = %job.id, state = %job.state, "Job descriptor saved");
        Ok(())
    }

    /// Load a job descriptor by id.
    pub fn load(&self, id: &str) -> StoreResult<Job> {
        let path = self.descriptor_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All jobs in the store, newest first.
    pub fn list_all(&self) -> StoreResult<Vec<Job>> {
        let base = self.root.join("jobs");
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&base)? {
            let entry = entry?;
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job_id = %id, error = %e, "Skipping unreadable job"),
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Append one event with flush + fsync for crash durability.
    pub fn log_event(&self, event: &JobEvent) -> StoreResult<()> {
        let dir = self.job_dir(&event.job_id);
        fs::create_dir_all(&dir)?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path(&event.job_id))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        // Best effort; a failed fsync must not fail the job.
        let _ = file.sync_all();
        Ok(())
    }

    /// Read the event log, skipping malformed or truncated lines.
    pub fn read_events(&self, id: &str) -> StoreResult<Vec<JobEvent>> {
        let path = self.events_path(id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JobEvent>(&line) {
                Ok(ev) => events.push(ev),
                Err(_) => {
                    // Tolerated: a crash can truncate the final line.
                    debug!(job_id = %id, "Skipping malformed event line");
                }
            }
        }
        Ok(events)
    }

    /// Highest chunk index recorded as done, 0 when none.
    ///
    /// This scan is the resumability query; it never trusts cached
    /// counters on the descriptor.
    pub fn last_completed_chunk(&self, id: &str) -> StoreResult<u32> {
        let events = self.read_events(id)?;
        Ok(events
            .iter()
            .filter_map(|ev| ev.kind.completed_chunk())
            .max()
            .unwrap_or(0))
    }

    /// Find a non-terminal job targeting `out_path`, if any.
    pub fn find_resumable(&self, out_path: &Path) -> StoreResult<Option<JobId>> {
        let target = normalize_path(out_path);
        for job in self.list_all()? {
            if !job.state.is_terminal() && job.out_path == target {
                return Ok(Some(job.id));
            }
        }
        Ok(None)
    }

    /// Convenience: stamp and append an event for `job_id`.
    pub fn log(&self, job_id: &str, kind: JobEventKind) -> StoreResult<()> {
        self.log_event(&JobEvent::now(job_id, kind))
    }
}

/// Write `bytes` to `path` via a temp file in the same directory,
/// fsyncing before the rename so the replace is atomic.
pub(crate) fn atomic_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
