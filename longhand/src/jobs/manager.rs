//! Job submission facade.
//!
//! Thin layer over the store for creating jobs and preparing resumes.
//! Idempotency is the caller's concern; [`JobManager::find_resumable`]
//! lets a caller detect an existing non-terminal job targeting the same
//! artifact instead of creating a duplicate.

use std::path::Path;

use tracing::info;

use super::events::JobEventKind;
use super::job::{Job, JobId, JobState};
use super::store::{SharedJobStore, StoreResult};
use crate::session::SessionOverrides;
use crate::spec::RunSpec;

/// Facade for creating and requeueing jobs.
pub struct JobManager {
    store: SharedJobStore,
}

impl JobManager {
    pub fn new(store: SharedJobStore) -> Self {
        Self { store }
    }

    /// Create a new pending job and log its submission.
    pub fn submit(
        &self,
        spec: RunSpec,
        system_prompt: String,
        overrides: SessionOverrides,
    ) -> StoreResult<JobId> {
        let job = Job::new(spec, system_prompt, overrides);
        self.store.save(&job)?;
        self.store.log(&job.id, JobEventKind::JobSubmitted)?;
        info!(job_id = %job.id, name = %job.name, backend = %job.backend, "Job submitted");
        Ok(job.id)
    }

    /// Find a non-terminal job already targeting `out_path`.
    pub fn find_resumable(&self, out_path: &Path) -> StoreResult<Option<JobId>> {
        self.store.find_resumable(out_path)
    }

    /// Requeue a non-running job as pending so the scheduler picks it
    /// up again; the executor then resumes from the last completed
    /// chunk recorded in the event log.
    pub fn prepare_resume(&self, job_id: &str) -> StoreResult<JobId> {
        let mut job = self.store.load(job_id)?;
        job.set_state(JobState::Pending);
        self.store.save(&job)?;
        self.store.log(job_id, JobEventKind::ResumePrepared)?;
        info!(job_id, "Job prepared for resume");
        Ok(job.id)
    }

    /// Load a job descriptor.
    pub fn load(&self, job_id: &str) -> StoreResult<Job> {
        self.store.load(job_id)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> StoreResult<Vec<Job>> {
        self.store.list_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::JobStore;
    use tempfile::tempdir;

    fn manager() -> (JobManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path()).unwrap().shared();
        (JobManager::new(store), dir)
    }

    #[test]
    fn test_submit_creates_pending_job() {
        let (mgr, _dir) = manager();
        let id = mgr
            .submit(
                RunSpec::new("Topic"),
                "sys".into(),
                SessionOverrides::default(),
            )
            .unwrap();

        let job = mgr.load(&id).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.system_prompt, "sys");
    }

    #[test]
    fn test_find_resumable_roundtrip() {
        let (mgr, dir) = manager();
        let out = dir.path().join("doc.md");
        let spec = RunSpec::new("Topic").with_out_path(&out);
        let id = mgr
            .submit(spec, String::new(), SessionOverrides::default())
            .unwrap();

        assert_eq!(mgr.find_resumable(&out).unwrap().as_deref(), Some(&id[..]));
    }

    #[test]
    fn test_prepare_resume_requeues() {
        let (mgr, _dir) = manager();
        let id = mgr
            .submit(
                RunSpec::new("Topic"),
                String::new(),
                SessionOverrides::default(),
            )
            .unwrap();

        // Simulate an interrupted run left in RUNNING.
        let mut job = mgr.load(&id).unwrap();
        job.set_state(JobState::Running);
        mgr.store.save(&job).unwrap();

        mgr.prepare_resume(&id).unwrap();
        assert_eq!(mgr.load(&id).unwrap().state, JobState::Pending);
    }
}
