//! Scheduler scenarios: admission under caps, priority ordering on
//! release, quiet-hours deferral, queue persistence across restarts,
//! and queued-job cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::Semaphore;

use longhand::backend::{Backend, ChatRequest};
use longhand::control::ControlMessage;
use longhand::error::BackendResult;
use longhand::jobs::{JobManager, JobState, JobStore, SharedJobStore};
use longhand::sched::{
    Admission, CapacityCaps, QuietHours, Scheduler, SchedulerConfig,
};
use longhand::session::SessionOverrides;
use longhand::spec::RunSpec;

/// Backend that blocks each send until the test hands out a permit.
struct GatedBackend {
    gate: Arc<Semaphore>,
    reply: &'static str,
}

#[async_trait]
impl Backend for GatedBackend {
    async fn send(&self, _request: ChatRequest) -> BackendResult<String> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(self.reply.to_string())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn caps(total: usize) -> CapacityCaps {
    CapacityCaps {
        total,
        per_backend: HashMap::new(),
        default_per_backend: total.max(1),
    }
}

fn submit_named(store: &SharedJobStore, dir: &std::path::Path, name: &str) -> String {
    let manager = JobManager::new(store.clone());
    let spec = RunSpec::new(name).with_out_path(dir.join(format!("{name}.md")));
    manager
        .submit(spec, String::new(), SessionOverrides::default())
        .unwrap()
}

fn gated_scheduler_with_reply(
    store: SharedJobStore,
    caps: CapacityCaps,
    quiet: QuietHours,
    gate: Arc<Semaphore>,
    reply: &'static str,
) -> Scheduler {
    let config = SchedulerConfig {
        caps,
        quiet,
        ..Default::default()
    };
    Scheduler::new(store, config).with_backend_factory(Arc::new(move |_id| {
        Ok(Arc::new(GatedBackend {
            gate: gate.clone(),
            reply,
        }) as Arc<dyn Backend>)
    }))
}

fn gated_scheduler(
    store: SharedJobStore,
    caps: CapacityCaps,
    quiet: QuietHours,
    gate: Arc<Semaphore>,
) -> Scheduler {
    gated_scheduler_with_reply(store, caps, quiet, gate, "Generated body. NEXT: [END]")
}

#[tokio::test]
async fn test_priority_queue_drains_in_order() {
    let dir = tempdir().unwrap();
    let store = JobStore::open(dir.path()).unwrap().shared();
    let gate = Arc::new(Semaphore::new(0));
    let scheduler = gated_scheduler(store.clone(), caps(1), QuietHours::none(), gate.clone());

    let running = submit_named(&store, dir.path(), "running");
    let low = submit_named(&store, dir.path(), "low");
    let urgent = submit_named(&store, dir.path(), "urgent");

    assert_eq!(scheduler.submit(&running, 0).unwrap(), Admission::Run);
    assert_eq!(scheduler.submit(&low, 5).unwrap(), Admission::Queued);
    assert_eq!(scheduler.submit(&urgent, 1).unwrap(), Admission::Queued);

    // Backlog is priority ordered: [1, 5].
    let status = scheduler.status();
    assert_eq!(status.queued.len(), 2);
    assert_eq!(status.queued[0].job_id, urgent);
    assert_eq!(status.queued[1].job_id, low);

    // Finish the running job; the priority-1 job is admitted first.
    gate.add_permits(1);
    scheduler.wait(&running).await;
    let status = scheduler.status();
    assert_eq!(status.running, vec![urgent.clone()]);
    assert_eq!(status.queued.len(), 1);
    assert_eq!(status.queued[0].job_id, low);

    gate.add_permits(1);
    scheduler.wait(&urgent).await;
    gate.add_permits(1);
    scheduler.wait(&low).await;

    for id in [&running, &urgent, &low] {
        assert_eq!(store.load(id).unwrap().state, JobState::Done);
    }
    assert!(scheduler.status().queued.is_empty());
}

#[tokio::test]
async fn test_quiet_hours_defer_admission() {
    let dir = tempdir().unwrap();
    let store = JobStore::open(dir.path()).unwrap().shared();
    let gate = Arc::new(Semaphore::new(0));
    let scheduler = gated_scheduler(
        store.clone(),
        caps(4),
        QuietHours::every_day(0, 24),
        gate.clone(),
    );

    let job = submit_named(&store, dir.path(), "deferred");
    assert_eq!(scheduler.submit(&job, 0).unwrap(), Admission::Queued);

    let status = scheduler.status();
    assert!(status.quiet_now);
    assert!(status.running.is_empty());
    assert_eq!(status.queued.len(), 1);
    assert_eq!(store.load(&job).unwrap().state, JobState::Pending);
}

#[tokio::test]
async fn test_queue_survives_restart_and_drops_stale_entries() {
    let dir = tempdir().unwrap();
    let store = JobStore::open(dir.path()).unwrap().shared();
    let gate = Arc::new(Semaphore::new(0));

    let stale = submit_named(&store, dir.path(), "stale");
    let fresh = submit_named(&store, dir.path(), "fresh");

    // First process: no capacity at all, both jobs land in the queue.
    {
        let scheduler =
            gated_scheduler(store.clone(), caps(0), QuietHours::none(), gate.clone());
        assert_eq!(scheduler.submit(&fresh, 2).unwrap(), Admission::Queued);
        assert_eq!(scheduler.submit(&stale, 1).unwrap(), Admission::Queued);
    }

    // The stale job reached a terminal state some other way.
    let mut job = store.load(&stale).unwrap();
    job.set_state(JobState::Cancelled);
    store.save(&job).unwrap();

    // Second process restores the backlog, drops the stale entry, and
    // admits the fresh one into the new capacity.
    let scheduler = gated_scheduler(store.clone(), caps(1), QuietHours::none(), gate.clone());
    scheduler.restore().unwrap();

    let status = scheduler.status();
    assert_eq!(status.running, vec![fresh.clone()]);
    assert!(status.queued.is_empty());

    gate.add_permits(1);
    scheduler.wait(&fresh).await;
    assert_eq!(store.load(&fresh).unwrap().state, JobState::Done);
}

#[tokio::test]
async fn test_cancel_queued_job_removes_it() {
    let dir = tempdir().unwrap();
    let store = JobStore::open(dir.path()).unwrap().shared();
    let gate = Arc::new(Semaphore::new(0));
    let scheduler = gated_scheduler(store.clone(), caps(1), QuietHours::none(), gate.clone());

    let running = submit_named(&store, dir.path(), "running");
    let queued = submit_named(&store, dir.path(), "queued");
    scheduler.submit(&running, 0).unwrap();
    scheduler.submit(&queued, 1).unwrap();

    assert!(scheduler
        .send_control(&queued, ControlMessage::Cancel)
        .unwrap());
    assert_eq!(store.load(&queued).unwrap().state, JobState::Cancelled);
    assert!(scheduler.status().queued.is_empty());

    // Completing the running job admits nothing.
    gate.add_permits(1);
    scheduler.wait(&running).await;
    assert!(scheduler.status().running.is_empty());
}

#[tokio::test]
async fn test_cancel_running_job_is_cooperative() {
    let dir = tempdir().unwrap();
    let store = JobStore::open(dir.path()).unwrap().shared();
    let gate = Arc::new(Semaphore::new(0));
    // No terminal directive: the job would run its whole chunk budget,
    // so only the cancel can end it.
    let scheduler = gated_scheduler_with_reply(
        store.clone(),
        caps(1),
        QuietHours::none(),
        gate.clone(),
        "Partial body. NEXT: [carry on]",
    );

    let job = submit_named(&store, dir.path(), "to-cancel");
    scheduler.submit(&job, 0).unwrap();

    // The cancel is delivered while the backend call is in flight; the
    // job observes it at the next chunk boundary.
    assert!(scheduler.send_control(&job, ControlMessage::Cancel).unwrap());
    gate.add_permits(1);
    scheduler.wait(&job).await;

    assert_eq!(store.load(&job).unwrap().state, JobState::Cancelled);
}
