//! Admission state machine.
//!
//! Synchronous core of the scheduler: who runs now, who queues, and
//! who gets admitted when a slot frees up. The async scheduler wraps
//! this behind a lock and persists the queue after every mutation;
//! keeping the rules here makes them testable without tasks or clocks.
//!
//! Admission rule: a job runs immediately iff quiet hours are not
//! active, total running jobs are under the global cap, and running
//! jobs on its backend are under that backend's cap. Otherwise it
//! queues at its priority (lower number = more urgent, FIFO within a
//! priority).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::jobs::JobId;

/// Concurrency caps for admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityCaps {
    /// Global cap across all backends.
    pub total: usize,
    /// Per-backend caps; `default_per_backend` applies to the rest.
    pub per_backend: HashMap<String, usize>,
    pub default_per_backend: usize,
}

impl Default for CapacityCaps {
    fn default() -> Self {
        let mut per_backend = HashMap::new();
        per_backend.insert("bridge".to_string(), 1);
        per_backend.insert("openrouter".to_string(), 2);
        Self {
            total: 1,
            per_backend,
            default_per_backend: 1,
        }
    }
}

impl CapacityCaps {
    pub fn backend_cap(&self, backend: &str) -> usize {
        self.per_backend
            .get(backend)
            .copied()
            .unwrap_or(self.default_per_backend)
    }
}

/// One persisted queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub priority: i32,
    pub job_id: JobId,
    pub backend: String,
}

/// Whether a submission ran or queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Run,
    Queued,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDisposition {
    /// The job is running; the caller must deliver a cancel control
    /// message, cooperative cancellation only.
    Running,
    /// The job was waiting in the queue and has been removed.
    Dequeued,
    /// The scheduler knows nothing about this job.
    Unknown,
}

/// Synchronous admission bookkeeping.
#[derive(Debug, Default)]
pub struct AdmissionState {
    caps: CapacityCaps,
    running: HashMap<JobId, String>,
    queue: Vec<QueueEntry>,
}

impl AdmissionState {
    pub fn new(caps: CapacityCaps) -> Self {
        Self {
            caps,
            running: HashMap::new(),
            queue: Vec::new(),
        }
    }

    fn running_on(&self, backend: &str) -> usize {
        self.running.values().filter(|b| b.as_str() == backend).count()
    }

    fn has_capacity(&self, backend: &str) -> bool {
        self.running.len() < self.caps.total
            && self.running_on(backend) < self.caps.backend_cap(backend)
    }

    /// Decide whether `job_id` runs now or queues.
    pub fn submit(
        &mut self,
        job_id: &str,
        backend: &str,
        priority: i32,
        quiet: bool,
    ) -> Admission {
        if !quiet && self.has_capacity(backend) {
            self.running.insert(job_id.to_string(), backend.to_string());
            return Admission::Run;
        }
        self.enqueue(QueueEntry {
            priority,
            job_id: job_id.to_string(),
            backend: backend.to_string(),
        });
        Admission::Queued
    }

    /// Append an entry and keep the queue priority-ordered. The sort is
    /// stable, so equal priorities stay FIFO.
    pub fn enqueue(&mut self, entry: QueueEntry) {
        self.queue.push(entry);
        self.queue.sort_by_key(|e| e.priority);
    }

    /// Mark a running job finished and admit as many queued jobs as
    /// current capacity allows, in priority order. Returns the entries
    /// to start.
    pub fn release(&mut self, job_id: &str, quiet: bool) -> Vec<QueueEntry> {
        self.running.remove(job_id);
        self.refill(quiet)
    }

    /// Admit queued jobs into free capacity without releasing anything.
    pub fn refill(&mut self, quiet: bool) -> Vec<QueueEntry> {
        let mut admitted = Vec::new();
        if quiet {
            return admitted;
        }
        let mut idx = 0;
        while idx < self.queue.len() {
            if self.has_capacity(&self.queue[idx].backend) {
                let entry = self.queue.remove(idx);
                self.running
                    .insert(entry.job_id.clone(), entry.backend.clone());
                admitted.push(entry);
            } else {
                idx += 1;
            }
        }
        admitted
    }

    /// Handle a cancel request for a running or queued job.
    pub fn cancel(&mut self, job_id: &str) -> CancelDisposition {
        if self.running.contains_key(job_id) {
            return CancelDisposition::Running;
        }
        let before = self.queue.len();
        self.queue.retain(|e| e.job_id != job_id);
        if self.queue.len() < before {
            CancelDisposition::Dequeued
        } else {
            CancelDisposition::Unknown
        }
    }

    /// Replace the queue wholesale, used when restoring from disk.
    pub fn restore_queue(&mut self, entries: Vec<QueueEntry>) {
        self.queue = entries;
        self.queue.sort_by_key(|e| e.priority);
    }

    pub fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.queue.clone()
    }

    pub fn running_ids(&self) -> Vec<JobId> {
        self.running.keys().cloned().collect()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(total: usize) -> CapacityCaps {
        CapacityCaps {
            total,
            per_backend: HashMap::new(),
            default_per_backend: total,
        }
    }

    #[test]
    fn test_admit_when_capacity_free() {
        let mut state = AdmissionState::new(caps(2));
        assert_eq!(state.submit("a", "bridge", 0, false), Admission::Run);
        assert_eq!(state.submit("b", "bridge", 0, false), Admission::Run);
        assert_eq!(state.submit("c", "bridge", 0, false), Admission::Queued);
    }

    #[test]
    fn test_quiet_hours_block_admission() {
        let mut state = AdmissionState::new(caps(4));
        assert_eq!(state.submit("a", "bridge", 0, true), Admission::Queued);
        assert_eq!(state.running_count(), 0);
    }

    #[test]
    fn test_priority_order_in_queue() {
        let mut state = AdmissionState::new(caps(1));
        assert_eq!(state.submit("running", "bridge", 0, false), Admission::Run);
        state.submit("low", "bridge", 5, false);
        state.submit("urgent", "bridge", 1, false);

        let queue = state.queue_snapshot();
        assert_eq!(queue[0].job_id, "urgent");
        assert_eq!(queue[1].job_id, "low");
    }

    #[test]
    fn test_release_admits_highest_priority_first() {
        let mut state = AdmissionState::new(caps(1));
        state.submit("running", "bridge", 0, false);
        state.submit("low", "bridge", 5, false);
        state.submit("urgent", "bridge", 1, false);

        let admitted = state.release("running", false);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].job_id, "urgent");
        assert_eq!(state.queue_snapshot()[0].job_id, "low");
    }

    #[test]
    fn test_release_during_quiet_admits_nothing() {
        let mut state = AdmissionState::new(caps(1));
        state.submit("running", "bridge", 0, false);
        state.submit("queued", "bridge", 1, false);

        let admitted = state.release("running", true);
        assert!(admitted.is_empty());
        assert_eq!(state.queue_snapshot().len(), 1);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut state = AdmissionState::new(caps(1));
        state.submit("running", "bridge", 0, false);
        state.submit("first", "bridge", 3, false);
        state.submit("second", "bridge", 3, false);

        let queue = state.queue_snapshot();
        assert_eq!(queue[0].job_id, "first");
        assert_eq!(queue[1].job_id, "second");
    }

    #[test]
    fn test_per_backend_cap() {
        let mut per_backend = HashMap::new();
        per_backend.insert("bridge".to_string(), 1);
        let caps = CapacityCaps {
            total: 4,
            per_backend,
            default_per_backend: 2,
        };
        let mut state = AdmissionState::new(caps);

        assert_eq!(state.submit("a", "bridge", 0, false), Admission::Run);
        // Bridge is saturated even though the global cap is not.
        assert_eq!(state.submit("b", "bridge", 0, false), Admission::Queued);
        // Another backend still fits.
        assert_eq!(state.submit("c", "openrouter", 0, false), Admission::Run);
    }

    #[test]
    fn test_release_skips_saturated_backend() {
        let mut per_backend = HashMap::new();
        per_backend.insert("bridge".to_string(), 1);
        let caps = CapacityCaps {
            total: 4,
            per_backend,
            default_per_backend: 4,
        };
        let mut state = AdmissionState::new(caps);
        state.submit("bridge-running", "bridge", 0, false);
        state.submit("other-running", "openrouter", 0, false);
        state.submit("bridge-waiter", "bridge", 1, false);
        state.submit("other-waiter", "openrouter", 2, false);

        // Finishing the openrouter job frees capacity for the
        // openrouter waiter, but the bridge waiter stays queued.
        let admitted = state.release("other-running", false);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].job_id, "other-waiter");
        assert_eq!(state.queue_snapshot()[0].job_id, "bridge-waiter");
    }

    #[test]
    fn test_cancel_dispositions() {
        let mut state = AdmissionState::new(caps(1));
        state.submit("running", "bridge", 0, false);
        state.submit("queued", "bridge", 1, false);

        assert_eq!(state.cancel("running"), CancelDisposition::Running);
        assert_eq!(state.cancel("queued"), CancelDisposition::Dequeued);
        assert_eq!(state.cancel("nobody"), CancelDisposition::Unknown);
        assert!(state.queue_snapshot().is_empty());
    }

    #[test]
    fn test_restore_queue_sorts() {
        let mut state = AdmissionState::new(caps(1));
        state.restore_queue(vec![
            QueueEntry {
                priority: 9,
                job_id: "b".into(),
                backend: "bridge".into(),
            },
            QueueEntry {
                priority: 1,
                job_id: "a".into(),
                backend: "bridge".into(),
            },
        ]);
        assert_eq!(state.queue_snapshot()[0].job_id, "a");
    }
}
