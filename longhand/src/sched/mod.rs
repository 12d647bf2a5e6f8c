//! Admission control: capacity caps, quiet hours, persisted priority
//! queue, and the task-spawning scheduler.

pub mod admission;
pub mod queue;
pub mod quiet;
pub mod scheduler;

pub use admission::{Admission, AdmissionState, CancelDisposition, CapacityCaps, QueueEntry};
pub use quiet::QuietHours;
pub use scheduler::{BackendFactory, Scheduler, SchedulerConfig, SchedulerStatus};
