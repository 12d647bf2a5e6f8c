//! Per-job execution: the chunk processor, the micro-extension loop,
//! density control, and the retry/watchdog executor around them.

pub mod chunk;
pub mod density;
pub mod executor;
mod extend;

pub use chunk::{ChunkOutcome, ChunkProcessor};
pub use executor::JobExecutor;

use std::time::Duration;

use crate::control::{ControlReceiver, PauseTransition, WaitOutcome};
use crate::error::ExecResult;
use crate::jobs::{JobEventKind, JobStore};

/// Tuning for the executor's retry loop.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum retry attempts per chunk before the job fails.
    pub max_retries: u32,
    /// Base of the exponential backoff; sleep is `base * 2^attempt`.
    pub backoff_base: Duration,
    /// Delay between extension passes so a local proxy is not hammered.
    pub extension_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            extension_delay: Duration::from_millis(50),
        }
    }
}

/// What a control-message check decided.
#[derive(Debug)]
pub(crate) enum ControlCheck {
    /// Keep going; carries the latest operator hint, if any.
    Proceed { hint: Option<String> },
    /// A cancel was observed; unwind to the executor.
    Cancelled,
}

/// Drain the control channel, log pause/resume transitions, block on a
/// pause, and surface cancellation. Shared by the chunk loop and the
/// extension loop, which must observe controls identically.
pub(crate) async fn observe_controls(
    store: &JobStore,
    job_id: &str,
    controls: &mut ControlReceiver,
) -> ExecResult<ControlCheck> {
    let outcome = controls.drain();
    for transition in &outcome.transitions {
        let kind = match transition {
            PauseTransition::Paused => JobEventKind::JobPaused,
            PauseTransition::Resumed => JobEventKind::JobResumed,
        };
        store.log(job_id, kind)?;
    }
    if outcome.cancelled {
        return Ok(ControlCheck::Cancelled);
    }

    let mut hint = outcome.next_hint;
    if controls.is_paused() {
        store.log(job_id, JobEventKind::WaitingForResume)?;
        match controls.wait_for_resume().await {
            WaitOutcome::Resumed => {
                store.log(job_id, JobEventKind::JobResumed)?;
                // A hint sent while paused surfaces on the next drain;
                // pick it up now so it applies to this chunk.
                if let Some(late) = controls.drain().next_hint {
                    hint = Some(late);
                }
            }
            WaitOutcome::Cancelled => return Ok(ControlCheck::Cancelled),
        }
    }

    Ok(ControlCheck::Proceed { hint })
}
