//! Per-job control channel.
//!
//! The operator side holds a [`ControlHandle`]; the running job holds
//! the matching [`ControlReceiver`]. The channel and the pause flag are
//! the only state shared between the two sides, and both are job
//! scoped, so no cross-job locking exists anywhere.
//!
//! Drain semantics: messages are drained, not peeked. At most one
//! `Next` hint survives a drain (the latest); pause and resume flip the
//! internal pause flag; any `Cancel` wins over everything else. A hint
//! that arrives while the job is blocked waiting for resume is stashed
//! and surfaces on the next drain instead of being lost.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::debug;

/// A transient instruction delivered to a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Pause,
    Resume,
    Cancel,
    /// Replacement prompt text for the next chunk.
    Next(String),
}

impl ControlMessage {
    /// Wire name of the command, used for event logging.
    pub fn command(&self) -> &'static str {
        match self {
            ControlMessage::Pause => "pause",
            ControlMessage::Resume => "resume",
            ControlMessage::Cancel => "cancel",
            ControlMessage::Next(_) => "next",
        }
    }
}

/// Operator-side sender for a job's control channel.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlHandle {
    /// Enqueue a control message. Returns false when the job has
    /// already finished and the receiver is gone.
    pub fn send(&self, msg: ControlMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Pause/resume transitions observed during a drain, for event logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    Paused,
    Resumed,
}

/// Result of draining the control channel at a chunk boundary.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// A cancel message was seen; the job must stop at this boundary.
    pub cancelled: bool,
    /// Latest operator hint, if any arrived since the last drain.
    pub next_hint: Option<String>,
    /// Pause/resume flips in arrival order.
    pub transitions: Vec<PauseTransition>,
}

/// Job-side receiver with drain and pause-wait semantics.
pub struct ControlReceiver {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
    /// Hints stashed while blocked in [`wait_for_resume`].
    stashed: VecDeque<String>,
    paused: bool,
}

/// Create a fresh control channel pair for one job.
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ControlHandle { tx },
        ControlReceiver {
            rx,
            stashed: VecDeque::new(),
            paused: false,
        },
    )
}

impl ControlReceiver {
    /// Whether the last processed message left the job paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Put a drained hint back so the next drain surfaces it. Used when
    /// an outer loop drains at a boundary but the inner loop is the
    /// consumer.
    pub fn stash_hint(&mut self, hint: String) {
        self.stashed.push_back(hint);
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&mut self) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        // Stashed hints arrived earlier than anything still queued.
        if let Some(h) = self.stashed.pop_back() {
            self.stashed.clear();
            outcome.next_hint = Some(h);
        }

        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                ControlMessage::Pause => {
                    if !self.paused {
                        self.paused = true;
                        outcome.transitions.push(PauseTransition::Paused);
                    }
                }
                ControlMessage::Resume => {
                    if self.paused {
                        self.paused = false;
                        outcome.transitions.push(PauseTransition::Resumed);
                    }
                }
                ControlMessage::Cancel => {
                    outcome.cancelled = true;
                }
                ControlMessage::Next(text) => {
                    // Latest hint wins; earlier ones are discarded.
                    outcome.next_hint = Some(text);
                }
            }
        }
        outcome
    }

    /// Block until a resume or cancel arrives.
    ///
    /// Hints received while paused are stashed for the next drain;
    /// additional pause messages are idempotent.
    pub async fn wait_for_resume(&mut self) -> WaitOutcome {
        debug!("Job paused, waiting for resume");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ControlMessage::Resume => {
                    self.paused = false;
                    return WaitOutcome::Resumed;
                }
                ControlMessage::Cancel => {
                    self.paused = false;
                    return WaitOutcome::Cancelled;
                }
                ControlMessage::Next(text) => self.stashed.push_back(text),
                ControlMessage::Pause => {}
            }
        }
        // All handles dropped while paused; treat as cancellation.
        WaitOutcome::Cancelled
    }
}

/// How a pause wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Resumed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empty() {
        let (_handle, mut rx) = control_channel();
        let outcome = rx.drain();
        assert!(!outcome.cancelled);
        assert!(outcome.next_hint.is_none());
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_latest_next_wins() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Next("first".into()));
        handle.send(ControlMessage::Next("second".into()));
        handle.send(ControlMessage::Next("third".into()));
        let outcome = rx.drain();
        assert_eq!(outcome.next_hint.as_deref(), Some("third"));
        // Consumed, not peeked: a second drain sees nothing.
        assert!(rx.drain().next_hint.is_none());
    }

    #[test]
    fn test_cancel_wins() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        handle.send(ControlMessage::Cancel);
        handle.send(ControlMessage::Next("hint".into()));
        let outcome = rx.drain();
        assert!(outcome.cancelled);
    }

    #[test]
    fn test_pause_resume_transitions() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        handle.send(ControlMessage::Resume);
        let outcome = rx.drain();
        assert_eq!(
            outcome.transitions,
            vec![PauseTransition::Paused, PauseTransition::Resumed]
        );
        assert!(!rx.is_paused());
    }

    #[test]
    fn test_redundant_pause_is_idempotent() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        handle.send(ControlMessage::Pause);
        let outcome = rx.drain();
        assert_eq!(outcome.transitions, vec![PauseTransition::Paused]);
        assert!(rx.is_paused());
    }

    #[tokio::test]
    async fn test_wait_for_resume() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        assert!(rx.drain().transitions.contains(&PauseTransition::Paused));

        let sender = handle.clone();
        tokio::spawn(async move {
            sender.send(ControlMessage::Next("stashed hint".into()));
            sender.send(ControlMessage::Resume);
        });

        assert_eq!(rx.wait_for_resume().await, WaitOutcome::Resumed);
        assert!(!rx.is_paused());
        // The hint sent during the pause survives to the next drain.
        assert_eq!(rx.drain().next_hint.as_deref(), Some("stashed hint"));
    }

    #[tokio::test]
    async fn test_cancel_during_pause() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        rx.drain();

        handle.send(ControlMessage::Cancel);
        assert_eq!(rx.wait_for_resume().await, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels_wait() {
        let (handle, mut rx) = control_channel();
        handle.send(ControlMessage::Pause);
        rx.drain();
        drop(handle);
        assert_eq!(rx.wait_for_resume().await, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (handle, rx) = control_channel();
        drop(rx);
        assert!(!handle.send(ControlMessage::Pause));
    }
}
