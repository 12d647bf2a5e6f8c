//! Micro-extension loop.
//!
//! Pushes a short chunk up to the configured minimum length without
//! restarting the subtopic. Each pass anchors on the tail of what has
//! accumulated so far and asks the backend to keep going. Three exits
//! besides the pass budget: the minimum length is reached, the new text
//! is too similar to the existing tail (repetition guard), or growth
//! stays under the floor for too many consecutive passes (stall guard).

use tracing::{debug, info};

use super::chunk::ChunkContext;
use super::{observe_controls, ControlCheck};
use crate::control::ControlReceiver;
use crate::error::ExecResult;
use crate::jobs::JobEventKind;
use crate::text::anchor::{anchor_from_text, build_continue_prompt};
use crate::text::directive::strip_directive;
use crate::text::similarity::jaccard_ngrams;

/// Tail size used for the per-pass local anchor.
const EXTENSION_ANCHOR_CHARS: usize = 150;

/// Tail size the repetition guard compares new text against.
const REPETITION_TAIL_CHARS: usize = 200;

/// How an extension run ended.
#[derive(Debug)]
pub(crate) enum ExtendOutcome {
    /// Final content after all passes that ran.
    Completed(String),
    /// A cancel control message arrived mid-extension.
    Cancelled,
}

/// Extend `content` toward `min_chars` with at most `passes` calls.
pub(crate) async fn extend_to_min(
    ctx: &ChunkContext<'_>,
    controls: &mut ControlReceiver,
    chunk_idx: u32,
    mut content: String,
    min_chars: usize,
    passes: u32,
) -> ExecResult<ExtendOutcome> {
    let overrides = &ctx.job.overrides;
    let mut low_growth_count: u32 = 0;
    let mut prev_len = content.chars().count();

    for pass in 0..passes {
        let hint = match observe_controls(ctx.store, &ctx.job.id, controls).await? {
            ControlCheck::Proceed { hint } => hint,
            ControlCheck::Cancelled => return Ok(ExtendOutcome::Cancelled),
        };

        // Keep a local proxy from being hot-looped.
        tokio::time::sleep(ctx.config.extension_delay).await;

        let local_anchor = anchor_from_text(&content, EXTENSION_ANCHOR_CHARS);
        if local_anchor.is_empty() && hint.is_none() {
            break;
        }

        let prompt = match hint {
            Some(text) => {
                ctx.store.log(
                    &ctx.job.id,
                    JobEventKind::NextHintApplied {
                        chunk_idx,
                        hint: text.clone(),
                    },
                )?;
                text
            }
            None => build_continue_prompt(&local_anchor),
        };

        let extension = match ctx.send(&prompt).await {
            Ok(reply) => {
                let (body, _) = strip_directive(&reply);
                body
            }
            Err(e) => {
                // Extension failures never fail the chunk; we keep what
                // we have.
                info!(chunk_idx, pass, error = %e, "Extension call failed");
                ctx.store.log(
                    &ctx.job.id,
                    JobEventKind::ExtensionFailed {
                        chunk_idx,
                        pass,
                        error_code: e.code,
                    },
                )?;
                break;
            }
        };

        let tail: String = content
            .chars()
            .rev()
            .take(REPETITION_TAIL_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let similarity = jaccard_ngrams(&extension, &tail, overrides.ngram);
        if similarity > overrides.repetition_threshold {
            info!(chunk_idx, pass, similarity, "Repetition guard tripped");
            ctx.store.log(
                &ctx.job.id,
                JobEventKind::RepetitionGuard {
                    chunk_idx,
                    pass,
                    similarity,
                },
            )?;
            break;
        }

        content.push_str(&extension);

        let current_len = content.chars().count();
        let growth = current_len.saturating_sub(prev_len);
        let floor = overrides.growth_floor(extension.trim().chars().count());
        if growth < floor {
            low_growth_count += 1;
            if low_growth_count >= overrides.stall_limit {
                ctx.store.log(
                    &ctx.job.id,
                    JobEventKind::ExtensionStalled {
                        chunk_idx,
                        pass,
                        growth,
                        floor,
                    },
                )?;
                break;
            }
        } else {
            low_growth_count = 0;
        }
        prev_len = current_len;

        debug!(chunk_idx, pass, len = current_len, "Extension pass appended");
        if current_len >= min_chars {
            break;
        }
    }

    Ok(ExtendOutcome::Completed(content))
}
