//! Per-chunk processing.
//!
//! One [`ChunkProcessor::process`] call is one backend round trip plus
//! whatever the result needs: directive stripping, micro-extension to
//! the minimum length, and the density pass. Control messages are
//! observed at entry and between extension passes; a cancel unwinds
//! with [`ChunkOutcome::Cancelled`] rather than an error.

use tracing::{debug, info, warn};

use super::density::{compress_lossless, density_snapshot, needs_compression};
use super::extend::{extend_to_min, ExtendOutcome};
use super::{observe_controls, ControlCheck, ExecutorConfig};
use crate::backend::{Backend, ChatRequest};
use crate::control::ControlReceiver;
use crate::error::{BackendResult, ExecResult};
use crate::jobs::{Job, JobEventKind, JobStore};
use crate::prompt::build_chunk_prompt;
use crate::spec::ResolvedSpec;
use crate::text::anchor::{create_anchor, DEFAULT_TAIL_CHARS};
use crate::text::directive::strip_directive;
use crate::text::tokens::{chars_to_tokens_approx, tokens_to_chars_approx};

/// Everything a chunk needs, borrowed from the executor for one run.
pub(crate) struct ChunkContext<'a> {
    pub backend: &'a dyn Backend,
    pub store: &'a JobStore,
    pub job: &'a Job,
    pub config: &'a ExecutorConfig,
}

impl ChunkContext<'_> {
    /// Send one user turn under the job's system prompt.
    pub(crate) async fn send(&self, user: &str) -> BackendResult<String> {
        let system = if self.job.system_prompt.is_empty() {
            format!("Generate content for {}", self.job.spec.subject)
        } else {
            self.job.system_prompt.clone()
        };
        let request = ChatRequest::new(system, user).with_model(self.job.spec.model.clone());
        self.backend.send(request).await
    }
}

/// Result of processing one chunk.
#[derive(Debug)]
pub enum ChunkOutcome {
    /// Final chunk text plus the hint captured from the directive line.
    Completed {
        text: String,
        hint: Option<String>,
    },
    /// A cancel control message was observed.
    Cancelled,
}

/// Executes one backend call for one chunk.
pub struct ChunkProcessor<'a> {
    ctx: ChunkContext<'a>,
    resolved: ResolvedSpec,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        store: &'a JobStore,
        job: &'a Job,
        config: &'a ExecutorConfig,
        resolved: ResolvedSpec,
    ) -> Self {
        Self {
            ctx: ChunkContext {
                backend,
                store,
                job,
                config,
            },
            resolved,
        }
    }

    /// Run chunk `chunk_idx` (1-based) to completion.
    pub async fn process(
        &self,
        chunk_idx: u32,
        controls: &mut ControlReceiver,
    ) -> ExecResult<ChunkOutcome> {
        let job = self.ctx.job;

        let operator_hint = match observe_controls(self.ctx.store, &job.id, controls).await? {
            ControlCheck::Proceed { hint } => hint,
            ControlCheck::Cancelled => return Ok(ChunkOutcome::Cancelled),
        };

        // Anchor on the artifact tail for every chunk after the first.
        let anchor = if chunk_idx > 1 {
            match std::fs::read_to_string(&job.out_path) {
                Ok(content) if !content.is_empty() => Some(
                    create_anchor(
                        &content,
                        job.overrides.semantic_anchor,
                        self.ctx.backend,
                        DEFAULT_TAIL_CHARS,
                    )
                    .await,
                ),
                Ok(_) => None,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Could not read artifact for anchor");
                    None
                }
            }
        } else {
            None
        };

        if let Some(hint) = &operator_hint {
            self.ctx.store.log(
                &job.id,
                JobEventKind::NextHintApplied {
                    chunk_idx,
                    hint: hint.clone(),
                },
            )?;
        }

        let user_content = build_chunk_prompt(
            chunk_idx,
            operator_hint.as_deref(),
            anchor.as_deref(),
            &job.overrides,
        );

        let reply = self.ctx.send(&user_content).await?;
        let (body, captured_hint) = strip_directive(&reply);
        debug!(
            chunk_idx,
            bytes = body.len(),
            hint = captured_hint.as_deref().unwrap_or(""),
            "Chunk reply received"
        );

        let min_chars = self.min_chars_for(&body);
        let mut text = body;
        if text.chars().count() < min_chars && self.resolved.passes > 0 {
            match extend_to_min(
                &self.ctx,
                controls,
                chunk_idx,
                text,
                min_chars,
                self.resolved.passes,
            )
            .await?
            {
                ExtendOutcome::Completed(extended) => text = extended,
                ExtendOutcome::Cancelled => return Ok(ChunkOutcome::Cancelled),
            }
        }

        text = self.density_pass(chunk_idx, text).await?;

        Ok(ChunkOutcome::Completed {
            text,
            hint: captured_hint,
        })
    }

    /// Effective minimum length: overrides first, then token-aware
    /// scaling clamped to ±20% of the configured value.
    fn min_chars_for(&self, sample: &str) -> usize {
        let overrides = &self.ctx.job.overrides;
        let configured = overrides.effective_min_chars(self.resolved.min_chars);
        if !overrides.smart_min || sample.is_empty() {
            return configured;
        }
        let tokens = chars_to_tokens_approx(configured, sample);
        let scaled = tokens_to_chars_approx(tokens, sample);
        let lo = (configured as f64 * 0.8) as usize;
        let hi = (configured as f64 * 1.2) as usize;
        scaled.clamp(lo, hi)
    }

    /// Log density metrics and, when enforcement demands it, run the
    /// lossless rewrite. Failures keep the original text.
    async fn density_pass(&self, chunk_idx: u32, text: String) -> ExecResult<String> {
        let job = self.ctx.job;
        let before = density_snapshot(&text);
        self.ctx.store.log(
            &job.id,
            JobEventKind::DensityMetrics {
                chunk_idx,
                metrics: before,
            },
        )?;

        if !needs_compression(&before, &job.overrides.density) {
            return Ok(text);
        }

        match compress_lossless(self.ctx.backend, &text).await {
            Ok(rewrite) if !rewrite.is_empty() => {
                let after = density_snapshot(&rewrite);
                info!(
                    chunk_idx,
                    before = before.lexical_density,
                    after = after.lexical_density,
                    "Compression pass applied"
                );
                self.ctx.store.log(
                    &job.id,
                    JobEventKind::CompressPass {
                        chunk_idx,
                        before,
                        after,
                    },
                )?;
                Ok(rewrite)
            }
            Ok(_) => {
                self.ctx
                    .store
                    .log(&job.id, JobEventKind::CompressPassFailed { chunk_idx })?;
                Ok(text)
            }
            Err(e) => {
                warn!(chunk_idx, error = %e, "Compression pass failed");
                self.ctx
                    .store
                    .log(&job.id, JobEventKind::CompressPassFailed { chunk_idx })?;
                Ok(text)
            }
        }
    }
}
