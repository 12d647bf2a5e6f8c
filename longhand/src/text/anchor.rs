//! Continuation anchors.
//!
//! An anchor is a short excerpt from the end of already-generated text,
//! handed back to the backend so the next chunk continues where the
//! previous one stopped instead of restarting the subtopic. Two modes:
//! a plain tail excerpt trimmed to a sentence boundary, and a semantic
//! anchor where the backend summarizes the tail into one or two
//! sentences.

use tracing::debug;

use crate::backend::{Backend, ChatRequest};

/// Default tail size for plain anchors.
pub const DEFAULT_TAIL_CHARS: usize = 300;

/// Default context size for semantic anchors.
pub const DEFAULT_CONTEXT_CHARS: usize = 400;

/// Take the last `tail_chars` characters of `text`, trimmed back to a
/// sentence boundary when one falls within the final 120 characters.
pub fn anchor_from_text(text: &str, tail_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(tail_chars);
    let tail: String = chars[start..].iter().collect();

    let boundary = tail
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = boundary {
        // Only trim when the boundary sits near the tail end, otherwise
        // we would throw away most of the excerpt.
        let tail_len = tail.len();
        if tail_len - end <= 120 {
            return tail[..end].trim().to_string();
        }
    }
    tail.trim().to_string()
}

/// Heuristic semantic anchor: the last one or two sentences of the
/// context window. Used directly when no backend is involved, and as
/// the fallback when the summarization call fails.
pub fn heuristic_tail_summary(text: &str, context_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(context_chars);
    let context: String = chars[start..].iter().collect();

    let sentences: Vec<&str> = context
        .split('.')
        .map(str::trim)
        .filter(|s| s.len() > 10)
        .collect();

    let summary = match sentences.len() {
        0 => return anchor_from_text(text, context_chars),
        1 => sentences[0].to_string(),
        n => format!("{}. {}", sentences[n - 2], sentences[n - 1]),
    };
    if summary.ends_with('.') {
        summary
    } else {
        format!("{}.", summary)
    }
}

/// Ask the backend to compress the tail into a one-to-two-sentence
/// anchor. Falls back to [`heuristic_tail_summary`] on any failure.
pub async fn summarize_tail(
    backend: &dyn Backend,
    text: &str,
    context_chars: usize,
) -> String {
    if text.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(context_chars);
    let context: String = chars[start..].iter().collect();

    let request = ChatRequest::new(
        "You are a text summarization assistant. Summarize the tail of the \
         provided text in 1-2 sentences, preserving the key semantic meaning \
         and context.",
        format!("Summarize this text in 1-2 sentences:\n\n{}", context),
    )
    .with_temperature(0.1)
    .with_max_tokens(100);

    match backend.send(request).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => heuristic_tail_summary(text, context_chars),
        Err(e) => {
            debug!(error = %e, "Semantic anchor call failed, using heuristic tail");
            heuristic_tail_summary(text, context_chars)
        }
    }
}

/// Compute the anchor for a continuation, semantic or plain.
pub async fn create_anchor(
    text: &str,
    semantic: bool,
    backend: &dyn Backend,
    tail_chars: usize,
) -> String {
    if semantic {
        summarize_tail(backend, text, DEFAULT_CONTEXT_CHARS).await
    } else {
        anchor_from_text(text, tail_chars)
    }
}

/// Build the user-turn text that continues from `anchor`.
pub fn build_continue_prompt(anchor: &str) -> String {
    if anchor.is_empty() {
        return "Continue from where you left off.".to_string();
    }
    format!(
        "Continue exactly from after the anchor; do not repeat or reintroduce; \
         no summary.\nANCHOR:\n<<<ANCHOR\n{}\nANCHOR>>>",
        anchor
    )
}
