//! Density metrics and the lossless compression pass.
//!
//! Three cheap, language-agnostic statistics are computed for every
//! chunk and logged unconditionally: lexical density (content-word
//! ratio), filler/hedge rate per thousand words, and average sentence
//! length. When enforcement is on and a threshold is crossed, one
//! rewrite call asks the backend for a denser rendition under a
//! lossless contract; failure of that pass keeps the original text.

use regex::Regex;
use std::sync::OnceLock;

use crate::backend::{Backend, ChatRequest};
use crate::error::BackendResult;
use crate::jobs::DensitySnapshot;
use crate::session::DensityPolicy;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "for", "to", "of", "in",
    "on", "at", "by", "with", "as", "is", "are", "was", "were", "be", "been", "being",
    "that", "this", "those", "these", "it", "its", "from", "into", "over", "under",
    "about", "above", "below", "up", "down", "out", "off",
];

const FILLERS: &[&str] = &[
    "actually",
    "basically",
    "clearly",
    "simply",
    "obviously",
    "literally",
    "just",
    "kind of",
    "sort of",
    "very",
    "really",
    "quite",
    "perhaps",
    "maybe",
    "likely",
    "possibly",
    "probably",
    "generally",
    "in fact",
    "indeed",
    "note that",
    "as you can see",
    "as we saw",
    "in summary",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").unwrap())
}

fn sentence_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").unwrap())
}

fn tokens(text: &str) -> Vec<&str> {
    word_re().find_iter(text).map(|m| m.as_str()).collect()
}

/// Ratio of content words to total tokens.
pub fn lexical_density(text: &str) -> f64 {
    let toks = tokens(text);
    if toks.is_empty() {
        return 0.0;
    }
    let content = toks
        .iter()
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .count();
    content as f64 / toks.len() as f64
}

/// Filler/hedge hits per 1000 words.
pub fn filler_rate(text: &str) -> f64 {
    let toks = tokens(text);
    if toks.is_empty() {
        return 0.0;
    }
    let haystack = format!(" {} ", text.to_lowercase());
    let mut hits = 0usize;
    for filler in FILLERS {
        let needle = format!(" {} ", filler);
        hits += haystack.matches(&needle).count();
    }
    hits as f64 * 1000.0 / toks.len() as f64
}

/// Average sentence length in words.
pub fn avg_sentence_len(text: &str) -> f64 {
    let lengths: Vec<usize> = sentence_split_re()
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .map(|s| tokens(s).len())
        .filter(|&n| n > 0)
        .collect();
    if lengths.is_empty() {
        return 0.0;
    }
    lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
}

/// All three statistics for one chunk.
pub fn density_snapshot(text: &str) -> DensitySnapshot {
    DensitySnapshot {
        lexical_density: lexical_density(text),
        filler_per_k: filler_rate(text),
        avg_sentence_len: avg_sentence_len(text),
    }
}

/// Whether any statistic crosses the policy thresholds.
pub fn needs_compression(snapshot: &DensitySnapshot, policy: &DensityPolicy) -> bool {
    policy.enforce
        && (snapshot.lexical_density < policy.target_density
            || snapshot.filler_per_k > policy.max_filler_per_k
            || snapshot.avg_sentence_len > policy.max_sentence_len)
}

/// One lossless rewrite call. Returns the trimmed rewrite; callers
/// keep the original chunk when this errors or comes back empty.
pub async fn compress_lossless(backend: &dyn Backend, text: &str) -> BackendResult<String> {
    let prompt = format!(
        "Lossless compression pass: Rewrite the EXACT content below to higher density.\n\
         - Preserve every fact and entailment.\n\
         - Remove fillers/hedges; avoid generic transitions.\n\
         - Do not add or remove claims.\n\
         CONTENT:\n<<<CHUNK\n{}\nCHUNK>>>",
        text
    );
    let request = ChatRequest::new(
        "You are a precision editor enforcing a lossless compression contract.",
        prompt,
    );
    let reply = backend.send(request).await?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(lexical_density(""), 0.0);
        assert_eq!(filler_rate(""), 0.0);
        assert_eq!(avg_sentence_len(""), 0.0);
    }

    #[test]
    fn test_lexical_density_bounds() {
        let dense = "Compilers translate source programs into executable machine representations";
        let sparse = "it is on the up and up as it was";
        assert!(lexical_density(dense) > lexical_density(sparse));
        assert!(lexical_density(dense) <= 1.0);
        assert!(lexical_density(sparse) >= 0.0);
    }

    #[test]
    fn test_filler_rate_counts_hedges() {
        let clean = "The allocator reclaims pages eagerly.";
        let hedged = "This is basically just a very simple allocator that actually works.";
        assert_eq!(filler_rate(clean), 0.0);
        assert!(filler_rate(hedged) > 0.0);
    }

    #[test]
    fn test_avg_sentence_len() {
        let text = "One two three. Four five six seven. ";
        let avg = avg_sentence_len(text);
        assert!((avg - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_needs_compression_gated_by_enforce() {
        let snapshot = DensitySnapshot {
            lexical_density: 0.1,
            filler_per_k: 100.0,
            avg_sentence_len: 60.0,
        };
        let mut policy = DensityPolicy::default();
        assert!(!needs_compression(&snapshot, &policy));
        policy.enforce = true;
        assert!(needs_compression(&snapshot, &policy));
    }

    #[test]
    fn test_needs_compression_thresholds() {
        let policy = DensityPolicy {
            enforce: true,
            ..Default::default()
        };
        let good = DensitySnapshot {
            lexical_density: 0.7,
            filler_per_k: 2.0,
            avg_sentence_len: 15.0,
        };
        assert!(!needs_compression(&good, &policy));

        let too_long = DensitySnapshot {
            avg_sentence_len: 30.0,
            ..good
        };
        assert!(needs_compression(&too_long, &policy));
    }
}
