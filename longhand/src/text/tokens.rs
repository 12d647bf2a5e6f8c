//! Heuristic token estimation.
//!
//! Fast approximations used by token-aware length scaling; no tokenizer
//! dependency. The weighting (1.3 tokens per word plus 0.25 tokens per
//! character) tracks English prose closely enough for length targets.

use regex::Regex;
use std::sync::OnceLock;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").unwrap())
}

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    let words = word_re().find_iter(text).count();
    let estimate = (words as f64 * 1.3) + (chars as f64 * 0.25);
    (estimate as usize).max(1)
}

/// Convert a character count to an approximate token count, calibrated
/// against `sample` when one is available.
pub fn chars_to_tokens_approx(chars: usize, sample: &str) -> usize {
    if !sample.is_empty() {
        let sample_chars = sample.chars().count();
        if sample_chars > 0 {
            let ratio = estimate_tokens(sample) as f64 / sample_chars as f64;
            return (chars as f64 * ratio) as usize;
        }
    }
    (chars / 4).max(1)
}

/// Convert a token count to an approximate character count, calibrated
/// against `sample` when one is available.
pub fn tokens_to_chars_approx(tokens: usize, sample: &str) -> usize {
    if !sample.is_empty() {
        let sample_chars = sample.chars().count();
        let sample_tokens = estimate_tokens(sample);
        if sample_chars > 0 && sample_tokens > 0 {
            let ratio = sample_chars as f64 / sample_tokens as f64;
            return (tokens as f64 * ratio) as usize;
        }
    }
    (tokens * 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_minimum_one_token() {
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn test_estimate_grows_with_text() {
        let short = estimate_tokens("a few words");
        let long = estimate_tokens("a considerably longer sentence with many more words in it");
        assert!(long > short);
    }

    #[test]
    fn test_default_ratios_without_sample() {
        assert_eq!(chars_to_tokens_approx(400, ""), 100);
        assert_eq!(tokens_to_chars_approx(100, ""), 400);
    }

    #[test]
    fn test_roundtrip_with_sample_is_stable() {
        let sample = "Ordinary English prose used to calibrate the ratio between \
                      characters and tokens for scaling decisions.";
        let tokens = chars_to_tokens_approx(4000, sample);
        let chars = tokens_to_chars_approx(tokens, sample);
        // Calibrated with the same sample, the round trip stays close.
        assert!((chars as i64 - 4000).unsigned_abs() < 100);
    }
}
