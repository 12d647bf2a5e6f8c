//! Per-job tuning overrides.
//!
//! The interactive predecessor of this tool kept these knobs as
//! module-level globals mutated by REPL commands. Here they are an
//! explicit, versioned struct stored on the Job and passed by value
//! into the executor, so a resumed job runs with the settings it was
//! submitted with.

use serde::{Deserialize, Serialize};

/// Current schema version for [`SessionOverrides`].
pub const OVERRIDES_VERSION: u32 = 1;

/// Density thresholds for the compression pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DensityPolicy {
    /// Whether crossing a threshold triggers the rewrite call.
    pub enforce: bool,
    /// Minimum acceptable content-word ratio.
    pub target_density: f64,
    /// Maximum filler/hedge hits per 1000 words.
    pub max_filler_per_k: f64,
    /// Maximum average sentence length in words.
    pub max_sentence_len: f64,
}

impl Default for DensityPolicy {
    fn default() -> Self {
        Self {
            enforce: false,
            target_density: 0.55,
            max_filler_per_k: 15.0,
            max_sentence_len: 22.0,
        }
    }
}

/// Tunable per-job behavior carried on the Job.
///
/// Guard thresholds are fields rather than constants; the shipped
/// defaults are the empirically chosen values of the predecessor tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOverrides {
    /// Schema version of this struct as persisted.
    pub version: u32,
    /// Override the preset minimum chunk length.
    pub min_chars: Option<usize>,
    /// Token-aware scaling of the minimum length, clamped to ±20%.
    pub smart_min: bool,
    /// Prefix the first chunk with an outline-first scaffold.
    pub outline_first: bool,
    /// Summarize the artifact tail via the backend instead of taking a
    /// verbatim excerpt.
    pub semantic_anchor: bool,
    /// Append the coverage-hammer line to continuation prompts.
    pub coverage_hammer: bool,
    /// Jaccard similarity above which an extension is discarded.
    pub repetition_threshold: f64,
    /// N-gram size for the repetition guard.
    pub ngram: usize,
    /// Absolute growth floor per extension pass, in characters.
    pub growth_floor_chars: usize,
    /// Relative growth floor as a fraction of the appended text.
    pub growth_floor_frac: f64,
    /// Consecutive low-growth passes before extension is abandoned.
    pub stall_limit: u32,
    /// Density metrics and compression configuration.
    pub density: DensityPolicy,
}

impl Default for SessionOverrides {
    fn default() -> Self {
        Self {
            version: OVERRIDES_VERSION,
            min_chars: None,
            smart_min: false,
            outline_first: false,
            semantic_anchor: false,
            coverage_hammer: false,
            repetition_threshold: 0.35,
            ngram: 4,
            growth_floor_chars: 50,
            growth_floor_frac: 0.1,
            stall_limit: 2,
            density: DensityPolicy::default(),
        }
    }
}

impl SessionOverrides {
    /// Effective minimum chunk length given the preset value.
    pub fn effective_min_chars(&self, preset_min: usize) -> usize {
        self.min_chars.unwrap_or(preset_min)
    }

    /// Growth floor for one extension pass.
    ///
    /// At least `growth_floor_chars`, or `growth_floor_frac` of the
    /// trimmed appended text, whichever is larger.
    pub fn growth_floor(&self, appended_len: usize) -> usize {
        let relative = (appended_len as f64 * self.growth_floor_frac) as usize;
        self.growth_floor_chars.max(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = SessionOverrides::default();
        assert_eq!(o.version, OVERRIDES_VERSION);
        assert_eq!(o.repetition_threshold, 0.35);
        assert_eq!(o.ngram, 4);
        assert_eq!(o.stall_limit, 2);
        assert!(!o.density.enforce);
    }

    #[test]
    fn test_effective_min_chars() {
        let mut o = SessionOverrides::default();
        assert_eq!(o.effective_min_chars(5800), 5800);
        o.min_chars = Some(100);
        assert_eq!(o.effective_min_chars(5800), 100);
    }

    #[test]
    fn test_growth_floor() {
        let o = SessionOverrides::default();
        // Small extensions bottom out at the absolute floor.
        assert_eq!(o.growth_floor(100), 50);
        // Large extensions use the relative floor.
        assert_eq!(o.growth_floor(1000), 100);
    }

    #[test]
    fn test_roundtrip() {
        let o = SessionOverrides {
            semantic_anchor: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&o).unwrap();
        let parsed: SessionOverrides = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, o);
    }
}
