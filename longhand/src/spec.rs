//! Run specifications.
//!
//! A [`RunSpec`] is the immutable input to a job. Length and span are
//! chosen through presets so operators reason in "long book" terms; the
//! preset mapping in [`RunSpec::resolved`] is deterministic and stable
//! so a resumed job reproduces the exact targets of its first run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How long each chunk should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthPreset {
    Standard,
    Long,
    VeryLong,
    Max,
}

/// How many chunks the whole document spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanPreset {
    Medium,
    Long,
    Book,
}

/// Concrete targets a preset pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    /// Minimum characters per chunk before micro-extension gives up.
    pub min_chars: usize,
    /// Maximum micro-extension passes per chunk.
    pub passes: u32,
    /// Total chunk budget for the job.
    pub chunks: u32,
}

/// Immutable input to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    /// Subject or topic the document is about.
    pub subject: String,
    /// Per-chunk length preset.
    #[serde(default = "default_length")]
    pub length: LengthPreset,
    /// Total span preset.
    #[serde(default = "default_span")]
    pub span: SpanPreset,
    /// Style overlay identifiers applied by prompt composition.
    #[serde(default)]
    pub overlays: Vec<String>,
    /// Free-form operator note folded into the prompt.
    #[serde(default)]
    pub extra_note: String,
    /// Additional reference files for prompt composition.
    #[serde(default)]
    pub extra_files: Vec<PathBuf>,
    /// Backend identifier this job runs against.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Model override passed through to the backend.
    #[serde(default)]
    pub model: Option<String>,
    /// Output artifact path; derived from the subject when absent.
    #[serde(default)]
    pub out_path: Option<PathBuf>,
    /// Watchdog timeout for one chunk's full processing, in seconds.
    #[serde(default = "default_watchdog")]
    pub watchdog_secs: u64,
}

fn default_length() -> LengthPreset {
    LengthPreset::Long
}

fn default_span() -> SpanPreset {
    SpanPreset::Book
}

fn default_backend() -> String {
    "bridge".to_string()
}

fn default_watchdog() -> u64 {
    300
}

impl RunSpec {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            length: default_length(),
            span: default_span(),
            overlays: vec!["narrative".to_string(), "no_bs".to_string()],
            extra_note: String::new(),
            extra_files: Vec::new(),
            backend: default_backend(),
            model: None,
            out_path: None,
            watchdog_secs: default_watchdog(),
        }
    }

    pub fn with_length(mut self, length: LengthPreset) -> Self {
        self.length = length;
        self
    }

    pub fn with_span(mut self, span: SpanPreset) -> Self {
        self.span = span;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_out_path(mut self, out_path: impl Into<PathBuf>) -> Self {
        self.out_path = Some(out_path.into());
        self
    }

    /// Map presets to concrete targets.
    ///
    /// Pure and deterministic; callers rely on repeated calls returning
    /// identical values across process restarts.
    pub fn resolved(&self) -> ResolvedSpec {
        let (min_chars, passes) = match self.length {
            LengthPreset::Standard => (4200, 1),
            LengthPreset::Long => (5800, 3),
            LengthPreset::VeryLong => (6200, 4),
            LengthPreset::Max => (6800, 5),
        };
        let chunks = match self.span {
            SpanPreset::Medium => 12,
            SpanPreset::Long => 24,
            SpanPreset::Book => 40,
        };
        ResolvedSpec {
            min_chars,
            passes,
            chunks,
        }
    }

    /// The artifact path this spec targets, defaulting next to the
    /// subject name when none was given.
    pub fn artifact_path(&self) -> PathBuf {
        match &self.out_path {
            Some(p) => p.clone(),
            None => {
                let stem = self.subject.replace(' ', "_");
                Path::new("books").join(format!("{}.final.md", stem))
            }
        }
    }
}
