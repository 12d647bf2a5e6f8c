//! Chunk prompt construction.
//!
//! Builds the user-turn text for each chunk. The first chunk is a seed
//! ("BEGIN", optionally with an outline-first scaffold); later chunks
//! are anchored continuations. An operator hint always overrides the
//! computed prompt verbatim.

use crate::session::SessionOverrides;
use crate::text::anchor::build_continue_prompt;

const OUTLINE_SCAFFOLD: &str = "OUTLINE-FIRST SCAFFOLD\n\
    - First chunk: produce a chapter-by-chapter outline consistent with the subject; \
    end with NEXT: [Begin Chapter 1].\n\
    - Subsequent chunks: follow the outline; narrative prose; define terms once; \
    no bullet walls.";

const COVERAGE_HAMMER: &str = "COVERAGE HAMMER: no wrap-up; continue to target depth.";

/// Build the user-turn text for chunk `chunk_idx` (1-based).
///
/// `hint` is an operator-supplied replacement that wins over the
/// computed anchor continuation; `anchor` is the tail excerpt or
/// summary of the artifact so far.
pub fn build_chunk_prompt(
    chunk_idx: u32,
    hint: Option<&str>,
    anchor: Option<&str>,
    overrides: &SessionOverrides,
) -> String {
    let mut prompt = if chunk_idx == 1 {
        let seed = hint.unwrap_or("BEGIN").to_string();
        if overrides.outline_first {
            format!("{}\n{}", seed, OUTLINE_SCAFFOLD)
        } else {
            seed
        }
    } else if let Some(hint) = hint {
        hint.to_string()
    } else {
        build_continue_prompt(anchor.unwrap_or(""))
    };

    if chunk_idx > 1 && overrides.coverage_hammer {
        prompt.push('\n');
        prompt.push_str(COVERAGE_HAMMER);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_chunk_is_seed() {
        let o = SessionOverrides::default();
        assert_eq!(build_chunk_prompt(1, None, None, &o), "BEGIN");
    }

    #[test]
    fn test_first_chunk_hint_overrides_seed() {
        let o = SessionOverrides::default();
        let prompt = build_chunk_prompt(1, Some("Start with the preface"), None, &o);
        assert_eq!(prompt, "Start with the preface");
    }

    #[test]
    fn test_outline_scaffold_on_first_chunk_only() {
        let o = SessionOverrides {
            outline_first: true,
            ..Default::default()
        };
        let first = build_chunk_prompt(1, None, None, &o);
        assert!(first.starts_with("BEGIN"));
        assert!(first.contains("OUTLINE-FIRST SCAFFOLD"));

        let later = build_chunk_prompt(2, None, Some("anchor."), &o);
        assert!(!later.contains("OUTLINE-FIRST SCAFFOLD"));
    }

    #[test]
    fn test_later_chunk_uses_anchor() {
        let o = SessionOverrides::default();
        let prompt = build_chunk_prompt(3, None, Some("last sentence."), &o);
        assert!(prompt.contains("<<<ANCHOR"));
        assert!(prompt.contains("last sentence."));
    }

    #[test]
    fn test_hint_beats_anchor() {
        let o = SessionOverrides::default();
        let prompt = build_chunk_prompt(3, Some("Cover the war years next"), Some("tail."), &o);
        assert_eq!(prompt, "Cover the war years next");
    }

    #[test]
    fn test_coverage_hammer_appended() {
        let o = SessionOverrides {
            coverage_hammer: true,
            ..Default::default()
        };
        let prompt = build_chunk_prompt(2, None, Some("tail."), &o);
        assert!(prompt.ends_with(COVERAGE_HAMMER));
        // Never on the seed chunk.
        assert!(!build_chunk_prompt(1, None, None, &o).contains("COVERAGE"));
    }
}
