//! Directive-marker protocol.
//!
//! The backend is instructed to end every reply with a line of the form
//! `NEXT: [<free text>]`. The trailer is stripped from the body and the
//! hint captured separately; any copy of the marker that leaks into the
//! middle of the body is purged as well. A hint of `END`, `DONE`, `STOP`
//! or `FINISHED` (case-insensitive, brackets optional) terminates the
//! job successfully regardless of remaining chunk budget.

use regex::Regex;
use std::sync::OnceLock;

fn trailing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*NEXT\s*:\s*\[([^\]]+)\]\s*$").unwrap())
}

fn midbody_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\n?[ \t]*NEXT\s*:\s*\[[^\]]*\][ \t]*\n?").unwrap())
}

/// Strip a trailing `NEXT: [<hint>]` line and return `(body, hint)`.
///
/// Mid-body occurrences of the marker are replaced with a single
/// newline. Idempotent: applying it to its own output changes nothing
/// and yields no hint.
pub fn strip_directive(text: &str) -> (String, Option<String>) {
    let mut hint = None;
    let mut body = text.to_string();

    if let Some(caps) = trailing_re().captures(&body) {
        let captured = caps.get(1).map(|m| m.as_str().trim().to_string());
        if let Some(h) = captured {
            if !h.is_empty() {
                hint = Some(h);
            }
        }
        body = trailing_re().replace(&body, "").into_owned();
    }

    // Purge markers the model emitted mid-body.
    body = midbody_re().replace_all(&body, "\n").into_owned();

    (body.trim().to_string(), hint)
}

/// Whether a captured hint signals successful termination.
pub fn terminal_hint(hint: &str) -> bool {
    let trimmed = hint
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    matches!(
        trimmed.to_ascii_uppercase().as_str(),
        "END" | "DONE" | "STOP" | "FINISHED"
    )
}
