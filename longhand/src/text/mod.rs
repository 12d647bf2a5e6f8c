//! Pure text analysis: anchors, directive markers, similarity, token
//! estimation. Nothing in this module touches the store or the
//! scheduler; the chunk processor composes these helpers.

pub mod anchor;
pub mod directive;
pub mod similarity;
pub mod tokens;

pub use anchor::{anchor_from_text, build_continue_prompt, create_anchor};
pub use directive::{strip_directive, terminal_hint};
pub use similarity::jaccard_ngrams;
