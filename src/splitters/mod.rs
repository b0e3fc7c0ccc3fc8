//! Format-specific splitters.
//!
//! Each splitter is a pure function from raw content to an ordered list of
//! text segments. Sequence numbering and persistence belong to the caller;
//! splitters only decide where the cuts go.

pub mod json;
pub mod markup;
pub mod tabular;
pub mod text;

/// Count whitespace-separated words.
pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
