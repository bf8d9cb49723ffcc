//! Small shared utilities.
//!
//! Currently just text processing: reducing feed entry HTML to plain
//! summary text and character-count truncation.

mod text;

pub use text::{clean_content, summarize, truncate_chars, SUMMARY_MAX_CHARS};
