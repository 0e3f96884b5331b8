//! Extractive fallback synopses.

use sift_core::text::{first_sentence, truncate_chars};

/// Shortest first sentence accepted as a synopsis.
const MIN_SENTENCE_CHARS: usize = 20;

/// Substitute synopsis built from the source text alone.
///
/// Prefers the first sentence when it fits in `max_chars`, otherwise the
/// first `max_chars` characters. Never returns an empty string.
pub fn fallback_synopsis(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "(no abstract available)".to_string();
    }
    if let Some(sentence) = first_sentence(text, MIN_SENTENCE_CHARS) {
        if sentence.chars().count() <= max_chars {
            return sentence.to_string();
        }
    }
    truncate_chars(text, max_chars.max(1))
}
