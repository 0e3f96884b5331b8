//! Text cleanup for feed fields and fallback synopses.

use std::sync::LazyLock;

use regex::Regex;

static INLINE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[^$]*\$").expect("inline math pattern"));
static LATEX_WRAPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+\{([^{}]*)\}").expect("latex wrapper pattern"));
static LATEX_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").expect("latex command pattern"));

/// Collapse every run of whitespace (including newlines) to one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a title or abstract from the feed.
///
/// Drops inline `$...$` math, unwraps `\cmd{text}` to `text`, removes bare
/// commands, then normalizes whitespace.
pub fn clean_text(text: &str) -> String {
    let without_math = INLINE_MATH.replace_all(text, " ");
    let unwrapped = LATEX_WRAPPED.replace_all(&without_math, "$1");
    let bare = LATEX_BARE.replace_all(&unwrapped, " ");
    normalize_whitespace(&bare)
}

/// First sentence of `text`, if one of at least `min_chars` characters ends
/// with `.`, `!` or `?` followed by whitespace or end of input.
pub fn first_sentence(text: &str, min_chars: usize) -> Option<&str> {
    let text = text.trim();
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if !at_boundary {
            continue;
        }
        let end = idx + c.len_utf8();
        let candidate = &text[..end];
        if candidate.chars().count() >= min_chars {
            return Some(candidate);
        }
    }
    None
}

/// Truncate to at most `max_chars` characters, breaking at a word boundary
/// when possible and appending `...` if anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > max_chars / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end_matches(|c: char| c.is_whitespace() || c == ','))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(normalize_whitespace("  a\n\tb   c "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn clean_text_strips_math_and_commands() {
        assert_eq!(
            clean_text("A $\\mathcal{O}(n)$ method for\n  \\emph{fast} search"),
            "A method for fast search"
        );
        assert_eq!(clean_text("Plain title"), "Plain title");
    }

    #[test]
    fn first_sentence_found() {
        let t = "We propose a new model. It works well.";
        assert_eq!(first_sentence(t, 5), Some("We propose a new model."));
    }

    #[test]
    fn first_sentence_skips_short_fragments() {
        let t = "Hi. We propose a new model! Rest.";
        assert_eq!(first_sentence(t, 10), Some("Hi. We propose a new model!"));
    }

    #[test]
    fn first_sentence_ignores_inner_periods() {
        let t = "Version 2.5 improves accuracy.";
        assert_eq!(first_sentence(t, 5), Some("Version 2.5 improves accuracy."));
    }

    #[test]
    fn first_sentence_none_without_terminator() {
        assert_eq!(first_sentence("no terminator here", 3), None);
        assert_eq!(first_sentence("", 0), None);
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn truncate_breaks_at_word() {
        assert_eq!(
            truncate_chars("the quick brown fox jumps", 12),
            "the quick..."
        );
    }

    #[test]
    fn truncate_handles_multibyte() {
        let out = truncate_chars("ééééééééééé", 4);
        assert_eq!(out, "éééé...");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(text in "[a-z \t\n]{0,60}") {
            let once = normalize_whitespace(&text);
            prop_assert_eq!(normalize_whitespace(&once), once.clone());
            prop_assert!(!once.contains("  "));
            prop_assert_eq!(once.trim(), once.as_str());
        }

        #[test]
        fn truncate_never_exceeds_limit(text in "[a-zé ,]{0,80}", max in 1usize..40) {
            let out = truncate_chars(&text, max);
            prop_assert!(out.chars().count() <= max + 3);
            if text.trim().chars().count() <= max {
                prop_assert_eq!(out, text.trim());
            } else {
                prop_assert!(out.ends_with("..."));
            }
        }
    }
}
