//! Keyword and category matching.
//!
//! [`MatchFilter::matches`] is a pure function of the paper and the rules:
//! no state is kept between calls.
//!
//! Rule syntax, one rule per configured keyword:
//!
//! | keyword              | rule                              |
//! |----------------------|-----------------------------------|
//! | `transformer`        | plain term                        |
//! | `"deep learning"`    | exact phrase                      |
//! | `llm \| "language model"` | any of the alternatives      |
//! | `llm OR agents`      | any of the alternatives           |

use sift_core::PaperRecord;
use sift_core::text::normalize_whitespace;
use sift_settings::{CombineMode, FilterSettings, TermMatch};

/// One keyword rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchRule {
    /// Plain term, matched per [`TermMatch`].
    Term(String),
    /// Exact phrase, matched as a contiguous substring.
    Phrase(String),
    /// Matches when any alternative matches.
    AnyOf(Vec<MatchRule>),
}

impl MatchRule {
    /// Parse one keyword entry. Blank entries yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let alternatives = split_alternatives(raw);
        if alternatives.len() > 1 {
            let mut rules: Vec<MatchRule> =
                alternatives.into_iter().filter_map(Self::parse_single).collect();
            return match rules.len() {
                0 => None,
                1 => rules.pop(),
                _ => Some(Self::AnyOf(rules)),
            };
        }
        Self::parse_single(raw)
    }

    fn parse_single(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let quoted = raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"');
        let body = normalize_whitespace(if quoted { &raw[1..raw.len() - 1] } else { raw }).to_lowercase();
        if body.is_empty() {
            None
        } else if quoted {
            Some(Self::Phrase(body))
        } else {
            Some(Self::Term(body))
        }
    }

    /// Evaluate against lowercase, whitespace-normalized text.
    fn matches(&self, haystack: &str, term_match: TermMatch) -> bool {
        match self {
            Self::Phrase(phrase) => haystack.contains(phrase.as_str()),
            Self::Term(term) => match term_match {
                TermMatch::Substring => haystack.contains(term.as_str()),
                TermMatch::Word => contains_word(haystack, term),
            },
            Self::AnyOf(rules) => rules.iter().any(|r| r.matches(haystack, term_match)),
        }
    }
}

/// Split on `|` and on a standalone uppercase `OR`, outside quotes.
fn split_alternatives(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'|' if !in_quotes => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            b' ' if !in_quotes && raw[i..].starts_with(" OR ") => {
                parts.push(&raw[start..i]);
                start = i + 4;
                i += 3;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&raw[start..]);
    parts
}

/// Whole-word containment: the match may not touch an alphanumeric character.
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(at, m)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Category and keyword filter built once per run from settings.
#[derive(Clone, Debug)]
pub struct MatchFilter {
    categories: Vec<String>,
    rules: Vec<MatchRule>,
    category_keyword_mode: CombineMode,
    rule_mode: CombineMode,
    term_match: TermMatch,
}

impl MatchFilter {
    /// Build from the wanted categories and filter settings.
    pub fn new(categories: &[String], settings: &FilterSettings) -> Self {
        Self {
            categories: categories.to_vec(),
            rules: settings.keywords.iter().filter_map(|k| MatchRule::parse(k)).collect(),
            category_keyword_mode: settings.category_keyword_mode,
            rule_mode: settings.rule_mode,
            term_match: settings.term_match,
        }
    }

    /// Parsed rules.
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Whether `paper` passes the filter.
    ///
    /// An empty category list or rule list imposes no condition, so with no
    /// keywords category membership alone decides.
    pub fn matches(&self, paper: &PaperRecord) -> bool {
        let category = (!self.categories.is_empty()).then(|| paper.in_any_category(&self.categories));
        let keywords = (!self.rules.is_empty()).then(|| self.keyword_match(paper));

        match (category, keywords) {
            (None, None) => true,
            (Some(c), None) => c,
            (None, Some(k)) => k,
            (Some(c), Some(k)) => match self.category_keyword_mode {
                CombineMode::All => c && k,
                CombineMode::Any => c || k,
            },
        }
    }

    fn keyword_match(&self, paper: &PaperRecord) -> bool {
        let haystack = normalize_whitespace(&paper.search_text()).to_lowercase();
        let mut results = self.rules.iter().map(|r| r.matches(&haystack, self.term_match));
        match self.rule_mode {
            CombineMode::Any => results.any(|m| m),
            CombineMode::All => results.all(|m| m),
        }
    }

    /// Keep only matching papers, preserving order.
    pub fn apply(&self, papers: Vec<PaperRecord>) -> Vec<PaperRecord> {
        papers.into_iter().filter(|p| self.matches(p)).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn paper(id: &str, categories: &[&str], title: &str, abstract_text: &str) -> PaperRecord {
        PaperRecord {
            id: id.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            authors: vec![],
            categories: categories.iter().map(|c| (*c).to_string()).collect(),
            primary_category: categories.first().map(|c| (*c).to_string()),
            published: Utc::now(),
            url: String::new(),
            pdf_url: None,
        }
    }

    fn filter(categories: &[&str], keywords: &[&str]) -> MatchFilter {
        let categories: Vec<String> = categories.iter().map(|c| (*c).to_string()).collect();
        MatchFilter::new(
            &categories,
            &FilterSettings {
                keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                ..FilterSettings::default()
            },
        )
    }

    // -- parsing --

    #[test]
    fn parses_terms_phrases_and_groups() {
        assert_eq!(MatchRule::parse("Transformer"), Some(MatchRule::Term("transformer".into())));
        assert_eq!(
            MatchRule::parse("\"Deep   Learning\""),
            Some(MatchRule::Phrase("deep learning".into()))
        );
        assert_eq!(
            MatchRule::parse("llm | \"language model\""),
            Some(MatchRule::AnyOf(vec![
                MatchRule::Term("llm".into()),
                MatchRule::Phrase("language model".into()),
            ]))
        );
        assert_eq!(
            MatchRule::parse("agents OR planning"),
            Some(MatchRule::AnyOf(vec![
                MatchRule::Term("agents".into()),
                MatchRule::Term("planning".into()),
            ]))
        );
    }

    #[test]
    fn pipe_inside_quotes_is_literal() {
        assert_eq!(MatchRule::parse("\"a | b\""), Some(MatchRule::Phrase("a | b".into())));
    }

    #[test]
    fn blank_rules_are_dropped() {
        assert_eq!(MatchRule::parse("   "), None);
        assert_eq!(MatchRule::parse("\"\""), None);
        assert_eq!(MatchRule::parse(" | x"), Some(MatchRule::Term("x".into())));
    }

    // -- scenarios --

    #[test]
    fn transformer_in_cs_ai() {
        let f = filter(&["cs.AI"], &["transformer"]);
        let hit = paper("1", &["cs.AI"], "Efficient attention", "A new transformer variant for long inputs.");
        let miss = paper("2", &["cs.AI"], "Graph search", "We study classical planning heuristics.");
        let kept = f.apply(vec![hit.clone(), miss]);
        assert_eq!(kept, vec![hit]);
    }

    #[test]
    fn deep_learning_phrase() {
        let f = filter(&["cs.LG"], &["\"deep learning\""]);
        let exact = paper("1", &["cs.LG"], "A survey", "Advances in deep learning for vision.");
        let split = paper("2", &["cs.LG"], "Deep nets", "Learning with deep and wide models.");
        assert!(f.matches(&exact));
        assert!(!f.matches(&split));
    }

    // -- combination --

    #[test]
    fn category_mismatch_blocks_keyword_hit_by_default() {
        let f = filter(&["cs.AI"], &["transformer"]);
        assert!(!f.matches(&paper("1", &["math.CO"], "Transformer", "")));
    }

    #[test]
    fn any_mode_accepts_either_condition() {
        let mut f = filter(&["cs.AI"], &["transformer"]);
        f.category_keyword_mode = CombineMode::Any;
        assert!(f.matches(&paper("1", &["math.CO"], "Transformer", "")));
        assert!(f.matches(&paper("2", &["cs.AI"], "Planning", "")));
        assert!(!f.matches(&paper("3", &["math.CO"], "Planning", "")));
    }

    #[test]
    fn empty_keywords_match_on_category_alone() {
        let f = filter(&["cs.AI"], &[]);
        assert!(f.matches(&paper("1", &["cs.AI"], "Anything", "")));
        assert!(!f.matches(&paper("2", &["cs.CV"], "Anything", "")));
    }

    #[test]
    fn all_rule_mode_requires_every_rule() {
        let mut f = filter(&["cs.AI"], &["agents", "planning"]);
        f.rule_mode = CombineMode::All;
        assert!(f.matches(&paper("1", &["cs.AI"], "Agents", "Planning under uncertainty")));
        assert!(!f.matches(&paper("2", &["cs.AI"], "Agents", "Reward shaping")));
    }

    #[test]
    fn word_policy_respects_boundaries() {
        let mut f = filter(&["cs.AI"], &["transformer"]);
        let plural = paper("1", &["cs.AI"], "Transformers everywhere", "");
        assert!(f.matches(&plural));
        f.term_match = TermMatch::Word;
        assert!(!f.matches(&plural));
        assert!(f.matches(&paper("2", &["cs.AI"], "A transformer, revisited", "")));
    }

    #[test]
    fn matching_is_case_insensitive_across_title_and_abstract() {
        let f = filter(&["cs.AI"], &["Neural Network"]);
        assert!(f.matches(&paper("1", &["cs.AI"], "On NEURAL", "NETWORK pruning")));
    }

    // -- properties --

    proptest! {
        #[test]
        fn filter_is_pure(
            title in "[a-z ]{0,40}",
            abstract_text in "[a-z ]{0,120}",
            keyword in "[a-z]{1,6}",
            in_category in any::<bool>(),
        ) {
            let f = filter(&["cs.AI"], &[keyword.as_str()]);
            let category = if in_category { "cs.AI" } else { "cs.CV" };
            let p = paper("1", &[category], &title, &abstract_text);
            let first = f.matches(&p);
            prop_assert_eq!(first, f.matches(&p));
            prop_assert_eq!(first, f.clone().matches(&p.clone()));
        }

        #[test]
        fn any_mode_is_union_of_single_rules(
            text in "[a-z ]{0,80}",
            a in "[a-z]{1,4}",
            b in "[a-z]{1,4}",
        ) {
            let p = paper("1", &["cs.AI"], "", &text);
            let both = filter(&["cs.AI"], &[a.as_str(), b.as_str()]).matches(&p);
            let either = filter(&["cs.AI"], &[a.as_str()]).matches(&p)
                || filter(&["cs.AI"], &[b.as_str()]).matches(&p);
            prop_assert_eq!(both, either);
        }
    }
}
