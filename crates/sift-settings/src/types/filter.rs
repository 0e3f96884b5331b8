use serde::{Deserialize, Serialize};

/// How two conditions combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Every condition must hold.
    #[default]
    All,
    /// One condition suffices.
    Any,
}

/// How a plain (unquoted) term is matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermMatch {
    /// Case-insensitive substring (`transformer` matches `transformers`).
    #[default]
    Substring,
    /// Case-insensitive whole word.
    Word,
}

/// Match filter settings.
///
/// Each keyword entry is one rule: `"deep learning"` (with quotes) is an exact
/// phrase, `a | b` or `a OR b` is an any-of group, anything else is a plain
/// term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    /// Keyword rules. Empty means category membership alone matches.
    pub keywords: Vec<String>,
    /// Combination of category match and keyword match.
    pub category_keyword_mode: CombineMode,
    /// Combination across keyword rules.
    pub rule_mode: CombineMode,
    /// Plain-term matching policy.
    pub term_match: TermMatch,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            keywords: vec![
                "machine learning".to_string(),
                "neural network".to_string(),
                "artificial intelligence".to_string(),
            ],
            category_keyword_mode: CombineMode::All,
            rule_mode: CombineMode::Any,
            term_match: TermMatch::Substring,
        }
    }
}
