//! Paper and summary records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One preprint as fetched from the upstream server.
///
/// Immutable once fetched. The identifier has its version suffix stripped so
/// `2401.01234v1` and `2401.01234v2` are the same paper for dedup purposes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    /// Version-less identifier (e.g. `2401.01234`).
    pub id: String,
    /// Cleaned title.
    pub title: String,
    /// Cleaned abstract.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Author names in listed order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// All subject categories, primary first.
    pub categories: Vec<String>,
    /// Primary category if the feed reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
    /// First publication timestamp.
    pub published: DateTime<Utc>,
    /// Abstract page URL.
    pub url: String,
    /// PDF link if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl PaperRecord {
    /// Title and abstract joined, the text keyword rules are evaluated on.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }

    /// Whether any of this paper's categories is in `wanted`.
    pub fn in_any_category(&self, wanted: &[String]) -> bool {
        self.categories.iter().any(|c| wanted.iter().any(|w| w == c))
    }

    /// Author line for display: up to three names, then "et al.".
    pub fn author_line(&self) -> String {
        match self.authors.len() {
            0 => String::new(),
            1..=3 => self.authors.join(", "),
            _ => format!("{} et al.", self.authors[..3].join(", ")),
        }
    }
}

/// Outcome of summarizing one paper.
///
/// A failed summary still carries a non-empty synopsis (the fallback), so no
/// paper is ever dropped because the model misbehaved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    /// Identifier of the summarized paper.
    pub paper_id: String,
    /// Synopsis text. Never empty.
    pub synopsis: String,
    /// `true` when the synopsis came from the model.
    pub success: bool,
    /// Why the fallback was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl SummaryResult {
    /// A model-generated summary.
    pub fn generated(paper_id: impl Into<String>, synopsis: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            synopsis: synopsis.into(),
            success: true,
            fallback_reason: None,
        }
    }

    /// A fallback summary with the reason the model output was not used.
    pub fn fallback(
        paper_id: impl Into<String>,
        synopsis: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            paper_id: paper_id.into(),
            synopsis: synopsis.into(),
            success: false,
            fallback_reason: Some(reason.into()),
        }
    }
}
