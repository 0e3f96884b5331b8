use serde::{Deserialize, Serialize};
use sift_core::retry::RetryConfig;

/// Upstream preprint server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// Atom query endpoint.
    pub base_url: String,
    /// Subject categories to fetch (e.g. `cs.AI`).
    pub categories: Vec<String>,
    /// How many days back a run looks for new papers.
    pub days_lookback: u32,
    /// Page size requested per category.
    pub max_results_per_category: u32,
    /// Minimum delay between consecutive requests in milliseconds.
    pub request_delay_ms: u64,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// `User-Agent` header sent upstream.
    pub user_agent: String,
    /// Retry policy for category requests.
    pub retry: RetryConfig,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://export.arxiv.org/api/query".to_string(),
            categories: vec!["cs.AI".to_string(), "cs.LG".to_string()],
            days_lookback: 1,
            max_results_per_category: 100,
            request_delay_ms: 3000,
            timeout_ms: 30_000,
            user_agent: concat!("sift/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryConfig::default(),
        }
    }
}
