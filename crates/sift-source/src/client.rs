//! arXiv query client.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use sift_core::PaperRecord;
use sift_core::retry::{RetryConfig, parse_retry_after_header, retry_async};
use sift_settings::SourceSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, SourceError};
use crate::feed::parse_feed;
use crate::rate_limit::RateLimiter;

/// Publication window for one fetch, `[since, until]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchWindow {
    /// Inclusive lower bound.
    pub since: DateTime<Utc>,
    /// Inclusive upper bound.
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    /// The `days` days ending at `now`.
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            since: now - chrono::Duration::days(i64::from(days)),
            until: now,
        }
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.until
    }
}

/// A category whose request failed after retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryFailure {
    /// Category id.
    pub category: String,
    /// Final error message.
    pub error: String,
}

/// Result of fetching all categories.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchReport {
    /// Unique papers across every successful category.
    pub papers: Vec<PaperRecord>,
    /// Categories that failed.
    pub failed: Vec<CategoryFailure>,
}

impl FetchReport {
    /// Some, but not all, categories failed.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Source of candidate papers.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Fetch papers for `categories` published within `window`.
    ///
    /// Fails only when every category fails or the fetch is cancelled.
    async fn fetch(
        &self,
        categories: &[String],
        window: FetchWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchReport>;
}

/// [`PaperSource`] backed by the arXiv Atom API.
pub struct ArxivClient {
    http: reqwest::Client,
    base_url: String,
    max_results: u32,
    retry: RetryConfig,
    limiter: RateLimiter,
}

impl ArxivClient {
    /// Build a client from source settings.
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            max_results: settings.max_results_per_category,
            retry: settings.retry.clone(),
            limiter: RateLimiter::new(Duration::from_millis(settings.request_delay_ms)),
        })
    }

    /// Search expression for one category and window.
    pub fn build_query(category: &str, window: FetchWindow) -> String {
        format!(
            "cat:{category} AND submittedDate:[{} TO {}]",
            window.since.format("%Y%m%d%H%M"),
            window.until.format("%Y%m%d%H%M"),
        )
    }

    #[instrument(skip(self, window))]
    async fn fetch_category(&self, category: &str, window: FetchWindow) -> Result<Vec<PaperRecord>> {
        self.limiter.acquire().await;

        let query = Self::build_query(category, window);
        let max_results = self.max_results.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("search_query", query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_header);
            return Err(SourceError::Http {
                status: status.as_u16(),
                retry_after_ms,
            });
        }

        let body = response.text().await?;
        let papers = parse_feed(&body)?;
        let total = papers.len();
        let in_window: Vec<PaperRecord> = papers
            .into_iter()
            .filter(|p| window.contains(p.published))
            .collect();
        debug!(category, total, in_window = in_window.len(), "category fetched");
        Ok(in_window)
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    async fn fetch(
        &self,
        categories: &[String],
        window: FetchWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let mut seen = HashSet::new();

        for category in categories {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let outcome = retry_async("source.fetch", &self.retry, Some(cancel), |_| {
                self.fetch_category(category, window)
            })
            .await;

            match outcome {
                Ok(attempted) => {
                    metrics::counter!("sift_papers_fetched_total", "category" => category.clone())
                        .increment(attempted.value.len() as u64);
                    for paper in attempted.value {
                        if seen.insert(paper.id.clone()) {
                            report.papers.push(paper);
                        }
                    }
                }
                Err(exhausted) if exhausted.cancelled => return Err(SourceError::Cancelled),
                Err(exhausted) => {
                    warn!(
                        category = %category,
                        retries = exhausted.retries,
                        error = %exhausted.error,
                        "category fetch failed, continuing with the rest"
                    );
                    report.failed.push(CategoryFailure {
                        category: category.clone(),
                        error: exhausted.error.to_string(),
                    });
                }
            }
        }

        if !categories.is_empty() && report.failed.len() == categories.len() {
            return Err(SourceError::AllCategoriesFailed {
                failures: report
                    .failed
                    .into_iter()
                    .map(|f| (f.category, f.error))
                    .collect(),
            });
        }

        info!(
            categories = categories.len(),
            failed = report.failed.len(),
            papers = report.papers.len(),
            "fetch complete"
        );
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Matches requests whose `search_query` names `cat:<category>`.
    struct ForCategory(&'static str);

    impl wiremock::Match for ForCategory {
        fn matches(&self, request: &Request) -> bool {
            request
                .url
                .query_pairs()
                .any(|(k, v)| k == "search_query" && v.starts_with(&format!("cat:{} ", self.0)))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 16, 0, 0, 0).unwrap()
    }

    fn entry(id: &str, published: &str, categories: &[&str]) -> String {
        let cats: String = categories
            .iter()
            .map(|c| format!(r#"<category term="{c}"/>"#))
            .collect();
        format!(
            "<entry><id>http://arxiv.org/abs/{id}v1</id><published>{published}</published>\
             <title>Paper {id}</title><summary>About {id}.</summary>{cats}</entry>"
        )
    }

    fn feed(entries: &[String]) -> String {
        format!(
            r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">{}</feed>"#,
            entries.concat()
        )
    }

    fn client(server: &MockServer, max_retries: u32) -> ArxivClient {
        let settings = SourceSettings {
            base_url: format!("{}/api/query", server.uri()),
            request_delay_ms: 0,
            timeout_ms: 2000,
            retry: RetryConfig {
                max_retries,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_factor: 0.0,
            },
            ..SourceSettings::default()
        };
        ArxivClient::new(&settings).unwrap()
    }

    fn cats(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn query_uses_submitted_date_window() {
        let window = FetchWindow::last_days(now(), 1);
        assert_eq!(
            ArxivClient::build_query("cs.AI", window),
            "cat:cs.AI AND submittedDate:[202501150000 TO 202501160000]"
        );
    }

    #[tokio::test]
    async fn cross_listed_papers_returned_once() {
        let server = MockServer::start().await;
        let shared = entry("2501.00001", "2025-01-15T10:00:00Z", &["cs.AI", "cs.LG"]);
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(ForCategory("cs.AI"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[shared.clone()])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(ForCategory("cs.LG"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
                shared,
                entry("2501.00002", "2025-01-15T11:00:00Z", &["cs.LG"]),
            ])))
            .mount(&server)
            .await;

        let report = client(&server, 0)
            .fetch(
                &cats(&["cs.AI", "cs.LG"]),
                FetchWindow::last_days(now(), 1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = report.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2501.00001", "2501.00002"]);
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn papers_outside_window_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
                entry("2501.00001", "2025-01-15T10:00:00Z", &["cs.AI"]),
                entry("2412.09999", "2024-12-20T10:00:00Z", &["cs.AI"]),
            ])))
            .mount(&server)
            .await;

        let report = client(&server, 0)
            .fetch(&cats(&["cs.AI"]), FetchWindow::last_days(now(), 1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.papers.len(), 1);
    }

    #[tokio::test]
    async fn one_failing_category_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(ForCategory("cs.AI"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[entry(
                "2501.00001",
                "2025-01-15T10:00:00Z",
                &["cs.AI"],
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(ForCategory("cs.CV"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let report = client(&server, 2)
            .fetch(
                &cats(&["cs.AI", "cs.CV"]),
                FetchWindow::last_days(now(), 1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.papers.len(), 1);
        assert!(report.is_degraded());
        assert_eq!(report.failed[0].category, "cs.CV");
        assert!(report.failed[0].error.contains("503"));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[entry(
                "2501.00001",
                "2025-01-15T10:00:00Z",
                &["cs.AI"],
            )])))
            .mount(&server)
            .await;

        let report = client(&server, 2)
            .fetch(&cats(&["cs.AI"]), FetchWindow::last_days(now(), 1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.papers.len(), 1);
    }

    #[tokio::test]
    async fn all_categories_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .fetch(
                &cats(&["cs.AI", "cs.LG"]),
                FetchWindow::last_days(now(), 1),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, SourceError::AllCategoriesFailed { ref failures } if failures.len() == 2);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let server = MockServer::start().await;
        let token = CancellationToken::new();
        token.cancel();
        let err = client(&server, 0)
            .fetch(&cats(&["cs.AI"]), FetchWindow::last_days(now(), 1), &token)
            .await
            .unwrap_err();
        assert_matches!(err, SourceError::Cancelled);
    }

    #[tokio::test]
    async fn garbage_body_counts_as_category_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed><entry></oops>"))
            .mount(&server)
            .await;
        let err = client(&server, 2)
            .fetch(&cats(&["cs.AI"]), FetchWindow::last_days(now(), 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SourceError::AllCategoriesFailed { .. });
    }
}
