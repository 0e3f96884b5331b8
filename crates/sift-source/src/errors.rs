//! Source client error types.

use sift_core::errors::{ErrorCategory, Retryable};
use thiserror::Error;

/// Errors from fetching and parsing the upstream feed.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}")]
    Http {
        /// Status code.
        status: u16,
        /// Delay requested via `Retry-After`.
        retry_after_ms: Option<u64>,
    },
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// Feed body could not be parsed.
    #[error("feed parse error: {0}")]
    Parse(String),
    /// HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
    /// Every requested category failed.
    #[error("all {} categories failed (first: {})", failures.len(), failures.first().map_or("-", |(c, _)| c.as_str()))]
    AllCategoriesFailed {
        /// `(category, error)` pairs.
        failures: Vec<(String, String)>,
    },
    /// Fetch stopped because of shutdown.
    #[error("fetch cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                retry_after_ms: None,
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl Retryable for SourceError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status, .. } => ErrorCategory::from_status(*status),
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout => ErrorCategory::Timeout,
            Self::Parse(_) => ErrorCategory::Parse,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Setup(_) | Self::AllCategoriesFailed { .. } => ErrorCategory::Unknown,
        }
    }

    fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Http { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
