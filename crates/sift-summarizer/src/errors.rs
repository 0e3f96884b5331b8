//! Summarizer error types.

use sift_core::errors::{ErrorCategory, Retryable};
use thiserror::Error;

/// Errors from the summarization capability.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Summarization is switched off in settings.
    #[error("summarizer disabled")]
    Disabled,
    /// The model could not be loaded.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// Service answered with a non-success status.
    #[error("summarizer returned HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Request exceeded its deadline.
    #[error("summarization timed out")]
    Timeout,
    /// Response did not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for SummarizerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl Retryable for SummarizerError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status, .. } => ErrorCategory::from_status(*status),
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout => ErrorCategory::Timeout,
            Self::InvalidResponse(_) => ErrorCategory::Parse,
            Self::Disabled | Self::ModelUnavailable(_) => ErrorCategory::Unknown,
        }
    }
}

/// Result type for summarizer operations.
pub type Result<T> = std::result::Result<T, SummarizerError>;
