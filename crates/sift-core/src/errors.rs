//! Error classification shared by every network-facing stage.
//!
//! Each crate keeps its own `thiserror` enum; those enums implement
//! [`Retryable`] so the single retry policy in [`crate::retry`] can decide
//! whether another attempt is worthwhile.

use serde::{Deserialize, Serialize};

/// Error category for classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid or missing credentials.
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Network connectivity issues.
    Network,
    /// Request exceeded its deadline.
    Timeout,
    /// Server-side errors (5xx).
    Server,
    /// Malformed request (4xx).
    InvalidRequest,
    /// Response could not be decoded.
    Parse,
    /// Operation was cancelled.
    Cancelled,
    /// Unrecognized error.
    Unknown,
}

impl ErrorCategory {
    /// Whether errors of this category are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Timeout | Self::Server
        )
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            408 => Self::Timeout,
            429 => Self::RateLimit,
            400..=499 => Self::InvalidRequest,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Server => write!(f, "server"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Parse => write!(f, "parse"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Retryable-error predicate consumed by [`crate::retry::retry_async`].
pub trait Retryable {
    /// Classification of this error.
    fn category(&self) -> ErrorCategory;

    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Server-requested delay before the next attempt, if any.
    fn retry_after_ms(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::Authentication);
        assert_eq!(ErrorCategory::from_status(404), ErrorCategory::InvalidRequest);
        assert_eq!(ErrorCategory::from_status(408), ErrorCategory::Timeout);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::Server);
        assert_eq!(ErrorCategory::from_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn transient_categories_are_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Server.is_retryable());
        assert!(!ErrorCategory::Authentication.is_retryable());
        assert!(!ErrorCategory::Parse.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
        assert_eq!(ErrorCategory::InvalidRequest.to_string(), "invalid_request");
    }
}
