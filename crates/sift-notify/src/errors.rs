//! Channel error types.

use sift_core::errors::{ErrorCategory, Retryable};
use thiserror::Error;

/// Errors from delivering to a notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Channel settings are unusable (bad address, missing token).
    #[error("channel misconfigured: {0}")]
    Config(String),
    /// Endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
        /// Delay requested by the endpoint.
        retry_after_ms: Option<u64>,
    },
    /// The API accepted the request but reported failure.
    #[error("rejected: {0}")]
    Rejected(String),
    /// SMTP transaction failed.
    #[error("smtp error: {message}")]
    Smtp {
        /// Error text.
        message: String,
        /// Server answered with a permanent (5xx) code.
        permanent: bool,
    },
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Attempt exceeded the channel timeout.
    #[error("delivery timed out")]
    Timeout,
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            // reqwest error text can embed the request URL, which carries
            // the bot token for Telegram.
            Self::Network(e.without_url().to_string())
        }
    }
}

impl From<lettre::transport::smtp::Error> for ChannelError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Smtp {
                permanent: e.is_permanent(),
                message: e.to_string(),
            }
        }
    }
}

impl Retryable for ChannelError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status, .. } => ErrorCategory::from_status(*status),
            Self::Smtp { permanent: true, .. } | Self::Config(_) | Self::Rejected(_) => {
                ErrorCategory::InvalidRequest
            }
            Self::Smtp { .. } | Self::Network(_) => ErrorCategory::Network,
            Self::Timeout => ErrorCategory::Timeout,
        }
    }

    fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Http { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let rate_limited = ChannelError::Http {
            status: 429,
            body: String::new(),
            retry_after_ms: Some(5000),
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after_ms(), Some(5000));

        assert!(!ChannelError::Config("bad".into()).is_retryable());
        assert!(!ChannelError::Rejected("chat not found".into()).is_retryable());
        assert!(
            !ChannelError::Smtp {
                message: "550 mailbox unavailable".into(),
                permanent: true
            }
            .is_retryable()
        );
        assert!(
            ChannelError::Smtp {
                message: "421 try later".into(),
                permanent: false
            }
            .is_retryable()
        );
        assert!(ChannelError::Timeout.is_retryable());
    }
}
