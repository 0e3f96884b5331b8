//! Retry policy shared by the source client, summarizer and channels.
//!
//! - [`RetryConfig`]: retry parameters (max retries, backoff, jitter)
//! - [`retry_async`]: run an async operation under the policy
//! - [`calculate_backoff_delay`]: exponential backoff math
//! - [`parse_retry_after_header`]: parse an HTTP `Retry-After` value
//!
//! Whether an error is worth another attempt is decided by the error type's
//! [`Retryable`] implementation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::Retryable;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum retries (three attempts in total).
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Successful value plus the number of retries it took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempted<T> {
    /// The value.
    pub value: T,
    /// Retries performed after the first attempt.
    pub retries: u32,
}

/// Final error after the policy gave up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Last error observed.
    pub error: E,
    /// Retries performed after the first attempt.
    pub retries: u32,
    /// Whether the policy stopped because of cancellation.
    pub cancelled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff delay without randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`, then widened by the
/// jitter factor. `attempt` is zero-based (0 for the first retry).
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);
    let with_jitter = (capped as f64) * (1.0 + jitter_factor);
    with_jitter.round() as u64
}

/// Backoff delay with explicit randomness.
///
/// `random` should be in `[0.0, 1.0)`; it maps to `[-jitter, +jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;
    with_jitter.round().max(0.0) as u64
}

/// Parse a `Retry-After` HTTP header value into milliseconds.
///
/// Accepts integer seconds or an RFC 2822 date.
#[must_use]
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delay_ms = date
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Run `op` under `config`, retrying retryable errors with backoff.
///
/// `op` receives the zero-based attempt number. Non-retryable errors stop
/// immediately. When `cancel` fires during a backoff wait the last error is
/// returned with `cancelled` set.
pub async fn retry_async<T, E, F, Fut>(
    operation: &str,
    config: &RetryConfig,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> Result<Attempted<T>, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, retries = attempt, "succeeded after retry");
                }
                return Ok(Attempted {
                    value,
                    retries: attempt,
                });
            }
            Err(error) => {
                if !error.is_retryable() || attempt >= config.max_retries {
                    return Err(Exhausted {
                        error,
                        retries: attempt,
                        cancelled: false,
                    });
                }
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(Exhausted {
                        error,
                        retries: attempt,
                        cancelled: true,
                    });
                }

                let backoff_ms = calculate_backoff_delay_with_random(
                    attempt,
                    config.base_delay_ms,
                    config.max_delay_ms,
                    config.jitter_factor,
                    rand::random::<f64>(),
                );
                let delay_ms = error
                    .retry_after_ms()
                    .map_or(backoff_ms, |ra| backoff_ms.max(ra.min(config.max_delay_ms)));

                metrics::counter!("sift_retries_total", "operation" => operation.to_owned())
                    .increment(1);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms,
                    category = %error.category(),
                    error = %error,
                    "retrying after error"
                );

                let sleep = tokio::time::sleep(Duration::from_millis(delay_ms));
                if let Some(token) = cancel {
                    tokio::select! {
                        () = sleep => {}
                        () = token.cancelled() => {
                            return Err(Exhausted { error, retries: attempt, cancelled: true });
                        }
                    }
                } else {
                    sleep.await;
                }
                attempt += 1;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
