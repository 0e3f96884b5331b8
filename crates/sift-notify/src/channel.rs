//! The notification channel seam.

use std::time::Duration;

use async_trait::async_trait;
use sift_core::DigestPayload;

use crate::errors::Result;

/// A destination the digest can be delivered to.
///
/// Implementations do one attempt per call; retries, timeouts and
/// concurrency belong to the [`crate::DispatchCoordinator`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel name used in outcomes, logs and metrics.
    fn name(&self) -> &'static str;

    /// Upper bound for a single attempt.
    fn timeout(&self) -> Duration;

    /// Deliver a digest.
    async fn deliver(&self, digest: &DigestPayload) -> Result<()>;

    /// Send a short free-form notice.
    async fn send_notice(&self, title: &str, body: &str) -> Result<()>;

    /// Confirm the channel is wired up.
    async fn send_test(&self) -> Result<()> {
        self.send_notice(
            "sift test notification",
            "This channel is configured correctly and will receive paper digests.",
        )
        .await
    }

    /// Report a failed run.
    async fn send_error_notice(&self, message: &str) -> Result<()> {
        self.send_notice("sift run failed", message).await
    }
}
