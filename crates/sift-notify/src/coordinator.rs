//! Concurrent delivery to every enabled channel.

use std::sync::Arc;

use futures::future::join_all;
use sift_core::retry::{RetryConfig, retry_async};
use sift_core::{DigestPayload, DispatchOutcome};
use sift_settings::ChannelSettings;
use tracing::{info, instrument, warn};

use crate::channel::Channel;
use crate::email::EmailChannel;
use crate::errors::{ChannelError, Result};
use crate::telegram::TelegramChannel;
use crate::webhook::WebhookChannel;

/// Delivers digests to all channels independently.
///
/// Each channel gets its own retry loop and per-attempt timeout. One
/// channel's failure never affects another's.
pub struct DispatchCoordinator {
    channels: Vec<Arc<dyn Channel>>,
    retry: RetryConfig,
}

impl DispatchCoordinator {
    /// Coordinator over explicit channels.
    pub fn new(channels: Vec<Arc<dyn Channel>>, retry: RetryConfig) -> Self {
        Self { channels, retry }
    }

    /// Build every enabled channel from settings.
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self> {
        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
        if settings.email.enabled {
            channels.push(Arc::new(EmailChannel::new(&settings.email)?));
        }
        if settings.telegram.enabled {
            channels.push(Arc::new(TelegramChannel::new(&settings.telegram)?));
        }
        if settings.webhook.enabled {
            channels.push(Arc::new(WebhookChannel::new(&settings.webhook)?));
        }
        Ok(Self::new(channels, settings.retry.clone()))
    }

    /// Names of the configured channels.
    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Whether no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver `digest` to every channel concurrently.
    ///
    /// Runs to completion once started; each attempt is bounded by the
    /// channel's timeout and each channel by the retry policy.
    #[instrument(skip_all, fields(run_id = %digest.run_id, papers = digest.len()))]
    pub async fn dispatch(&self, digest: &DigestPayload) -> Vec<DispatchOutcome> {
        let deliveries = self.channels.iter().map(|channel| async move {
            let channel: &dyn Channel = channel.as_ref();
            let name = channel.name();
            let result = retry_async("dispatch", &self.retry, None, |_| attempt(channel, digest)).await;
            let outcome = match result {
                Ok(done) => {
                    info!(channel = name, retries = done.retries, "digest delivered");
                    DispatchOutcome::delivered(name, done.retries)
                }
                Err(exhausted) => {
                    warn!(
                        channel = name,
                        retries = exhausted.retries,
                        error = %exhausted.error,
                        "digest delivery failed"
                    );
                    DispatchOutcome::failed(name, exhausted.error.to_string(), exhausted.retries)
                }
            };
            let label = if outcome.success { "delivered" } else { "failed" };
            metrics::counter!("sift_channel_deliveries_total", "channel" => name, "outcome" => label)
                .increment(1);
            outcome
        });
        join_all(deliveries).await
    }

    /// Send a test message through every channel, without retries.
    pub async fn send_test(&self) -> Vec<DispatchOutcome> {
        let sends = self.channels.iter().map(|channel| async move {
            let name = channel.name();
            match bounded(channel.as_ref(), channel.send_test()).await {
                Ok(()) => DispatchOutcome::delivered(name, 0),
                Err(e) => DispatchOutcome::failed(name, e.to_string(), 0),
            }
        });
        join_all(sends).await
    }

    /// Best-effort error notice to every channel. Failures are only logged.
    pub async fn send_error_notice(&self, message: &str) {
        let sends = self.channels.iter().map(|channel| async move {
            if let Err(e) = bounded(channel.as_ref(), channel.send_error_notice(message)).await {
                warn!(channel = channel.name(), error = %e, "error notice not delivered");
            }
        });
        let _ = join_all(sends).await;
    }

    /// Best-effort free-form notice to every channel, without retries.
    /// Returns how many channels accepted it.
    pub async fn send_notice(&self, title: &str, body: &str) -> usize {
        let sends = self.channels.iter().map(|channel| async move {
            match bounded(channel.as_ref(), channel.send_notice(title, body)).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, title, "notice not delivered");
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }
}

async fn attempt(channel: &dyn Channel, digest: &DigestPayload) -> Result<()> {
    bounded(channel, channel.deliver(digest)).await
}

async fn bounded<F>(channel: &dyn Channel, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout(channel.timeout(), fut)
        .await
        .map_err(|_| ChannelError::Timeout)?
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{entry, payload};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` attempts with the given error, then succeeds.
    struct ScriptedChannel {
        name: &'static str,
        failures: u32,
        retryable: bool,
        stall: bool,
        attempts: AtomicU32,
        notices: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn new(name: &'static str, failures: u32) -> Self {
            Self {
                name,
                failures,
                retryable: true,
                stall: false,
                attempts: AtomicU32::new(0),
                notices: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn deliver(&self, _digest: &DigestPayload) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if n < self.failures {
                if self.retryable {
                    Err(ChannelError::Network("connection reset".into()))
                } else {
                    Err(ChannelError::Rejected("chat not found".into()))
                }
            } else {
                Ok(())
            }
        }

        async fn send_notice(&self, title: &str, _body: &str) -> Result<()> {
            self.notices.lock().push(title.to_string());
            if self.failures == u32::MAX {
                Err(ChannelError::Network("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 20,
            jitter_factor: 0.0,
        }
    }

    fn digest() -> DigestPayload {
        payload(vec![entry("2403.00001", "T", true)])
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_channel_does_not_affect_others() {
        let ok = Arc::new(ScriptedChannel::new("email", 0));
        let broken = Arc::new(ScriptedChannel::new("webhook", u32::MAX));
        let coordinator = DispatchCoordinator::new(vec![ok.clone(), broken.clone()], retry());

        let outcomes = coordinator.dispatch(&digest()).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].channel, "email");
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].retries, 2);
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(ok.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_with_retry_count() {
        let flaky = Arc::new(ScriptedChannel::new("telegram", 1));
        let coordinator = DispatchCoordinator::new(vec![flaky], retry());

        let outcomes = coordinator.dispatch(&digest()).await;
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let mut rejected = ScriptedChannel::new("telegram", u32::MAX);
        rejected.retryable = false;
        let rejected = Arc::new(rejected);
        let coordinator = DispatchCoordinator::new(vec![rejected.clone()], retry());

        let outcomes = coordinator.dispatch(&digest()).await;
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].retries, 0);
        assert!(outcomes[0].error.as_deref().unwrap().contains("chat not found"));
        assert_eq!(rejected.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_attempt_times_out() {
        let mut stuck = ScriptedChannel::new("email", u32::MAX);
        stuck.stall = true;
        let coordinator = DispatchCoordinator::new(vec![Arc::new(stuck)], RetryConfig::none());

        let outcomes = coordinator.dispatch(&digest()).await;
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].error.as_deref(), Some("delivery timed out"));
    }

    #[tokio::test]
    async fn test_and_error_notices_reach_every_channel() {
        let a = Arc::new(ScriptedChannel::new("email", 0));
        let b = Arc::new(ScriptedChannel::new("webhook", u32::MAX));
        let coordinator = DispatchCoordinator::new(vec![a.clone(), b.clone()], retry());

        let outcomes = coordinator.send_test().await;
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);

        coordinator.send_error_notice("fetch failed").await;
        assert_eq!(a.notices.lock().len(), 2);
        assert_eq!(b.notices.lock().last().map(String::as_str), Some("sift run failed"));
    }

    #[tokio::test]
    async fn notice_counts_accepting_channels() {
        let a = Arc::new(ScriptedChannel::new("email", 0));
        let b = Arc::new(ScriptedChannel::new("webhook", u32::MAX));
        let coordinator = DispatchCoordinator::new(vec![a.clone(), b.clone()], retry());

        assert_eq!(coordinator.send_notice("sift started", "daemon up").await, 1);
        assert_eq!(a.notices.lock().clone(), vec!["sift started".to_string()]);
        assert_eq!(b.notices.lock().len(), 1);
    }

    #[test]
    fn from_settings_builds_enabled_channels_only() {
        let mut settings = ChannelSettings::default();
        settings.webhook.enabled = true;
        settings.webhook.url = "https://hooks.example.com/x".into();
        let coordinator = DispatchCoordinator::from_settings(&settings).unwrap();
        assert_eq!(coordinator.channel_names(), vec!["webhook"]);
        assert!(!coordinator.is_empty());
    }
}
