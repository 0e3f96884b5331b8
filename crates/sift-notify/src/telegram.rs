//! Telegram Bot API channel.
//!
//! Digests are sent as one or more HTML-mode messages, each within the 4096
//! UTF-16 unit limit. Progress is remembered per run so a retried delivery
//! resumes after the last message that went through instead of repeating
//! the whole digest.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sift_core::{DigestPayload, RunId};
use sift_settings::TelegramSettings;
use tracing::debug;

use crate::channel::Channel;
use crate::errors::{ChannelError, Result};
use crate::render::{TELEGRAM_MESSAGE_LIMIT, chunk_blocks, escape_html, render_telegram};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize, Default)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Delivers digests through a Telegram bot.
pub struct TelegramChannel {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
    timeout: Duration,
    progress: Mutex<Option<(RunId, usize)>>,
}

impl TelegramChannel {
    /// Build from settings. Token and chat id must be present.
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        if settings.bot_token.is_empty() || settings.chat_id.is_empty() {
            return Err(ChannelError::Config("bot token and chat id required".into()));
        }
        let timeout = Duration::from_millis(settings.timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Config(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                settings.api_base.trim_end_matches('/'),
                settings.bot_token
            ),
            chat_id: settings.chat_id.clone(),
            timeout,
            progress: Mutex::new(None),
        })
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await.unwrap_or_default();
        let description = body.description.unwrap_or_default();
        if !status.is_success() {
            return Err(ChannelError::Http {
                status: status.as_u16(),
                body: description,
                retry_after_ms: body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(|secs| secs * 1000),
            });
        }
        if !body.ok {
            return Err(ChannelError::Rejected(description));
        }
        Ok(())
    }

    fn resume_index(&self, run_id: &RunId) -> usize {
        match &*self.progress.lock() {
            Some((id, sent)) if id == run_id => *sent,
            _ => 0,
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deliver(&self, digest: &DigestPayload) -> Result<()> {
        let messages = render_telegram(digest);
        let start = self.resume_index(&digest.run_id);
        if start > 0 {
            debug!(start, total = messages.len(), "resuming telegram delivery");
        }
        for (idx, message) in messages.iter().enumerate().skip(start) {
            self.send_message(message).await?;
            *self.progress.lock() = Some((digest.run_id.clone(), idx + 1));
        }
        Ok(())
    }

    async fn send_notice(&self, title: &str, body: &str) -> Result<()> {
        let blocks = vec![format!("<b>{}</b>", escape_html(title)), escape_html(body)];
        for message in chunk_blocks(&blocks, TELEGRAM_MESSAGE_LIMIT) {
            self.send_message(&message).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{entry, payload};
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123456:ABC";

    fn channel(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(&TelegramSettings {
            enabled: true,
            bot_token: TOKEN.into(),
            chat_id: "42".into(),
            api_base: server.uri(),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}}))
    }

    fn big_digest() -> DigestPayload {
        let title = "Scaling ".repeat(30);
        payload((0..40).map(|i| entry(&format!("2403.{i:05}"), &title, true)).collect())
    }

    #[tokio::test]
    async fn deliver_sends_html_messages_to_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(serde_json::json!({"chat_id": "42", "parse_mode": "HTML"})))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        channel(&server)
            .deliver(&payload(vec![entry("2403.00001", "Sparse Mixtures", true)]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retried_delivery_resumes_after_last_sent_message() {
        let server = MockServer::start().await;
        let endpoint = format!("/bot{TOKEN}/sendMessage");
        Mock::given(method("POST"))
            .and(path(endpoint.clone()))
            .respond_with(ok())
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(endpoint.clone()))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ok())
            .with_priority(3)
            .mount(&server)
            .await;

        let channel = channel(&server);
        let digest = big_digest();
        let total = render_telegram(&digest).len();
        assert!(total >= 3);

        let first = channel.deliver(&digest).await;
        assert_matches!(first, Err(ChannelError::Http { status: 502, .. }));
        channel.deliver(&digest).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        // one message before the failure, the failed one, then the rest
        assert_eq!(requests.len(), total + 1);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 7",
                "parameters": {"retry_after": 7}
            })))
            .mount(&server)
            .await;

        let err = channel(&server).send_test().await.unwrap_err();
        assert_matches!(
            err,
            ChannelError::Http { status: 429, retry_after_ms: Some(7000), .. }
        );
    }

    #[tokio::test]
    async fn ok_false_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = channel(&server).send_error_notice("boom").await.unwrap_err();
        assert_matches!(err, ChannelError::Rejected(ref d) if d.contains("chat not found"));
    }

    #[test]
    fn missing_token_is_config_error() {
        let result = TelegramChannel::new(&TelegramSettings {
            enabled: true,
            ..TelegramSettings::default()
        });
        assert_matches!(result.err(), Some(ChannelError::Config(_)));
    }
}
