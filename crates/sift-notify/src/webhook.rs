//! Incoming-webhook channel with a Slack-compatible body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use sift_core::DigestPayload;
use sift_core::retry::parse_retry_after_header;
use sift_core::text::truncate_chars;
use sift_settings::WebhookSettings;

use crate::channel::Channel;
use crate::errors::{ChannelError, Result};
use crate::render::render_slack;

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

/// Posts `{"text": ...}` to a webhook URL.
pub struct WebhookChannel {
    http: reqwest::Client,
    url: String,
    channel: Option<String>,
    max_items: usize,
    timeout: Duration,
}

impl WebhookChannel {
    /// Build from settings. The URL must be present.
    pub fn new(settings: &WebhookSettings) -> Result<Self> {
        if settings.url.is_empty() {
            return Err(ChannelError::Config("webhook url required".into()));
        }
        let timeout = Duration::from_millis(settings.timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Config(e.to_string()))?;
        Ok(Self {
            http,
            url: settings.url.clone(),
            channel: settings.channel.clone().filter(|c| !c.is_empty()),
            max_items: settings.max_items.max(1),
            timeout,
        })
    }

    async fn post(&self, text: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&WebhookBody {
                text,
                channel: self.channel.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after_header);
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Http {
            status: status.as_u16(),
            body: truncate_chars(&body, 200),
            retry_after_ms,
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deliver(&self, digest: &DigestPayload) -> Result<()> {
        self.post(&render_slack(digest, self.max_items)).await
    }

    async fn send_notice(&self, title: &str, body: &str) -> Result<()> {
        self.post(&format!("*{title}*\n{body}")).await
    }
}
