use serde::{Deserialize, Serialize};
use sift_core::retry::RetryConfig;

/// SMTP email channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSettings {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// SMTP submission host.
    pub smtp_host: String,
    /// SMTP submission port.
    pub smtp_port: u16,
    /// Use STARTTLS (otherwise implicit TLS).
    pub starttls: bool,
    /// SMTP username.
    pub username: String,
    /// SMTP password.
    pub password: String,
    /// Sender address. Defaults to `username` when empty.
    pub from: String,
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject prefix.
    pub subject_prefix: String,
    /// Send timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            starttls: true,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            recipients: Vec::new(),
            subject_prefix: "[ArXiv Digest]".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl EmailSettings {
    /// Effective sender address.
    pub fn sender(&self) -> &str {
        if self.from.is_empty() {
            &self.username
        } else {
            &self.from
        }
    }
}

/// Telegram bot channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramSettings {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Bot token from `@BotFather`.
    pub bot_token: String,
    /// Destination chat id.
    pub chat_id: String,
    /// Bot API base URL.
    pub api_base: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Incoming-webhook channel (Slack-compatible body).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// Optional target channel name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Papers listed per message before a "+N more" tail.
    pub max_items: usize,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            channel: None,
            max_items: 10,
            timeout_ms: 30_000,
        }
    }
}

/// All notification channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Email.
    pub email: EmailSettings,
    /// Telegram.
    pub telegram: TelegramSettings,
    /// Webhook.
    pub webhook: WebhookSettings,
    /// Retry policy applied per channel.
    pub retry: RetryConfig,
    /// Send a short error notice when a scheduled run fails.
    pub error_notifications: bool,
    /// Announce daemon start through every channel.
    pub startup_notification: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            email: EmailSettings::default(),
            telegram: TelegramSettings::default(),
            webhook: WebhookSettings::default(),
            retry: RetryConfig::default(),
            error_notifications: true,
            startup_notification: true,
        }
    }
}

impl ChannelSettings {
    /// Names of enabled channels.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.email.enabled {
            names.push("email");
        }
        if self.telegram.enabled {
            names.push("telegram");
        }
        if self.webhook.enabled {
            names.push("webhook");
        }
        names
    }
}
