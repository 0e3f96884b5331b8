//! SMTP email channel.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use sift_core::DigestPayload;
use sift_settings::EmailSettings;
use tracing::debug;

use crate::channel::Channel;
use crate::errors::{ChannelError, Result};
use crate::render::{render_html, render_text, subject};

/// Delivers digests as multipart (plain + HTML) email.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject_prefix: String,
    timeout: Duration,
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| ChannelError::Config(format!("{address}: {e}")))
}

impl EmailChannel {
    /// Build the SMTP transport and parse all addresses.
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let from = parse_mailbox(settings.sender())?;
        let to = settings
            .recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(ChannelError::Config("no recipients".into()));
        }

        let timeout = Duration::from_millis(settings.timeout_ms);
        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
        }
        .map_err(|e| ChannelError::Config(e.to_string()))?;

        let transport = builder
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            subject_prefix: settings.subject_prefix.clone(),
            timeout,
        })
    }

    /// Multipart message with plain-text and HTML alternatives.
    pub fn build_message(&self, subject: &str, text: String, html: String) -> Result<Message> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| ChannelError::Config(e.to_string()))
    }

    async fn send(&self, message: Message) -> Result<()> {
        let response = self.transport.send(message).await?;
        debug!(code = %response.code(), recipients = self.to.len(), "email accepted");
        Ok(())
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deliver(&self, digest: &DigestPayload) -> Result<()> {
        let message = self.build_message(
            &subject(&self.subject_prefix, digest),
            render_text(digest),
            render_html(digest),
        )?;
        self.send(message).await
    }

    async fn send_notice(&self, title: &str, body: &str) -> Result<()> {
        let html = format!(
            "<html><body><h3>{}</h3><p>{}</p></body></html>",
            crate::render::escape_html(title),
            crate::render::escape_html(body)
        );
        let subject = format!("{} {title}", self.subject_prefix);
        let message = self.build_message(subject.trim_start(), body.to_string(), html)?;
        self.send(message).await
    }
}
