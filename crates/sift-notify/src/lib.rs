//! # sift-notify
//!
//! Notification channels and the dispatch coordinator.
//!
//! - [`EmailChannel`]: SMTP submission with STARTTLS, plain + HTML bodies
//! - [`TelegramChannel`]: Bot API `sendMessage`, chunked at 4096 characters
//! - [`WebhookChannel`]: Slack-compatible `{"text": ...}` POST
//!
//! [`DispatchCoordinator`] fans a digest out to every enabled channel
//! concurrently and reports one [`sift_core::DispatchOutcome`] per channel.

#![deny(unsafe_code)]

pub mod channel;
pub mod coordinator;
pub mod email;
pub mod errors;
pub mod render;
pub mod telegram;
pub mod webhook;

pub use channel::Channel;
pub use coordinator::DispatchCoordinator;
pub use email::EmailChannel;
pub use errors::{ChannelError, Result};
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;
