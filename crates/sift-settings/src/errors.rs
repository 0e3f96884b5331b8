//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is empty for an enabled feature.
    #[error("missing required setting {section}.{field}")]
    MissingField {
        /// Dotted section path (e.g. `channels.email`).
        section: &'static str,
        /// Field name as written in the settings file.
        field: &'static str,
    },
    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
    /// Every notification channel is disabled.
    #[error("no notification channel is enabled (enable channels.email, channels.telegram or channels.webhook)")]
    NoChannels,
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
