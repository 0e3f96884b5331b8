//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SiftSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `SIFT_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{Device, SiftSettings};

/// Resolve the default settings path (`~/.sift/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sift").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SiftSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SiftSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<SiftSettings> {
    let defaults = serde_json::to_value(SiftSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(settings: &mut SiftSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
///
/// Integers must be valid and in range, booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, lists are comma
/// separated. Invalid values are ignored with a warning.
pub fn apply_overrides_with(settings: &mut SiftSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── General ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SIFT_DATA_DIR") {
        settings.data_dir = v;
    }
    if let Some(v) = env.string("SIFT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("SIFT_TIMEZONE") {
        settings.schedule.timezone = v;
    }

    // ── Source / filter ─────────────────────────────────────────────
    if let Some(v) = env.list("SIFT_CATEGORIES") {
        settings.source.categories = v;
    }
    if let Some(v) = env.list("SIFT_KEYWORDS") {
        settings.filter.keywords = v;
    }
    if let Some(v) = env.u32("SIFT_DAYS_LOOKBACK", 1, 30) {
        settings.source.days_lookback = v;
    }
    if let Some(v) = env.usize("SIFT_MAX_PAPERS", 1, 500) {
        settings.digest.max_papers_per_run = v;
    }

    // ── Summarizer ──────────────────────────────────────────────────
    if let Some(v) = env.bool("SIFT_SUMMARIZER_ENABLED") {
        settings.summarizer.enabled = v;
    }
    if let Some(v) = env.string("SIFT_SUMMARIZER_URL") {
        settings.summarizer.base_url = v;
    }
    if let Some(v) = env.string("SIFT_SUMMARIZER_MODEL") {
        settings.summarizer.model = v;
    }
    if let Some(v) = env.string("SIFT_SUMMARIZER_DEVICE") {
        match serde_json::from_value::<Device>(Value::String(v.to_lowercase())) {
            Ok(device) => settings.summarizer.device = device,
            Err(_) => tracing::warn!(key = "SIFT_SUMMARIZER_DEVICE", value = %v, "invalid device env var, ignoring"),
        }
    }

    // ── Email ───────────────────────────────────────────────────────
    if let Some(v) = env.bool("SIFT_EMAIL_ENABLED") {
        settings.channels.email.enabled = v;
    }
    if let Some(v) = env.string("SIFT_SMTP_HOST") {
        settings.channels.email.smtp_host = v;
    }
    if let Some(v) = env.u16("SIFT_SMTP_PORT", 1, 65535) {
        settings.channels.email.smtp_port = v;
    }
    if let Some(v) = env.string("SIFT_SMTP_USERNAME") {
        settings.channels.email.username = v;
    }
    if let Some(v) = env.string("SIFT_SMTP_PASSWORD") {
        settings.channels.email.password = v;
    }
    if let Some(v) = env.string("SIFT_EMAIL_FROM") {
        settings.channels.email.from = v;
    }
    if let Some(v) = env.list("SIFT_EMAIL_TO") {
        settings.channels.email.recipients = v;
    }

    // ── Telegram ────────────────────────────────────────────────────
    if let Some(v) = env.bool("SIFT_TELEGRAM_ENABLED") {
        settings.channels.telegram.enabled = v;
    }
    if let Some(v) = env.string("SIFT_TELEGRAM_BOT_TOKEN") {
        settings.channels.telegram.bot_token = v;
    }
    if let Some(v) = env.string("SIFT_TELEGRAM_CHAT_ID") {
        settings.channels.telegram.chat_id = v;
    }

    // ── Webhook ─────────────────────────────────────────────────────
    if let Some(v) = env.bool("SIFT_WEBHOOK_ENABLED") {
        settings.channels.webhook.enabled = v;
    }
    if let Some(v) = env.string("SIFT_WEBHOOK_URL") {
        settings.channels.webhook.url = v;
    }
    if let Some(v) = env.string("SIFT_WEBHOOK_CHANNEL") {
        settings.channels.webhook.channel = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming and dropping empty items.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn list(&self, name: &str) -> Option<Vec<String>> {
        let items = parse_list(&self.string(name)?);
        (!items.is_empty()).then_some(items)
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
