//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their [`Default`] value.

mod channels;
mod filter;
mod schedule;
mod source;
mod summarizer;

pub use channels::*;
pub use filter::*;
pub use schedule::*;
pub use source::*;
pub use summarizer::*;

use serde::{Deserialize, Serialize};
use sift_core::logging::LogFormat;

/// Root settings type.
///
/// Loaded from `~/.sift/settings.json` (or `--config`) with defaults for
/// missing fields. Environment variables override specific values.
///
/// ```json
/// {
///   "source": { "categories": ["cs.AI"] },
///   "filter": { "keywords": ["transformer", "\"deep learning\""] },
///   "channels": { "telegram": { "enabled": true, "botToken": "...", "chatId": "42" } }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiftSettings {
    /// Directory for the dedup database and run journal.
    pub data_dir: String,
    /// Logging.
    pub logging: LoggingSettings,
    /// Upstream fetch.
    pub source: SourceSettings,
    /// Match filter.
    pub filter: FilterSettings,
    /// Summarization.
    pub summarizer: SummarizerSettings,
    /// Digest assembly.
    pub digest: DigestSettings,
    /// Dedup store.
    pub dedup: DedupSettings,
    /// Notification channels.
    pub channels: ChannelSettings,
    /// Scheduler.
    pub schedule: ScheduleSettings,
    /// Periodic health snapshot.
    pub health: HealthSettings,
}

impl Default for SiftSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            logging: LoggingSettings::default(),
            source: SourceSettings::default(),
            filter: FilterSettings::default(),
            summarizer: SummarizerSettings::default(),
            digest: DigestSettings::default(),
            dedup: DedupSettings::default(),
            channels: ChannelSettings::default(),
            schedule: ScheduleSettings::default(),
            health: HealthSettings::default(),
        }
    }
}

fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.sift")
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace` .. `error`); `RUST_LOG` wins when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Digest assembly settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestSettings {
    /// Maximum papers per digest; the rest wait for the next run.
    pub max_papers_per_run: usize,
    /// Keep per-run JSON files under `{dataDir}/runs`.
    pub keep_run_history: bool,
    /// Most per-run files kept; older ones are deleted. `0` keeps all.
    pub max_run_history: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            max_papers_per_run: 10,
            keep_run_history: true,
            max_run_history: 200,
        }
    }
}

/// When papers are recorded as seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkPolicy {
    /// As soon as the digest is assembled, before dispatch.
    #[default]
    OnAssembly,
    /// After at least one channel accepted the digest.
    OnDelivery,
}

/// Dedup store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupSettings {
    /// Database file name inside the data directory.
    pub db_file: String,
    /// Entries older than this many days are pruned once a run has fetched successfully.
    pub retention_days: u32,
    /// Mark-seen timing.
    pub mark_policy: MarkPolicy,
    /// With `onDelivery`: failed runs after which papers are marked anyway.
    pub max_redelivery_attempts: u32,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            db_file: "seen.db".to_string(),
            retention_days: 30,
            mark_policy: MarkPolicy::OnAssembly,
            max_redelivery_attempts: 3,
        }
    }
}

/// Health snapshot written periodically in scheduled modes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthSettings {
    /// Write snapshots at all.
    pub enabled: bool,
    /// Minutes between snapshots.
    pub interval_minutes: u32,
    /// File name inside the data directory.
    pub file: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
            file: "health_status.json".to_string(),
        }
    }
}
