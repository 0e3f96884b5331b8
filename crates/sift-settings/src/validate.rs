//! Startup validation.
//!
//! Runs once before any scheduling begins. The first problem found is
//! returned; for missing credentials the error names the exact field.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;

use crate::errors::{Result, SettingsError};
use crate::types::{CadenceSettings, SiftSettings};

impl SiftSettings {
    /// Check that the settings describe a runnable configuration.
    pub fn validate(&self) -> Result<()> {
        self.validate_pipeline()?;
        self.validate_channels()?;
        self.validate_schedule()?;
        Ok(())
    }

    /// Checks that do not involve notification channels.
    pub fn validate_pipeline(&self) -> Result<()> {
        if self.source.categories.is_empty() {
            return Err(SettingsError::MissingField {
                section: "source",
                field: "categories",
            });
        }
        if self.source.base_url.is_empty() {
            return Err(SettingsError::MissingField {
                section: "source",
                field: "baseUrl",
            });
        }
        if self.source.days_lookback == 0 {
            return Err(SettingsError::InvalidValue(
                "source.daysLookback must be at least 1".into(),
            ));
        }
        if self.digest.max_papers_per_run == 0 {
            return Err(SettingsError::InvalidValue(
                "digest.maxPapersPerRun must be at least 1".into(),
            ));
        }
        if self.summarizer.batch_size == 0 {
            return Err(SettingsError::InvalidValue(
                "summarizer.batchSize must be at least 1".into(),
            ));
        }
        if self.summarizer.min_length > self.summarizer.max_length {
            return Err(SettingsError::InvalidValue(format!(
                "summarizer.minLength ({}) exceeds summarizer.maxLength ({})",
                self.summarizer.min_length, self.summarizer.max_length
            )));
        }
        if self.summarizer.enabled && self.summarizer.base_url.is_empty() {
            return Err(SettingsError::MissingField {
                section: "summarizer",
                field: "baseUrl",
            });
        }
        if self.health.enabled {
            if self.health.interval_minutes == 0 {
                return Err(SettingsError::InvalidValue(
                    "health.intervalMinutes must be at least 1".into(),
                ));
            }
            require("health", "file", &self.health.file)?;
        }
        Ok(())
    }

    /// Credential checks for every enabled channel.
    pub fn validate_channels(&self) -> Result<()> {
        let channels = &self.channels;
        if channels.enabled_names().is_empty() {
            return Err(SettingsError::NoChannels);
        }

        let email = &channels.email;
        if email.enabled {
            require("channels.email", "smtpHost", &email.smtp_host)?;
            require("channels.email", "username", &email.username)?;
            require("channels.email", "password", &email.password)?;
            if email.recipients.iter().all(|r| r.trim().is_empty()) {
                return Err(SettingsError::MissingField {
                    section: "channels.email",
                    field: "recipients",
                });
            }
        }

        let telegram = &channels.telegram;
        if telegram.enabled {
            require("channels.telegram", "botToken", &telegram.bot_token)?;
            require("channels.telegram", "chatId", &telegram.chat_id)?;
        }

        let webhook = &channels.webhook;
        if webhook.enabled {
            require("channels.webhook", "url", &webhook.url)?;
            if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
                return Err(SettingsError::InvalidValue(format!(
                    "channels.webhook.url must be an http(s) URL, got {}",
                    webhook.url
                )));
            }
        }
        Ok(())
    }

    /// Timezone and job cadence checks.
    pub fn validate_schedule(&self) -> Result<()> {
        let _ = parse_timezone(&self.schedule.timezone)?;

        let mut seen = HashSet::new();
        for job in &self.schedule.jobs {
            if job.id.trim().is_empty() {
                return Err(SettingsError::MissingField {
                    section: "schedule.jobs",
                    field: "id",
                });
            }
            if !seen.insert(job.id.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate job id {}",
                    job.id
                )));
            }
            match &job.cadence {
                CadenceSettings::Daily { at } => {
                    let _ = parse_local_time(at)?;
                }
                CadenceSettings::Weekly { weekday, at } => {
                    let _ = parse_weekday(weekday)?;
                    let _ = parse_local_time(at)?;
                }
                CadenceSettings::Interval { minutes } => {
                    if *minutes == 0 {
                        return Err(SettingsError::InvalidValue(format!(
                            "job {} interval must be at least 1 minute",
                            job.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn require(section: &'static str, field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SettingsError::MissingField { section, field })
    } else {
        Ok(())
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name).map_err(|_| SettingsError::InvalidValue(format!("unknown timezone {name}")))
}

/// Parse a local `HH:MM` time.
pub fn parse_local_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| SettingsError::InvalidValue(format!("invalid time {value}, expected HH:MM")))
}

/// Parse a weekday name (`monday`, `Mon`, ...).
pub fn parse_weekday(value: &str) -> Result<Weekday> {
    Weekday::from_str(value.trim())
        .map_err(|_| SettingsError::InvalidValue(format!("invalid weekday {value}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
