//! Trigger-time computation.
//!
//! Wall-clock cadences are evaluated in the configured timezone. Around DST
//! transitions:
//!
//! - a local time inside a spring-forward gap fires at the first valid
//!   instant after the gap
//! - a local time repeated by a fall-back transition fires once, at the
//!   earlier instant

use std::time::Duration;

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use sift_settings::{CadenceSettings, parse_local_time, parse_weekday};

use crate::errors::{CronError, Result};

/// Longest DST gap we step across, in minutes.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// A job cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at a local time.
    Daily {
        /// Local time of day.
        at: NaiveTime,
    },
    /// Once a week on `weekday` at a local time.
    Weekly {
        /// Day of week.
        weekday: Weekday,
        /// Local time of day.
        at: NaiveTime,
    },
    /// Fixed period, independent of the wall clock.
    Interval {
        /// Time between fires.
        every: Duration,
    },
}

impl Schedule {
    /// Parse cadence settings.
    pub fn from_settings(cadence: &CadenceSettings) -> Result<Self> {
        let invalid = |e: sift_settings::SettingsError| CronError::InvalidSchedule(e.to_string());
        match cadence {
            CadenceSettings::Daily { at } => Ok(Self::Daily {
                at: parse_local_time(at).map_err(invalid)?,
            }),
            CadenceSettings::Weekly { weekday, at } => Ok(Self::Weekly {
                weekday: parse_weekday(weekday).map_err(invalid)?,
                at: parse_local_time(at).map_err(invalid)?,
            }),
            CadenceSettings::Interval { minutes } if *minutes > 0 => Ok(Self::Interval {
                every: Duration::from_secs(u64::from(*minutes) * 60),
            }),
            CadenceSettings::Interval { .. } => {
                Err(CronError::InvalidSchedule("interval must be at least 1 minute".into()))
            }
        }
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match *self {
            Self::Interval { every } => {
                Some(after + chrono::Duration::from_std(every).ok()?)
            }
            Self::Daily { at } => next_wall_clock(after, tz, at, None),
            Self::Weekly { weekday, at } => next_wall_clock(after, tz, at, Some(weekday)),
        }
    }

    /// Short human description.
    pub fn describe(&self) -> String {
        match self {
            Self::Daily { at } => format!("daily at {}", at.format("%H:%M")),
            Self::Weekly { weekday, at } => format!("weekly on {weekday} at {}", at.format("%H:%M")),
            Self::Interval { every } => format!("every {} min", every.as_secs() / 60),
        }
    }
}

fn next_wall_clock(
    after: DateTime<Utc>,
    tz: Tz,
    at: NaiveTime,
    weekday: Option<Weekday>,
) -> Option<DateTime<Utc>> {
    let start = after.with_timezone(&tz).date_naive();
    // Yesterday covers a local time that resolves past midnight after a gap.
    let mut date = start.pred_opt()?;
    for _ in 0..16 {
        if weekday.is_none_or(|wd| date.weekday() == wd) {
            if let Some(instant) = resolve_local(tz, date, at) {
                if instant > after {
                    return Some(instant);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Map a local date and time to an instant, applying the DST rules.
pub fn resolve_local(tz: Tz, date: NaiveDate, at: NaiveTime) -> Option<DateTime<Utc>> {
    let local = date.and_time(at);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => first_valid_after(tz, local),
    }
}

fn first_valid_after(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=MAX_GAP_MINUTES).find_map(|m| {
        let probe = local + chrono::Duration::minutes(m);
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
