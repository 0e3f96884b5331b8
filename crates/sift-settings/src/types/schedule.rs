use serde::{Deserialize, Serialize};

/// When a job fires. Times are `HH:MM` in the schedule timezone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CadenceSettings {
    /// Every day at a local time.
    Daily {
        /// Local time, `HH:MM`.
        at: String,
    },
    /// Once a week.
    Weekly {
        /// Day name (`monday`, `mon`, ...).
        weekday: String,
        /// Local time, `HH:MM`.
        at: String,
    },
    /// Fixed interval from scheduler start.
    Interval {
        /// Minutes between runs.
        minutes: u32,
    },
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self::Daily {
            at: "09:00".to_string(),
        }
    }
}

/// One scheduled digest job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobSettings {
    /// Stable job id.
    pub id: String,
    /// Whether the scheduler registers this job.
    pub enabled: bool,
    /// Trigger cadence.
    pub cadence: CadenceSettings,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            id: "daily".to_string(),
            enabled: true,
            cadence: CadenceSettings::default(),
        }
    }
}

/// What a manual trigger does while the job is already running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualTriggerPolicy {
    /// Report an error to the caller.
    #[default]
    Reject,
    /// Log and report the trigger as skipped.
    Skip,
}

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleSettings {
    /// IANA timezone for wall-clock cadences.
    pub timezone: String,
    /// Registered jobs.
    pub jobs: Vec<JobSettings>,
    /// Manual trigger behavior while a run is active.
    pub manual_trigger: ManualTriggerPolicy,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            jobs: vec![JobSettings::default()],
            manual_trigger: ManualTriggerPolicy::Reject,
        }
    }
}
