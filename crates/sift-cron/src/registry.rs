//! Job registry: job id → lifecycle state machine.
//!
//! ```text
//! Idle ──begin──▶ Running ──finish(ok)──▶ Succeeded ──begin──▶ Running ...
//!                    │
//!                    └──finish(err)──▶ Failed ──begin──▶ Running ...
//! ```
//!
//! `begin` on a `Running` job is refused, which is the only mutual exclusion
//! between runs of one job. All methods take `now` explicitly so the registry
//! can be driven with synthetic time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sift_core::JobId;
use sift_settings::{ScheduleSettings, parse_timezone};
use tracing::debug;

use crate::errors::{CronError, Result};
use crate::schedule::Schedule;

/// Lifecycle phase of one job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum JobPhase {
    /// Registered, never run.
    Idle,
    /// A run is in progress.
    #[serde(rename_all = "camelCase")]
    Running {
        /// When the run started.
        since: DateTime<Utc>,
    },
    /// Last run completed.
    #[serde(rename_all = "camelCase")]
    Succeeded {
        /// Completion time.
        at: DateTime<Utc>,
    },
    /// Last run failed or panicked.
    #[serde(rename_all = "camelCase")]
    Failed {
        /// Completion time.
        at: DateTime<Utc>,
        /// Failure description.
        error: String,
    },
}

impl JobPhase {
    /// Short phase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Registry entry for one job.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    /// Job id.
    pub id: JobId,
    /// Human-readable cadence.
    pub cadence: String,
    /// Current phase.
    #[serde(flatten)]
    pub phase: JobPhase,
    /// Next scheduled fire time, if any.
    pub next_fire: Option<DateTime<Utc>>,
    /// Runs started.
    pub runs: u64,
    /// Triggers refused because a run was active.
    pub skipped: u64,
    #[serde(skip)]
    schedule: Schedule,
}

/// All registered jobs and their state.
#[derive(Debug)]
pub struct JobRegistry {
    tz: Tz,
    jobs: BTreeMap<JobId, JobState>,
}

impl JobRegistry {
    /// Empty registry evaluating wall-clock cadences in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            jobs: BTreeMap::new(),
        }
    }

    /// Build a registry from schedule settings. Disabled jobs are skipped.
    pub fn from_settings(settings: &ScheduleSettings, now: DateTime<Utc>) -> Result<Self> {
        let tz = parse_timezone(&settings.timezone)
            .map_err(|e| CronError::InvalidSchedule(e.to_string()))?;
        let mut registry = Self::new(tz);
        for job in settings.jobs.iter().filter(|j| j.enabled) {
            let schedule = Schedule::from_settings(&job.cadence)?;
            registry.register(JobId::from(job.id.as_str()), schedule, now)?;
        }
        Ok(registry)
    }

    /// Timezone for wall-clock cadences.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Register a job; its first fire is computed from `now`.
    pub fn register(&mut self, id: JobId, schedule: Schedule, now: DateTime<Utc>) -> Result<()> {
        if self.jobs.contains_key(&id) {
            return Err(CronError::DuplicateJob(id));
        }
        let next_fire = schedule.next_after(now, self.tz);
        debug!(job = %id, cadence = %schedule.describe(), next_fire = ?next_fire, "job registered");
        let state = JobState {
            id: id.clone(),
            cadence: schedule.describe(),
            phase: JobPhase::Idle,
            next_fire,
            runs: 0,
            skipped: 0,
            schedule,
        };
        let _ = self.jobs.insert(id, state);
        Ok(())
    }

    /// Look up a job.
    pub fn get(&self, id: &JobId) -> Option<&JobState> {
        self.jobs.get(id)
    }

    /// Registered job ids, sorted.
    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.keys().cloned().collect()
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs whose next fire time has been reached.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|j| j.next_fire.is_some_and(|t| t <= now))
            .map(|j| j.id.clone())
            .collect()
    }

    /// Earliest upcoming fire time across all jobs.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.jobs.values().filter_map(|j| j.next_fire).min()
    }

    /// Consume a due fire: schedule the next one strictly after `now`.
    /// Missed fires collapse into this one.
    pub fn advance(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        let tz = self.tz;
        let job = self.job_mut(id)?;
        job.next_fire = job.schedule.next_after(now, tz);
        Ok(())
    }

    /// Move a job to `Running`. Refused (and counted) if already running.
    pub fn try_begin(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        let job = self.job_mut(id)?;
        if job.phase.is_running() {
            job.skipped += 1;
            return Err(CronError::AlreadyRunning(id.clone()));
        }
        job.phase = JobPhase::Running { since: now };
        job.runs += 1;
        Ok(())
    }

    /// Move a running job to `Succeeded` or `Failed`.
    pub fn finish(
        &mut self,
        id: &JobId,
        outcome: std::result::Result<(), String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let job = self.job_mut(id)?;
        if !job.phase.is_running() {
            return Err(CronError::InvalidTransition {
                job: id.clone(),
                action: "finish",
                phase: job.phase.name(),
            });
        }
        job.phase = match outcome {
            Ok(()) => JobPhase::Succeeded { at: now },
            Err(error) => JobPhase::Failed { at: now, error },
        };
        Ok(())
    }

    /// Point-in-time copy of every job, for status output.
    pub fn snapshot(&self) -> Vec<JobState> {
        self.jobs.values().cloned().collect()
    }

    fn job_mut(&mut self, id: &JobId) -> Result<&mut JobState> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| CronError::UnknownJob(id.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
