//! Dispatch outcomes and run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::DigestPayload;
use crate::ids::{JobId, RunId};

/// Result of delivering one digest to one channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Channel name (`email`, `telegram`, `webhook`).
    pub channel: String,
    /// Whether delivery eventually succeeded.
    pub success: bool,
    /// Last error if delivery failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries performed after the first attempt.
    pub retries: u32,
}

impl DispatchOutcome {
    /// Successful delivery.
    pub fn delivered(channel: impl Into<String>, retries: u32) -> Self {
        Self {
            channel: channel.into(),
            success: true,
            error: None,
            retries,
        }
    }

    /// Failed delivery.
    pub fn failed(channel: impl Into<String>, error: impl Into<String>, retries: u32) -> Self {
        Self {
            channel: channel.into(),
            success: false,
            error: Some(error.into()),
            retries,
        }
    }
}

/// Overall run status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Everything worked (including runs with nothing new to send).
    Success,
    /// Completed with partial failures; output still delivered.
    Degraded,
    /// Aborted, or no channel accepted the digest.
    Failed,
    /// Stopped at a stage boundary because of shutdown.
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Fired by the scheduler.
    Scheduled,
    /// Requested interactively.
    Manual,
    /// Single run from the command line.
    Once,
}

/// Everything observable about one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Run identifier.
    pub run_id: RunId,
    /// Job that owns the run, if scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// How the run started.
    pub trigger: RunTrigger,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Overall status.
    pub status: RunStatus,
    /// Assembled digest, absent when the run aborted before assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<DigestPayload>,
    /// Per-channel delivery results.
    #[serde(default)]
    pub outcomes: Vec<DispatchOutcome>,
    /// Degradation notes (failed categories, fallback summaries, ...).
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Fatal error message for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// Number of channels that accepted the digest.
    pub fn channels_succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Number of channels that rejected the digest.
    pub fn channels_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// Papers included in the digest.
    pub fn papers_sent(&self) -> usize {
        self.payload.as_ref().map_or(0, DigestPayload::len)
    }

    /// One-line summary for terminal output.
    pub fn summary_line(&self) -> String {
        let stats = self.payload.as_ref().map(|p| &p.stats);
        format!(
            "status={} fetched={} matched={} duplicates={} deferred={} sent={} channels_ok={} channels_failed={} duration_ms={}",
            self.status,
            stats.map_or(0, |s| s.fetched),
            stats.map_or(0, |s| s.matched),
            stats.map_or(0, |s| s.duplicates),
            stats.map_or(0, |s| s.deferred),
            self.papers_sent(),
            self.channels_succeeded(),
            self.channels_failed(),
            self.duration_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestStats;

    fn result(outcomes: Vec<DispatchOutcome>) -> RunResult {
        let now = Utc::now();
        RunResult {
            run_id: RunId::new(),
            job_id: Some(JobId::from("daily")),
            trigger: RunTrigger::Scheduled,
            started_at: now,
            finished_at: now,
            duration_ms: 12,
            status: RunStatus::Degraded,
            payload: Some(DigestPayload {
                run_id: RunId::new(),
                generated_at: now,
                entries: vec![],
                stats: DigestStats {
                    fetched: 10,
                    matched: 4,
                    duplicates: 1,
                    ..DigestStats::default()
                },
            }),
            outcomes,
            warnings: vec![],
            error: None,
        }
    }

    #[test]
    fn counts_channel_outcomes() {
        let r = result(vec![
            DispatchOutcome::delivered("email", 0),
            DispatchOutcome::failed("telegram", "502", 2),
        ]);
        assert_eq!(r.channels_succeeded(), 1);
        assert_eq!(r.channels_failed(), 1);
    }

    #[test]
    fn summary_line_reports_counters() {
        let line = result(vec![DispatchOutcome::delivered("email", 0)]).summary_line();
        assert!(line.contains("status=degraded"));
        assert!(line.contains("fetched=10"));
        assert!(line.contains("matched=4"));
        assert!(line.contains("channels_ok=1"));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RunStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(serde_json::to_string(&RunTrigger::Once).unwrap(), "\"once\"");
    }
}
