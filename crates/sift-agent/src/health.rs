//! Periodic health snapshot, written to `{dataDir}/health_status.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sift_core::{RunId, RunStatus};
use sift_cron::{JobState, Scheduler};
use sift_pipeline::Pipeline;
use sift_settings::HealthSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summarizer state at snapshot time.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerHealth {
    /// Summarization requested in settings.
    pub enabled: bool,
    /// A model load has succeeded.
    pub loaded: bool,
}

/// The most recent journaled run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRunHealth {
    /// Run id.
    pub run_id: RunId,
    /// Final status.
    pub status: RunStatus,
    /// Completion time.
    pub finished_at: DateTime<Utc>,
}

/// Component health written on every tick.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// When the snapshot was taken.
    pub checked_at: DateTime<Utc>,
    /// Channels configured, dedup store readable and last run not failed.
    pub healthy: bool,
    /// Scheduler still accepting fires.
    pub scheduler_running: bool,
    /// Job states.
    pub jobs: Vec<JobState>,
    /// Enabled channel names.
    pub channels: Vec<&'static str>,
    /// Summarizer state.
    pub summarizer: SummarizerHealth,
    /// Dedup entries, `None` when the store could not be read.
    pub seen_papers: Option<usize>,
    /// Last journaled run.
    pub last_run: Option<LastRunHealth>,
}

/// Writes [`HealthSnapshot`]s on a fixed interval until shutdown.
pub struct HealthMonitor {
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler,
    path: PathBuf,
    interval: Duration,
}

impl HealthMonitor {
    /// Monitor writing to `{data_dir}/{settings.file}`.
    pub fn new(pipeline: Arc<Pipeline>, scheduler: Scheduler, data_dir: &str, settings: &HealthSettings) -> Self {
        Self {
            pipeline,
            scheduler,
            path: PathBuf::from(data_dir).join(&settings.file),
            interval: Duration::from_secs(u64::from(settings.interval_minutes.max(1)) * 60),
        }
    }

    /// Collect the current state.
    pub fn snapshot(&self, scheduler_running: bool) -> HealthSnapshot {
        let channels = self.pipeline.dispatcher().channel_names();
        let seen_papers = match self.pipeline.dedup().len() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "dedup store unreadable");
                None
            }
        };
        let last_run = match self.pipeline.journal().map(sift_store::RunJournal::last) {
            Some(Ok(Some(run))) => Some(LastRunHealth {
                run_id: run.run_id,
                status: run.status,
                finished_at: run.finished_at,
            }),
            Some(Err(e)) => {
                warn!(error = %e, "failed to read run journal");
                None
            }
            _ => None,
        };
        let summarizer = self.pipeline.summarizer();

        let healthy = !channels.is_empty()
            && seen_papers.is_some()
            && last_run.as_ref().is_none_or(|r| r.status != RunStatus::Failed);

        HealthSnapshot {
            checked_at: Utc::now(),
            healthy,
            scheduler_running,
            jobs: self.scheduler.snapshot(),
            channels,
            summarizer: SummarizerHealth {
                enabled: summarizer.is_enabled(),
                loaded: summarizer.is_loaded(),
            },
            seen_papers,
            last_run,
        }
    }

    /// Take a snapshot and replace the health file with it.
    pub fn write(&self, scheduler_running: bool) -> sift_store::Result<HealthSnapshot> {
        let snapshot = self.snapshot(scheduler_running);
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let body = serde_json::to_vec_pretty(&snapshot)?;
        sift_store::write_atomic(&self.path, &body)?;
        debug!(path = ?self.path, healthy = snapshot.healthy, "health snapshot written");
        Ok(snapshot)
    }

    /// Write immediately, then every interval, until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(path = ?self.path, interval_secs = self.interval.as_secs(), "health monitor started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.write(true) {
                        warn!(error = %e, "failed to write health snapshot");
                    }
                }
            }
        }
        if let Err(e) = self.write(false) {
            warn!(error = %e, "failed to write final health snapshot");
        }
    }
}
