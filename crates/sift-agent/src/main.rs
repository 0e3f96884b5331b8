//! # sift
//!
//! Command-line entry point: loads and validates settings, wires the
//! pipeline and scheduler together and runs one of four modes.
//!
//! | flag                   | mode                                     |
//! |------------------------|------------------------------------------|
//! | `--run-once`           | one pipeline run, then exit              |
//! | `--daemon`             | scheduler until SIGINT/SIGTERM           |
//! | `--test-notifications` | test message per channel, then exit      |
//! | (none)                 | scheduler plus an interactive shell      |
//!
//! Both scheduled modes also write a periodic health snapshot. The daemon
//! announces its start through every channel.

#![deny(unsafe_code)]

mod health;
mod runner;
mod shell;
mod shutdown;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use sift_core::{DispatchOutcome, RunResult, RunStatus, RunTrigger};
use sift_cron::{JobState, Scheduler};
use sift_pipeline::Pipeline;
use sift_settings::SiftSettings;
use tracing::{info, warn};

use crate::health::HealthMonitor;
use crate::runner::PipelineJobRunner;
use crate::shell::{Shell, spawn_stdin_reader};
use crate::shutdown::ShutdownCoordinator;

/// Scheduled arXiv digest.
#[derive(Parser, Debug)]
#[command(name = "sift", version, about = "Scheduled arXiv paper digest")]
struct Cli {
    /// Settings file (defaults to `~/.sift/settings.json`).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run the pipeline once and exit.
    #[arg(long, conflicts_with_all = ["daemon", "test_notifications"])]
    run_once: bool,

    /// Run the scheduler until interrupted.
    #[arg(long, conflicts_with = "test_notifications")]
    daemon: bool,

    /// Send a test message through every enabled channel and exit.
    #[arg(long)]
    test_notifications: bool,

    /// Log level, overriding the settings file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    RunOnce,
    Daemon,
    TestNotifications,
    Interactive,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.run_once {
            Mode::RunOnce
        } else if self.daemon {
            Mode::Daemon
        } else if self.test_notifications {
            Mode::TestNotifications
        } else {
            Mode::Interactive
        }
    }
}

fn load_settings(cli: &Cli) -> Result<SiftSettings> {
    let path = cli.config.clone().unwrap_or_else(sift_settings::settings_path);
    sift_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))
}

/// A failed run-once exits non-zero; degraded and empty runs do not.
fn run_failed(result: &RunResult) -> bool {
    result.status == RunStatus::Failed
}

/// Body of the daemon start notice.
fn startup_message(jobs: &[JobState], now: DateTime<Utc>) -> String {
    let mut lines = vec![format!("sift started at {}", now.format("%Y-%m-%d %H:%M:%S UTC"))];
    if jobs.is_empty() {
        lines.push("no scheduled jobs".to_string());
    }
    for job in jobs {
        let next = job
            .next_fire
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        lines.push(format!("{} ({}), next {next}", job.id, job.cadence));
    }
    lines.join("\n")
}

/// Best-effort start notice. Returns how many channels accepted it.
async fn announce_startup(pipeline: &Pipeline, jobs: &[JobState]) -> usize {
    let accepted = pipeline
        .dispatcher()
        .send_notice("sift started", &startup_message(jobs, Utc::now()))
        .await;
    info!(accepted, "startup notice sent");
    accepted
}

/// Notification test fails only when no channel accepted the message.
fn all_failed(outcomes: &[DispatchOutcome]) -> bool {
    !outcomes.is_empty() && outcomes.iter().all(|o| !o.success)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    sift_core::logging::init_subscriber(level, settings.logging.format);

    settings.validate().context("invalid configuration")?;

    let mode = cli.mode();
    let pipeline = Arc::new(Pipeline::from_settings(&settings).context("failed to initialize pipeline")?);
    info!(
        ?mode,
        channels = ?pipeline.dispatcher().channel_names(),
        categories = ?settings.source.categories,
        "sift starting"
    );

    match mode {
        Mode::RunOnce => run_once(&pipeline).await,
        Mode::TestNotifications => test_notifications(&pipeline).await,
        Mode::Daemon | Mode::Interactive => scheduled(&settings, pipeline, mode).await,
    }
}

async fn run_once(pipeline: &Pipeline) -> Result<ExitCode> {
    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.listen_for_signals();

    let result = pipeline.run(None, RunTrigger::Once, &shutdown.token()).await;
    println!("{}", result.summary_line());
    for outcome in result.outcomes.iter().filter(|o| !o.success) {
        println!("  {}: {}", outcome.channel, outcome.error.as_deref().unwrap_or("failed"));
    }

    shutdown.graceful_shutdown(vec![signals], None).await;
    if run_failed(&result) {
        warn!(error = result.error.as_deref().unwrap_or("-"), "run failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn test_notifications(pipeline: &Pipeline) -> Result<ExitCode> {
    let outcomes = pipeline.dispatcher().send_test().await;
    for outcome in &outcomes {
        match &outcome.error {
            None => println!("{}: ok", outcome.channel),
            Some(e) => println!("{}: failed ({e})", outcome.channel),
        }
    }
    Ok(if all_failed(&outcomes) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn scheduled(settings: &SiftSettings, pipeline: Arc<Pipeline>, mode: Mode) -> Result<ExitCode> {
    let notify_errors = mode == Mode::Daemon && settings.channels.error_notifications;
    let runner = Arc::new(PipelineJobRunner::new(pipeline.clone(), notify_errors));
    let scheduler = Scheduler::from_settings(&settings.schedule, runner).context("invalid schedule")?;
    for job in scheduler.snapshot() {
        info!(job = %job.id, cadence = %job.cadence, next_fire = ?job.next_fire, "job scheduled");
    }

    if mode == Mode::Daemon && settings.channels.startup_notification {
        let _ = announce_startup(&pipeline, &scheduler.snapshot()).await;
    }

    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.listen_for_signals();
    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        let token = shutdown.token();
        async move { scheduler.run(token).await }
    });
    let mut tasks = vec![scheduler_task, signals];
    if settings.health.enabled {
        let monitor = HealthMonitor::new(pipeline.clone(), scheduler.clone(), &settings.data_dir, &settings.health);
        tasks.push(tokio::spawn(monitor.run(shutdown.token())));
    }

    if mode == Mode::Interactive {
        let shell = Shell::new(pipeline, scheduler, shutdown.token());
        let mut stdout = std::io::stdout();
        if let Err(e) = shell.run(spawn_stdin_reader(), &mut stdout).await {
            warn!(error = %e, "shell output failed");
        }
    } else {
        shutdown.token().cancelled().await;
    }

    shutdown.graceful_shutdown(tasks, None).await;
    info!("shutdown complete");
    Ok(ExitCode::SUCCESS)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
