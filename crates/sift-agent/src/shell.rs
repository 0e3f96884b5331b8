//! Interactive command loop: `run`, `test`, `status`, `quit`.
//!
//! Lines come from a dedicated stdin thread over a channel, so a pending
//! read never holds up runtime shutdown.

use std::io::{BufRead, Write};
use std::sync::Arc;

use sift_core::{JobId, RunResult, RunTrigger};
use sift_cron::{JobPhase, JobState, Scheduler, TriggerOutcome};
use sift_pipeline::Pipeline;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const HELP: &str = "commands: run [job] | test | status | help | quit";
const RECENT_RUNS: usize = 5;

/// One parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Trigger a job now (first registered job when omitted).
    Run(Option<JobId>),
    /// Send a test notification through every channel.
    Test,
    /// Print job states and the last run.
    Status,
    /// Print the command list.
    Help,
    /// Leave the shell and shut down.
    Quit,
    /// Blank line.
    Empty,
    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Parse a line of user input.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Empty;
        };
        match head.to_ascii_lowercase().as_str() {
            "run" => Self::Run(words.next().map(JobId::from)),
            "test" => Self::Test,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Read stdin lines on a plain thread and forward them.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("sift-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start stdin reader");
    }
    rx
}

/// The interactive shell.
pub struct Shell {
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler,
    shutdown: CancellationToken,
}

impl Shell {
    /// Shell over a running scheduler.
    pub fn new(pipeline: Arc<Pipeline>, scheduler: Scheduler, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            scheduler,
            shutdown,
        }
    }

    /// Process commands until `quit`, end of input or shutdown.
    pub async fn run(&self, mut lines: mpsc::Receiver<String>, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "{HELP}")?;
        loop {
            write!(out, "sift> ")?;
            out.flush()?;

            let line = tokio::select! {
                () = self.shutdown.cancelled() => break,
                line = lines.recv() => line,
            };
            let Some(line) = line else { break };

            match Command::parse(&line) {
                Command::Quit => break,
                Command::Empty => {}
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Unknown(word) => writeln!(out, "unknown command: {word}\n{HELP}")?,
                Command::Status => writeln!(out, "{}", self.status())?,
                Command::Test => {
                    for outcome in self.pipeline.dispatcher().send_test().await {
                        match outcome.error {
                            None => writeln!(out, "{}: ok", outcome.channel)?,
                            Some(e) => writeln!(out, "{}: failed ({e})", outcome.channel)?,
                        }
                    }
                }
                Command::Run(job) => {
                    let message = self.run_now(job).await;
                    writeln!(out, "{message}")?;
                }
            }
        }
        writeln!(out)?;
        Ok(())
    }

    async fn run_now(&self, job: Option<JobId>) -> String {
        let Some(job) = job.or_else(|| self.scheduler.job_ids().into_iter().next()) else {
            let result = self
                .pipeline
                .run(None, RunTrigger::Manual, &self.shutdown)
                .await;
            return result.summary_line();
        };

        match self.scheduler.trigger_now(&job, self.shutdown.child_token()) {
            Ok(TriggerOutcome::Started(handle)) => match handle.wait().await {
                Some(result) => result.summary_line(),
                None => format!("run of {job} aborted"),
            },
            Ok(TriggerOutcome::Skipped) => format!("{job} is already running, trigger skipped"),
            Err(e) => e.to_string(),
        }
    }

    fn status(&self) -> String {
        let (last, recent) = match self.pipeline.journal() {
            Some(journal) => {
                let last = journal.last().unwrap_or_else(|e| {
                    warn!(error = %e, "failed to read run journal");
                    None
                });
                let recent = journal.history(RECENT_RUNS).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to read run history");
                    Vec::new()
                });
                (last, recent)
            }
            None => (None, Vec::new()),
        };
        let seen = self.pipeline.dedup().len().unwrap_or(0);
        format_status(&self.scheduler.snapshot(), last.as_ref(), &recent, seen)
    }
}

/// Render job states, the last run and recent history for the `status` command.
pub fn format_status(jobs: &[JobState], last: Option<&RunResult>, recent: &[RunResult], seen: usize) -> String {
    let mut lines = Vec::with_capacity(jobs.len() + recent.len() + 4);
    if jobs.is_empty() {
        lines.push("no scheduled jobs".to_string());
    }
    for job in jobs {
        let phase = match &job.phase {
            JobPhase::Idle => "idle".to_string(),
            JobPhase::Running { since } => format!("running since {}", since.format("%H:%M:%S")),
            JobPhase::Succeeded { at } => format!("succeeded at {}", at.format("%Y-%m-%d %H:%M")),
            JobPhase::Failed { at, error } => format!("failed at {} ({error})", at.format("%Y-%m-%d %H:%M")),
        };
        let next = job
            .next_fire
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        lines.push(format!(
            "{} [{}] {phase}; next {next}; runs {} skipped {}",
            job.id, job.cadence, job.runs, job.skipped
        ));
    }
    match last {
        Some(run) => lines.push(format!(
            "last run {} at {}: {}",
            run.run_id,
            run.finished_at.format("%Y-%m-%d %H:%M UTC"),
            run.summary_line()
        )),
        None => lines.push("no runs recorded".to_string()),
    }
    if !recent.is_empty() {
        lines.push("recent runs:".to_string());
        for run in recent {
            lines.push(format!(
                "  {} {}",
                run.started_at.format("%Y-%m-%d %H:%M"),
                run.summary_line()
            ));
        }
    }
    lines.push(format!("papers seen: {seen}"));
    lines.join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
