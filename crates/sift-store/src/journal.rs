//! Run journal: one JSON document per run plus `last_run.json`.
//!
//! Files are written through [`write_atomic`], so readers never see a
//! half-written document. Per-run files beyond the history limit are
//! deleted oldest first.

use std::path::{Path, PathBuf};

use sift_core::RunResult;
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::errors::Result;

const LAST_RUN_FILE: &str = "last_run.json";
const RUNS_DIR: &str = "runs";

/// Directory-backed record of past runs.
#[derive(Clone, Debug)]
pub struct RunJournal {
    dir: PathBuf,
    keep_history: bool,
    max_history: usize,
}

impl RunJournal {
    /// Journal rooted at `dir`. With `keep_history` every run also gets its
    /// own file under `runs/`, without a limit on how many are kept.
    pub fn new(dir: impl Into<PathBuf>, keep_history: bool) -> Self {
        Self {
            dir: dir.into(),
            keep_history,
            max_history: 0,
        }
    }

    /// Keep at most `max` per-run files. `0` keeps all.
    #[must_use]
    pub fn with_history_limit(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    /// Persist `result`. Returns the path of `last_run.json`.
    pub fn record(&self, result: &RunResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(result)?;

        if self.keep_history {
            let runs = self.dir.join(RUNS_DIR);
            std::fs::create_dir_all(&runs)?;
            let name = format!(
                "run_{}_{}.json",
                result.started_at.format("%Y%m%dT%H%M%S"),
                result.run_id
            );
            write_atomic(&runs.join(name), &body)?;
            if let Err(e) = self.trim_history(&runs) {
                warn!(error = %e, "failed to trim run history");
            }
        }

        let last = self.dir.join(LAST_RUN_FILE);
        write_atomic(&last, &body)?;
        debug!(path = ?last, run_id = %result.run_id, "run recorded");
        Ok(last)
    }

    /// Most recent run, if any.
    pub fn last(&self) -> Result<Option<RunResult>> {
        let path = self.dir.join(LAST_RUN_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Up to `limit` past runs, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<RunResult>> {
        let runs = self.dir.join(RUNS_DIR);
        if !runs.exists() {
            return Ok(Vec::new());
        }
        let mut files = run_files(&runs)?;
        files.reverse();

        let mut out = Vec::new();
        for path in files.into_iter().take(limit) {
            let content = std::fs::read(&path)?;
            out.push(serde_json::from_slice(&content)?);
        }
        Ok(out)
    }

    fn trim_history(&self, runs: &Path) -> Result<()> {
        if self.max_history == 0 {
            return Ok(());
        }
        let files = run_files(runs)?;
        let excess = files.len().saturating_sub(self.max_history);
        for path in &files[..excess] {
            std::fs::remove_file(path)?;
        }
        if excess > 0 {
            debug!(removed = excess, "trimmed run history");
        }
        Ok(())
    }
}

/// Per-run files, oldest first. Names start with the run's start time.
fn run_files(runs: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(runs)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name().is_some_and(|n| n.to_string_lossy().starts_with("run_"))
        })
        .collect();
    files.sort();
    Ok(files)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
