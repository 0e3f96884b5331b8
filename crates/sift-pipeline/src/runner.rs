//! End-to-end pipeline run.
//!
//! Stages, in order: fetch → prune → filter → dedup → select → summarize →
//! assemble → mark seen → dispatch → journal. Cancellation is honoured at
//! the boundaries up to marking. After papers are marked the run always
//! completes dispatch, bounded by channel timeouts.
//!
//! Runs are serialized per pipeline: jobs share one dedup store, so a second
//! run waits until the active one has marked and dispatched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sift_core::{
    DigestPayload, DigestStats, DispatchOutcome, JobId, RunId, RunResult, RunStatus, RunTrigger,
};
use sift_notify::DispatchCoordinator;
use sift_settings::{MarkPolicy, SiftSettings};
use sift_source::{ArxivClient, FetchWindow, PaperSource, SourceError};
use sift_store::{DedupStore, RunJournal};
use sift_summarizer::{SummarizerGateway, SummaryInput};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::assembler::{assemble, select};
use crate::errors::{PipelineError, Result};
use crate::filter::MatchFilter;

/// Per-run knobs taken from settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Categories to fetch and match.
    pub categories: Vec<String>,
    /// Fetch window length in days.
    pub days_lookback: u32,
    /// Per-run digest cap.
    pub max_papers: usize,
    /// Dedup retention; `0` keeps entries forever.
    pub retention_days: u32,
    /// When papers are marked seen.
    pub mark_policy: MarkPolicy,
    /// With [`MarkPolicy::OnDelivery`]: failed deliveries before marking anyway.
    pub max_redelivery_attempts: u32,
    /// Length of extractive fallbacks.
    pub fallback_chars: usize,
}

impl PipelineOptions {
    /// Extract from full settings.
    pub fn from_settings(settings: &SiftSettings) -> Self {
        Self {
            categories: settings.source.categories.clone(),
            days_lookback: settings.source.days_lookback,
            max_papers: settings.digest.max_papers_per_run,
            retention_days: settings.dedup.retention_days,
            mark_policy: settings.dedup.mark_policy,
            max_redelivery_attempts: settings.dedup.max_redelivery_attempts,
            fallback_chars: settings.summarizer.fallback_chars,
        }
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    run_id: RunId,
    started_at: DateTime<Utc>,
    degraded: bool,
    warnings: Vec<String>,
    payload: Option<DigestPayload>,
    outcomes: Vec<DispatchOutcome>,
}

impl RunState {
    fn degrade(&mut self, warning: String) {
        warn!(run_id = %self.run_id, "{warning}");
        self.degraded = true;
        self.warnings.push(warning);
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// The assembled pipeline. Cheap to share behind an `Arc`.
pub struct Pipeline {
    source: Arc<dyn PaperSource>,
    filter: MatchFilter,
    summarizer: Arc<SummarizerGateway>,
    dedup: Arc<DedupStore>,
    dispatcher: Arc<DispatchCoordinator>,
    journal: Option<RunJournal>,
    options: PipelineOptions,
    active: Mutex<()>,
}

impl Pipeline {
    /// Pipeline over explicit components.
    pub fn new(
        source: Arc<dyn PaperSource>,
        filter: MatchFilter,
        summarizer: Arc<SummarizerGateway>,
        dedup: Arc<DedupStore>,
        dispatcher: Arc<DispatchCoordinator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            filter,
            summarizer,
            dedup,
            dispatcher,
            journal: None,
            options,
            active: Mutex::new(()),
        }
    }

    /// Persist every run result to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Build every component from validated settings.
    pub fn from_settings(settings: &SiftSettings) -> Result<Self> {
        let data_dir = PathBuf::from(&settings.data_dir);
        let source = ArxivClient::new(&settings.source)?;
        let dedup = DedupStore::open(&data_dir.join(&settings.dedup.db_file))?;
        let summarizer = SummarizerGateway::from_settings(&settings.summarizer)?;
        let dispatcher = DispatchCoordinator::from_settings(&settings.channels)?;
        let filter = MatchFilter::new(&settings.source.categories, &settings.filter);

        Ok(Self::new(
            Arc::new(source),
            filter,
            Arc::new(summarizer),
            Arc::new(dedup),
            Arc::new(dispatcher),
            PipelineOptions::from_settings(settings),
        )
        .with_journal(
            RunJournal::new(data_dir, settings.digest.keep_run_history)
                .with_history_limit(settings.digest.max_run_history),
        ))
    }

    /// Dedup store shared across runs.
    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Summarizer gateway, for health reporting.
    pub fn summarizer(&self) -> &SummarizerGateway {
        &self.summarizer
    }

    /// Channel coordinator, for test and error notices.
    pub fn dispatcher(&self) -> &DispatchCoordinator {
        &self.dispatcher
    }

    /// Run journal, if configured.
    pub fn journal(&self) -> Option<&RunJournal> {
        self.journal.as_ref()
    }

    /// Execute one full run. Never panics on component failure; the outcome
    /// is always reported through the returned [`RunResult`].
    ///
    /// Waits for any run already in progress on this pipeline to finish.
    pub async fn run(
        &self,
        job_id: Option<JobId>,
        trigger: RunTrigger,
        cancel: &CancellationToken,
    ) -> RunResult {
        let _active = match self.active.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!(job_id = job_id.as_deref().unwrap_or("-"), "another run is active, waiting");
                self.active.lock().await
            }
        };
        let mut state = RunState {
            run_id: RunId::new(),
            started_at: Utc::now(),
            degraded: false,
            warnings: Vec::new(),
            payload: None,
            outcomes: Vec::new(),
        };
        let clock = Instant::now();
        let span = info_span!(
            "pipeline_run",
            run_id = %state.run_id,
            job_id = job_id.as_deref().unwrap_or("-"),
            trigger = ?trigger
        );

        let executed = self.execute(&mut state, cancel).instrument(span.clone()).await;
        let _guard = span.enter();

        let mut error = None;
        let status = match executed {
            Err(PipelineError::Cancelled) => RunStatus::Cancelled,
            Err(e) => {
                error = Some(e.to_string());
                RunStatus::Failed
            }
            Ok(()) if !state.outcomes.is_empty() && state.outcomes.iter().all(|o| !o.success) => {
                error = Some("all channels failed".to_string());
                RunStatus::Failed
            }
            Ok(()) if state.degraded => RunStatus::Degraded,
            Ok(()) => RunStatus::Success,
        };

        let finished_at = Utc::now();
        let result = RunResult {
            run_id: state.run_id,
            job_id,
            trigger,
            started_at: state.started_at,
            finished_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            status,
            payload: state.payload,
            outcomes: state.outcomes,
            warnings: state.warnings,
            error,
        };

        metrics::counter!("sift_runs_total", "status" => status.to_string()).increment(1);
        metrics::histogram!("sift_run_duration_seconds").record(clock.elapsed().as_secs_f64());
        match status {
            RunStatus::Failed => warn!(error = ?result.error, "{}", result.summary_line()),
            _ => info!("{}", result.summary_line()),
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(&result) {
                warn!(error = %e, "failed to write run journal");
            }
        }
        result
    }

    async fn execute(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<()> {
        checkpoint(cancel)?;

        // ── fetch ──
        let window = FetchWindow::last_days(state.started_at, self.options.days_lookback);
        let report = match self.source.fetch(&self.options.categories, window, cancel).await {
            Ok(report) => report,
            Err(SourceError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        self.prune(state.started_at);
        let mut stats = DigestStats {
            fetched: report.papers.len(),
            ..DigestStats::default()
        };
        for failure in &report.failed {
            stats.failed_categories.push(failure.category.clone());
            state.degrade(format!("category {} failed: {}", failure.category, failure.error));
        }

        // ── filter + dedup ──
        let matched = self.filter.apply(report.papers);
        stats.matched = matched.len();
        let mut fresh = Vec::with_capacity(matched.len());
        for paper in matched {
            if self.dedup.has_seen(&paper.id)? {
                stats.duplicates += 1;
            } else {
                fresh.push(paper);
            }
        }
        debug!(
            fetched = stats.fetched,
            matched = stats.matched,
            duplicates = stats.duplicates,
            "candidates narrowed"
        );
        checkpoint(cancel)?;

        // ── select ──
        let selection = select(fresh, self.options.max_papers);
        stats.deferred = selection.deferred.len();
        if stats.deferred > 0 {
            info!(deferred = stats.deferred, "papers over the per-run cap deferred");
        }
        if selection.selected.is_empty() {
            info!("nothing new to deliver");
            state.payload = Some(assemble(
                state.run_id.clone(),
                Utc::now(),
                Vec::new(),
                Vec::new(),
                self.options.fallback_chars,
                stats,
            ));
            return Ok(());
        }

        // ── summarize ──
        let inputs: Vec<SummaryInput> =
            selection.selected.iter().map(SummaryInput::from_paper).collect();
        let summaries = self.summarizer.summarize(&inputs, cancel).await;
        if self.summarizer.is_enabled() {
            if !summaries.model_available {
                state.degrade("summarization model unavailable, fallback summaries used".into());
            } else if summaries.is_degraded() {
                state.degrade(format!("{} papers used fallback summaries", summaries.fallbacks));
            }
        }
        checkpoint(cancel)?;

        // ── assemble + mark ──
        let payload = assemble(
            state.run_id.clone(),
            Utc::now(),
            selection.selected,
            summaries.results,
            self.options.fallback_chars,
            stats,
        );
        let ids = payload.paper_ids();
        if self.options.mark_policy == MarkPolicy::OnAssembly {
            let _ = self.dedup.mark_seen(&ids, state.run_id.as_str(), Utc::now())?;
        }

        // ── dispatch ──
        let outcomes = self.dispatcher.dispatch(&payload).await;
        for failed in outcomes.iter().filter(|o| !o.success) {
            state.warnings.push(format!(
                "channel {} failed: {}",
                failed.channel,
                failed.error.as_deref().unwrap_or("unknown error")
            ));
        }
        if self.options.mark_policy == MarkPolicy::OnDelivery {
            self.settle_on_delivery(state, &ids, &outcomes)?;
        }

        state.payload = Some(payload);
        state.outcomes = outcomes;
        Ok(())
    }

    fn prune(&self, now: DateTime<Utc>) {
        if self.options.retention_days == 0 {
            return;
        }
        let cutoff = now - chrono::Duration::days(i64::from(self.options.retention_days));
        if let Err(e) = self.dedup.prune(cutoff) {
            warn!(error = %e, "dedup pruning failed");
        }
    }

    /// Mark after at least one channel accepted. When all failed, count the
    /// attempt and give up on papers that reached the redelivery limit.
    fn settle_on_delivery(
        &self,
        state: &mut RunState,
        ids: &[String],
        outcomes: &[DispatchOutcome],
    ) -> Result<()> {
        let delivered = outcomes.is_empty() || outcomes.iter().any(|o| o.success);
        if delivered {
            let _ = self.dedup.mark_seen(ids, state.run_id.as_str(), Utc::now())?;
            return Ok(());
        }

        let counts = self.dedup.record_delivery_failure(ids, Utc::now())?;
        let exhausted: Vec<String> = counts
            .into_iter()
            .filter(|(_, attempts)| *attempts >= self.options.max_redelivery_attempts)
            .map(|(id, _)| id)
            .collect();
        if !exhausted.is_empty() {
            let _ = self.dedup.mark_seen(&exhausted, state.run_id.as_str(), Utc::now())?;
            state.warnings.push(format!(
                "{} papers reached the redelivery limit and were marked seen",
                exhausted.len()
            ));
        }
        Ok(())
    }
}
