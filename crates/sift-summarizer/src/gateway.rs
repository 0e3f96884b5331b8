//! Batching gateway in front of a [`SummaryModel`].
//!
//! Never fails a run: every input comes back with a [`SummaryResult`], using
//! the extractive fallback wherever the model could not produce one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sift_core::retry::{RetryConfig, retry_async};
use sift_core::text::normalize_whitespace;
use sift_core::{PaperRecord, SummaryResult};
use sift_settings::SummarizerSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, SummarizerError};
use crate::fallback::fallback_synopsis;
use crate::model::{DisabledModel, ItemOutcome, SidecarModel, SummaryModel, SummaryParams};

/// Text to summarize, keyed by paper id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryInput {
    /// Paper identifier.
    pub id: String,
    /// Source text, usually the abstract.
    pub text: String,
}

impl SummaryInput {
    /// Abstract of `paper`, or its title when the abstract is empty.
    pub fn from_paper(paper: &PaperRecord) -> Self {
        let text = if paper.abstract_text.trim().is_empty() {
            paper.title.clone()
        } else {
            paper.abstract_text.clone()
        };
        Self {
            id: paper.id.clone(),
            text,
        }
    }
}

/// Results of one summarization pass.
#[derive(Clone, Debug, Default)]
pub struct SummaryReport {
    /// One result per input, in input order.
    pub results: Vec<SummaryResult>,
    /// Results that used the fallback.
    pub fallbacks: usize,
    /// Whether the model was reachable for this pass.
    pub model_available: bool,
}

impl SummaryReport {
    /// At least one input fell back.
    pub fn is_degraded(&self) -> bool {
        self.fallbacks > 0
    }
}

/// Batches inputs through the model with timeouts, retries and fallbacks.
pub struct SummarizerGateway {
    model: Arc<dyn SummaryModel>,
    params: SummaryParams,
    batch_size: usize,
    request_timeout: Duration,
    load_timeout: Duration,
    min_input_chars: usize,
    fallback_chars: usize,
    retry: RetryConfig,
    enabled: bool,
    loaded: AtomicBool,
}

impl SummarizerGateway {
    /// Gateway over the configured sidecar, or fallback-only when disabled.
    pub fn from_settings(settings: &SummarizerSettings) -> Result<Self> {
        let model: Arc<dyn SummaryModel> = if settings.enabled {
            Arc::new(SidecarModel::new(settings)?)
        } else {
            Arc::new(DisabledModel)
        };
        Ok(Self::new(model, settings))
    }

    /// Gateway over an explicit model.
    pub fn new(model: Arc<dyn SummaryModel>, settings: &SummarizerSettings) -> Self {
        Self {
            model,
            params: SummaryParams {
                max_length: settings.max_length,
                min_length: settings.min_length,
            },
            batch_size: settings.batch_size.max(1),
            request_timeout: Duration::from_millis(settings.timeout_ms),
            load_timeout: Duration::from_millis(settings.load_timeout_ms),
            min_input_chars: settings.min_input_chars,
            fallback_chars: settings.fallback_chars,
            retry: settings.retry.clone(),
            enabled: settings.enabled,
            loaded: AtomicBool::new(false),
        }
    }

    /// Whether summarization was requested at all. A disabled gateway
    /// produces fallbacks only, and that is not a degradation.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a model load has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Make sure the model is loaded. A success is remembered across runs,
    /// a failure is retried on the next call.
    pub async fn prepare(&self) -> Result<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        tokio::time::timeout(self.load_timeout, self.model.load())
            .await
            .map_err(|_| SummarizerError::ModelUnavailable("load timed out".into()))??;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Summarize every input. Always returns one result per input.
    #[instrument(skip_all, fields(model = self.model.model_id(), count = inputs.len()))]
    pub async fn summarize(&self, inputs: &[SummaryInput], cancel: &CancellationToken) -> SummaryReport {
        let mut slots: Vec<Option<SummaryResult>> = vec![None; inputs.len()];

        let mut eligible = Vec::new();
        for (idx, input) in inputs.iter().enumerate() {
            if input.text.trim().chars().count() < self.min_input_chars {
                slots[idx] = Some(self.fallback(input, "input too short"));
            } else {
                eligible.push(idx);
            }
        }

        let model_available = if eligible.is_empty() {
            true
        } else {
            match self.prepare().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "summarization model unavailable, using fallbacks");
                    let reason = e.to_string();
                    for &idx in &eligible {
                        slots[idx] = Some(self.fallback(&inputs[idx], &reason));
                    }
                    eligible.clear();
                    false
                }
            }
        };

        for chunk in eligible.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|&i| inputs[i].text.clone()).collect();
            match self.call_with_retry(&texts, cancel).await {
                Ok(outcomes) => {
                    for (&idx, outcome) in chunk.iter().zip(outcomes) {
                        slots[idx] = Some(self.resolve(&inputs[idx], outcome));
                    }
                }
                Err((e, cancelled)) if cancelled || chunk.len() == 1 => {
                    let reason = e.to_string();
                    for &idx in chunk {
                        slots[idx] = Some(self.fallback(&inputs[idx], &reason));
                    }
                }
                Err((e, _)) => {
                    debug!(error = %e, size = chunk.len(), "batch failed, retrying items individually");
                    for &idx in chunk {
                        let single = vec![inputs[idx].text.clone()];
                        let result = match self.call_with_retry(&single, cancel).await {
                            Ok(mut outcomes) => match outcomes.pop() {
                                Some(outcome) => self.resolve(&inputs[idx], outcome),
                                None => self.fallback(&inputs[idx], "no output"),
                            },
                            Err((e, _)) => self.fallback(&inputs[idx], &e.to_string()),
                        };
                        slots[idx] = Some(result);
                    }
                }
            }
        }

        let results: Vec<SummaryResult> = slots
            .into_iter()
            .zip(inputs)
            .map(|(slot, input)| slot.unwrap_or_else(|| self.fallback(input, "not summarized")))
            .collect();
        let fallbacks = results.iter().filter(|r| !r.success).count();
        let generated = results.len() - fallbacks;

        metrics::counter!("sift_summaries_total", "outcome" => "generated").increment(generated as u64);
        metrics::counter!("sift_summaries_total", "outcome" => "fallback").increment(fallbacks as u64);
        info!(generated, fallbacks, "summarization complete");

        SummaryReport {
            results,
            fallbacks,
            model_available,
        }
    }

    async fn call_with_retry(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<ItemOutcome>, (SummarizerError, bool)> {
        retry_async("summarizer.batch", &self.retry, Some(cancel), |_| self.timed_batch(texts))
            .await
            .map(|attempted| attempted.value)
            .map_err(|exhausted| (exhausted.error, exhausted.cancelled))
    }

    async fn timed_batch(&self, texts: &[String]) -> Result<Vec<ItemOutcome>> {
        tokio::time::timeout(self.request_timeout, self.model.summarize_batch(texts, self.params))
            .await
            .map_err(|_| SummarizerError::Timeout)?
    }

    fn resolve(&self, input: &SummaryInput, outcome: ItemOutcome) -> SummaryResult {
        match outcome {
            Ok(text) => {
                let text = normalize_whitespace(&text);
                if text.is_empty() {
                    self.fallback(input, "empty model output")
                } else {
                    SummaryResult::generated(&input.id, text)
                }
            }
            Err(reason) => self.fallback(input, &reason),
        }
    }

    fn fallback(&self, input: &SummaryInput, reason: &str) -> SummaryResult {
        SummaryResult::fallback(
            &input.id,
            fallback_synopsis(&input.text, self.fallback_chars),
            reason,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
