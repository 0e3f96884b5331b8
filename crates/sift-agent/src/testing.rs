//! In-process fakes shared by the binary's unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sift_core::retry::RetryConfig;
use sift_core::{DigestPayload, PaperRecord};
use sift_notify::{Channel, ChannelError, DispatchCoordinator};
use sift_pipeline::{MatchFilter, Pipeline, PipelineOptions};
use sift_settings::{FilterSettings, MarkPolicy, SummarizerSettings};
use sift_source::{FetchReport, FetchWindow, PaperSource, SourceError};
use sift_store::{DedupStore, RunJournal};
use sift_summarizer::{DisabledModel, SummarizerGateway};
use tokio_util::sync::CancellationToken;

pub(crate) struct FakeSource {
    pub papers: Vec<PaperRecord>,
    pub down: bool,
}

#[async_trait]
impl PaperSource for FakeSource {
    async fn fetch(
        &self,
        categories: &[String],
        _window: FetchWindow,
        _cancel: &CancellationToken,
    ) -> sift_source::Result<FetchReport> {
        if self.down {
            return Err(SourceError::AllCategoriesFailed {
                failures: categories.iter().map(|c| (c.clone(), "HTTP 503".into())).collect(),
            });
        }
        Ok(FetchReport {
            papers: self.papers.clone(),
            failed: vec![],
        })
    }
}

/// Records digests and notices; fails digest delivery when `fail` is set.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    pub fail: bool,
    pub delivered: Mutex<Vec<usize>>,
    pub notices: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn deliver(&self, digest: &DigestPayload) -> sift_notify::Result<()> {
        if self.fail {
            return Err(ChannelError::Rejected("no".into()));
        }
        self.delivered.lock().push(digest.len());
        Ok(())
    }

    async fn send_notice(&self, title: &str, body: &str) -> sift_notify::Result<()> {
        self.notices.lock().push((title.to_string(), body.to_string()));
        Ok(())
    }
}

pub(crate) fn paper(id: &str) -> PaperRecord {
    PaperRecord {
        id: id.into(),
        title: "Sparse transformer routing".into(),
        abstract_text: "We study transformer models with sparse routing. Results follow.".into(),
        authors: vec!["A. Author".into()],
        categories: vec!["cs.AI".into()],
        primary_category: Some("cs.AI".into()),
        published: Utc::now(),
        url: format!("https://arxiv.org/abs/{id}"),
        pdf_url: None,
    }
}

pub(crate) fn pipeline(
    source: FakeSource,
    channel: Arc<RecordingChannel>,
    journal: Option<RunJournal>,
) -> Arc<Pipeline> {
    let options = PipelineOptions {
        categories: vec!["cs.AI".into()],
        days_lookback: 1,
        max_papers: 10,
        retention_days: 30,
        mark_policy: MarkPolicy::OnAssembly,
        max_redelivery_attempts: 2,
        fallback_chars: 200,
    };
    let filter = MatchFilter::new(
        &options.categories,
        &FilterSettings {
            keywords: vec!["transformer".into()],
            ..FilterSettings::default()
        },
    );
    let summarizer = SummarizerGateway::new(
        Arc::new(DisabledModel),
        &SummarizerSettings {
            enabled: false,
            ..SummarizerSettings::default()
        },
    );
    let dispatcher = DispatchCoordinator::new(vec![channel as Arc<dyn Channel>], RetryConfig::none());
    let pipeline = Pipeline::new(
        Arc::new(source),
        filter,
        Arc::new(summarizer),
        Arc::new(DedupStore::open_in_memory().unwrap()),
        Arc::new(dispatcher),
        options,
    );
    Arc::new(match journal {
        Some(journal) => pipeline.with_journal(journal),
        None => pipeline,
    })
}
