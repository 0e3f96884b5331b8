//! Bridges the scheduler to the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use sift_core::{JobId, RunResult, RunStatus, RunTrigger};
use sift_cron::JobRunner;
use sift_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the digest pipeline for a scheduled or manual job.
pub struct PipelineJobRunner {
    pipeline: Arc<Pipeline>,
    notify_errors: bool,
}

impl PipelineJobRunner {
    /// With `notify_errors`, a failed run sends an error notice through every channel.
    pub fn new(pipeline: Arc<Pipeline>, notify_errors: bool) -> Self {
        Self {
            pipeline,
            notify_errors,
        }
    }
}

#[async_trait]
impl JobRunner for PipelineJobRunner {
    async fn run(&self, job: &JobId, trigger: RunTrigger, cancel: CancellationToken) -> RunResult {
        let result = self.pipeline.run(Some(job.clone()), trigger, &cancel).await;
        info!(job = %job, "{}", result.summary_line());

        if self.notify_errors && result.status == RunStatus::Failed {
            let message = format!(
                "Job {job} (run {}) failed: {}",
                result.run_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
            self.pipeline.dispatcher().send_error_notice(&message).await;
        }
        result
    }
}
