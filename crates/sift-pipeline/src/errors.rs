//! Pipeline error types.

use sift_notify::ChannelError;
use sift_source::SourceError;
use sift_store::StoreError;
use sift_summarizer::SummarizerError;
use thiserror::Error;

/// Errors that abort a run or prevent the pipeline from being built.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fetch failed for every category.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Dedup store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Summarizer could not be constructed.
    #[error(transparent)]
    Summarizer(#[from] SummarizerError),
    /// A channel could not be constructed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Stopped at a stage boundary.
    #[error("run cancelled")]
    Cancelled,
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
