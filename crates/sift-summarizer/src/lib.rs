//! # sift-summarizer
//!
//! Turns abstracts into short synopses through a local inference sidecar.
//!
//! The [`SummarizerGateway`] batches inputs, bounds every call with a
//! timeout, retries transient failures and substitutes an extractive
//! [`fallback_synopsis`] for anything the model could not handle. A
//! summarization pass never fails the run.

#![deny(unsafe_code)]

pub mod errors;
pub mod fallback;
pub mod gateway;
pub mod model;

pub use errors::{Result, SummarizerError};
pub use fallback::fallback_synopsis;
pub use gateway::{SummarizerGateway, SummaryInput, SummaryReport};
pub use model::{DisabledModel, ItemOutcome, SidecarModel, SummaryModel, SummaryParams};
