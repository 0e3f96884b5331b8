//! # sift-core
//!
//! Foundation types and shared utilities for the sift digest pipeline.
//!
//! This crate provides the vocabulary every other sift crate depends on:
//!
//! - **Records**: [`PaperRecord`] as fetched from the preprint server
//! - **Summaries**: [`SummaryResult`] with fallback tracking
//! - **Digests**: [`DigestPayload`] with per-run counters
//! - **Runs**: [`RunResult`], [`RunStatus`], [`DispatchOutcome`]
//! - **Retry**: one policy ([`retry::RetryConfig`] + [`retry::retry_async`]) used by every network stage
//! - **Errors**: [`errors::ErrorCategory`] and the [`errors::Retryable`] predicate
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod digest;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod paper;
pub mod retry;
pub mod run;
pub mod text;

pub use digest::{DigestEntry, DigestPayload, DigestStats};
pub use errors::{ErrorCategory, Retryable};
pub use ids::{JobId, RunId};
pub use paper::{PaperRecord, SummaryResult};
pub use run::{DispatchOutcome, RunResult, RunStatus, RunTrigger};
