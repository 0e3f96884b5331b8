//! # sift-pipeline
//!
//! The digest pipeline proper: [`MatchFilter`] narrows fetched papers,
//! [`select`] and [`assemble`] build the digest, and [`Pipeline`] drives a
//! full run from fetch to dispatch.
//!
//! By default papers are marked seen as soon as the digest is assembled,
//! before dispatch. A digest that no channel accepted is therefore not
//! retried. `dedup.markPolicy = "onDelivery"` trades that for bounded
//! redelivery.

#![deny(unsafe_code)]

pub mod assembler;
pub mod errors;
pub mod filter;
pub mod runner;

pub use assembler::{Selection, assemble, select};
pub use errors::{PipelineError, Result};
pub use filter::{MatchFilter, MatchRule};
pub use runner::{Pipeline, PipelineOptions};
