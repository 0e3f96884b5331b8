//! # sift-source
//!
//! Fetches candidate papers from the arXiv Atom API.
//!
//! One request per category, spaced by a [`RateLimiter`], each retried under
//! the shared retry policy. A failing category degrades the fetch; only the
//! failure of every category fails it. Cross-listed papers are returned once.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod feed;
pub mod rate_limit;

pub use client::{ArxivClient, CategoryFailure, FetchReport, FetchWindow, PaperSource};
pub use errors::{Result, SourceError};
pub use feed::{normalize_id, parse_feed};
pub use rate_limit::RateLimiter;
