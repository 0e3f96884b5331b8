//! # sift-store
//!
//! Durable state that survives between runs.
//!
//! - [`DedupStore`]: `SQLite` record of paper ids already delivered. Batches
//!   are written in one transaction with `synchronous = FULL`, so a crash
//!   either keeps the whole batch or none of it.
//! - [`RunJournal`]: JSON files describing past runs, written by
//!   write-then-rename.
//! - [`write_atomic`]: the fsync-then-rename writer both the journal and the
//!   health snapshot use.

#![deny(unsafe_code)]

mod atomic;
pub mod dedup;
pub mod errors;
pub mod journal;
mod migrations;

pub use atomic::write_atomic;
pub use dedup::{DedupEntry, DedupStore};
pub use errors::{Result, StoreError};
pub use journal::RunJournal;
