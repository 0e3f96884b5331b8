//! Digest payload assembled once per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::paper::{PaperRecord, SummaryResult};

/// One paper with its summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestEntry {
    /// The paper.
    pub paper: PaperRecord,
    /// Its summary (generated or fallback).
    pub summary: SummaryResult,
}

/// Per-run counters carried on the digest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestStats {
    /// Unique papers returned by the source.
    pub fetched: usize,
    /// Papers that passed the match filter.
    pub matched: usize,
    /// Matched papers suppressed as already delivered.
    pub duplicates: usize,
    /// New papers held back by the per-run cap.
    pub deferred: usize,
    /// Entries whose summary is a fallback.
    pub fallback_summaries: usize,
    /// Categories whose fetch failed after retries.
    pub failed_categories: Vec<String>,
}

/// Ordered digest for one run, most recent paper first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestPayload {
    /// Run that produced this digest.
    pub run_id: RunId,
    /// Assembly time.
    pub generated_at: DateTime<Utc>,
    /// Entries ordered by publication time, descending.
    pub entries: Vec<DigestEntry>,
    /// Run counters.
    pub stats: DigestStats,
}

impl DigestPayload {
    /// Number of papers in the digest.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the digest has no papers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers of every included paper.
    pub fn paper_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.paper.id.clone()).collect()
    }
}
