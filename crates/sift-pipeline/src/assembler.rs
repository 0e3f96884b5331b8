//! Digest assembly: ordering, capping and pairing papers with summaries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sift_core::{DigestEntry, DigestPayload, DigestStats, PaperRecord, RunId, SummaryResult};
use sift_summarizer::fallback_synopsis;

/// Papers chosen for this run and those held back by the cap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// At most `max` papers, most recent first.
    pub selected: Vec<PaperRecord>,
    /// The remainder. Left unmarked so a later run can pick them up.
    pub deferred: Vec<PaperRecord>,
}

/// Order by publication time (newest first, ties by id) and split at `max`.
pub fn select(mut papers: Vec<PaperRecord>, max: usize) -> Selection {
    papers.sort_by(|a, b| b.published.cmp(&a.published).then_with(|| a.id.cmp(&b.id)));
    let deferred = papers.split_off(max.min(papers.len()));
    Selection {
        selected: papers,
        deferred,
    }
}

/// Pair each selected paper with its summary.
///
/// A paper without a summary gets an extractive one, so the digest never
/// drops a paper. `stats.fallback_summaries` is filled in here.
pub fn assemble(
    run_id: RunId,
    generated_at: DateTime<Utc>,
    selected: Vec<PaperRecord>,
    summaries: Vec<SummaryResult>,
    fallback_chars: usize,
    mut stats: DigestStats,
) -> DigestPayload {
    let mut by_id: HashMap<String, SummaryResult> =
        summaries.into_iter().map(|s| (s.paper_id.clone(), s)).collect();

    let entries: Vec<DigestEntry> = selected
        .into_iter()
        .map(|paper| {
            let summary = by_id.remove(&paper.id).unwrap_or_else(|| {
                let source = if paper.abstract_text.trim().is_empty() {
                    &paper.title
                } else {
                    &paper.abstract_text
                };
                SummaryResult::fallback(
                    &paper.id,
                    fallback_synopsis(source, fallback_chars),
                    "no summary produced",
                )
            });
            DigestEntry { paper, summary }
        })
        .collect();

    stats.fallback_summaries = entries.iter().filter(|e| !e.summary.success).count();
    DigestPayload {
        run_id,
        generated_at,
        entries,
        stats,
    }
}
