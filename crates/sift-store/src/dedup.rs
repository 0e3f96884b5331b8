//! Dedup store: which paper ids have already been delivered.
//!
//! One `SQLite` file, one writer. Every mutating call is a single
//! transaction, and the connection runs with `synchronous = FULL` so a commit
//! is on disk before the call returns.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::errors::Result;
use crate::migrations::run_migrations;

/// One delivered paper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DedupEntry {
    /// Paper identifier.
    pub paper_id: String,
    /// When the paper was first recorded.
    pub first_seen: DateTime<Utc>,
}

/// Durable set of delivered paper ids.
pub struct DedupStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupStore").finish_non_exhaustive()
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl DedupStore {
    /// Open (creating if needed) a file-backed store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        let applied = run_migrations(&conn)?;
        debug!(?path, applied, "dedup store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let _ = run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Whether `paper_id` has been delivered before.
    pub fn has_seen(&self, paper_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM seen_papers WHERE paper_id = ?1",
                params![paper_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Look up one entry.
    pub fn get(&self, paper_id: &str) -> Result<Option<DedupEntry>> {
        let conn = self.conn.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT paper_id, first_seen FROM seen_papers WHERE paper_id = ?1",
                params![paper_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(paper_id, first_seen)| {
            DateTime::parse_from_rfc3339(&first_seen)
                .ok()
                .map(|t| DedupEntry {
                    paper_id,
                    first_seen: t.with_timezone(&Utc),
                })
        }))
    }

    /// Number of recorded ids.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM seen_papers", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Record a batch of ids as delivered, all or nothing.
    ///
    /// Existing entries keep their original `first_seen`. Pending redelivery
    /// counters for these ids are cleared. Returns how many ids were new.
    pub fn mark_seen(&self, paper_ids: &[String], run_id: &str, at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let stamp = ts(at);
        let mut inserted = 0;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO seen_papers (paper_id, first_seen, run_id) VALUES (?1, ?2, ?3)",
            )?;
            let mut clear = tx.prepare("DELETE FROM delivery_attempts WHERE paper_id = ?1")?;
            for id in paper_ids {
                inserted += insert.execute(params![id, stamp, run_id])?;
                let _ = clear.execute(params![id])?;
            }
        }
        tx.commit()?;
        info!(run_id, requested = paper_ids.len(), inserted, "marked papers seen");
        Ok(inserted)
    }

    /// Delete entries first seen before `older_than`. Returns the count removed.
    pub fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM seen_papers WHERE first_seen < ?1",
            params![ts(older_than)],
        )?;
        let _ = conn.execute(
            "DELETE FROM delivery_attempts WHERE last_attempt < ?1",
            params![ts(older_than)],
        )?;
        if removed > 0 {
            info!(removed, cutoff = %ts(older_than), "pruned dedup entries");
        }
        Ok(removed)
    }

    /// Count one failed delivery for each id. Returns the new attempt counts
    /// in input order.
    pub fn record_delivery_failure(
        &self,
        paper_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<(String, u32)>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let stamp = ts(at);
        let mut counts = Vec::with_capacity(paper_ids.len());
        {
            let mut upsert = tx.prepare(
                "INSERT INTO delivery_attempts (paper_id, attempts, last_attempt) VALUES (?1, 1, ?2)
                 ON CONFLICT(paper_id) DO UPDATE SET attempts = attempts + 1, last_attempt = ?2",
            )?;
            let mut read =
                tx.prepare("SELECT attempts FROM delivery_attempts WHERE paper_id = ?1")?;
            for id in paper_ids {
                let _ = upsert.execute(params![id, stamp])?;
                let attempts: u32 = read.query_row(params![id], |row| row.get(0))?;
                counts.push((id.clone(), attempts));
            }
        }
        tx.commit()?;
        Ok(counts)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn unseen_until_marked() {
        let store = DedupStore::open_in_memory().unwrap();
        assert!(!store.has_seen("2401.00001").unwrap());
        assert_eq!(store.mark_seen(&ids(&["2401.00001"]), "r1", Utc::now()).unwrap(), 1);
        assert!(store.has_seen("2401.00001").unwrap());
        assert!(!store.has_seen("2401.00002").unwrap());
    }

    #[test]
    fn first_seen_is_never_overwritten() {
        let store = DedupStore::open_in_memory().unwrap();
        let day1 = Utc::now() - Duration::days(1);
        let _ = store.mark_seen(&ids(&["a"]), "r1", day1).unwrap();
        assert_eq!(store.mark_seen(&ids(&["a", "b"]), "r2", Utc::now()).unwrap(), 1);

        let entry = store.get("a").unwrap().unwrap();
        assert_eq!(entry.first_seen.timestamp_millis(), day1.timestamp_millis());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let store = DedupStore::open_in_memory().unwrap();
        let now = Utc::now();
        let _ = store.mark_seen(&ids(&["old"]), "r1", now - Duration::days(40)).unwrap();
        let _ = store.mark_seen(&ids(&["new"]), "r2", now - Duration::days(2)).unwrap();

        assert_eq!(store.prune(now - Duration::days(30)).unwrap(), 1);
        assert!(!store.has_seen("old").unwrap());
        assert!(store.has_seen("new").unwrap());
        assert_eq!(store.prune(now - Duration::days(30)).unwrap(), 0);
    }

    #[test]
    fn empty_batch_is_noop() {
        let store = DedupStore::open_in_memory().unwrap();
        assert_eq!(store.mark_seen(&[], "r1", Utc::now()).unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn delivery_failures_accumulate_and_clear_on_mark() {
        let store = DedupStore::open_in_memory().unwrap();
        let now = Utc::now();
        let first = store.record_delivery_failure(&ids(&["a", "b"]), now).unwrap();
        assert_eq!(first, vec![("a".to_string(), 1), ("b".to_string(), 1)]);
        let second = store.record_delivery_failure(&ids(&["a"]), now).unwrap();
        assert_eq!(second, vec![("a".to_string(), 2)]);

        let _ = store.mark_seen(&ids(&["a"]), "r1", now).unwrap();
        let again = store.record_delivery_failure(&ids(&["a"]), now).unwrap();
        assert_eq!(again, vec![("a".to_string(), 1)]);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("seen.db");
        {
            let store = DedupStore::open(&path).unwrap();
            let _ = store.mark_seen(&ids(&["2401.00001", "2401.00002"]), "r1", Utc::now()).unwrap();
        }
        let store = DedupStore::open(&path).unwrap();
        assert!(store.has_seen("2401.00001").unwrap());
        assert_eq!(store.len().unwrap(), 2);
    }
}
