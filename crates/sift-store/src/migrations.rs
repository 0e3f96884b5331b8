//! Schema migrations for the dedup database.
//!
//! Each migration runs inside its own transaction and is recorded in
//! `schema_version`. Running the migrator twice is a no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "seen papers",
        sql: "CREATE TABLE seen_papers (
                paper_id   TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL,
                run_id     TEXT
              );
              CREATE INDEX idx_seen_papers_first_seen ON seen_papers (first_seen);",
    },
    Migration {
        version: 2,
        description: "redelivery attempts",
        sql: "CREATE TABLE delivery_attempts (
                paper_id     TEXT PRIMARY KEY,
                attempts     INTEGER NOT NULL,
                last_attempt TEXT NOT NULL
              );",
    },
];

/// Apply every pending migration. Returns how many ran.
pub(crate) fn run_migrations(conn: &Connection) -> Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }
        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                message: format!(
                    "v{} ({}) failed: {e}",
                    migration.version, migration.description
                ),
            })?;
        let _ = tx.execute(
            "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
        applied += 1;
    }
    Ok(applied)
}
