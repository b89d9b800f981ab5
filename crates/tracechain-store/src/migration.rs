//! Database schema migrations for SQLite.
//!
//! Each schema step is a SQL batch; applied versions are recorded in
//! `schema_migrations` and pending steps run in a single transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Ordered schema steps. Step `i` brings the schema to version `i + 1`.
const MIGRATIONS: &[&str] = &[SCHEMA_V1];

/// Current schema version.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`].
///
/// Safe to call on every open. A database written by a newer build is
/// refused rather than silently downgraded.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS schema_migrations (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL
         );",
    )?;

    let applied = schema_version(conn)?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {} is newer than this build understands ({})",
            applied, CURRENT_VERSION
        )));
    }

    let pending = &MIGRATIONS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, sql) in pending.iter().enumerate() {
        let version = applied + offset as u32 + 1;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_millis()],
        )?;
        tracing::debug!(version, "applied schema migration");
    }
    tx.commit()?;

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

/// v1: batches and their event chains.
const SCHEMA_V1: &str = r#"
        CREATE TABLE batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            product TEXT NOT NULL,            -- ProductDescriptor as JSON
            quantity REAL NOT NULL,
            created_at INTEGER NOT NULL,      -- pinned Unix ms, part of the identity hash
            parent_batch_id INTEGER REFERENCES batches(id),
            batch_hash TEXT NOT NULL,         -- lowercase hex SHA-256
            status TEXT NOT NULL,
            current_holder TEXT
        );

        CREATE TABLE events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            sequence INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            description TEXT NOT NULL,
            location TEXT NOT NULL,
            actor TEXT NOT NULL,
            timestamp INTEGER,                -- actor-claimed time (Unix ms)
            temperature REAL,
            humidity REAL,
            notes TEXT,
            documents BLOB NOT NULL,          -- CBOR array of CIDs
            photos BLOB NOT NULL,             -- CBOR array of CIDs
            previous_event_hash TEXT,         -- NULL for the first event
            event_hash TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,     -- local time of persistence, not hashed

            UNIQUE(batch_id, sequence)
        );

        CREATE INDEX idx_batches_parent ON batches(parent_batch_id);
        CREATE INDEX idx_events_batch_seq ON events(batch_id, sequence);
        CREATE INDEX idx_events_type ON events(event_type);
"#;

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
