//! SQLite index for the disk tier.
//!
//! One table, `cache_entries`, maps keys to payload files. Every statement
//! here runs on a connection opened with a busy timeout, so a lock held by
//! another process surfaces as `SQLITE_BUSY` instead of blocking forever.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::cache::DiskRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key         TEXT PRIMARY KEY,
        file_path   TEXT NOT NULL,
        created_at  INTEGER NOT NULL,
        accessed_at INTEGER NOT NULL,
        size        INTEGER NOT NULL,
        metadata    TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_cache_entries_accessed_at
        ON cache_entries(accessed_at);
";

/// A row selected for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    pub key: String,
    pub file_path: String,
    pub size: u64,
}

/// Opens (creating if needed) the index at `path`.
pub fn open(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // WAL lets readers in other processes proceed while one process writes
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DiskRecord> {
    let metadata: Option<String> = row.get(5)?;
    Ok(DiskRecord {
        key: row.get(0)?,
        file_path: row.get(1)?,
        created_at: row.get(2)?,
        accessed_at: row.get(3)?,
        size: to_u64(row.get(4)?),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

fn victim_from_row(row: &Row<'_>) -> rusqlite::Result<Victim> {
    Ok(Victim {
        key: row.get(0)?,
        file_path: row.get(1)?,
        size: to_u64(row.get(2)?),
    })
}

pub fn find(conn: &Connection, key: &str) -> rusqlite::Result<Option<DiskRecord>> {
    conn.query_row(
        "SELECT key, file_path, created_at, accessed_at, size, metadata
         FROM cache_entries WHERE key = ?1",
        [key],
        record_from_row,
    )
    .optional()
}

pub fn file_path(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT file_path FROM cache_entries WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

pub fn upsert(conn: &Connection, record: &DiskRecord) -> rusqlite::Result<()> {
    let metadata = record.metadata.as_ref().map(|m| m.to_string());
    conn.execute(
        "INSERT INTO cache_entries (key, file_path, created_at, accessed_at, size, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(key) DO UPDATE SET
            file_path = excluded.file_path,
            created_at = excluded.created_at,
            accessed_at = excluded.accessed_at,
            size = excluded.size,
            metadata = excluded.metadata",
        params![
            record.key,
            record.file_path,
            record.created_at,
            record.accessed_at,
            to_i64(record.size),
            metadata,
        ],
    )?;
    Ok(())
}

pub fn touch(conn: &Connection, key: &str, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE cache_entries SET accessed_at = ?1 WHERE key = ?2",
        params![now, key],
    )
}

/// Deletes one row, returning what it pointed at.
pub fn remove(conn: &Connection, key: &str) -> rusqlite::Result<Option<Victim>> {
    conn.query_row(
        "DELETE FROM cache_entries WHERE key = ?1 RETURNING key, file_path, size",
        [key],
        victim_from_row,
    )
    .optional()
}

/// Deletes every row created before `cutoff`, returning them.
pub fn take_expired(conn: &Connection, cutoff: i64) -> rusqlite::Result<Vec<Victim>> {
    let mut stmt = conn.prepare(
        "DELETE FROM cache_entries WHERE created_at < ?1 RETURNING key, file_path, size",
    )?;
    let rows = stmt.query_map([cutoff], victim_from_row)?;
    rows.collect()
}

/// The `limit` globally least recently accessed rows, oldest first.
pub fn oldest(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<Victim>> {
    let mut stmt = conn.prepare(
        "SELECT key, file_path, size FROM cache_entries
         ORDER BY accessed_at ASC, rowid ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map([to_i64(limit as u64)], victim_from_row)?;
    rows.collect()
}

pub fn total_size(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row(
        "SELECT COALESCE(SUM(size), 0) FROM cache_entries",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(to_u64)
}

pub fn count(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(to_u64)
}

/// Every `(key, file_path)` pair in the index.
pub fn entries(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, file_path FROM cache_entries")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn indexed_paths(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT file_path FROM cache_entries")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

pub fn clear(conn: &Connection) -> rusqlite::Result<u64> {
    conn.execute("DELETE FROM cache_entries", [])
        .map(|n| n as u64)
}
