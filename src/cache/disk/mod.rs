//! Disk Cache Module
//!
//! Persistent tier shared by every process that points at the same
//! directory. An SQLite index (`cache.db`) maps keys to payload files under
//! `data/`; the index is the contract between processes.
//!
//! Reads self-heal: an expired, missing, truncated or undecodable entry is
//! purged and reported as a miss. Writes go to a newly named file and only
//! then repoint the index, so the row always names a complete file that
//! belongs to it. A failed commit leaves an unindexed payload behind for
//! [`DiskCache::cleanup`] to reclaim; the committed entry is untouched.

mod index;
mod layout;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use std::{fs, io};

use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::entry::{duration_micros, now_micros};
use crate::cache::{CacheCounters, Codec, DiskRecord, DiskStats, EvictionReport, Lookup, Miss};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

pub use layout::{DATA_DIR, INDEX_FILE};

/// Rows removed per eviction transaction while over budget.
const EVICTION_BATCH: usize = 10;

struct DiskInner {
    conn: Connection,
    counters: CacheCounters,
}

// == Disk Cache ==
/// Byte-budgeted persistent cache backed by SQLite and payload files.
pub struct DiskCache<C: Codec> {
    inner: Mutex<DiskInner>,
    cache_dir: PathBuf,
    ttl: Duration,
    max_bytes: u64,
    orphan_grace: Duration,
    codec: C,
}

impl<C: Codec> DiskCache<C> {
    // == Constructor ==
    /// Opens (or creates) the cache rooted at `config.cache_dir`.
    ///
    /// # Errors
    /// `CacheError::Config` for an invalid TTL, budget or directory;
    /// `CacheError::Io`/`Database` when the directory or index cannot be
    /// created.
    pub fn open(config: &CacheConfig, codec: C) -> Result<Self> {
        config.validate_disk()?;

        let cache_dir = config.cache_dir.clone();
        fs::create_dir_all(cache_dir.join(DATA_DIR))?;
        let conn = index::open(&cache_dir.join(INDEX_FILE), config.busy_timeout)?;

        info!(
            cache_dir = %cache_dir.display(),
            ttl_secs = config.cache_ttl.as_secs(),
            max_bytes = config.max_cache_size,
            "disk cache opened"
        );

        Ok(Self {
            inner: Mutex::new(DiskInner {
                conn,
                counters: CacheCounters::new(),
            }),
            cache_dir,
            ttl: config.cache_ttl,
            max_bytes: config.max_cache_size,
            orphan_grace: config.orphan_grace,
            codec,
        })
    }

    fn lock(&self) -> MutexGuard<'_, DiskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.cache_dir.join(relative)
    }

    fn remove_payload(&self, relative: &str) {
        if let Err(e) = layout::remove_quietly(&self.absolute(relative)) {
            // The sweep in cleanup() retries unindexed files
            warn!(path = relative, error = %e, "failed to remove payload file");
        }
    }

    /// Drops the row for `key` after a failed read; never fails the caller.
    fn purge(&self, inner: &mut DiskInner, key: &str) {
        match index::remove(&inner.conn, key) {
            Ok(Some(victim)) => self.remove_payload(&victim.file_path),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "failed to purge disk entry"),
        }
    }

    fn corrupted(&self, inner: &mut DiskInner, key: &str, reason: String) -> Miss {
        warn!(key, reason = %reason, "corrupted disk entry purged");
        self.purge(inner, key);
        inner.counters.record_corruption();
        inner.counters.record_miss();
        Miss::Corrupted(reason)
    }

    // == Get ==
    /// Loads and decodes the payload for `key`.
    ///
    /// Never fails hard: every failure is one of the [`Miss`] kinds and any
    /// broken entry is purged on the way out.
    pub fn get(&self, key: &str) -> Lookup<C::Value> {
        let mut inner = self.lock();

        let record = match index::find(&inner.conn, key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                inner.counters.record_miss();
                return Err(Miss::Absent);
            }
            Err(e) => {
                warn!(key, error = %e, "disk index lookup failed");
                inner.counters.record_miss();
                return Err(Miss::Io(e.into()));
            }
        };

        let now = now_micros();
        if record.is_expired(now, self.ttl) {
            debug!(key, "disk entry expired");
            self.purge(&mut inner, key);
            inner.counters.record_expirations(1);
            inner.counters.record_miss();
            return Err(Miss::Expired);
        }

        let bytes = match fs::read(self.absolute(&record.file_path)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(self.corrupted(&mut inner, key, "payload file missing".to_string()));
            }
            Err(e) => {
                warn!(key, error = %e, "disk payload read failed");
                inner.counters.record_miss();
                return Err(Miss::Io(e.into()));
            }
        };

        if bytes.len() as u64 != record.size {
            let reason = format!("payload is {} bytes, index says {}", bytes.len(), record.size);
            return Err(self.corrupted(&mut inner, key, reason));
        }

        let value = match self.codec.decode(&bytes) {
            Ok(value) => value,
            Err(e) => return Err(self.corrupted(&mut inner, key, e.to_string())),
        };

        // Best effort: a busy index must not turn a good read into a miss
        if let Err(e) = index::touch(&inner.conn, key, now) {
            debug!(key, error = %e, "accessed_at update skipped");
        }
        inner.counters.record_hit();
        Ok(value)
    }

    // == Set ==
    /// Persists `value` under `key` and then enforces TTL and byte budget.
    ///
    /// The payload goes to a fresh file; the file it replaces is removed
    /// only after the index transaction commits. If that transaction fails,
    /// the previous entry stays intact and the new file is left unindexed
    /// for [`Self::cleanup`].
    pub fn set(&self, key: &str, value: &C::Value, metadata: Option<Value>) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        let relative = layout::fresh_path(key);

        let mut inner = self.lock();
        layout::write_atomic(&self.absolute(&relative), &bytes)?;

        let now = now_micros();
        let record = DiskRecord {
            key: key.to_string(),
            file_path: relative,
            created_at: now,
            accessed_at: now,
            size: bytes.len() as u64,
            metadata,
        };

        let previous = match Self::commit_record(&mut inner.conn, &record) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(key, error = %e, "disk index update failed, payload left for cleanup");
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            self.remove_payload(&previous);
        }
        debug!(key, size = record.size, "disk entry stored");

        match self.evict_locked(&mut inner) {
            Ok(report) if report.total() > 0 => {
                info!(
                    expired = report.expired,
                    evicted = report.evicted,
                    bytes_freed = report.bytes_freed,
                    "disk eviction pass"
                );
            }
            Ok(_) => {}
            // The write itself succeeded; the next pass retries
            Err(e) => warn!(error = %e, "disk eviction failed"),
        }
        Ok(())
    }

    /// Upserts `record` in one transaction, returning the replaced file path.
    fn commit_record(conn: &mut Connection, record: &DiskRecord) -> Result<Option<String>> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous = index::file_path(&tx, &record.key)?;
        index::upsert(&tx, record)?;
        tx.commit()?;
        Ok(previous)
    }

    // == Delete ==
    /// Removes the row and its payload. Returns whether a row existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let inner = self.lock();
        match index::remove(&inner.conn, key)? {
            Some(victim) => {
                layout::remove_quietly(&self.absolute(&victim.file_path))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Clear ==
    /// Drops every row and every payload file. Returns the row count.
    pub fn clear(&self) -> Result<u64> {
        let inner = self.lock();
        let removed = index::clear(&inner.conn)?;
        let data_dir = self.cache_dir.join(DATA_DIR);
        match fs::remove_dir_all(&data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&data_dir)?;
        info!(removed, "disk cache cleared");
        Ok(removed)
    }

    // == Eviction ==
    /// Runs the TTL purge and the byte-budget LRU pass.
    pub fn evict(&self) -> Result<EvictionReport> {
        let mut inner = self.lock();
        self.evict_locked(&mut inner)
    }

    fn evict_locked(&self, inner: &mut DiskInner) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();

        // (1) TTL
        let cutoff = now_micros().saturating_sub(duration_micros(self.ttl));
        let tx = inner
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let expired = index::take_expired(&tx, cutoff)?;
        tx.commit()?;
        for victim in &expired {
            self.remove_payload(&victim.file_path);
            report.expired += 1;
            report.bytes_freed += victim.size;
        }

        // (2) Byte budget, global LRU in bounded batches
        loop {
            let mut total = index::total_size(&inner.conn)?;
            if total <= self.max_bytes {
                break;
            }
            let batch = index::oldest(&inner.conn, EVICTION_BATCH)?;
            if batch.is_empty() {
                break;
            }

            let tx = inner
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut removed = Vec::with_capacity(batch.len());
            for victim in batch {
                if total <= self.max_bytes {
                    break;
                }
                if index::remove(&tx, &victim.key)?.is_some() {
                    total = total.saturating_sub(victim.size);
                    removed.push(victim);
                }
            }
            tx.commit()?;

            for victim in &removed {
                debug!(key = %victim.key, size = victim.size, "disk entry evicted");
                self.remove_payload(&victim.file_path);
                report.evicted += 1;
                report.bytes_freed += victim.size;
            }
        }

        inner.counters.record_expirations(report.expired);
        inner.counters.record_evictions(report.evicted);
        Ok(report)
    }

    // == Cleanup ==
    /// Eviction plus reconciliation of index and files: rows whose payload
    /// vanished are dropped, and unindexed payloads older than the grace
    /// period are deleted.
    pub fn cleanup(&self) -> Result<EvictionReport> {
        let mut inner = self.lock();
        let mut report = self.evict_locked(&mut inner)?;

        for (key, file_path) in index::entries(&inner.conn)? {
            if !self.absolute(&file_path).exists() {
                if let Some(victim) = index::remove(&inner.conn, &key)? {
                    report.dangling += 1;
                    report.bytes_freed += victim.size;
                }
            }
        }

        let indexed = index::indexed_paths(&inner.conn)?;
        let (orphans, bytes) = layout::sweep_orphans(&self.cache_dir, &indexed, self.orphan_grace)?;
        report.orphans += orphans;
        report.bytes_freed += bytes;

        if report.total() > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                dangling = report.dangling,
                orphans = report.orphans,
                "disk cleanup finished"
            );
        }
        Ok(report)
    }

    // == Introspection ==
    /// Sum of indexed payload sizes.
    pub fn get_total_size(&self) -> Result<u64> {
        Ok(index::total_size(&self.lock().conn)?)
    }

    pub fn len(&self) -> Result<u64> {
        Ok(index::count(&self.lock().conn)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The raw index row for `key`, without touching it.
    pub fn record(&self, key: &str) -> Result<Option<DiskRecord>> {
        Ok(index::find(&self.lock().conn, key)?)
    }

    /// Absolute path of the payload the index currently holds for `key`.
    pub fn payload_path(&self, key: &str) -> Result<Option<PathBuf>> {
        let record = index::find(&self.lock().conn, key)?;
        Ok(record.map(|r| self.absolute(&r.file_path)))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> Result<DiskStats> {
        let inner = self.lock();
        Ok(DiskStats {
            entries: index::count(&inner.conn)?,
            total_size: index::total_size(&inner.conn)?,
            max_size: self.max_bytes,
            ttl_secs: self.ttl.as_secs_f64(),
            cache_dir: self.cache_dir.clone(),
            hit_rate: inner.counters.hit_rate(),
            counters: inner.counters.clone(),
        })
    }

    // == Close ==
    /// Closes the index connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        inner.conn.close().map_err(|(_, e)| CacheError::from(e))?;
        debug!(cache_dir = %self.cache_dir.display(), "disk cache closed");
        Ok(())
    }
}
