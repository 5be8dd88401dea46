//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions,
//! and the snapshot types each tier reports.

use std::path::PathBuf;

use serde::Serialize;

// == Cache Counters ==
/// Per-tier operation counters, updated under the tier's lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheCounters {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent, expired or corrupted)
    pub misses: u64,
    /// Number of entries removed for capacity or byte budget
    pub evictions: u64,
    /// Number of entries removed because they outlived their TTL
    pub expirations: u64,
    /// Number of entries purged after failing to load
    pub corruptions: u64,
}

impl CacheCounters {
    // == Constructor ==
    /// Creates a new CacheCounters with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    pub fn record_expirations(&mut self, count: u64) {
        self.expirations += count;
    }

    pub fn record_corruption(&mut self) {
        self.corruptions += 1;
    }
}

// == Memory Stats ==
/// Snapshot of the memory tier.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: f64,
    /// Entries past their TTL that have not been purged yet
    pub expired_entries: usize,
    pub hit_rate: f64,
    #[serde(flatten)]
    pub counters: CacheCounters,
}

// == Disk Stats ==
/// Snapshot of the disk tier.
#[derive(Debug, Clone, Serialize)]
pub struct DiskStats {
    pub entries: u64,
    pub total_size: u64,
    pub max_size: u64,
    pub ttl_secs: f64,
    pub cache_dir: PathBuf,
    pub hit_rate: f64,
    #[serde(flatten)]
    pub counters: CacheCounters,
}

// == Manager Stats ==
/// Combined view returned by [`crate::cache::CacheManager::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub enabled: bool,
    pub memory: Option<MemoryStats>,
    pub disk: Option<DiskStats>,
}

// == Eviction Report ==
/// What an eviction or cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Rows purged for exceeding the TTL
    pub expired: u64,
    /// Rows removed to get back under the byte budget
    pub evicted: u64,
    /// Rows whose payload file had vanished
    pub dangling: u64,
    /// Payload files with no index row
    pub orphans: u64,
    /// Bytes released from the index
    pub bytes_freed: u64,
}

impl EvictionReport {
    pub fn total(&self) -> u64 {
        self.expired + self.evicted + self.dangling + self.orphans
    }

    pub fn merge(&mut self, other: EvictionReport) {
        self.expired += other.expired;
        self.evicted += other.evicted;
        self.dangling += other.dangling;
        self.orphans += other.orphans;
        self.bytes_freed += other.bytes_freed;
    }
}
