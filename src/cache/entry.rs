//! Cache Entry Module
//!
//! Defines the in-memory entry and the persisted disk index record.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

// == Memory Entry ==
/// A value held by the memory tier together with its creation instant.
#[derive(Debug, Clone)]
pub struct MemoryEntry<V> {
    /// The stored value
    pub value: V,
    /// When the value was inserted (monotonic clock)
    pub created_at: Instant,
}

impl<V> MemoryEntry<V> {
    // == Constructor ==
    pub fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has outlived `ttl`.
    ///
    /// Boundary condition: an entry is expired only once its age is strictly
    /// greater than the TTL.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

// == Disk Record ==
/// One row of the disk index. Timestamps are Unix microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskRecord {
    pub key: String,
    /// Payload path relative to the cache directory
    pub file_path: String,
    pub created_at: i64,
    pub accessed_at: i64,
    pub size: u64,
    pub metadata: Option<serde_json::Value>,
}

impl DiskRecord {
    /// Age-based expiry, strict like [`MemoryEntry::is_expired`].
    pub fn is_expired(&self, now_micros: i64, ttl: Duration) -> bool {
        now_micros.saturating_sub(self.created_at) > duration_micros(ttl)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in microseconds.
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub fn duration_micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}
