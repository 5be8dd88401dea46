//! Memory Cache Module
//!
//! Fast in-process tier: an `lru::LruCache` for O(1) recency tracking, with
//! lazy TTL expiration on top.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tracing::debug;

use crate::cache::{CacheCounters, Lookup, MemoryEntry, MemoryStats, Miss};
use crate::error::ConfigError;

struct MemoryInner<V> {
    entries: LruCache<String, MemoryEntry<V>>,
    counters: CacheCounters,
}

// == Memory Cache ==
/// Bounded LRU cache with lazy TTL, guarded by one mutex.
pub struct MemoryCache<V> {
    inner: Mutex<MemoryInner<V>>,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Time-to-live applied to every entry
    ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    // == Constructor ==
    /// Creates a new MemoryCache with specified capacity and TTL.
    ///
    /// # Errors
    /// `ConfigError` when `max_size` or `ttl` is zero.
    pub fn new(max_size: usize, ttl: Duration) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(max_size).ok_or_else(|| {
            ConfigError::InvalidSize("memory cache max_size must be > 0".to_string())
        })?;
        if ttl.is_zero() {
            return Err(ConfigError::InvalidTtl(
                "memory cache ttl must be > 0".to_string(),
            ));
        }

        Ok(Self {
            inner: Mutex::new(MemoryInner {
                entries: LruCache::new(capacity),
                counters: CacheCounters::new(),
            }),
            max_size,
            ttl,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Get ==
    /// Retrieves a value and marks it most recently used.
    ///
    /// Expired entries are removed and reported as `Miss::Expired`.
    pub fn get(&self, key: &str) -> Lookup<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            None => {
                inner.counters.record_miss();
                return Err(Miss::Absent);
            }
            Some(entry) => entry.is_expired(self.ttl),
        };

        if expired {
            inner.entries.pop(key);
            inner.counters.record_expirations(1);
            inner.counters.record_miss();
            debug!(key, "memory entry expired");
            return Err(Miss::Expired);
        }

        let value = inner
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(Miss::Absent)?;
        inner.counters.record_hit();
        Ok(value)
    }

    // == Set ==
    /// Stores a value, resetting its TTL.
    ///
    /// Inserting a new key at capacity evicts the least recently used entry;
    /// overwriting an existing key never evicts.
    pub fn set(&self, key: &str, value: V) {
        let mut inner = self.lock();

        if let Some((displaced, _)) = inner.entries.push(key.to_string(), MemoryEntry::new(value)) {
            // push hands back the old entry on overwrite, the LRU one on eviction
            if displaced != key {
                inner.counters.record_evictions(1);
                debug!(key = %displaced, "memory entry evicted");
            }
        }
    }

    // == Delete ==
    /// Removes an entry. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    // == Clear ==
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    // == Contains ==
    /// Checks for a live entry without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(self.ttl))
    }

    // == Purge Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.lock();
        let ttl = self.ttl;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.counters.record_expirations(expired.len() as u64);
        expired.len()
    }

    // == Stats ==
    /// Returns a snapshot; `expired_entries` is a linear scan.
    pub fn stats(&self) -> MemoryStats {
        let inner = self.lock();
        let expired_entries = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .count();

        MemoryStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs_f64(),
            expired_entries,
            hit_rate: inner.counters.hit_rate(),
            counters: inner.counters.clone(),
        }
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::{self, sleep};

    fn cache(max: usize) -> MemoryCache<String> {
        MemoryCache::new(max, Duration::from_secs(300)).unwrap()
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = MemoryCache::<String>::new(0, Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::InvalidSize(_))));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let result = MemoryCache::<String>::new(10, Duration::ZERO);
        assert!(matches!(result, Err(ConfigError::InvalidTtl(_))));
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache(100);

        cache.set("key1", "value1".to_string());

        assert_eq!(cache.get("key1").unwrap(), "value1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let cache = cache(100);
        assert!(matches!(cache.get("nonexistent"), Err(Miss::Absent)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = cache(100);

        cache.set("key1", "value1".to_string());
        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite() {
        let cache = cache(100);

        cache.set("key1", "value1".to_string());
        cache.set("key1", "value2".to_string());

        assert_eq!(cache.get("key1").unwrap(), "value2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache = cache(2);

        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("b"));
        assert_eq!(cache.stats().counters.evictions, 0);
    }

    #[test]
    fn test_ttl_expiration_removes_entry() {
        let cache = MemoryCache::new(10, Duration::from_millis(20)).unwrap();

        cache.set("key1", 1u8);
        assert!(cache.get("key1").is_ok());

        sleep(Duration::from_millis(40));

        assert!(matches!(cache.get("key1"), Err(Miss::Expired)));
        assert_eq!(cache.len(), 0);
        assert!(matches!(cache.get("key1"), Err(Miss::Absent)));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = cache(3);

        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.set("key3", "value3".to_string());
        cache.set("key4", "value4".to_string());

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("key1"));
        assert!(cache.contains("key2"));
        assert!(cache.contains("key4"));
        assert_eq!(cache.stats().counters.evictions, 1);
        assert_eq!(cache.keys_by_recency(), vec!["key2", "key3", "key4"]);
    }

    #[test]
    fn test_lru_touch_on_get() {
        let cache = cache(3);

        cache.set("key1", "value1".to_string());
        cache.set("key2", "value2".to_string());
        cache.set("key3", "value3".to_string());
        cache.get("key1").unwrap();
        cache.set("key4", "value4".to_string());

        assert!(cache.contains("key1"));
        assert!(!cache.contains("key2"));
        assert_eq!(cache.keys_by_recency(), vec!["key3", "key1", "key4"]);
    }

    #[test]
    fn test_contains_does_not_touch() {
        let cache = cache(2);

        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        assert!(cache.contains("a"));
        cache.set("c", "3".to_string());

        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_stats_counts_expired_without_purging() {
        let cache = MemoryCache::new(10, Duration::from_millis(20)).unwrap();

        cache.set("old", 1u8);
        sleep(Duration::from_millis(40));
        cache.set("new", 2u8);

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.expired_entries, 1);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().expired_entries, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_hits_and_misses() {
        let cache = cache(10);

        cache.set("key1", "value1".to_string());
        cache.get("key1").unwrap();
        let _ = cache.get("nonexistent");

        let stats = cache.stats();
        assert_eq!(stats.counters.hits, 1);
        assert_eq!(stats.counters.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_clear() {
        let cache = cache(10);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.keys_by_recency().is_empty());
    }

    #[test]
    fn test_concurrent_writers_respect_capacity() {
        let cache = Arc::new(MemoryCache::new(16, Duration::from_secs(60)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(&format!("t{}-{}", t, i), i);
                        let _ = cache.get(&format!("t{}-{}", t, i / 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 16);
    }
}
