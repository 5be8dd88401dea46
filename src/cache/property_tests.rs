//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the tiers against simple reference models.

use proptest::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::cache::{BytesCodec, CacheKey, DiskCache, JsonCodec, MemoryCache};
use crate::config::CacheConfig;

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,32}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

/// Reference LRU: front = least recently used.
#[derive(Default)]
struct LruModel {
    order: VecDeque<(String, String)>,
}

impl LruModel {
    fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|(k, _)| k == key)
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let pos = self.position(key)?;
        let entry = self.order.remove(pos)?;
        let value = entry.1.clone();
        self.order.push_back(entry);
        Some(value)
    }

    fn set(&mut self, key: &str, value: &str, capacity: usize) -> Option<String> {
        let mut evicted = None;
        match self.position(key) {
            Some(pos) => {
                self.order.remove(pos);
            }
            None if self.order.len() >= capacity => {
                evicted = self.order.pop_front().map(|(k, _)| k);
            }
            None => {}
        }
        self.order.push_back((key.to_string(), value.to_string()));
        evicted
    }

    fn delete(&mut self, key: &str) {
        if let Some(pos) = self.position(key) {
            self.order.remove(pos);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Property: Memory LRU matches the reference model
    // *For any* sequence of operations on a cache of capacity C, the cache
    // holds at most C entries, every read agrees with the model, and the
    // entry evicted on overflow is always the least recently used one.
    #[test]
    fn prop_memory_matches_lru_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(cache_op_strategy(), 1..80)
    ) {
        let cache = MemoryCache::new(capacity, TEST_TTL).unwrap();
        let mut model = LruModel::default();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let evicted = model.set(&key, &value, capacity);
                    cache.set(&key, value);
                    if let Some(evicted) = evicted {
                        prop_assert!(!cache.contains(&evicted), "'{}' should be evicted", evicted);
                    }
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(cache.get(&key).ok(), model.get(&key));
                }
                CacheOp::Delete { key } => {
                    model.delete(&key);
                    cache.delete(&key);
                }
            }
            prop_assert!(cache.len() <= capacity, "size {} exceeds {}", cache.len(), capacity);
        }

        let expected: Vec<String> = model.order.iter().map(|(k, _)| k.clone()).collect();
        prop_assert_eq!(cache.keys_by_recency(), expected);
    }

    // Property: Key derivation ignores parameter order
    // *For any* set of named parameters, every permutation yields the same key.
    #[test]
    fn prop_key_param_order_independent(
        params in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
        rotate in 0usize..8
    ) {
        let forward: Vec<(String, Value)> =
            params.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let mut shuffled = forward.clone();
        if !shuffled.is_empty() {
            let by = rotate % shuffled.len();
            shuffled.rotate_left(by);
            shuffled.reverse();
        }

        let a = CacheKey::derive("op", Vec::new(), forward);
        let b = CacheKey::derive("op", Vec::new(), shuffled);
        prop_assert_eq!(a, b);
    }
}

// Disk properties touch the filesystem, so fewer cases
proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Property: Disk round trip
    // *For any* JSON-serializable value, set followed by get returns it.
    #[test]
    fn prop_disk_roundtrip(
        key in "[a-zA-Z0-9_]{1,40}",
        entries in prop::collection::btree_map("[a-z]{1,6}", value_strategy(), 0..6)
    ) {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(&CacheConfig::new(dir.path()), JsonCodec::<BTreeMap<String, String>>::new()).unwrap();

        cache.set(&key, &entries, None).unwrap();

        prop_assert_eq!(cache.get(&key).unwrap(), entries);
    }

    // Property: Disk eviction is global LRU within budget
    // *For any* sequence of inserts, the index stays within max bytes and the
    // surviving keys are exactly the newest suffix a reference model keeps.
    #[test]
    fn prop_disk_eviction_keeps_newest_within_budget(
        sizes in prop::collection::vec(1usize..400, 1..30),
        budget in 200u64..1500
    ) {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            max_cache_size: budget,
            ..CacheConfig::new(dir.path())
        };
        let cache = DiskCache::open(&config, BytesCodec).unwrap();
        let mut model: VecDeque<(String, u64)> = VecDeque::new();

        for (i, size) in sizes.iter().enumerate() {
            let key = format!("key{:03}", i);
            cache.set(&key, &vec![b'x'; *size], None).unwrap();

            model.push_back((key, *size as u64));
            while model.iter().map(|(_, s)| s).sum::<u64>() > budget {
                model.pop_front();
            }

            prop_assert!(cache.get_total_size().unwrap() <= budget);
        }

        for (i, _) in sizes.iter().enumerate() {
            let key = format!("key{:03}", i);
            let expected = model.iter().any(|(k, _)| *k == key);
            prop_assert_eq!(cache.record(&key).unwrap().is_some(), expected, "key {}", key);
            let live = cache.payload_path(&key).unwrap().map_or(false, |p| p.exists());
            prop_assert_eq!(live, expected, "file for {}", key);
        }
    }
}

// == Property Test for Error Response Format ==
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Property: Error Response Format
    // *For any* error, the HTTP response carries a JSON body whose "error"
    // field is the error's message.
    #[test]
    fn prop_error_response_format(
        error_msg in "[a-zA-Z0-9 _-]{1,100}"
    ) {
        use crate::error::{CacheError, ConfigError};
        use axum::body::to_bytes;
        use axum::response::IntoResponse;

        let error_variants = vec![
            CacheError::InvalidRequest(error_msg.clone()),
            CacheError::Internal(error_msg.clone()),
            CacheError::Config(ConfigError::InvalidTtl(error_msg.clone())),
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, error_msg.clone())),
        ];

        let rt = tokio::runtime::Runtime::new().unwrap();
        for error in error_variants {
            let expected_msg = error.to_string();
            let response = error.into_response();

            let content_type = response.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok());
            prop_assert!(
                content_type.map(|ct| ct.contains("application/json")).unwrap_or(false),
                "Response should have JSON content-type"
            );

            let bytes = rt.block_on(async {
                to_bytes(response.into_body(), usize::MAX).await.unwrap()
            });
            let json: Value = serde_json::from_slice(&bytes)
                .expect("Response body should be valid JSON");

            prop_assert_eq!(json["error"].as_str(), Some(expected_msg.as_str()));
        }
    }
}
