//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cache::{CacheLevel, MAX_KEY_LENGTH};

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

/// Request body for PUT /set
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `level`: Target tier(s), `auto` when omitted
/// - `metadata`: Optional JSON stored alongside the disk index row
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub level: CacheLevel,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl SetRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// `?level=` query for GET /get/:key and POST /clear
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LevelQuery {
    #[serde(default)]
    pub level: CacheLevel,
}

/// Request body for POST /key
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRequest {
    /// Name of the cached operation
    pub operation: String,
    /// Positional arguments, order significant
    #[serde(default)]
    pub args: Vec<Value>,
    /// Named parameters, order insignificant
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl KeyRequest {
    pub fn validate(&self) -> Option<String> {
        if self.operation.is_empty() {
            return Some("Operation cannot be empty".to_string());
        }
        None
    }
}

/// Validates a key taken from the URL path.
pub fn validate_path_key(key: &str) -> Option<String> {
    validate_key(key)
}
