//! Cache key derivation
//!
//! A key is the SHA-256 of a canonical JSON document built from the
//! operation name, its positional arguments (order kept) and its named
//! parameters (sorted by name). Object members are sorted explicitly at
//! every depth, so the key does not depend on how `serde_json::Map` orders
//! its entries.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Deterministic identifier of one logical upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Starts a key for `operation`.
    pub fn builder(operation: impl Into<String>) -> KeyBuilder {
        KeyBuilder {
            operation: operation.into(),
            args: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Derives a key in one call.
    pub fn derive<I, P, K>(operation: &str, args: I, params: P) -> Self
    where
        I: IntoIterator<Item = Value>,
        P: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut builder = Self::builder(operation);
        builder.args.extend(args);
        builder
            .params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v)));
        builder.build()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Accumulates the parts of a [`CacheKey`].
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    operation: String,
    args: Vec<Value>,
    params: BTreeMap<String, Value>,
}

impl KeyBuilder {
    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a named parameter; insertion order does not matter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The canonical document that gets hashed, as compact JSON.
    pub fn canonical(&self) -> String {
        let doc = serde_json::json!({
            "op": self.operation,
            "args": self.args,
            "params": self.params,
        });
        canonicalize(&doc).to_string()
    }

    pub fn build(self) -> CacheKey {
        let digest = Sha256::digest(self.canonical().as_bytes());
        CacheKey(hex::encode(digest))
    }
}

/// Rebuilds `value` with every object's members in key order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = members
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
