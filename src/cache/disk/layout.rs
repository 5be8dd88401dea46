//! On-disk layout of the disk tier.
//!
//! ```text
//! {cache_dir}/cache.db
//! {cache_dir}/data/{stem[..2]}/{stem}.{version}.blob
//! ```
//!
//! The stem is the key itself when it is filesystem-safe, otherwise the
//! SHA-256 hex of the key. Every write gets a fresh `version` (timestamp,
//! pid and a per-process sequence), so a committed payload is never
//! overwritten in place; the index row names the live file.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::entry::now_micros;

pub const INDEX_FILE: &str = "cache.db";
pub const DATA_DIR: &str = "data";
const BLOB_EXT: &str = "blob";
const TMP_MARKER: &str = ".tmp.";
const MAX_STEM_LEN: usize = 128;

static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn is_safe_stem(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_STEM_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub fn file_stem(key: &str) -> Cow<'_, str> {
    if is_safe_stem(key) {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(hex::encode(Sha256::digest(key.as_bytes())))
    }
}

fn version() -> String {
    let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{}-{}", now_micros(), std::process::id(), seq)
}

/// A fresh payload path for `key`, relative to the cache directory.
///
/// No two calls return the same path, in this process or any other.
pub fn fresh_path(key: &str) -> String {
    let stem = file_stem(key);
    let shard: String = stem.chars().take(2).collect();
    format!("{}/{}/{}.{}.{}", DATA_DIR, shard, stem, version(), BLOB_EXT)
}

/// Writes `bytes` to `path` via a uniquely named sibling and a rename, so
/// readers never observe a half-written payload.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!("{}{}.{}", TMP_MARKER, std::process::id(), seq));
    let tmp = Path::new(&tmp_name);

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_data()?;
        fs::rename(tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result
}

/// Removes a file, treating "already gone" as success.
///
/// Returns whether a file was actually deleted.
pub fn remove_quietly(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_payload_file(name: &str) -> bool {
    name.ends_with(".blob") || name.contains(TMP_MARKER)
}

fn older_than(meta: &fs::Metadata, grace: Duration) -> bool {
    meta.modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map_or(true, |age| age >= grace)
}

/// Deletes payload files under `data/` that no index row references.
///
/// Files younger than `grace` are kept: another process may have written
/// them and not committed its index row yet. Returns `(files, bytes)`.
pub fn sweep_orphans(
    cache_dir: &Path,
    indexed: &HashSet<String>,
    grace: Duration,
) -> io::Result<(u64, u64)> {
    let data_dir = cache_dir.join(DATA_DIR);
    let shards = match fs::read_dir(&data_dir) {
        Ok(shards) => shards,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    let mut bytes = 0;
    for shard in shards {
        let shard = shard?;
        if !shard.file_type()?.is_dir() {
            continue;
        }
        let shard_name = shard.file_name().to_string_lossy().into_owned();

        for file in fs::read_dir(shard.path())? {
            let file = file?;
            let name = file.file_name().to_string_lossy().into_owned();
            if !is_payload_file(&name) {
                continue;
            }
            let relative = format!("{}/{}/{}", DATA_DIR, shard_name, name);
            if indexed.contains(&relative) {
                continue;
            }
            let meta = file.metadata()?;
            if !older_than(&meta, grace) {
                continue;
            }
            if remove_quietly(&file.path())? {
                debug!(path = %relative, "removed orphan payload");
                removed += 1;
                bytes += meta.len();
            }
        }

        // Only succeeds when the shard is empty
        let _ = fs::remove_dir(shard.path());
    }

    Ok((removed, bytes))
}
