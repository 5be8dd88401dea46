//! Tagged lookup results
//!
//! Reads never fail hard: they either hit or report why they missed, so
//! callers branch on the kind of miss instead of on error types.

use thiserror::Error;

use crate::error::CacheError;

/// Why a cache read did not produce a value.
#[derive(Error, Debug)]
pub enum Miss {
    /// No entry under this key
    #[error("not found")]
    Absent,

    /// Entry outlived its TTL and was purged
    #[error("expired")]
    Expired,

    /// Persisted payload was missing or undecodable and has been purged
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// The tier could not be read (I/O, busy index)
    #[error("tier unavailable: {0}")]
    Io(#[from] CacheError),

    /// Caching (or the requested tier) is switched off
    #[error("cache disabled")]
    Disabled,
}

impl Miss {
    /// True for misses that indicate a degraded tier rather than a cold key.
    pub fn is_failure(&self) -> bool {
        matches!(self, Miss::Corrupted(_) | Miss::Io(_))
    }
}

/// Result of a cache read.
pub type Lookup<T> = std::result::Result<T, Miss>;
