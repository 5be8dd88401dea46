//! Error types for the cache subsystem
//!
//! Provides unified error handling using thiserror.
//!
//! Two families exist: [`ConfigError`] is fatal and raised at construction
//! time before any I/O happens; [`CacheError`] describes a single failed
//! operation and is always recoverable by the caller.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Config Error Enum ==
/// Invalid construction parameters for a cache tier or the rate limiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// TTL must be strictly positive
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Size or capacity limit must be strictly positive
    #[error("Invalid cache size: {0}")]
    InvalidSize(String),

    /// Cache directory is unusable
    #[error("Invalid cache directory: {0}")]
    InvalidPath(String),

    /// Rate limiter needs at least one admission per window
    #[error("Invalid max_requests: {0}")]
    InvalidMaxRequests(String),

    /// Rate limiter window must be strictly positive
    #[error("Invalid rate limit window: {0}")]
    InvalidWindow(String),
}

// == Codec Error ==
/// Failure to encode or decode a payload.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(msg: impl fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

// == Tier ==
/// Identifies one of the two cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Disk,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Memory => f.write_str("memory"),
            Tier::Disk => f.write_str("disk"),
        }
    }
}

// == Cache Error Enum ==
/// Recoverable failure of a single cache operation.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Construction was attempted with invalid parameters
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The SQLite index failed (includes busy timeouts)
    #[error("Index error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Key missing from every selected tier (HTTP surface only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// One or more tiers failed while the others were still attempted
    #[error("Cache tier failure: {}", describe_failures(.0))]
    Tiers(Vec<(Tier, CacheError)>),

    /// Internal error (e.g. a blocking task was cancelled)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Folds per-tier failures into a single error, or `Ok` when none failed.
    pub fn aggregate(failures: Vec<(Tier, CacheError)>) -> Result<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Tiers(failures))
        }
    }

    /// Returns true when SQLite reported the index as locked past the busy timeout.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            CacheError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }
}

fn describe_failures(failures: &[(Tier, CacheError)]) -> String {
    failures
        .iter()
        .map(|(tier, err)| format!("{}: {}", tier, err))
        .collect::<Vec<_>>()
        .join("; ")
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Config(_) => StatusCode::BAD_REQUEST,
            CacheError::Codec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Database(_) if self.is_busy() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
