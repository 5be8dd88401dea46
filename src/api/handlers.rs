//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints. Cache operations
//! touch SQLite and the filesystem, so each one runs on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheManager, CleanupReport, JsonCodec, ManagerStats, Miss};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_path_key, ClearResponse, DeleteResponse, GetResponse, HealthResponse, KeyRequest,
    KeyResponse, LevelQuery, SetRequest, SetResponse,
};

/// Manager type served over HTTP: arbitrary JSON values.
pub type JsonCacheManager = CacheManager<JsonCodec<Value>>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared two-tier cache; the manager synchronizes internally
    pub cache: Arc<JsonCacheManager>,
}

impl AppState {
    /// Creates a new AppState around an existing manager.
    pub fn new(cache: JsonCacheManager) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// # Errors
    /// Configuration or disk-open failures from [`CacheManager::new`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(CacheManager::new(config, JsonCodec::new())?))
    }
}

/// Runs `op` against the cache on the blocking thread pool.
async fn with_cache<T, F>(state: &AppState, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&JsonCacheManager) -> Result<T> + Send + 'static,
{
    let cache = Arc::clone(&state.cache);
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))?
}

fn check_key(key: &str) -> Result<()> {
    match validate_path_key(key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let SetRequest {
        key,
        value,
        level,
        metadata,
    } = req;
    let response = SetResponse::new(key.as_str());
    with_cache(&state, move |cache| cache.set(&key, &value, level, metadata)).await?;

    Ok(Json(response))
}

/// Handler for GET /get/:key
///
/// A cold, expired or corrupted key is a 404; an unreadable tier is
/// reported as the underlying error.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<LevelQuery>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;

    let lookup_key = key.clone();
    let lookup = with_cache(&state, move |cache| {
        Ok(cache.get(&lookup_key, query.level))
    })
    .await?;

    match lookup {
        Ok(value) => Ok(Json(GetResponse::new(key, value))),
        Err(Miss::Io(e)) => Err(e),
        Err(miss) => {
            debug!(key = %key, reason = %miss, "get miss");
            Err(CacheError::NotFound(key))
        }
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;

    let target = key.clone();
    with_cache(&state, move |cache| cache.delete(&target)).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /clear
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<LevelQuery>,
) -> Result<Json<ClearResponse>> {
    with_cache(&state, move |cache| cache.clear(query.level)).await?;
    Ok(Json(ClearResponse::new(query.level)))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Result<Json<CleanupReport>> {
    let report = with_cache(&state, |cache| cache.cleanup()).await?;
    Ok(Json(report))
}

/// Handler for POST /key
///
/// Derives the cache key for an operation call without touching the cache.
pub async fn key_handler(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<KeyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = state
        .cache
        .generate_key(&req.operation, req.args, req.params);
    Ok(Json(KeyResponse {
        key: key.into_string(),
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<ManagerStats>> {
    let stats = with_cache(&state, |cache| Ok(cache.get_stats())).await?;
    Ok(Json(stats))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.is_enabled()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLevel;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        AppState::from_config(&CacheConfig::new(dir.path())).unwrap()
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            level: CacheLevel::Auto,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = set_request("test_key", json!({"v": [1, 2, 3]}));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(
            State(state),
            Path("test_key".to_string()),
            Query(LevelQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!({"v": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let result = get_handler(
            State(state),
            Path("nonexistent".to_string()),
            Query(LevelQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        set_handler(State(state.clone()), Json(set_request("to_delete", json!(1))))
            .await
            .unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        let result = get_handler(
            State(state),
            Path("to_delete".to_string()),
            Query(LevelQuery::default()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_clear_memory_only_keeps_disk() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        set_handler(State(state.clone()), Json(set_request("k", json!("v"))))
            .await
            .unwrap();

        clear_handler(
            State(state.clone()),
            Query(LevelQuery {
                level: CacheLevel::Memory,
            }),
        )
        .await
        .unwrap();

        let response = get_handler(
            State(state),
            Path("k".to_string()),
            Query(LevelQuery {
                level: CacheLevel::Disk,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!("v"));
    }

    #[tokio::test]
    async fn test_key_handler_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let req: KeyRequest =
            serde_json::from_value(json!({"operation": "quotes", "params": {"b": 2, "a": 1}}))
                .unwrap();
        let same: KeyRequest =
            serde_json::from_value(json!({"operation": "quotes", "params": {"a": 1, "b": 2}}))
                .unwrap();

        let a = key_handler(State(state.clone()), Json(req)).await.unwrap();
        let b = key_handler(State(state), Json(same)).await.unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.key.len(), 64);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let stats = stats_handler(State(state)).await.unwrap();
        assert!(stats.enabled);
        assert_eq!(stats.memory.as_ref().unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let state = AppState::new(CacheManager::disabled());
        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "healthy");
        assert!(!response.cache_enabled);
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let result = set_handler(State(state), Json(set_request("", json!("value")))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
