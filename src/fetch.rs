//! Read-through helper
//!
//! Combines a [`CacheManager`] and a [`RateLimiter`]: a cached value is
//! returned directly, otherwise one rate-limited fetch fills the cache.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheLevel, CacheManager, Codec};
use crate::limiter::RateLimiter;

/// Returns the cached value for `key`, or fetches, stores and returns it.
///
/// Only misses consume a rate-limit slot. Cache reads and writes run on the
/// blocking pool, since either may wait on another process's index lock. A
/// failed store is logged and the fetched value still returned; a failed
/// fetch is returned unchanged and nothing is cached.
pub async fn get_or_fetch<C, F, Fut, E>(
    cache: &Arc<CacheManager<C>>,
    limiter: &RateLimiter,
    key: &str,
    fetch: F,
) -> Result<C::Value, E>
where
    C: Codec + 'static,
    C::Value: Clone + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C::Value, E>>,
{
    let lookup = {
        let cache = Arc::clone(cache);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || cache.get(&key, CacheLevel::Auto)).await
    };
    match lookup {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(miss)) => debug!(key, reason = %miss, "fetching after cache miss"),
        Err(e) => warn!(key, error = %e, "cache lookup task failed"),
    }

    let waited = limiter.acquire().await;
    if !waited.is_zero() {
        debug!(key, waited_ms = waited.as_millis() as u64, "fetch delayed by rate limit");
    }

    let value = fetch().await?;

    let store = {
        let cache = Arc::clone(cache);
        let key = key.to_string();
        let value = value.clone();
        tokio::task::spawn_blocking(move || cache.set(&key, &value, CacheLevel::Auto, None)).await
    };
    match store {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(key, error = %e, "failed to cache fetched value"),
        Err(e) => warn!(key, error = %e, "cache store task failed"),
    }
    Ok(value)
}
