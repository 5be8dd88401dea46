//! Cleanup Task
//!
//! Background task that periodically runs [`CacheManager::cleanup`]:
//! memory TTL purge, disk expiry and budget eviction, and reclamation of
//! orphaned payload files.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, Codec};

/// Spawns a background task that periodically cleans up the cache.
///
/// Each pass runs on the blocking pool since it touches SQLite and the
/// filesystem. A failed pass is logged and retried on the next tick.
///
/// # Arguments
/// * `cache` - Shared manager
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, to abort it during graceful shutdown.
pub fn spawn_cleanup_task<C>(
    cache: Arc<CacheManager<C>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()>
where
    C: Codec + 'static,
    C::Value: Clone + Send + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let pass = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || pass.cleanup()).await {
                Ok(Ok(report)) => {
                    let removed = report.memory_expired + report.disk.total();
                    if removed > 0 {
                        info!(
                            memory_expired = report.memory_expired,
                            disk_expired = report.disk.expired,
                            disk_evicted = report.disk.evicted,
                            dangling = report.disk.dangling,
                            orphans = report.disk.orphans,
                            "cache cleanup removed {} entries",
                            removed
                        );
                    } else {
                        debug!("cache cleanup: nothing to remove");
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "cache cleanup failed"),
                Err(e) => warn!(error = %e, "cache cleanup task panicked"),
            }
        }
    })
}
