//! Tiered Cache - admin server
//!
//! Serves the two-tier cache over HTTP and runs the periodic cleanup pass.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::api::{create_router, JsonCacheManager};
use tiered_cache::{spawn_cleanup_task, AppState, Config, RateLimiter};

/// Main entry point for the cache admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Open the cache tiers
/// 4. Start background cleanup task
/// 5. Serve the router until SIGINT/SIGTERM, then close the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tiered cache server");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        enabled = config.cache.enable_cache,
        cache_dir = %config.cache.cache_dir.display(),
        max_cache_size = config.cache.max_cache_size,
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config.cache).context("failed to open cache")?;
    // Outbound calls go through get_or_fetch; the server only reports the limit
    let limiter = RateLimiter::from_config(&config.rate_limit)?;
    info!(
        max_requests = limiter.max_requests(),
        window_secs = limiter.window().as_secs(),
        "Rate limit configured"
    );

    let cleanup_handle = spawn_cleanup_task(state.cache.clone(), config.cleanup_interval);
    info!("Background cleanup task started");

    let cache = Arc::clone(&state.cache);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup_handle.abort();
    // Wait for the aborted task to drop its handle on the cache
    let _ = cleanup_handle.await;
    warn!("Cleanup task aborted");

    close_cache(cache);
    info!("Server shutdown complete");
    Ok(())
}

/// Closes the disk index once no other handle to the manager remains.
fn close_cache(cache: Arc<JsonCacheManager>) {
    match Arc::try_unwrap(cache) {
        Ok(manager) => {
            if let Err(e) = manager.close() {
                warn!(error = %e, "failed to close cache");
            }
        }
        Err(_) => warn!("cache still shared at shutdown, index closed on drop"),
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
