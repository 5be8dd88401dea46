//! Tiered Cache - A two-tier memoization cache for expensive remote calls
//!
//! Provides a bounded in-process LRU tier, a persistent SQLite-indexed disk
//! tier shared across processes, a sliding-window rate limiter for the
//! calls being cached, and a small HTTP admin surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod limiter;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheKey, CacheLevel, CacheManager, Lookup, Miss};
pub use config::{CacheConfig, Config, RateLimitConfig};
pub use error::{CacheError, ConfigError};
pub use fetch::get_or_fetch;
pub use limiter::RateLimiter;
pub use tasks::spawn_cleanup_task;
