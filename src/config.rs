//! Configuration Module
//!
//! The cache tiers and the rate limiter are configured through plain structs
//! handed to their constructors; only the server binary reads the
//! environment, through [`Config::from_env`].

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Settings consumed by [`crate::cache::CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global switch; when false every cache operation is a no-op
    pub enable_cache: bool,
    /// Disk entry time-to-live
    pub cache_ttl: Duration,
    /// Disk byte budget
    pub max_cache_size: u64,
    /// Root directory holding `cache.db` and `data/`
    pub cache_dir: PathBuf,
    /// Whether the in-process tier is used
    pub memory_enabled: bool,
    /// Maximum number of entries in the in-process tier
    pub memory_max_entries: usize,
    /// In-process entry time-to-live
    pub memory_ttl: Duration,
    /// Whether the on-disk tier is used
    pub disk_enabled: bool,
    /// How long a disk operation waits on another process's write lock
    pub busy_timeout: Duration,
    /// Minimum age of an unindexed payload file before the sweep removes it
    pub orphan_grace: Duration,
}

impl CacheConfig {
    /// Creates a config with defaults rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Checks every parameter, failing fast before any I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enable_cache {
            return Ok(());
        }
        if self.disk_enabled {
            self.validate_disk()?;
        }
        if self.memory_enabled {
            self.validate_memory()?;
        }
        Ok(())
    }

    /// Checks the disk tier settings regardless of the enable flags.
    pub fn validate_disk(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidTtl("cache_ttl must be > 0".to_string()));
        }
        if self.max_cache_size == 0 {
            return Err(ConfigError::InvalidSize(
                "max_cache_size must be > 0".to_string(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPath(
                "cache_dir must not be empty".to_string(),
            ));
        }
        if self.cache_dir.is_file() {
            return Err(ConfigError::InvalidPath(format!(
                "{} is a file",
                self.cache_dir.display()
            )));
        }
        Ok(())
    }

    /// Checks the memory tier settings regardless of the enable flags.
    pub fn validate_memory(&self) -> Result<(), ConfigError> {
        if self.memory_ttl.is_zero() {
            return Err(ConfigError::InvalidTtl("memory_ttl must be > 0".to_string()));
        }
        if self.memory_max_entries == 0 {
            return Err(ConfigError::InvalidSize(
                "memory_max_entries must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_ttl: Duration::from_secs(86_400),
            max_cache_size: 500 * 1024 * 1024,
            cache_dir: PathBuf::from("cache"),
            memory_enabled: true,
            memory_max_entries: 1000,
            memory_ttl: Duration::from_secs(3600),
            disk_enabled: true,
            busy_timeout: Duration::from_secs(5),
            orphan_grace: Duration::from_secs(60),
        }
    }
}

/// Settings consumed by [`crate::limiter::RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum admissions inside any trailing window
    pub max_requests: usize,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_seconds: 60,
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache tier settings
    pub cache: CacheConfig,
    /// Outbound rate limit settings
    pub rate_limit: RateLimitConfig,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ENABLE_CACHE` - Global cache switch (default: true)
    /// - `CACHE_TTL` - Disk TTL in seconds (default: 86400)
    /// - `MAX_CACHE_SIZE` - Disk budget in bytes (default: 500 MiB)
    /// - `CACHE_DIR` - Cache directory (default: ./cache)
    /// - `MEMORY_CACHE_ENABLED` / `MEMORY_MAX_ENTRIES` / `MEMORY_CACHE_TTL`
    /// - `DISK_CACHE_ENABLED`
    /// - `RATE_LIMIT_MAX_REQUESTS` / `RATE_LIMIT_WINDOW` (default: 60 per 60s)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = CacheConfig::default();
        let rate_defaults = RateLimitConfig::default();

        let cache = CacheConfig {
            enable_cache: env_or("ENABLE_CACHE", defaults.enable_cache),
            cache_ttl: Duration::from_secs(env_or(
                "CACHE_TTL",
                defaults.cache_ttl.as_secs(),
            )),
            max_cache_size: env_or("MAX_CACHE_SIZE", defaults.max_cache_size),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.cache_dir.clone()),
            memory_enabled: env_or("MEMORY_CACHE_ENABLED", defaults.memory_enabled),
            memory_max_entries: env_or("MEMORY_MAX_ENTRIES", defaults.memory_max_entries),
            memory_ttl: Duration::from_secs(env_or(
                "MEMORY_CACHE_TTL",
                defaults.memory_ttl.as_secs(),
            )),
            disk_enabled: env_or("DISK_CACHE_ENABLED", defaults.disk_enabled),
            ..defaults
        };

        Self {
            cache,
            rate_limit: RateLimitConfig {
                max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", rate_defaults.max_requests),
                window_seconds: env_or("RATE_LIMIT_WINDOW", rate_defaults.window_seconds),
            },
            server_port: env_or("SERVER_PORT", 3000),
            cleanup_interval: env_or("CLEANUP_INTERVAL", 300),
        }
    }

    /// Validates the cache and rate limit sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidMaxRequests(
                "max_requests must be > 0".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::InvalidWindow(
                "window_seconds must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server_port: 3000,
            cleanup_interval: 300,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
