//! Cache Manager Module
//!
//! Puts the memory and disk tiers behind one interface: read-through with
//! promotion, fan-out writes, and aggregated failures.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheKey, Codec, DiskCache, EvictionReport, Lookup, ManagerStats, MemoryCache, Miss,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result, Tier};

/// Which tier(s) an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    /// Reads check memory then disk; writes go to every enabled tier
    #[default]
    #[serde(alias = "all")]
    Auto,
    Memory,
    Disk,
}

impl CacheLevel {
    fn includes(self, tier: Tier) -> bool {
        match self {
            CacheLevel::Auto => true,
            CacheLevel::Memory => tier == Tier::Memory,
            CacheLevel::Disk => tier == Tier::Disk,
        }
    }
}

// == Cache Manager ==
/// Two-tier cache. Construct one per process and pass it to collaborators.
pub struct CacheManager<C: Codec> {
    enabled: bool,
    memory: Option<MemoryCache<C::Value>>,
    disk: Option<DiskCache<C>>,
}

impl<C> CacheManager<C>
where
    C: Codec,
    C::Value: Clone,
{
    // == Constructor ==
    /// Builds the tiers selected by `config`.
    ///
    /// # Errors
    /// `CacheError::Config` on invalid settings, before any I/O; I/O or index
    /// errors if the disk tier cannot be opened.
    pub fn new(config: &CacheConfig, codec: C) -> Result<Self> {
        config.validate()?;

        if !config.enable_cache {
            info!("caching disabled");
            return Ok(Self::disabled());
        }

        let memory = if config.memory_enabled {
            Some(MemoryCache::new(config.memory_max_entries, config.memory_ttl)?)
        } else {
            None
        };
        let disk = if config.disk_enabled {
            Some(DiskCache::open(config, codec)?)
        } else {
            None
        };

        info!(
            memory = memory.is_some(),
            disk = disk.is_some(),
            "cache manager ready"
        );
        Ok(Self {
            enabled: true,
            memory,
            disk,
        })
    }

    /// A manager on which every operation is a no-op.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            memory: None,
            disk: None,
        }
    }

    // == Key Derivation ==
    /// Derives the key for `operation` called with `args` and named `params`.
    pub fn generate_key<I, P, K>(&self, operation: &str, args: I, params: P) -> CacheKey
    where
        I: IntoIterator<Item = Value>,
        P: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        CacheKey::derive(operation, args, params)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn memory(&self) -> Option<&MemoryCache<C::Value>> {
        self.memory.as_ref()
    }

    pub fn disk(&self) -> Option<&DiskCache<C>> {
        self.disk.as_ref()
    }

    // == Get ==
    /// Reads `key` from the tiers selected by `level`.
    ///
    /// With `Auto`, a disk hit is copied into memory before it is returned.
    /// A failing disk tier degrades to a miss.
    pub fn get(&self, key: &str, level: CacheLevel) -> Lookup<C::Value> {
        if !self.enabled {
            return Err(Miss::Disabled);
        }

        let memory = self.memory.as_ref().filter(|_| level.includes(Tier::Memory));
        let disk = self.disk.as_ref().filter(|_| level.includes(Tier::Disk));
        if memory.is_none() && disk.is_none() {
            return Err(Miss::Disabled);
        }

        let mut miss = Miss::Absent;
        if let Some(memory) = memory {
            match memory.get(key) {
                Ok(value) => {
                    debug!(key, tier = "memory", "cache hit");
                    return Ok(value);
                }
                Err(m) => miss = m,
            }
        }

        if let Some(disk) = disk {
            match disk.get(key) {
                Ok(value) => {
                    debug!(key, tier = "disk", "cache hit");
                    if level == CacheLevel::Auto {
                        if let Some(memory) = self.memory.as_ref() {
                            memory.set(key, value.clone());
                        }
                    }
                    return Ok(value);
                }
                Err(m) => {
                    if m.is_failure() {
                        warn!(key, error = %m, "disk tier miss");
                    }
                    miss = m;
                }
            }
        }

        debug!(key, reason = %miss, "cache miss");
        Err(miss)
    }

    // == Set ==
    /// Writes `value` to every tier selected by `level`.
    ///
    /// Every selected tier is attempted; failures come back as one
    /// `CacheError::Tiers`.
    pub fn set(
        &self,
        key: &str,
        value: &C::Value,
        level: CacheLevel,
        metadata: Option<Value>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(memory) = self.memory.as_ref().filter(|_| level.includes(Tier::Memory)) {
            memory.set(key, value.clone());
        }

        let mut failures = Vec::new();
        if let Some(disk) = self.disk.as_ref().filter(|_| level.includes(Tier::Disk)) {
            if let Err(e) = disk.set(key, value, metadata) {
                warn!(key, error = %e, "disk write failed");
                failures.push((Tier::Disk, e));
            }
        }
        CacheError::aggregate(failures)
    }

    // == Delete ==
    /// Removes `key` from both tiers.
    pub fn delete(&self, key: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(memory) = &self.memory {
            memory.delete(key);
        }

        let mut failures = Vec::new();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.delete(key) {
                failures.push((Tier::Disk, e));
            }
        }
        CacheError::aggregate(failures)
    }

    // == Clear ==
    pub fn clear(&self, level: CacheLevel) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(memory) = self.memory.as_ref().filter(|_| level.includes(Tier::Memory)) {
            memory.clear();
            info!("memory cache cleared");
        }

        let mut failures = Vec::new();
        if let Some(disk) = self.disk.as_ref().filter(|_| level.includes(Tier::Disk)) {
            if let Err(e) = disk.clear() {
                failures.push((Tier::Disk, e));
            }
        }
        CacheError::aggregate(failures)
    }

    // == Cleanup ==
    /// Purges expired memory entries and runs the disk cleanup pass.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        if !self.enabled {
            return Ok(report);
        }

        if let Some(memory) = &self.memory {
            report.memory_expired = memory.purge_expired() as u64;
        }

        let mut failures = Vec::new();
        if let Some(disk) = &self.disk {
            match disk.cleanup() {
                Ok(disk_report) => report.disk.merge(disk_report),
                Err(e) => failures.push((Tier::Disk, e)),
            }
        }
        CacheError::aggregate(failures)?;
        Ok(report)
    }

    // == Stats ==
    pub fn get_stats(&self) -> ManagerStats {
        let disk = self.disk.as_ref().and_then(|disk| match disk.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "disk stats unavailable");
                None
            }
        });

        ManagerStats {
            enabled: self.enabled,
            memory: self.memory.as_ref().map(MemoryCache::stats),
            disk,
        }
    }

    // == Close ==
    /// Releases both tiers; the disk index is closed explicitly.
    pub fn close(self) -> Result<()> {
        if let Some(memory) = &self.memory {
            memory.clear();
        }
        match self.disk {
            Some(disk) => disk.close(),
            None => Ok(()),
        }
    }
}

/// Outcome of [`CacheManager::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub memory_expired: u64,
    pub disk: EvictionReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::JsonCodec;
    use serde_json::json;
    use tempfile::TempDir;

    type Manager = CacheManager<JsonCodec<Value>>;

    fn manager(dir: &TempDir) -> Manager {
        CacheManager::new(&CacheConfig::new(dir.path()), JsonCodec::new()).unwrap()
    }

    #[test]
    fn test_level_deserialize() {
        let level: CacheLevel = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(level, CacheLevel::Auto);
        let level: CacheLevel = serde_json::from_str(r#""disk""#).unwrap();
        assert_eq!(level, CacheLevel::Disk);
    }

    #[test]
    fn test_generate_key_ignores_param_order() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);

        let a = cache.generate_key("quotes", vec![], vec![("a", json!(1)), ("b", json!(2))]);
        let b = cache.generate_key("quotes", vec![], vec![("b", json!(2)), ("a", json!(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_set_writes_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);

        cache.set("k", &json!(1), CacheLevel::Auto, None).unwrap();

        assert!(cache.memory().unwrap().contains("k"));
        assert!(cache.disk().unwrap().record("k").unwrap().is_some());
    }

    #[test]
    fn test_memory_level_skips_disk() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);

        cache.set("k", &json!(1), CacheLevel::Memory, None).unwrap();

        assert!(cache.disk().unwrap().record("k").unwrap().is_none());
        assert!(matches!(cache.get("k", CacheLevel::Disk), Err(Miss::Absent)));
        assert_eq!(cache.get("k", CacheLevel::Memory).unwrap(), json!(1));
    }

    #[test]
    fn test_disk_level_read_does_not_promote() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);

        cache.set("k", &json!(1), CacheLevel::Disk, None).unwrap();
        assert_eq!(cache.get("k", CacheLevel::Disk).unwrap(), json!(1));

        assert!(!cache.memory().unwrap().contains("k"));
    }

    #[test]
    fn test_delete_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);
        cache.set("k", &json!(1), CacheLevel::Auto, None).unwrap();

        cache.delete("k").unwrap();

        assert!(matches!(cache.get("k", CacheLevel::Auto), Err(Miss::Absent)));
        cache.delete("k").unwrap();
    }

    #[test]
    fn test_disk_only_manager() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            memory_enabled: false,
            ..CacheConfig::new(dir.path())
        };
        let cache: Manager = CacheManager::new(&config, JsonCodec::new()).unwrap();

        cache.set("k", &json!("v"), CacheLevel::Auto, None).unwrap();

        assert!(cache.memory().is_none());
        assert_eq!(cache.get("k", CacheLevel::Auto).unwrap(), json!("v"));
        assert!(matches!(cache.get("k", CacheLevel::Memory), Err(Miss::Disabled)));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            memory_max_entries: 0,
            ..CacheConfig::new(dir.path().join("never-created"))
        };
        let result: Result<Manager> = CacheManager::new(&config, JsonCodec::new());

        assert!(matches!(result, Err(CacheError::Config(_))));
        assert!(!dir.path().join("never-created").exists());
    }

    #[test]
    fn test_stats_include_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);
        cache.set("k", &json!(1), CacheLevel::Auto, None).unwrap();

        let stats = cache.get_stats();
        assert!(stats.enabled);
        assert_eq!(stats.memory.unwrap().size, 1);
        assert_eq!(stats.disk.unwrap().entries, 1);
    }

    #[test]
    fn test_cleanup_on_fresh_cache_reports_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir);
        cache.set("k", &json!(1), CacheLevel::Auto, None).unwrap();

        let report = cache.cleanup().unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
