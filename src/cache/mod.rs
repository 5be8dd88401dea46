//! Cache Module
//!
//! Two-tier caching: a bounded in-process LRU tier with lazy TTL, and a
//! persistent byte-budgeted disk tier, orchestrated by [`CacheManager`].

mod codec;
mod disk;
mod entry;
mod key;
mod lookup;
mod manager;
mod memory;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use codec::{BytesCodec, Codec, JsonCodec};
pub use disk::{DiskCache, DATA_DIR, INDEX_FILE};
pub use entry::{now_micros, DiskRecord, MemoryEntry};
pub use key::{CacheKey, KeyBuilder};
pub use lookup::{Lookup, Miss};
pub use manager::{CacheLevel, CacheManager, CleanupReport};
pub use memory::MemoryCache;
pub use stats::{CacheCounters, DiskStats, EvictionReport, ManagerStats, MemoryStats};

// == Public Constants ==
/// Maximum allowed key length in bytes for the HTTP surface
pub const MAX_KEY_LENGTH: usize = 256;
