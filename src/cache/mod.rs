//! Cache Module
//!
//! Pluggable caching with TTL expiration, LRU/LFU/TTL eviction, optional
//! compression, tag and pattern invalidation, and L1/L2 layering.

pub mod compression;
mod entry;
mod events;
mod health;
mod layered;
mod manager;
pub mod policy;
mod stats;
pub mod storage;
pub mod warming;


use serde::de::DeserializeOwned;
use serde::Serialize;

// Re-export public types
pub use compression::{CompressionAlgorithm, Compressor, Lz4Compressor};
pub use entry::{current_timestamp_ms, CacheEntry, EntryMetadata, EntryValue};
pub use events::{CacheEvent, CacheEventType, EventCallback};
pub use health::{CacheHealth, HealthStatus, Recommendation, RecommendationKind};
pub use layered::MultiLayerCache;
pub use manager::{CacheManager, SetOptions};
pub use policy::EvictionPolicy;
pub use stats::{CacheStatistics, CompressionStats, PerformanceStats};
pub use storage::{MemoryStorage, PersistentStorage, StorageBackend, StorageQuota};
pub use warming::{PopularWarmingStrategy, UsageRecord, WarmingConfig, WarmingStrategy};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Largest payload a compressed entry may expand to
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Bounds every cached value type must satisfy.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
