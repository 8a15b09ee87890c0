//! Cache Engine - a pluggable caching layer
//!
//! Stores values under string keys with per-entry TTL, LRU/LFU/TTL
//! eviction, optional compression, tag and pattern invalidation, L1/L2
//! layering, and health reporting.

pub mod cache;
pub mod config;
pub mod error;
pub mod shell;
pub mod tasks;

pub use cache::{CacheManager, MultiLayerCache, SetOptions};
pub use config::{CacheConfig, CoherencyStrategy, EvictionPolicyKind};
pub use error::{CacheError, Result};
