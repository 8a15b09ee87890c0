//! Configuration Module
//!
//! Cache configuration, its partial-update form, and loading from
//! environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Eviction Policy Kind ==
/// Name of the eviction policy a manager runs with.
///
/// Unknown names resolve to `Lru`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Lfu,
    Ttl,
}

impl EvictionPolicyKind {
    /// Resolves a policy name, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "LFU" => Self::Lfu,
            "TTL" => Self::Ttl,
            "LRU" => Self::Lru,
            other => {
                tracing::warn!("Unknown eviction policy '{}', falling back to LRU", other);
                Self::Lru
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "LRU",
            Self::Lfu => "LFU",
            Self::Ttl => "TTL",
        }
    }
}

impl From<String> for EvictionPolicyKind {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<EvictionPolicyKind> for String {
    fn from(kind: EvictionPolicyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EvictionPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Storage Type ==
/// Which storage backend a manager is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Ephemeral in-process map
    #[default]
    Memory,
    /// Serialized, quota-bounded key-value store
    Persistent,
}

impl StorageType {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "persistent" => Some(Self::Persistent),
            _ => None,
        }
    }
}

// == Coherency Strategy ==
/// How writes to L1 propagate to L2 in a multi-layer cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoherencyStrategy {
    /// Every set is written to both layers before returning
    #[default]
    WriteThrough,
    /// Sets are queued and written to L2 on flush
    WriteBack,
}

// == Persistence Config ==
/// Settings for the persistent storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Upper bound on serialized bytes held by the backend
    pub storage_quota: u64,
    /// Interval between snapshot flushes, in milliseconds
    pub backup_frequency: u64,
    /// Snapshot file; `None` keeps the store in-process only
    pub path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_quota: 5 * 1024 * 1024,
            backup_frequency: 60_000,
            path: None,
        }
    }
}

// == Cache Config ==
/// Configuration of a single cache manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Entry-count ceiling
    pub max_size: usize,
    /// TTL in milliseconds for entries set without one
    #[serde(rename = "defaultTTL")]
    pub default_ttl: u64,
    pub eviction_policy: EvictionPolicyKind,
    pub compression_enabled: bool,
    /// Serialized size in bytes above which values are compressed
    pub compression_threshold: usize,
    pub storage_type: StorageType,
    pub key_prefix: String,
    pub persistence: PersistenceConfig,
    /// Expiry sweep interval in milliseconds
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: 300_000,
            eviction_policy: EvictionPolicyKind::Lru,
            compression_enabled: false,
            compression_threshold: 1024,
            storage_type: StorageType::Memory,
            key_prefix: String::new(),
            persistence: PersistenceConfig::default(),
            cleanup_interval: 60_000,
        }
    }
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Entry ceiling (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in ms (default: 300000)
    /// - `CACHE_EVICTION_POLICY` - `LRU`, `LFU` or `TTL` (default: LRU)
    /// - `CACHE_COMPRESSION_ENABLED` - `true`/`false` (default: false)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Bytes (default: 1024)
    /// - `CACHE_STORAGE_TYPE` - `memory` or `persistent` (default: memory)
    /// - `CACHE_KEY_PREFIX` - Namespace for persisted keys (default: empty)
    /// - `CACHE_PERSISTENCE_ENABLED` - `true`/`false` (default: false)
    /// - `CACHE_STORAGE_QUOTA` - Bytes (default: 5 MiB)
    /// - `CACHE_BACKUP_FREQUENCY_MS` - Snapshot interval (default: 60000)
    /// - `CACHE_PERSISTENCE_PATH` - Snapshot file (default: none)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Expiry sweep interval (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: parse_env("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            default_ttl: parse_env("CACHE_DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl),
            eviction_policy: env::var("CACHE_EVICTION_POLICY")
                .map(|v| EvictionPolicyKind::from_name(&v))
                .unwrap_or(defaults.eviction_policy),
            compression_enabled: parse_env("CACHE_COMPRESSION_ENABLED")
                .unwrap_or(defaults.compression_enabled),
            compression_threshold: parse_env("CACHE_COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold),
            storage_type: env::var("CACHE_STORAGE_TYPE")
                .ok()
                .and_then(|v| StorageType::from_name(&v))
                .unwrap_or(defaults.storage_type),
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            persistence: PersistenceConfig {
                enabled: parse_env("CACHE_PERSISTENCE_ENABLED")
                    .unwrap_or(defaults.persistence.enabled),
                storage_quota: parse_env("CACHE_STORAGE_QUOTA")
                    .unwrap_or(defaults.persistence.storage_quota),
                backup_frequency: parse_env("CACHE_BACKUP_FREQUENCY_MS")
                    .unwrap_or(defaults.persistence.backup_frequency),
                path: env::var("CACHE_PERSISTENCE_PATH").ok().map(PathBuf::from),
            },
            cleanup_interval: parse_env("CACHE_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    // == Validate ==
    /// Rejects configurations the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "maxSize must be greater than zero".to_string(),
            ));
        }
        if self.persistence.enabled && self.persistence.storage_quota == 0 {
            return Err(CacheError::InvalidConfig(
                "storageQuota must be greater than zero when persistence is enabled".to_string(),
            ));
        }
        Ok(())
    }

    // == Apply Update ==
    /// Applies the fields set in `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: CacheConfigUpdate) {
        if let Some(v) = update.max_size {
            self.max_size = v;
        }
        if let Some(v) = update.default_ttl {
            self.default_ttl = v;
        }
        if let Some(v) = update.eviction_policy {
            self.eviction_policy = v;
        }
        if let Some(v) = update.compression_enabled {
            self.compression_enabled = v;
        }
        if let Some(v) = update.compression_threshold {
            self.compression_threshold = v;
        }
    }
}

// == Config Update ==
/// Partial configuration accepted by `CacheManager::update_config`.
///
/// Only settings the running manager picks up are accepted. Storage type,
/// key prefix, persistence and the sweep interval are fixed once the
/// backend and background tasks exist, and updates naming them fail to
/// deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CacheConfigUpdate {
    pub max_size: Option<usize>,
    #[serde(rename = "defaultTTL")]
    pub default_ttl: Option<u64>,
    pub eviction_policy: Option<EvictionPolicyKind>,
    pub compression_enabled: Option<bool>,
    pub compression_threshold: Option<usize>,
}

fn parse_env<V: std::str::FromStr>(name: &str) -> Option<V> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
