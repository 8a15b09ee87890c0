//! Storage Backend Module
//!
//! Uniform async key → entry persistence. Two backends: an in-memory map
//! and a persistent, quota-bounded store of serialized records.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::CacheValue;
use crate::config::{CacheConfig, StorageType};
use crate::error::{CacheError, Result};

// == Quota ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageQuota {
    /// Bytes currently held
    pub used: u64,
    /// Bytes still free, `None` when unbounded
    pub available: Option<u64>,
}

// == Storage Trait ==
#[async_trait]
pub trait StorageBackend<T>: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>>;

    async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<()>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;

    async fn size(&self) -> Result<usize>;

    fn supports_persistence(&self) -> bool;

    async fn quota(&self) -> Result<StorageQuota>;

    /// Writes buffered state to durable storage.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// == Factory ==
/// Builds the backend named by `config.storage_type`.
pub async fn create_storage<T: CacheValue>(
    config: &CacheConfig,
) -> Result<Arc<dyn StorageBackend<T>>> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageType::Persistent => {
            let path = config
                .persistence
                .path
                .clone()
                .filter(|_| config.persistence.enabled);
            let storage = PersistentStorage::open(
                config.key_prefix.clone(),
                config.persistence.storage_quota,
                path,
            )
            .await?;
            Ok(Arc::new(storage))
        }
    }
}

// =============================================================================
// Memory Storage
// =============================================================================

/// Non-persistent map. Iterates in key order.
#[derive(Debug)]
pub struct MemoryStorage<T> {
    entries: RwLock<BTreeMap<String, CacheEntry<T>>>,
}

impl<T> MemoryStorage<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Default for MemoryStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: CacheValue> StorageBackend<T> for MemoryStorage<T> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    fn supports_persistence(&self) -> bool {
        false
    }

    async fn quota(&self) -> Result<StorageQuota> {
        let used = self.entries.read().await.values().map(|e| e.meta.size).sum();
        Ok(StorageQuota {
            used,
            available: None,
        })
    }
}

// =============================================================================
// Persistent Storage
// =============================================================================

#[derive(Debug, Default)]
struct RecordStore {
    /// Namespaced key → serialized entry
    records: BTreeMap<String, String>,
    /// Bytes of keys plus records
    used: u64,
}

/// Quota-bounded store of JSON records under `{prefix}{key}`.
///
/// Records live in memory and are written to the snapshot file on `flush`.
/// Records under other prefixes in the same file are preserved.
pub struct PersistentStorage<T> {
    prefix: String,
    quota: u64,
    path: Option<PathBuf>,
    store: RwLock<RecordStore>,
    dirty: AtomicBool,
    _value: PhantomData<fn() -> T>,
}

impl<T> PersistentStorage<T> {
    /// Opens the store, loading the snapshot at `path` if it exists.
    pub async fn open(prefix: String, quota: u64, path: Option<PathBuf>) -> Result<Self> {
        let mut store = RecordStore::default();
        if let Some(path) = &path {
            match tokio::fs::read_to_string(path).await {
                Ok(raw) => {
                    store.records = serde_json::from_str(&raw)?;
                    store.used = store
                        .records
                        .iter()
                        .map(|(k, v)| record_cost(k, v))
                        .sum();
                    info!(
                        "Loaded {} persisted records from {}",
                        store.records.len(),
                        path.display()
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No snapshot at {}, starting empty", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            prefix,
            quota,
            path,
            store: RwLock::new(store),
            dirty: AtomicBool::new(false),
            _value: PhantomData,
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn record_cost(key: &str, record: &str) -> u64 {
    (key.len() + record.len()) as u64
}

#[async_trait]
impl<T: CacheValue> StorageBackend<T> for PersistentStorage<T> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let store = self.store.read().await;
        match store.records.get(&self.namespaced(key)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<()> {
        let name = self.namespaced(key);
        let record = serde_json::to_string(&entry)?;
        let cost = record_cost(&name, &record);

        let mut store = self.store.write().await;
        let released = store
            .records
            .get(&name)
            .map(|old| record_cost(&name, old))
            .unwrap_or(0);
        let base = store.used - released;
        if base + cost > self.quota {
            return Err(CacheError::QuotaExceeded {
                requested: cost,
                available: self.quota.saturating_sub(base),
            });
        }

        store.records.insert(name, record);
        store.used = base + cost;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let name = self.namespaced(key);
        let mut store = self.store.write().await;
        match store.records.remove(&name) {
            Some(old) => {
                store.used -= record_cost(&name, &old);
                self.dirty.store(true, Ordering::Release);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut store = self.store.write().await;
        let owned: Vec<String> = store
            .records
            .keys()
            .filter(|k| k.starts_with(&self.prefix))
            .cloned()
            .collect();
        for name in owned {
            if let Some(old) = store.records.remove(&name) {
                store.used -= record_cost(&name, &old);
            }
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(store
            .records
            .keys()
            .filter_map(|k| k.strip_prefix(self.prefix.as_str()))
            .map(str::to_string)
            .collect())
    }

    async fn size(&self) -> Result<usize> {
        let store = self.store.read().await;
        Ok(store
            .records
            .keys()
            .filter(|k| k.starts_with(&self.prefix))
            .count())
    }

    fn supports_persistence(&self) -> bool {
        true
    }

    async fn quota(&self) -> Result<StorageQuota> {
        let used = self.store.read().await.used;
        Ok(StorageQuota {
            used,
            available: Some(self.quota.saturating_sub(used)),
        })
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = serde_json::to_string(&self.store.read().await.records)?;
        let tmp = path.with_extension("tmp");
        let result = async {
            tokio::fs::write(&tmp, snapshot.as_bytes()).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            self.dirty.store(true, Ordering::Release);
            warn!("Snapshot write to {} failed: {}", path.display(), e);
            return Err(e.into());
        }
        debug!("Snapshot written to {}", path.display());
        Ok(())
    }
}
