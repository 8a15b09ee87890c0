//! Cache Manager Module
//!
//! Main cache engine: coordinates storage, eviction policy, compression,
//! statistics and lifecycle events behind get/set/delete/invalidate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::compression::{create_compressor, Compressor, Lz4Compressor};
use crate::cache::entry::{current_timestamp_ms, CacheEntry, EntryMetadata, EntryValue};
use crate::cache::events::{CacheEvent, CacheEventType, EventBus};
use crate::cache::health::{optimization_recommendations, CacheHealth, Recommendation};
use crate::cache::policy::{create_policy, EvictionPolicy};
use crate::cache::stats::CacheStatistics;
use crate::cache::storage::{create_storage, StorageBackend, StorageQuota};
use crate::cache::warming::{UsageRecord, WarmingConfig, WarmingStrategy};
use crate::cache::CacheValue;
use crate::config::{CacheConfig, CacheConfigUpdate};
use crate::error::{CacheError, Result};

// == Set Options ==
/// Per-entry settings for `CacheManager::set_with_options`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL in milliseconds, the configured default when `None`
    pub ttl: Option<u64>,
    pub tags: Vec<String>,
    pub priority: i32,
}

impl SetOptions {
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// == Cache Manager ==
/// A single cache instance.
///
/// Every operation that touches storage runs under one per-manager async
/// lock, so the capacity check, eviction and insert of a `set` are atomic
/// with respect to other operations on the same manager.
pub struct CacheManager<T> {
    config: RwLock<CacheConfig>,
    storage: Arc<dyn StorageBackend<T>>,
    policy: RwLock<Arc<dyn EvictionPolicy>>,
    compressor: RwLock<Option<Arc<dyn Compressor>>>,
    /// Decodes compressed entries even after compression is switched off
    decoder: Lz4Compressor,
    stats: RwLock<CacheStatistics>,
    /// Key → stored size, mirrors the backend
    sizes: RwLock<HashMap<String, u64>>,
    events: EventBus,
    op_lock: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: CacheValue> CacheManager<T> {
    // == Constructor ==
    /// Creates a manager on the backend named by `config.storage_type`.
    ///
    /// No background tasks are started; see `start`.
    pub async fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let storage = create_storage(&config).await?;
        Self::with_storage(config, storage).await
    }

    /// Creates a manager on an explicit backend.
    pub async fn with_storage(
        config: CacheConfig,
        storage: Arc<dyn StorageBackend<T>>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = Self {
            policy: RwLock::new(create_policy(config.eviction_policy)),
            compressor: RwLock::new(create_compressor(config.compression_enabled)),
            decoder: Lz4Compressor::new(),
            storage,
            stats: RwLock::new(CacheStatistics::new()),
            sizes: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            op_lock: Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            config: RwLock::new(config),
        };
        manager.rebuild_size_index().await?;
        Ok(manager)
    }

    /// Creates a shared manager and starts its expiry sweep (and snapshot
    /// backups when the backend persists).
    pub async fn start(config: CacheConfig) -> Result<Arc<Self>> {
        let manager = Arc::new(Self::new(config).await?);
        crate::tasks::start_background_tasks(&manager).await;
        Ok(manager)
    }

    /// Hands a background task to the manager so `destroy` can stop it.
    pub async fn attach_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend<T>> {
        &self.storage
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` on a miss.
    ///
    /// Expired entries are removed and reported as misses. Internal
    /// failures are reported as `cache_error` events and also read as a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        let start = Instant::now();
        let _guard = self.op_lock.lock().await;
        match self.lookup(key, start).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read of '{}' failed: {}", key, e);
                self.stats.write().await.record_miss(elapsed_ms(start));
                self.report_error("get", Some(key), &e).await;
                None
            }
        }
    }

    async fn lookup(&self, key: &str, start: Instant) -> Result<Option<T>> {
        let Some(mut entry) = self.storage.get(key).await? else {
            self.record_miss(key, start, "not_found").await;
            return Ok(None);
        };

        if entry.is_expired() {
            self.purge(key).await?;
            self.record_miss(key, start, "expired").await;
            return Ok(None);
        }

        let policy = self.policy.read().await.clone();
        policy.on_access(&mut entry.meta);
        let value = self.decode(&entry.value).await?;
        let compressed = entry.is_compressed();
        self.storage.set(key, entry).await?;

        let elapsed = elapsed_ms(start);
        self.stats.write().await.record_hit(elapsed);
        self.events
            .emit(
                CacheEvent::new(CacheEventType::Hit)
                    .with_key(key)
                    .with("duration", elapsed)
                    .with("compressed", compressed),
            )
            .await;
        Ok(Some(value))
    }

    async fn decode(&self, value: &EntryValue<T>) -> Result<T> {
        match value {
            EntryValue::Raw(v) => Ok(v.clone()),
            EntryValue::Compressed { bytes, algorithm } => {
                let active = self.compressor.read().await.clone();
                let raw = match active {
                    Some(c) => c.decompress(bytes, *algorithm)?,
                    None => self.decoder.decompress(bytes, *algorithm)?,
                };
                Ok(serde_json::from_slice(&raw)?)
            }
        }
    }

    async fn record_miss(&self, key: &str, start: Instant, reason: &str) {
        let elapsed = elapsed_ms(start);
        self.stats.write().await.record_miss(elapsed);
        debug!("Cache miss for '{}' ({})", key, reason);
        self.events
            .emit(
                CacheEvent::new(CacheEventType::Miss)
                    .with_key(key)
                    .with("reason", reason)
                    .with("duration", elapsed),
            )
            .await;
    }

    // == Set ==
    /// Stores `value` under `key` with the given TTL in milliseconds, or the
    /// configured default.
    pub async fn set(&self, key: &str, value: T, ttl: Option<u64>) -> Result<()> {
        self.set_with_options(
            key,
            value,
            SetOptions {
                ttl,
                ..SetOptions::default()
            },
        )
        .await
    }

    /// Stores `value` with TTL, tags and priority.
    ///
    /// Evicts first if the cache is full and `key` is new. Failures are
    /// reported as `cache_error` events and returned.
    pub async fn set_with_options(&self, key: &str, value: T, options: SetOptions) -> Result<()> {
        let start = Instant::now();
        let _guard = self.op_lock.lock().await;
        match self.insert(key, value, options, start).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Cache write of '{}' failed: {}", key, e);
                self.report_error("set", Some(key), &e).await;
                Err(e)
            }
        }
    }

    async fn insert(&self, key: &str, value: T, options: SetOptions, start: Instant) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }

        let (max_size, default_ttl, threshold) = {
            let config = self.config.read().await;
            (config.max_size, config.default_ttl, config.compression_threshold)
        };
        let policy = self.policy.read().await.clone();
        let compressor = self.compressor.read().await.clone();

        let serialized = serde_json::to_vec(&value)?;
        let mut compression = None;
        let stored = match compressor.filter(|c| c.should_compress(&serialized, threshold)) {
            Some(c) => {
                let result = c.compress(&serialized)?;
                compression = Some((result.original_size as u64, result.compressed_size as u64));
                EntryValue::Compressed {
                    bytes: result.data,
                    algorithm: result.algorithm,
                }
            }
            None => EntryValue::Raw(value),
        };
        let size = compression.map_or(serialized.len() as u64, |(_, c)| c);

        let ttl = options.ttl.unwrap_or(default_ttl);
        let mut meta = EntryMetadata::new(key, ttl, size);
        meta.tags = options.tags.into_iter().collect();
        meta.priority = options.priority;

        let is_overwrite = self.sizes.read().await.contains_key(key);
        if !is_overwrite {
            self.ensure_capacity(max_size, policy.as_ref()).await?;
        }

        policy.on_insert(&mut meta);
        self.storage.set(key, CacheEntry::new(meta, stored)).await?;
        self.track(key, size).await;

        let elapsed = elapsed_ms(start);
        {
            let mut stats = self.stats.write().await;
            if let Some((original, compressed)) = compression {
                stats.record_compression(original, compressed);
            }
            stats.record_set(elapsed);
        }
        self.events
            .emit(
                CacheEvent::new(CacheEventType::Set)
                    .with_key(key)
                    .with("size", size)
                    .with("ttl", ttl)
                    .with("compressed", compression.is_some())
                    .with("duration", elapsed),
            )
            .await;
        Ok(())
    }

    // == Ensure Capacity ==
    /// Evicts until one more entry fits under `max_size`.
    ///
    /// Candidates come from a fresh snapshot of the backend. The TTL policy
    /// may choose fewer victims than needed, leaving the cache over size.
    async fn ensure_capacity(&self, max_size: usize, policy: &dyn EvictionPolicy) -> Result<()> {
        let keys = self.storage.keys().await?;
        if keys.len() < max_size {
            return Ok(());
        }

        let start = Instant::now();
        let target = keys.len() - max_size + 1;
        let mut snapshot = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.storage.get(key).await {
                Ok(Some(entry)) => snapshot.push(entry.meta),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable entry '{}' during eviction: {}", key, e),
            }
        }

        let victims = policy.select_for_eviction(&snapshot, target);
        if victims.len() < target {
            debug!(
                "{} policy selected {} of {} eviction candidates",
                policy.name(),
                victims.len(),
                target
            );
        }

        let mut evicted = 0u64;
        for victim in &victims {
            if self.remove(victim, false).await? {
                evicted += 1;
                self.events
                    .emit(
                        CacheEvent::new(CacheEventType::Eviction)
                            .with_key(victim.as_str())
                            .with("policy", policy.name()),
                    )
                    .await;
            }
        }

        self.stats
            .write()
            .await
            .record_eviction(evicted, elapsed_ms(start));
        info!("Evicted {} entries ({} policy)", evicted, policy.name());
        Ok(())
    }

    // == Has ==
    /// True iff a live entry exists. Does not count as a lookup.
    pub async fn has(&self, key: &str) -> bool {
        match self.storage.get(key).await {
            Ok(Some(entry)) => !entry.is_expired(),
            Ok(None) => false,
            Err(e) => {
                debug!("has('{}') could not read entry: {}", key, e);
                false
            }
        }
    }

    // == Delete ==
    /// Removes `key`. Returns whether an entry was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.op_lock.lock().await;
        self.remove(key, true).await
    }

    /// Deletes `key` and emits `cache_delete`. Only caller-requested
    /// removals count as operations, evictions are counted separately.
    async fn remove(&self, key: &str, count_operation: bool) -> Result<bool> {
        let removed = self.storage.delete(key).await?;
        self.untrack(key).await;
        if removed {
            if count_operation {
                self.stats.write().await.record_delete();
            }
            self.events
                .emit(CacheEvent::new(CacheEventType::Delete).with_key(key))
                .await;
        }
        Ok(removed)
    }

    /// Drops an entry without counting it as a delete.
    async fn purge(&self, key: &str) -> Result<bool> {
        let removed = self.storage.delete(key).await?;
        self.untrack(key).await;
        Ok(removed)
    }

    // == Invalidate ==
    /// Deletes every key matching the regular expression `pattern`.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern)?;
        let _guard = self.op_lock.lock().await;

        let mut count = 0;
        for key in self.storage.keys().await? {
            if regex.is_match(&key) && self.remove(&key, true).await? {
                count += 1;
            }
        }

        info!("Invalidated {} entries matching '{}'", count, pattern);
        self.events
            .emit(
                CacheEvent::new(CacheEventType::Invalidate)
                    .with("pattern", pattern)
                    .with("count", count),
            )
            .await;
        Ok(count)
    }

    /// Deletes every entry carrying at least one of `tags`.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> Result<usize> {
        let _guard = self.op_lock.lock().await;

        let mut count = 0;
        for key in self.storage.keys().await? {
            let tagged = match self.storage.get(&key).await {
                Ok(Some(entry)) => entry.meta.has_any_tag(tags),
                Ok(None) => false,
                Err(e) => {
                    warn!("Skipping unreadable entry '{}' during tag invalidation: {}", key, e);
                    false
                }
            };
            if tagged && self.remove(&key, true).await? {
                count += 1;
            }
        }

        info!("Invalidated {} entries tagged {:?}", count, tags);
        self.events
            .emit(
                CacheEvent::new(CacheEventType::Invalidate)
                    .with("tags", tags.to_vec())
                    .with("count", count),
            )
            .await;
        Ok(count)
    }

    // == Clear ==
    /// Empties storage. Hit, miss and eviction counters are kept.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.storage.clear().await?;
        let mut sizes = self.sizes.write().await;
        sizes.clear();
        self.stats.write().await.reset_size();
        info!("Cache cleared");
        Ok(())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let _guard = self.op_lock.lock().await;
        let now = current_timestamp_ms();

        let mut removed = 0;
        for key in self.storage.keys().await? {
            match self.storage.get(&key).await {
                Ok(Some(entry)) if entry.meta.is_expired_at(now) => {
                    if self.purge(&key).await? {
                        removed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry '{}' during sweep: {}", key, e),
            }
        }

        if removed > 0 {
            self.events
                .emit(CacheEvent::new(CacheEventType::ExpiredCleanup).with("count", removed))
                .await;
        }
        Ok(removed)
    }

    // == Statistics & Config ==
    pub async fn get_statistics(&self) -> CacheStatistics {
        self.stats.read().await.clone()
    }

    pub async fn get_config(&self) -> CacheConfig {
        self.config.read().await.clone()
    }

    /// Applies a partial update. A new eviction policy or compression
    /// setting takes effect for operations that start after this returns.
    pub async fn update_config(&self, update: CacheConfigUpdate) -> Result<()> {
        let mut config = self.config.write().await;
        let mut next = config.clone();
        next.apply(update);
        next.validate()?;

        if next.eviction_policy != config.eviction_policy {
            *self.policy.write().await = create_policy(next.eviction_policy);
            info!(
                "Eviction policy switched from {} to {}",
                config.eviction_policy, next.eviction_policy
            );
        }
        if next.compression_enabled != config.compression_enabled {
            *self.compressor.write().await = create_compressor(next.compression_enabled);
            info!("Compression enabled: {}", next.compression_enabled);
        }

        *config = next;
        Ok(())
    }

    pub async fn policy_metrics(&self) -> BTreeMap<String, u64> {
        self.policy.read().await.metrics()
    }

    pub async fn storage_quota(&self) -> Result<StorageQuota> {
        self.storage.quota().await
    }

    // == Health ==
    pub async fn get_health(&self) -> CacheHealth {
        let quota = self.config.read().await.persistence.storage_quota;
        CacheHealth::evaluate(&*self.stats.read().await, quota)
    }

    pub async fn get_optimization_recommendations(&self) -> Vec<Recommendation> {
        let compression_enabled = self.config.read().await.compression_enabled;
        optimization_recommendations(&*self.stats.read().await, compression_enabled)
    }

    // == Events ==
    /// Registers an observer for every event this manager emits.
    pub async fn on_event<F>(&self, callback: F)
    where
        F: Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(callback)).await;
    }

    // == Warming ==
    /// Announces each key (up to `maxSize`) as a `cache_warm` event.
    ///
    /// Computing and storing the values is the subscriber's job. Returns the
    /// number of keys announced.
    pub async fn warm_cache(&self, keys: &[String]) -> usize {
        let max_size = self.config.read().await.max_size;
        let mut announced = 0;
        for key in keys.iter().take(max_size) {
            self.events
                .emit(
                    CacheEvent::new(CacheEventType::Warm)
                        .with_key(key.as_str())
                        .with("status", "requested"),
                )
                .await;
            announced += 1;
        }
        info!("Requested warming of {} keys", announced);
        announced
    }

    /// Picks keys with `strategy` and announces them via `warm_cache`.
    pub async fn warm_from_history(
        &self,
        strategy: &dyn WarmingStrategy,
        config: &WarmingConfig,
        history: &[UsageRecord],
    ) -> usize {
        let stats = self.get_statistics().await;
        let keys = strategy.keys_to_warm(config, &stats, history);
        debug!("{} warming strategy selected {} keys", strategy.name(), keys.len());
        self.warm_cache(&keys).await
    }

    // == Persistence ==
    /// Flushes the backend to durable storage.
    pub async fn flush(&self) -> Result<()> {
        self.storage.flush().await
    }

    // == Destroy ==
    /// Stops background tasks and drops observers. Stored data is kept.
    pub async fn destroy(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.events.clear().await;
        if let Err(e) = self.storage.flush().await {
            warn!("Final flush on destroy failed: {}", e);
        }
        debug!("Cache manager destroyed");
    }

    // == Internal Bookkeeping ==
    async fn report_error(&self, operation: &str, key: Option<&str>, err: &CacheError) {
        let mut event = CacheEvent::new(CacheEventType::Error)
            .with("operation", operation)
            .with("error", err.to_string());
        if let Some(key) = key {
            event = event.with_key(key);
        }
        self.events.emit(event).await;
    }

    async fn track(&self, key: &str, size: u64) {
        let mut sizes = self.sizes.write().await;
        let previous = sizes.insert(key.to_string(), size).unwrap_or(0);
        let mut stats = self.stats.write().await;
        let total = stats.total_size.saturating_sub(previous) + size;
        stats.set_size(sizes.len(), total);
    }

    async fn untrack(&self, key: &str) {
        let mut sizes = self.sizes.write().await;
        if let Some(previous) = sizes.remove(key) {
            let mut stats = self.stats.write().await;
            let total = stats.total_size.saturating_sub(previous);
            stats.set_size(sizes.len(), total);
        }
    }

    async fn rebuild_size_index(&self) -> Result<()> {
        let mut sizes = self.sizes.write().await;
        sizes.clear();
        for key in self.storage.keys().await? {
            match self.storage.get(&key).await {
                Ok(Some(entry)) => {
                    sizes.insert(key, entry.meta.size);
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable stored entry '{}': {}", key, e),
            }
        }
        let total = sizes.values().sum();
        self.stats.write().await.set_size(sizes.len(), total);
        if !sizes.is_empty() {
            info!("Recovered {} entries ({} bytes) from storage", sizes.len(), total);
        }
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
