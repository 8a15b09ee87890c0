//! Multi-Layer Cache Module
//!
//! Two managers behind one cache contract: a small fast L1 in front of a
//! larger, usually persistent L2.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::EntryMetadata;
use crate::cache::health::CacheHealth;
use crate::cache::manager::{CacheManager, SetOptions};
use crate::cache::stats::CacheStatistics;
use crate::cache::CacheValue;
use crate::config::CoherencyStrategy;
use crate::error::Result;

// == Multi-Layer Cache ==
/// L1/L2 composition.
///
/// Reads fall through from L1 to L2 and promote L2 hits into L1. Writes go
/// to L1 and, depending on the coherency strategy, either straight to L2 or
/// into a write-back queue drained by `flush_write_back`.
pub struct MultiLayerCache<T> {
    l1: Arc<CacheManager<T>>,
    l2: Arc<CacheManager<T>>,
    coherency: CoherencyStrategy,
    /// Writes not yet applied to L2, newest value per key
    pending: Mutex<HashMap<String, QueuedWrite<T>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A write waiting for L2. `meta` records when it was made and its
/// resolved TTL, so L2 receives only the time left.
#[derive(Clone)]
struct QueuedWrite<T> {
    value: T,
    options: SetOptions,
    meta: EntryMetadata,
}

impl<T> QueuedWrite<T> {
    /// TTL left in milliseconds, `None` once the write has expired.
    fn remaining_ttl(&self) -> Option<u64> {
        match self.meta.ttl_remaining_ms() {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Options for applying the write now, with the TTL shortened to what
    /// is left.
    fn options_now(&self, remaining: u64) -> SetOptions {
        SetOptions {
            ttl: Some(remaining),
            ..self.options.clone()
        }
    }
}

impl<T: CacheValue> MultiLayerCache<T> {
    pub fn new(l1: Arc<CacheManager<T>>, l2: Arc<CacheManager<T>>, coherency: CoherencyStrategy) -> Self {
        Self {
            l1,
            l2,
            coherency,
            pending: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Creates a shared cache and, in write-back mode, starts a task that
    /// flushes queued writes every `flush_interval_ms`.
    pub async fn start(
        l1: Arc<CacheManager<T>>,
        l2: Arc<CacheManager<T>>,
        coherency: CoherencyStrategy,
        flush_interval_ms: u64,
    ) -> Arc<Self> {
        let cache = Arc::new(Self::new(l1, l2, coherency));
        if coherency == CoherencyStrategy::WriteBack {
            let handle = crate::tasks::spawn_write_back_task(Arc::downgrade(&cache), flush_interval_ms);
            cache.tasks.lock().await.push(handle);
        }
        cache
    }

    pub fn l1(&self) -> &Arc<CacheManager<T>> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<CacheManager<T>> {
        &self.l2
    }

    pub fn coherency(&self) -> CoherencyStrategy {
        self.coherency
    }

    // == Get ==
    /// Reads L1, then L2. An L2 hit is copied into L1 with L1's default TTL.
    ///
    /// In write-back mode a queued write is newer than anything in L2, so
    /// it is consulted first: a live one is returned and copied back into
    /// L1 with its remaining TTL, an expired one makes the key a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.l1.get(key).await {
            return Some(value);
        }

        if self.coherency == CoherencyStrategy::WriteBack {
            let queued = self.pending.lock().await.get(key).cloned();
            if let Some(write) = queued {
                let Some(remaining) = write.remaining_ttl() else {
                    self.drop_expired_write(key).await;
                    return None;
                };
                self.promote(key, write.value.clone(), write.options_now(remaining))
                    .await;
                return Some(write.value);
            }
        }

        let value = self.l2.get(key).await?;
        self.promote(key, value.clone(), SetOptions::default()).await;
        Some(value)
    }

    async fn promote(&self, key: &str, value: T, options: SetOptions) {
        match self.l1.set_with_options(key, value, options).await {
            Ok(()) => debug!("Promoted '{}' into L1", key),
            Err(e) => warn!("Promotion of '{}' into L1 failed: {}", key, e),
        }
    }

    /// Forgets an expired queued write. Whatever L2 holds for the key is
    /// older than that write, so it goes too.
    async fn drop_expired_write(&self, key: &str) {
        {
            let mut pending = self.pending.lock().await;
            if pending.get(key).is_some_and(|w| w.remaining_ttl().is_none()) {
                pending.remove(key);
            }
        }
        debug!("Queued write for '{}' expired before reaching L2", key);
        if let Err(e) = self.l2.delete(key).await {
            warn!("Dropping stale L2 copy of '{}' failed: {}", key, e);
        }
    }

    // == Set ==
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

    /// Writes L1, then L2 (write-through) or the write-back queue.
    pub async fn set_with_options(&self, key: &str, value: T, options: SetOptions) -> Result<()> {
        match self.coherency {
            CoherencyStrategy::WriteThrough => {
                self.l1
                    .set_with_options(key, value.clone(), options.clone())
                    .await?;
                self.l2.set_with_options(key, value, options).await
            }
            CoherencyStrategy::WriteBack => {
                self.l1
                    .set_with_options(key, value.clone(), options.clone())
                    .await?;
                let ttl = match options.ttl {
                    Some(ttl) => ttl,
                    None => self.l2.get_config().await.default_ttl,
                };
                let write = QueuedWrite {
                    value,
                    options,
                    meta: EntryMetadata::new(key, ttl, 0),
                };
                self.pending.lock().await.insert(key.to_string(), write);
                Ok(())
            }
        }
    }

    // == Write-Back Flush ==
    /// Applies queued writes to L2 with the TTL each has left. Returns the
    /// number written.
    ///
    /// Writes that expired while queued are dropped along with any older
    /// L2 copy. Writes that fail stay queued unless a newer write for the
    /// same key arrived meanwhile; the first failure is returned after the
    /// pass.
    pub async fn flush_write_back(&self) -> Result<usize> {
        let queued: Vec<(String, QueuedWrite<T>)> = self.pending.lock().await.drain().collect();
        if queued.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut expired = 0;
        let mut first_error = None;
        for (key, write) in queued {
            let Some(remaining) = write.remaining_ttl() else {
                expired += 1;
                if let Err(e) = self.l2.delete(&key).await {
                    warn!("Dropping stale L2 copy of '{}' failed: {}", key, e);
                }
                continue;
            };
            match self
                .l2
                .set_with_options(&key, write.value.clone(), write.options_now(remaining))
                .await
            {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!("Write-back of '{}' to L2 failed: {}", key, e);
                    self.pending.lock().await.entry(key).or_insert(write);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        info!(
            "Flushed {} queued writes to L2, dropped {} expired",
            written, expired
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Number of writes waiting for L2.
    pub async fn pending_writes(&self) -> usize {
        self.pending.lock().await.len()
    }

    // == Has ==
    pub async fn has(&self, key: &str) -> bool {
        self.l1.has(key).await || self.l2.has(key).await
    }

    // == Delete ==
    /// Removes `key` from both layers and the write-back queue.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let queued = self.pending.lock().await.remove(key).is_some();
        let in_l1 = self.l1.delete(key).await?;
        let in_l2 = self.l2.delete(key).await?;
        Ok(queued || in_l1 || in_l2)
    }

    // == Invalidate ==
    /// Invalidates on both layers. The count is the sum of both.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern)?;
        self.pending.lock().await.retain(|key, _| !regex.is_match(key));
        Ok(self.l1.invalidate(pattern).await? + self.l2.invalidate(pattern).await?)
    }

    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> Result<usize> {
        self.pending
            .lock()
            .await
            .retain(|_, write| !write.options.tags.iter().any(|t| tags.contains(&t.as_str())));
        Ok(self.l1.invalidate_by_tags(tags).await? + self.l2.invalidate_by_tags(tags).await?)
    }

    // == Clear ==
    pub async fn clear(&self) -> Result<()> {
        self.pending.lock().await.clear();
        self.l1.clear().await?;
        self.l2.clear().await
    }

    // == Statistics & Health ==
    /// Counts are summed across layers, ratios and averages are averaged.
    pub async fn get_statistics(&self) -> CacheStatistics {
        let l1 = self.l1.get_statistics().await;
        let l2 = self.l2.get_statistics().await;
        l1.merge(&l2)
    }

    pub async fn get_health(&self) -> CacheHealth {
        let l1 = self.l1.get_health().await;
        let l2 = self.l2.get_health().await;
        l1.combine(&l2)
    }

    // == Destroy ==
    /// Flushes queued writes, then destroys both layers.
    pub async fn destroy(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        if let Err(e) = self.flush_write_back().await {
            warn!("Write-back flush on destroy failed: {}", e);
        }
        self.l1.destroy().await;
        self.l2.destroy().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::HealthStatus;
    use crate::config::CacheConfig;

    async fn layer(max_size: usize) -> Arc<CacheManager<String>> {
        Arc::new(
            CacheManager::new(CacheConfig {
                max_size,
                ..CacheConfig::default()
            })
            .await
            .unwrap(),
        )
    }

    async fn cache(coherency: CoherencyStrategy) -> MultiLayerCache<String> {
        MultiLayerCache::new(layer(10).await, layer(100).await, coherency)
    }

    /// Write-back cache whose L1 holds a single entry.
    async fn tiny_write_back() -> MultiLayerCache<String> {
        MultiLayerCache::new(layer(1).await, layer(100).await, CoherencyStrategy::WriteBack)
    }

    #[tokio::test]
    async fn test_write_through_writes_both_layers() {
        let cache = cache(CoherencyStrategy::WriteThrough).await;
        cache.set("k", "v".into(), None).await.unwrap();

        assert!(cache.l1().has("k").await);
        assert!(cache.l2().has("k").await);
        assert_eq!(cache.pending_writes().await, 0);
    }

    #[tokio::test]
    async fn test_l2_hit_is_promoted() {
        let cache = cache(CoherencyStrategy::WriteThrough).await;
        cache.l2().set("k", "v".into(), None).await.unwrap();

        assert_eq!(cache.get("k").await, Some("v".to_string()));
        assert!(cache.l1().has("k").await);
        assert!(cache.l2().has("k").await);

        let before = cache.l2().get_statistics().await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
        let after = cache.l2().get_statistics().await;
        assert_eq!(before.hits, after.hits);
        assert_eq!(before.misses, after.misses);
    }

    #[tokio::test]
    async fn test_double_miss() {
        let cache = cache(CoherencyStrategy::WriteThrough).await;
        assert_eq!(cache.get("nope").await, None);
        assert_eq!(cache.l1().get_statistics().await.misses, 1);
        assert_eq!(cache.l2().get_statistics().await.misses, 1);
    }

    #[tokio::test]
    async fn test_write_back_queues_until_flush() {
        let cache = cache(CoherencyStrategy::WriteBack).await;
        cache.set("k", "v1".into(), None).await.unwrap();
        cache.set("k", "v2".into(), None).await.unwrap();

        assert!(cache.l1().has("k").await);
        assert!(!cache.l2().has("k").await);
        assert_eq!(cache.pending_writes().await, 1);

        assert_eq!(cache.flush_write_back().await.unwrap(), 1);
        assert_eq!(cache.l2().get("k").await, Some("v2".to_string()));
        assert_eq!(cache.pending_writes().await, 0);
    }

    #[tokio::test]
    async fn test_delete_drops_queued_write() {
        let cache = cache(CoherencyStrategy::WriteBack).await;
        cache.set("k", "v".into(), None).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert_eq!(cache.flush_write_back().await.unwrap(), 0);
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn test_invalidate_sums_layers() {
        let cache = cache(CoherencyStrategy::WriteThrough).await;
        cache.set("user:1", "a".into(), None).await.unwrap();
        cache.set("user:2", "b".into(), None).await.unwrap();
        cache.set("post:1", "c".into(), None).await.unwrap();

        assert_eq!(cache.invalidate("^user:").await.unwrap(), 4);
        assert!(cache.has("post:1").await);
    }

    #[tokio::test]
    async fn test_invalidate_by_tags_drops_queued_writes() {
        let cache = cache(CoherencyStrategy::WriteBack).await;
        cache
            .set_with_options("a", "1".into(), SetOptions::default().tags(&["feed"]))
            .await
            .unwrap();
        cache.set("b", "2".into(), None).await.unwrap();

        assert_eq!(cache.invalidate_by_tags(&["feed"]).await.unwrap(), 1);
        assert_eq!(cache.pending_writes().await, 1);
    }

    #[tokio::test]
    async fn test_merged_statistics_and_health() {
        let cache = cache(CoherencyStrategy::WriteThrough).await;
        cache.set("k", "v".into(), None).await.unwrap();
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.get_statistics().await;
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        // L1: 1/2, L2: 0/1
        assert_eq!(stats.hit_rate, 0.25);

        let health = cache.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.issues, vec!["low hit rate"]);
    }

    #[tokio::test]
    async fn test_destroy_flushes_write_back() {
        let cache = MultiLayerCache::start(
            layer(10).await,
            layer(100).await,
            CoherencyStrategy::WriteBack,
            60_000,
        )
        .await;
        cache.set("k", "v".into(), None).await.unwrap();

        cache.destroy().await;
        assert!(cache.l2().has("k").await);
    }

    // == Write-Back Reads ==

    #[tokio::test]
    async fn test_write_back_read_prefers_queued_write_over_l2() {
        let cache = tiny_write_back().await;
        cache.set("k", "v1".into(), None).await.unwrap();
        assert_eq!(cache.flush_write_back().await.unwrap(), 1);

        cache.set("k", "v2".into(), None).await.unwrap();
        // Pushes "k" out of the one-slot L1 while v2 is still queued.
        cache.set("other", "x".into(), None).await.unwrap();
        assert!(!cache.l1().has("k").await);

        let l2_before = cache.l2().get_statistics().await;
        assert_eq!(cache.get("k").await, Some("v2".to_string()));
        let l2_after = cache.l2().get_statistics().await;
        assert_eq!(l2_before.hits + l2_before.misses, l2_after.hits + l2_after.misses);
        assert!(cache.l1().has("k").await);

        cache.flush_write_back().await.unwrap();
        assert_eq!(cache.l1().get("k").await, Some("v2".to_string()));
        assert_eq!(cache.l2().get("k").await, Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_expired_queued_write_hides_older_l2_value() {
        let cache = tiny_write_back().await;
        cache.set("k", "old".into(), None).await.unwrap();
        cache.flush_write_back().await.unwrap();

        cache.set("k", "new".into(), Some(30)).await.unwrap();
        cache.set("other", "x".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("k").await, None);
        assert!(!cache.l2().has("k").await);
        assert_eq!(cache.pending_writes().await, 1);
    }

    // == Write-Back TTL ==

    #[tokio::test]
    async fn test_flush_passes_remaining_ttl() {
        let cache = cache(CoherencyStrategy::WriteBack).await;
        cache.set("k", "v".into(), Some(1000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.flush_write_back().await.unwrap(), 1);
        let entry = cache.l2().storage().get("k").await.unwrap().unwrap();
        assert!(entry.meta.ttl > 0);
        assert!(entry.meta.ttl <= 950, "ttl was {}", entry.meta.ttl);
    }

    #[tokio::test]
    async fn test_flush_uses_l2_default_ttl_from_queue_time() {
        let l2 = Arc::new(
            CacheManager::new(CacheConfig {
                default_ttl: 1000,
                ..CacheConfig::default()
            })
            .await
            .unwrap(),
        );
        let cache = MultiLayerCache::new(layer(10).await, l2, CoherencyStrategy::WriteBack);
        cache.set("k", "v".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cache.flush_write_back().await.unwrap();
        let entry = cache.l2().storage().get("k").await.unwrap().unwrap();
        assert!(entry.meta.ttl <= 950, "ttl was {}", entry.meta.ttl);
    }

    #[tokio::test]
    async fn test_expired_queued_write_is_not_flushed() {
        let cache = cache(CoherencyStrategy::WriteBack).await;
        cache
            .set_with_options("k", "v".into(), SetOptions::with_ttl(30).tags(&["feed"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.flush_write_back().await.unwrap(), 0);
        assert_eq!(cache.pending_writes().await, 0);
        assert!(!cache.l2().has("k").await);
    }
}
