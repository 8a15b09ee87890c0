//! Integration Tests for the Cache Engine
//!
//! End-to-end scenarios through the public API: eviction, expiry,
//! persistence across reopen, layering and event delivery.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cache_engine::cache::{CacheEvent, CacheEventType, HealthStatus};
use cache_engine::config::{PersistenceConfig, StorageType};
use cache_engine::{
    CacheConfig, CacheError, CacheManager, CoherencyStrategy, EvictionPolicyKind,
    MultiLayerCache, SetOptions,
};
use serde::{Deserialize, Serialize};

// == Helper Functions ==

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

fn persistent_config(path: &Path, quota: u64) -> CacheConfig {
    CacheConfig {
        storage_type: StorageType::Persistent,
        key_prefix: "app:".to_string(),
        persistence: PersistenceConfig {
            enabled: true,
            storage_quota: quota,
            path: Some(path.to_path_buf()),
            ..PersistenceConfig::default()
        },
        ..CacheConfig::default()
    }
}

async fn record_events<T: cache_engine::cache::CacheValue>(
    cache: &CacheManager<T>,
) -> Arc<Mutex<Vec<CacheEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    cache
        .on_event(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        })
        .await;
    seen
}

// == Eviction & Expiry ==

#[tokio::test]
async fn test_lru_refresh_scenario() {
    let cache = CacheManager::<i64>::new(CacheConfig {
        max_size: 2,
        eviction_policy: EvictionPolicyKind::Lru,
        default_ttl: 1000,
        ..CacheConfig::default()
    })
    .await
    .unwrap();

    cache.set("a", 1, None).await.unwrap();
    cache.set("b", 2, None).await.unwrap();
    assert_eq!(cache.get("a").await, Some(1));
    cache.set("c", 3, None).await.unwrap();

    assert!(cache.has("a").await);
    assert!(cache.has("c").await);
    assert!(!cache.has("b").await);
}

#[tokio::test]
async fn test_short_ttl_expires_before_sweep() {
    let cache = CacheManager::<String>::new(CacheConfig::default())
        .await
        .unwrap();

    cache.set("x", "y".to_string(), Some(10)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let before = cache.get_statistics().await.misses;
    assert_eq!(cache.get("x").await, None);
    assert_eq!(cache.get_statistics().await.misses, before + 1);
}

#[tokio::test]
async fn test_structured_values_with_compression() {
    let cache = CacheManager::<Vec<Profile>>::new(CacheConfig {
        compression_enabled: true,
        compression_threshold: 256,
        ..CacheConfig::default()
    })
    .await
    .unwrap();
    let profiles: Vec<Profile> = (0..50)
        .map(|i| Profile {
            name: format!("user-{}", i),
            visits: i,
        })
        .collect();

    cache.set("profiles", profiles.clone(), None).await.unwrap();

    assert_eq!(cache.get("profiles").await, Some(profiles));
    assert_eq!(cache.get_statistics().await.compression.total_compressed, 1);
}

// == Persistence ==

#[tokio::test]
async fn test_persistent_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let config = persistent_config(&path, 1 << 20);

    let first = CacheManager::<Profile>::new(config.clone()).await.unwrap();
    let ada = Profile {
        name: "Ada".to_string(),
        visits: 3,
    };
    first
        .set_with_options("user:1", ada.clone(), SetOptions::default().tags(&["users"]))
        .await
        .unwrap();
    first.destroy().await;

    let second = CacheManager::<Profile>::new(config).await.unwrap();
    let stats = second.get_statistics().await;
    assert_eq!(stats.entry_count, 1);
    assert!(stats.total_size > 0);
    assert_eq!(second.get("user:1").await, Some(ada));
    assert_eq!(second.invalidate_by_tags(&["users"]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_quota_exceeded_propagates_with_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::<String>::new(persistent_config(&dir.path().join("s.json"), 256))
        .await
        .unwrap();
    let events = record_events(&cache).await;

    let result = cache.set("big", "x".repeat(1024), None).await;

    assert!(matches!(result, Err(CacheError::QuotaExceeded { .. })));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.event_type == CacheEventType::Error));
    assert!(!cache.has("big").await);
}

// == Multi-Layer ==

#[tokio::test]
async fn test_multi_layer_over_persistent_l2() {
    let dir = tempfile::tempdir().unwrap();
    let l1 = Arc::new(
        CacheManager::<String>::new(CacheConfig {
            max_size: 2,
            ..CacheConfig::default()
        })
        .await
        .unwrap(),
    );
    let l2 = Arc::new(
        CacheManager::<String>::new(persistent_config(&dir.path().join("l2.json"), 1 << 20))
            .await
            .unwrap(),
    );
    let cache = MultiLayerCache::new(l1, l2, CoherencyStrategy::WriteThrough);

    for key in ["a", "b", "c"] {
        cache.set(key, key.to_uppercase(), None).await.unwrap();
    }

    // "a" fell out of L1 but is still in L2
    assert!(!cache.l1().has("a").await);
    assert_eq!(cache.get("a").await, Some("A".to_string()));
    assert!(cache.l1().has("a").await);

    let l2_before = cache.l2().get_statistics().await;
    assert_eq!(cache.get("a").await, Some("A".to_string()));
    let l2_after = cache.l2().get_statistics().await;
    assert_eq!(l2_before.hits + l2_before.misses, l2_after.hits + l2_after.misses);
}

#[tokio::test]
async fn test_write_back_reaches_l2_on_destroy() {
    let l1 = Arc::new(CacheManager::<u32>::new(CacheConfig::default()).await.unwrap());
    let l2 = Arc::new(CacheManager::<u32>::new(CacheConfig::default()).await.unwrap());
    let cache = MultiLayerCache::start(l1, l2.clone(), CoherencyStrategy::WriteBack, 60_000).await;

    cache.set("n", 7, None).await.unwrap();
    assert!(!l2.has("n").await);

    cache.destroy().await;
    assert!(l2.has("n").await);
}

// == Events & Health ==

#[tokio::test]
async fn test_event_stream_for_basic_lifecycle() {
    let cache = CacheManager::<String>::new(CacheConfig::default())
        .await
        .unwrap();
    let events = record_events(&cache).await;

    cache.set("k", "v".to_string(), None).await.unwrap();
    cache.get("k").await;
    cache.get("missing").await;
    cache.delete("k").await.unwrap();
    cache.invalidate("^nothing$").await.unwrap();

    let types: Vec<CacheEventType> = events.lock().unwrap().iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            CacheEventType::Set,
            CacheEventType::Hit,
            CacheEventType::Miss,
            CacheEventType::Delete,
            CacheEventType::Invalidate,
        ]
    );
}

#[tokio::test]
async fn test_started_manager_sweeps_expired_entries() {
    let cache = CacheManager::<String>::start(CacheConfig {
        cleanup_interval: 20,
        ..CacheConfig::default()
    })
    .await
    .unwrap();
    let events = record_events(&cache).await;

    cache.set("short", "v".to_string(), Some(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(cache.get_statistics().await.entry_count, 0);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.event_type == CacheEventType::ExpiredCleanup));
    cache.destroy().await;
}

#[tokio::test]
async fn test_health_degrades_with_misses() {
    let cache = CacheManager::<String>::new(CacheConfig::default())
        .await
        .unwrap();
    assert_eq!(cache.get_health().await.status, HealthStatus::Healthy);

    for i in 0..5 {
        cache.get(&format!("missing-{}", i)).await;
    }

    let health = cache.get_health().await;
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(!cache.get_optimization_recommendations().await.is_empty());
}
