//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CacheValue};

/// Spawns a background task that calls `cleanup_expired` every
/// `interval_ms` milliseconds.
///
/// The task holds a weak reference and exits on its own once the manager
/// is dropped. `CacheManager::destroy` aborts it earlier.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(CacheManager::<String>::new(config).await?);
/// let handle = spawn_cleanup_task(Arc::downgrade(&manager), 60_000);
/// manager.attach_task(handle).await;
/// ```
pub fn spawn_cleanup_task<T: CacheValue>(
    manager: Weak<CacheManager<T>>,
    interval_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(interval_ms.max(1));

    tokio::spawn(async move {
        info!("Starting expiry sweep with interval of {} ms", interval_ms);

        loop {
            tokio::time::sleep(interval).await;

            let Some(manager) = manager.upgrade() else {
                debug!("Cache manager dropped, stopping expiry sweep");
                break;
            };

            match manager.cleanup_expired().await {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(e) => warn!("Expiry sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::Arc;

    async fn manager() -> Arc<CacheManager<String>> {
        Arc::new(CacheManager::new(CacheConfig::default()).await.unwrap())
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = manager().await;
        cache
            .set("expire_soon", "value".to_string(), Some(10))
            .await
            .unwrap();

        let handle = spawn_cleanup_task(Arc::downgrade(&cache), 25);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(
            cache.storage().get("expire_soon").await.unwrap().is_none(),
            "Expired entry should have been cleaned up"
        );
        assert_eq!(cache.get_statistics().await.entry_count, 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = manager().await;
        cache
            .set("long_lived", "value".to_string(), Some(3_600_000))
            .await
            .unwrap();

        let handle = spawn_cleanup_task(Arc::downgrade(&cache), 20);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.get("long_lived").await, Some("value".to_string()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_when_manager_dropped() {
        let cache = manager().await;
        let handle = spawn_cleanup_task(Arc::downgrade(&cache), 10);

        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should exit once the manager is gone");
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let cache = manager().await;
        let handle = spawn_cleanup_task(Arc::downgrade(&cache), 1_000);

        handle.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
