//! Write-Back Flush Task
//!
//! Drains a multi-layer cache's write-back queue into L2 on a timer.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheValue, MultiLayerCache};

/// Spawns a task that calls `flush_write_back` every `interval_ms`.
pub fn spawn_write_back_task<T: CacheValue>(
    cache: Weak<MultiLayerCache<T>>,
    interval_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(interval_ms.max(1));

    tokio::spawn(async move {
        debug!("Starting write-back flush with interval of {} ms", interval_ms);

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                break;
            };

            if let Err(e) = cache.flush_write_back().await {
                warn!("Write-back flush failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::{CacheConfig, CoherencyStrategy};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_write_back_task_flushes_queue() {
        let l1 = Arc::new(CacheManager::<String>::new(CacheConfig::default()).await.unwrap());
        let l2 = Arc::new(CacheManager::<String>::new(CacheConfig::default()).await.unwrap());
        let cache = Arc::new(MultiLayerCache::new(l1, l2, CoherencyStrategy::WriteBack));
        cache.set("k", "v".to_string(), None).await.unwrap();

        let handle = spawn_write_back_task(Arc::downgrade(&cache), 20);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(cache.pending_writes().await, 0);
        assert!(cache.l2().has("k").await);
    }
}
