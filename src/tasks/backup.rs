//! Snapshot Backup Task
//!
//! Periodically flushes a persistent backend's snapshot to disk.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CacheValue};

/// Spawns a task that calls `CacheManager::flush` every `frequency_ms`.
pub fn spawn_backup_task<T: CacheValue>(
    manager: Weak<CacheManager<T>>,
    frequency_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(frequency_ms.max(1));

    tokio::spawn(async move {
        info!("Starting snapshot backup with frequency of {} ms", frequency_ms);

        loop {
            tokio::time::sleep(interval).await;

            let Some(manager) = manager.upgrade() else {
                debug!("Cache manager dropped, stopping snapshot backup");
                break;
            };

            if let Err(e) = manager.flush().await {
                warn!("Snapshot backup failed: {}", e);
            }
        }
    })
}
