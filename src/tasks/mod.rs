//! Background Tasks Module
//!
//! Periodic work that runs alongside a cache.
//!
//! # Tasks
//! - Expiry sweep: removes expired entries every `cleanupInterval`
//! - Snapshot backup: flushes a persistent backend every `backupFrequency`
//! - Write-back flush: drains a multi-layer cache's queued L2 writes

mod backup;
mod cleanup;
mod write_back;

use std::sync::Arc;

pub use backup::spawn_backup_task;
pub use cleanup::spawn_cleanup_task;
pub use write_back::spawn_write_back_task;

use crate::cache::{CacheManager, CacheValue};

/// Starts the tasks a manager's configuration asks for and attaches them
/// to the manager.
pub async fn start_background_tasks<T: CacheValue>(manager: &Arc<CacheManager<T>>) {
    let config = manager.get_config().await;

    let sweep = spawn_cleanup_task(Arc::downgrade(manager), config.cleanup_interval);
    manager.attach_task(sweep).await;

    if config.persistence.enabled && manager.storage().supports_persistence() {
        let backup = spawn_backup_task(Arc::downgrade(manager), config.persistence.backup_frequency);
        manager.attach_task(backup).await;
    }
}
