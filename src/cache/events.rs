//! Cache Events Module
//!
//! Lifecycle notifications and the observer list they are delivered to.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::warn;

use crate::cache::entry::current_timestamp_ms;

// == Event Type ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheEventType {
    #[serde(rename = "cache_hit")]
    Hit,
    #[serde(rename = "cache_miss")]
    Miss,
    #[serde(rename = "cache_set")]
    Set,
    #[serde(rename = "cache_delete")]
    Delete,
    #[serde(rename = "cache_eviction")]
    Eviction,
    #[serde(rename = "cache_invalidate")]
    Invalidate,
    #[serde(rename = "cache_expired")]
    ExpiredCleanup,
    #[serde(rename = "cache_warm")]
    Warm,
    #[serde(rename = "cache_error")]
    Error,
}

// == Cache Event ==
/// Immutable record of something that happened inside a cache manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    #[serde(rename = "type")]
    pub event_type: CacheEventType,
    /// Unix milliseconds
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub metadata: Map<String, Value>,
}

impl CacheEvent {
    pub fn new(event_type: CacheEventType) -> Self {
        Self {
            event_type,
            timestamp: current_timestamp_ms(),
            key: None,
            metadata: Map::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.to_string(), value.into());
        self
    }
}

/// Observer callback. Errors and panics are logged and never reach the
/// operation that emitted the event.
pub type EventCallback = Arc<dyn Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync>;

// == Event Bus ==
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<EventCallback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, callback: EventCallback) {
        self.observers.write().await.push(callback);
    }

    pub async fn clear(&self) {
        self.observers.write().await.clear();
    }

    // == Emit ==
    /// Delivers `event` to every observer in registration order.
    pub async fn emit(&self, event: CacheEvent) {
        let observers = self.observers.read().await.clone();
        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Cache event observer failed on {:?}: {:#}", event.event_type, e),
                Err(_) => warn!("Cache event observer panicked on {:?}", event.event_type),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_serialize() {
        let event = CacheEvent::new(CacheEventType::Hit)
            .with_key("k")
            .with("duration", 1.5);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "cache_hit");
        assert_eq!(json["key"], "k");
        assert_eq!(json["metadata"]["duration"], 1.5);
    }

    #[tokio::test]
    async fn test_failing_observer_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(|_: &CacheEvent| -> anyhow::Result<()> {
            anyhow::bail!("observer down")
        }))
        .await;
        bus.subscribe(Arc::new(|_: &CacheEvent| -> anyhow::Result<()> {
            panic!("observer panicked")
        }))
        .await;
        let counter = seen.clone();
        bus.subscribe(Arc::new(move |_: &CacheEvent| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .await;

        bus.emit(CacheEvent::new(CacheEventType::Set)).await;
        bus.emit(CacheEvent::new(CacheEventType::Delete)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_observers() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.subscribe(Arc::new(move |_: &CacheEvent| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .await;
        bus.emit(CacheEvent::new(CacheEventType::Set)).await;

        bus.clear().await;
        bus.emit(CacheEvent::new(CacheEventType::Set)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
