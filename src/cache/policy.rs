//! Eviction Policy Module
//!
//! Chooses which keys to remove when the cache is over capacity.
//!
//! Policies work on a snapshot of entry metadata and never touch storage
//! themselves. Ties in the sort key keep the snapshot's order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::entry::{current_timestamp_ms, EntryMetadata};
use crate::config::EvictionPolicyKind;

// == Policy Trait ==
pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns up to `target_count` keys to evict, first victim first.
    fn select_for_eviction(&self, entries: &[EntryMetadata], target_count: usize) -> Vec<String>;

    /// Called on every cache hit, before the entry is written back.
    fn on_access(&self, entry: &mut EntryMetadata);

    /// Called on every insert, before the entry is stored.
    fn on_insert(&self, entry: &mut EntryMetadata);

    fn metrics(&self) -> BTreeMap<String, u64>;
}

// == Factory ==
/// Builds the policy for `kind`.
pub fn create_policy(kind: EvictionPolicyKind) -> Arc<dyn EvictionPolicy> {
    match kind {
        EvictionPolicyKind::Lru => Arc::new(LruPolicy::default()),
        EvictionPolicyKind::Lfu => Arc::new(LfuPolicy::default()),
        EvictionPolicyKind::Ttl => Arc::new(TtlPolicy::default()),
    }
}

// == Counters ==
#[derive(Debug, Default)]
struct PolicyCounters {
    accesses: AtomicU64,
    inserts: AtomicU64,
    selections: AtomicU64,
    selected_keys: AtomicU64,
}

impl PolicyCounters {
    fn access(&self, entry: &mut EntryMetadata) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        entry.touch();
    }

    fn insert(&self, entry: &mut EntryMetadata) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        entry.touch();
    }

    fn selected(&self, victims: Vec<String>) -> Vec<String> {
        self.selections.fetch_add(1, Ordering::Relaxed);
        self.selected_keys
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        victims
    }

    fn snapshot(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("accesses".to_string(), self.accesses.load(Ordering::Relaxed)),
            ("inserts".to_string(), self.inserts.load(Ordering::Relaxed)),
            ("selections".to_string(), self.selections.load(Ordering::Relaxed)),
            ("selectedKeys".to_string(), self.selected_keys.load(Ordering::Relaxed)),
        ])
    }
}

fn take_keys<'a>(sorted: impl Iterator<Item = &'a EntryMetadata>, n: usize) -> Vec<String> {
    sorted.take(n).map(|e| e.key.clone()).collect()
}

// == LRU ==
/// Evicts the entries with the oldest `last_accessed`.
#[derive(Debug, Default)]
pub struct LruPolicy {
    counters: PolicyCounters,
}

impl EvictionPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "LRU"
    }

    fn select_for_eviction(&self, entries: &[EntryMetadata], target_count: usize) -> Vec<String> {
        let mut sorted: Vec<&EntryMetadata> = entries.iter().collect();
        sorted.sort_by_key(|e| (e.last_accessed, e.sequence));
        self.counters
            .selected(take_keys(sorted.into_iter(), target_count))
    }

    fn on_access(&self, entry: &mut EntryMetadata) {
        self.counters.access(entry);
    }

    fn on_insert(&self, entry: &mut EntryMetadata) {
        self.counters.insert(entry);
    }

    fn metrics(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }
}

// == LFU ==
/// Evicts the entries with the lowest `access_count`.
#[derive(Debug, Default)]
pub struct LfuPolicy {
    counters: PolicyCounters,
}

impl EvictionPolicy for LfuPolicy {
    fn name(&self) -> &'static str {
        "LFU"
    }

    fn select_for_eviction(&self, entries: &[EntryMetadata], target_count: usize) -> Vec<String> {
        let mut sorted: Vec<&EntryMetadata> = entries.iter().collect();
        sorted.sort_by_key(|e| e.access_count);
        self.counters
            .selected(take_keys(sorted.into_iter(), target_count))
    }

    fn on_access(&self, entry: &mut EntryMetadata) {
        self.counters.access(entry);
    }

    fn on_insert(&self, entry: &mut EntryMetadata) {
        self.counters.insert(entry);
    }

    fn metrics(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }
}

// == TTL ==
/// Evicts only already-expired entries, oldest first.
///
/// Returns fewer than `target_count` keys when not enough entries have
/// expired; live entries are never selected.
#[derive(Debug, Default)]
pub struct TtlPolicy {
    counters: PolicyCounters,
}

impl EvictionPolicy for TtlPolicy {
    fn name(&self) -> &'static str {
        "TTL"
    }

    fn select_for_eviction(&self, entries: &[EntryMetadata], target_count: usize) -> Vec<String> {
        let now = current_timestamp_ms();
        let mut expired: Vec<&EntryMetadata> =
            entries.iter().filter(|e| e.is_expired_at(now)).collect();
        expired.sort_by_key(|e| e.created_at);
        self.counters
            .selected(take_keys(expired.into_iter(), target_count))
    }

    fn on_access(&self, entry: &mut EntryMetadata) {
        self.counters.access(entry);
    }

    fn on_insert(&self, entry: &mut EntryMetadata) {
        self.counters.insert(entry);
    }

    fn metrics(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }
}
