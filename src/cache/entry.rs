//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access
//! bookkeeping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::compression::CompressionAlgorithm;

static ACCESS_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// == Entry Metadata ==
/// Bookkeeping carried by every entry, independent of the value type.
///
/// Eviction policies only ever see this half of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub key: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read or write (Unix milliseconds)
    pub last_accessed: u64,
    pub access_count: u64,
    /// Time-to-live in milliseconds
    pub ttl: u64,
    /// Byte-size estimate of the stored payload
    pub size: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Informational only, not used for eviction ordering
    #[serde(default)]
    pub priority: i32,
    /// Monotonic stamp of the last touch, breaks `last_accessed` ties
    #[serde(default)]
    pub sequence: u64,
}

impl EntryMetadata {
    // == Constructor ==
    /// Creates metadata for a fresh entry. Access count starts at zero; the
    /// eviction policy's insert hook records the first touch.
    pub fn new(key: impl Into<String>, ttl: u64, size: u64) -> Self {
        let now = current_timestamp_ms();
        Self {
            key: key.into(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            size,
            tags: BTreeSet::new(),
            priority: 0,
            sequence: next_sequence(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: once `ttl` milliseconds have fully elapsed since
    /// creation the entry is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= self.ttl
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.created_at
            .saturating_add(self.ttl)
            .saturating_sub(current_timestamp_ms())
    }

    // == Touch ==
    /// Records an access: refreshes `last_accessed` and bumps the count.
    pub fn touch(&mut self) {
        self.last_accessed = current_timestamp_ms();
        self.access_count += 1;
        self.sequence = next_sequence();
    }

    /// True if any of `tags` is attached to this entry.
    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.contains(*t))
    }
}

// == Entry Value ==
/// The stored payload: either the caller's value or its compressed
/// serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum EntryValue<T> {
    Raw(T),
    Compressed {
        bytes: Vec<u8>,
        algorithm: CompressionAlgorithm,
    },
}

// == Cache Entry ==
/// A single cache entry. Owned by the storage backend once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(flatten)]
    pub meta: EntryMetadata,
    pub value: EntryValue<T>,
}

impl<T> CacheEntry<T> {
    pub fn new(meta: EntryMetadata, value: EntryValue<T>) -> Self {
        Self { meta, value }
    }

    pub fn key(&self) -> &str {
        &self.meta.key
    }

    /// True when `value` holds compressed bytes.
    pub fn is_compressed(&self) -> bool {
        matches!(self.value, EntryValue::Compressed { .. })
    }

    pub fn is_expired(&self) -> bool {
        self.meta.is_expired()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn next_sequence() -> u64 {
    ACCESS_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}
