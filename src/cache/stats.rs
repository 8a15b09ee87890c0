//! Cache Statistics Module
//!
//! Running aggregate of hits, misses, sizes, evictions, compression and
//! smoothed operation timings.

use serde::Serialize;

/// Weight given to the newest sample in the smoothed timings.
pub const SMOOTHING_FACTOR: f64 = 0.1;

// == Compression Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    /// Number of values stored compressed
    pub total_compressed: u64,
    /// Mean compressed/original ratio over all compressed values
    pub compression_ratio: f64,
    /// Bytes saved by compression, cumulative
    pub compression_savings: u64,
}

// == Performance Stats ==
/// Exponentially smoothed timings in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub average_get_time: f64,
    pub average_set_time: f64,
    pub average_eviction_time: f64,
}

// == Cache Statistics ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub total_operations: u64,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 before the first lookup
    pub hit_rate: f64,
    pub entry_count: usize,
    /// Sum of stored entry sizes in bytes
    pub total_size: u64,
    pub average_entry_size: f64,
    pub evictions: u64,
    pub compression: CompressionStats,
    pub performance: PerformanceStats,
}

impl CacheStatistics {
    // == Constructor ==
    /// Creates a new CacheStatistics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&mut self, elapsed_ms: f64) {
        self.total_operations += 1;
        self.hits += 1;
        self.refresh_hit_rate();
        self.performance.average_get_time = smooth(self.performance.average_get_time, elapsed_ms);
    }

    // == Record Miss ==
    pub fn record_miss(&mut self, elapsed_ms: f64) {
        self.total_operations += 1;
        self.misses += 1;
        self.refresh_hit_rate();
        self.performance.average_get_time = smooth(self.performance.average_get_time, elapsed_ms);
    }

    // == Record Set ==
    pub fn record_set(&mut self, elapsed_ms: f64) {
        self.total_operations += 1;
        self.performance.average_set_time = smooth(self.performance.average_set_time, elapsed_ms);
    }

    pub fn record_delete(&mut self) {
        self.total_operations += 1;
    }

    // == Record Eviction ==
    /// Adds `count` evictions and folds the pass duration into the timing.
    pub fn record_eviction(&mut self, count: u64, elapsed_ms: f64) {
        self.evictions += count;
        self.performance.average_eviction_time =
            smooth(self.performance.average_eviction_time, elapsed_ms);
    }

    // == Record Compression ==
    pub fn record_compression(&mut self, original_size: u64, compressed_size: u64) {
        if original_size == 0 {
            return;
        }
        let c = &mut self.compression;
        c.total_compressed += 1;
        let ratio = compressed_size as f64 / original_size as f64;
        c.compression_ratio += (ratio - c.compression_ratio) / c.total_compressed as f64;
        c.compression_savings += original_size.saturating_sub(compressed_size);
    }

    // == Sizes ==
    /// Sets the entry count and total size, recomputing the average.
    pub fn set_size(&mut self, entry_count: usize, total_size: u64) {
        self.entry_count = entry_count;
        self.total_size = total_size;
        self.average_entry_size = if entry_count == 0 {
            0.0
        } else {
            total_size as f64 / entry_count as f64
        };
    }

    /// Zeroes size bookkeeping, keeping hit/miss/eviction counters.
    pub fn reset_size(&mut self) {
        self.set_size(0, 0);
    }

    fn refresh_hit_rate(&mut self) {
        let lookups = self.hits + self.misses;
        self.hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        };
    }

    // == Merge ==
    /// Combines two layers' statistics: counters add, ratios and averages
    /// are the plain mean of the two sides.
    pub fn merge(&self, other: &Self) -> Self {
        let mean = |a: f64, b: f64| (a + b) / 2.0;
        Self {
            total_operations: self.total_operations + other.total_operations,
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            hit_rate: mean(self.hit_rate, other.hit_rate),
            entry_count: self.entry_count + other.entry_count,
            total_size: self.total_size + other.total_size,
            average_entry_size: mean(self.average_entry_size, other.average_entry_size),
            evictions: self.evictions + other.evictions,
            compression: CompressionStats {
                total_compressed: self.compression.total_compressed
                    + other.compression.total_compressed,
                compression_ratio: mean(
                    self.compression.compression_ratio,
                    other.compression.compression_ratio,
                ),
                compression_savings: self.compression.compression_savings
                    + other.compression.compression_savings,
            },
            performance: PerformanceStats {
                average_get_time: mean(
                    self.performance.average_get_time,
                    other.performance.average_get_time,
                ),
                average_set_time: mean(
                    self.performance.average_set_time,
                    other.performance.average_set_time,
                ),
                average_eviction_time: mean(
                    self.performance.average_eviction_time,
                    other.performance.average_eviction_time,
                ),
            },
        }
    }
}

fn smooth(average: f64, sample: f64) -> f64 {
    (1.0 - SMOOTHING_FACTOR) * average + SMOOTHING_FACTOR * sample
}
