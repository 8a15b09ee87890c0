//! Cache Warming Module
//!
//! Picks keys worth populating ahead of demand from observed usage.
//! Computing the values is up to the caller; the manager only announces
//! which keys should be warmed.

use serde::{Deserialize, Serialize};

use crate::cache::stats::CacheStatistics;

// == Warming Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarmingConfig {
    /// Minimum observed frequency for a key to be warmed
    pub popularity_threshold: u64,
    /// Cap on keys returned per run
    pub max_warming_operations: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            popularity_threshold: 5,
            max_warming_operations: 50,
        }
    }
}

// == Usage History ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub key: String,
    pub frequency: u64,
    /// Unix milliseconds of the last observed use
    #[serde(default)]
    pub last_used: u64,
}

impl UsageRecord {
    pub fn new(key: impl Into<String>, frequency: u64) -> Self {
        Self {
            key: key.into(),
            frequency,
            last_used: 0,
        }
    }
}

// == Strategy Trait ==
pub trait WarmingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn keys_to_warm(
        &self,
        config: &WarmingConfig,
        statistics: &CacheStatistics,
        history: &[UsageRecord],
    ) -> Vec<String>;

    /// Lets the strategy adapt to the latest statistics.
    fn update_strategy(&mut self, statistics: &CacheStatistics);
}

// == Popular Strategy ==
/// Warms the most frequently used keys at or above the popularity
/// threshold.
#[derive(Debug, Clone, Default)]
pub struct PopularWarmingStrategy {
    last_hit_rate: f64,
}

impl PopularWarmingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit rate observed at the last `update_strategy` call.
    pub fn last_hit_rate(&self) -> f64 {
        self.last_hit_rate
    }
}

impl WarmingStrategy for PopularWarmingStrategy {
    fn name(&self) -> &'static str {
        "popular"
    }

    fn keys_to_warm(
        &self,
        config: &WarmingConfig,
        _statistics: &CacheStatistics,
        history: &[UsageRecord],
    ) -> Vec<String> {
        let mut popular: Vec<&UsageRecord> = history
            .iter()
            .filter(|r| r.frequency >= config.popularity_threshold)
            .collect();
        popular.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        popular
            .into_iter()
            .take(config.max_warming_operations)
            .map(|r| r.key.clone())
            .collect()
    }

    fn update_strategy(&mut self, statistics: &CacheStatistics) {
        self.last_hit_rate = statistics.hit_rate;
    }
}
