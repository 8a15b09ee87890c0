//! Health and Optimization Reports
//!
//! Rule-based diagnostics derived from a manager's statistics.

use serde::Serialize;

use crate::cache::stats::CacheStatistics;

/// Hit rate below which a cache is reported as underperforming.
pub const LOW_HIT_RATE: f64 = 0.7;
/// Fraction of the storage quota above which memory use is flagged.
pub const HIGH_MEMORY_USAGE: f64 = 0.9;
/// Evictions per operation above which churn is flagged.
pub const HIGH_EVICTION_RATE: f64 = 0.1;

/// Hit rate below which a larger cache is recommended.
const TARGET_HIT_RATE: f64 = 0.8;
/// Evictions as a fraction of hits above which TTL tuning is recommended.
const EVICTION_TO_HIT_RATIO: f64 = 0.2;
/// Average entry size in bytes above which compression is recommended.
const LARGE_ENTRY_SIZE: f64 = 1024.0;

// == Health Status ==
/// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => Self::Healthy,
            1 | 2 => Self::Degraded,
            _ => Self::Critical,
        }
    }
}

// == Cache Health ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl CacheHealth {
    /// Evaluates the three health rules against `stats`.
    ///
    /// `storage_quota` is the byte budget memory usage is measured against.
    pub fn evaluate(stats: &CacheStatistics, storage_quota: u64) -> Self {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if stats.hits + stats.misses > 0 && stats.hit_rate < LOW_HIT_RATE {
            issues.push("low hit rate".to_string());
            recommendations
                .push("Increase cache size or review TTL settings to improve hit rate".to_string());
        }

        if storage_quota > 0 && stats.total_size as f64 / storage_quota as f64 > HIGH_MEMORY_USAGE {
            issues.push("high memory usage".to_string());
            recommendations
                .push("Enable compression or raise the storage quota".to_string());
        }

        if stats.total_operations > 0
            && stats.evictions as f64 / stats.total_operations as f64 > HIGH_EVICTION_RATE
        {
            issues.push("high eviction rate".to_string());
            recommendations
                .push("Increase maxSize to reduce eviction churn".to_string());
        }

        Self {
            status: HealthStatus::from_issue_count(issues.len()),
            issues,
            recommendations,
        }
    }

    /// Combines two reports: the worse status wins, lists are de-duplicated
    /// in first-seen order.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            status: self.status.max(other.status),
            issues: union(&self.issues, &other.issues),
            recommendations: union(&self.recommendations, &other.recommendations),
        }
    }
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for item in a.iter().chain(b) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

// == Recommendations ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    IncreaseSize,
    AdjustTtl,
    EnableCompression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub description: String,
    pub estimated_improvement: String,
    /// 0.0 to 1.0, higher first
    pub impact_score: f64,
}

/// Rule-based tuning suggestions, sorted by descending impact.
pub fn optimization_recommendations(
    stats: &CacheStatistics,
    compression_enabled: bool,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if stats.hits + stats.misses > 0 && stats.hit_rate < TARGET_HIT_RATE {
        let gap = TARGET_HIT_RATE - stats.hit_rate;
        out.push(Recommendation {
            kind: RecommendationKind::IncreaseSize,
            description: format!(
                "Hit rate is {:.1}%; increase maxSize to keep more of the working set",
                stats.hit_rate * 100.0
            ),
            estimated_improvement: format!("up to +{:.0}% hit rate", gap * 100.0),
            impact_score: (gap / TARGET_HIT_RATE).min(1.0),
        });
    }

    if stats.evictions as f64 > stats.hits as f64 * EVICTION_TO_HIT_RATIO {
        let ratio = if stats.hits == 0 {
            1.0
        } else {
            (stats.evictions as f64 / stats.hits as f64).min(1.0)
        };
        out.push(Recommendation {
            kind: RecommendationKind::AdjustTtl,
            description: format!(
                "{} evictions against {} hits; shorten defaultTTL so stale entries leave first",
                stats.evictions, stats.hits
            ),
            estimated_improvement: format!("{:.0}% fewer evictions", ratio * 50.0),
            impact_score: ratio * 0.8,
        });
    }

    if !compression_enabled && stats.average_entry_size > LARGE_ENTRY_SIZE {
        let weight = (stats.average_entry_size / (4.0 * LARGE_ENTRY_SIZE)).min(1.0);
        out.push(Recommendation {
            kind: RecommendationKind::EnableCompression,
            description: format!(
                "Average entry is {:.0} bytes; enable compression",
                stats.average_entry_size
            ),
            estimated_improvement: "30-50% less memory".to_string(),
            impact_score: 0.3 + 0.4 * weight,
        });
    }

    out.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hits: u64, misses: u64, evictions: u64, total_size: u64) -> CacheStatistics {
        let mut s = CacheStatistics::new();
        for _ in 0..hits {
            s.record_hit(0.0);
        }
        for _ in 0..misses {
            s.record_miss(0.0);
        }
        s.evictions = evictions;
        s.set_size(1, total_size);
        s
    }

    #[test]
    fn test_cold_cache_is_healthy() {
        let health = CacheHealth::evaluate(&CacheStatistics::new(), 1024);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.issues.is_empty());
    }

    #[test]
    fn test_low_hit_rate_degrades() {
        let health = CacheHealth::evaluate(&stats(1, 9, 0, 10), 1 << 20);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.issues, vec!["low hit rate"]);
        assert_eq!(health.recommendations.len(), 1);
    }

    #[test]
    fn test_three_issues_are_critical() {
        // 10 lookups, 5 evictions, 950 of 1000 bytes used
        let health = CacheHealth::evaluate(&stats(1, 9, 5, 950), 1000);
        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(
            health.issues,
            vec!["low hit rate", "high memory usage", "high eviction rate"]
        );
    }

    #[test]
    fn test_combine_takes_worse_status_and_dedups() {
        let a = CacheHealth {
            status: HealthStatus::Degraded,
            issues: vec!["low hit rate".into()],
            recommendations: vec!["r1".into()],
        };
        let b = CacheHealth {
            status: HealthStatus::Critical,
            issues: vec!["low hit rate".into(), "high memory usage".into()],
            recommendations: vec!["r1".into(), "r2".into()],
        };

        let combined = a.combine(&b);
        assert_eq!(combined.status, HealthStatus::Critical);
        assert_eq!(combined.issues, vec!["low hit rate", "high memory usage"]);
        assert_eq!(combined.recommendations, vec!["r1", "r2"]);
    }

    #[test]
    fn test_recommendations_sorted_by_impact() {
        let mut s = stats(2, 8, 10, 0);
        s.set_size(2, 8192);

        let recs = optimization_recommendations(&s, false);
        let kinds: Vec<RecommendationKind> = recs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::AdjustTtl,
                RecommendationKind::IncreaseSize,
                RecommendationKind::EnableCompression,
            ]
        );
        assert!(recs.windows(2).all(|w| w[0].impact_score >= w[1].impact_score));
    }

    #[test]
    fn test_no_recommendations_when_tuned() {
        let recs = optimization_recommendations(&stats(9, 1, 0, 100), false);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_cold_cache_gets_no_recommendations() {
        assert!(optimization_recommendations(&CacheStatistics::new(), false).is_empty());
    }

    #[test]
    fn test_compression_not_recommended_when_enabled() {
        let mut s = stats(9, 1, 0, 0);
        s.set_size(1, 10_000);
        assert!(optimization_recommendations(&s, true).is_empty());
    }
}
