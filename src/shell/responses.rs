//! Shell Responses
//!
//! JSON bodies written back by the operator shell, one per command.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheHealth, CacheStatistics, Recommendation};

/// Response for `get`. `value` is null on a miss.
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub found: bool,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            found: value.is_some(),
            value: value.unwrap_or(Value::Null),
        }
    }
}

/// Response for `set`.
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response for `has` and `del`.
#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    pub key: String,
    pub result: bool,
}

/// Response for the bulk removals (`invalidate`, `tags`, `cleanup`).
#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub removed: usize,
}

/// Response for `stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub statistics: CacheStatistics,
    pub policy: String,
    pub policy_metrics: BTreeMap<String, u64>,
}

/// Response for `health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub health: CacheHealth,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(health: CacheHealth) -> Self {
        Self {
            health,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
}

/// Response for commands that only acknowledge.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
