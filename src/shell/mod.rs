//! Operator Shell
//!
//! Line-oriented command interface over a `CacheManager` holding JSON
//! values. Every command produces exactly one JSON line.

pub mod command;
pub mod responses;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::error::Result;

pub use command::{validate_key, Command};
use responses::{
    CountResponse, ErrorResponse, GetResponse, HealthResponse, KeyResponse, MessageResponse,
    RecommendResponse, SetResponse, StatsResponse,
};

/// What the input loop should do after a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Print the JSON line and keep reading
    Output(String),
    /// Print the JSON line and stop
    Quit(String),
}

// == Shell ==
pub struct Shell {
    cache: Arc<CacheManager<Value>>,
}

impl Shell {
    pub fn new(cache: Arc<CacheManager<Value>>) -> Self {
        Self { cache }
    }

    /// Parses and executes one line. Errors become `{"error": ...}` lines.
    pub async fn handle_line(&self, line: &str) -> Reply {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!("Rejected command '{}': {}", line.trim(), e);
                return Reply::Output(to_line(&ErrorResponse::new(e.to_string())));
            }
        };

        if command == Command::Quit {
            return Reply::Quit(to_line(&MessageResponse::new("bye")));
        }

        match self.execute(command).await {
            Ok(value) => Reply::Output(value.to_string()),
            Err(e) => {
                warn!("Command failed: {}", e);
                Reply::Output(to_line(&ErrorResponse::new(e.to_string())))
            }
        }
    }

    // == Execute ==
    /// Runs a parsed command against the cache.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        let response = match command {
            Command::Set { key, value, ttl } => {
                self.cache.set(&key, value, ttl).await?;
                serde_json::to_value(SetResponse::new(key))?
            }
            Command::Get { key } => {
                let value = self.cache.get(&key).await;
                serde_json::to_value(GetResponse::new(key, value))?
            }
            Command::Has { key } => {
                let result = self.cache.has(&key).await;
                serde_json::to_value(KeyResponse { key, result })?
            }
            Command::Delete { key } => {
                let result = self.cache.delete(&key).await?;
                serde_json::to_value(KeyResponse { key, result })?
            }
            Command::Invalidate { pattern } => {
                let removed = self.cache.invalidate(&pattern).await?;
                serde_json::to_value(CountResponse { removed })?
            }
            Command::InvalidateTags { tags } => {
                let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
                let removed = self.cache.invalidate_by_tags(&tags).await?;
                serde_json::to_value(CountResponse { removed })?
            }
            Command::Cleanup => {
                let removed = self.cache.cleanup_expired().await?;
                serde_json::to_value(CountResponse { removed })?
            }
            Command::Stats => serde_json::to_value(StatsResponse {
                statistics: self.cache.get_statistics().await,
                policy: self.cache.get_config().await.eviction_policy.to_string(),
                policy_metrics: self.cache.policy_metrics().await,
            })?,
            Command::Health => serde_json::to_value(HealthResponse::new(self.cache.get_health().await))?,
            Command::Recommend => serde_json::to_value(RecommendResponse {
                recommendations: self.cache.get_optimization_recommendations().await,
            })?,
            Command::Clear => {
                self.cache.clear().await?;
                serde_json::to_value(MessageResponse::new("Cache cleared"))?
            }
            Command::Quit => serde_json::to_value(MessageResponse::new("bye"))?,
        };
        Ok(response)
    }
}

fn to_line<S: Serialize>(body: &S) -> String {
    serde_json::to_string(body).unwrap_or_else(|_| r#"{"error":"unserializable response"}"#.to_string())
}
