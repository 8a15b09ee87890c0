//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// Write-path operations return these to the caller. Read-path failures are
/// reported as `cache_error` events and surface as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persistent backend quota would be exceeded
    #[error("Storage quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded { requested: u64, available: u64 },

    /// Value or entry (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression failed ({algorithm}): {reason}")]
    Compression { algorithm: String, reason: String },

    /// Stored payload could not be decompressed
    #[error("Decompression failed ({algorithm}): {reason}")]
    Decompression { algorithm: String, reason: String },

    /// Invalidation pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed caller input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filesystem failure in the persistent backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
