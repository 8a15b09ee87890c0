//! Value Compression
//!
//! LZ4 block compression for serialized values above a size threshold.
//!
//! # Example
//!
//! ```
//! use cache_engine::cache::compression::{Compressor, Lz4Compressor};
//!
//! let compressor = Lz4Compressor::new();
//! let data = "cache ".repeat(100).into_bytes();
//!
//! let result = compressor.compress(&data).unwrap();
//! let restored = compressor.decompress(&result.data, result.algorithm).unwrap();
//! assert_eq!(restored, data);
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::MAX_DECOMPRESSED_SIZE;
use crate::error::{CacheError, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Stored as-is
    None,
    /// LZ4 block format with a 4-byte length prefix
    Lz4,
}

impl CompressionAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Result
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    pub algorithm: CompressionAlgorithm,
}

// =============================================================================
// Compressor Trait
// =============================================================================

pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, data: &[u8]) -> Result<CompressionResult>;

    /// Restores bytes produced by `compress`. Corrupt payloads are an error,
    /// never passed through.
    fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>>;

    /// True iff the serialized value is larger than `threshold` bytes.
    fn should_compress(&self, serialized: &[u8], threshold: usize) -> bool {
        serialized.len() > threshold
    }

    /// compressed / original, 1.0 for empty input.
    fn compression_ratio(&self, original_size: usize, compressed_size: usize) -> f64 {
        if original_size == 0 {
            1.0
        } else {
            compressed_size as f64 / original_size as f64
        }
    }

    fn supported_algorithms(&self) -> Vec<CompressionAlgorithm>;
}

/// Returns the compressor for a manager, or `None` when compression is off.
pub fn create_compressor(enabled: bool) -> Option<Arc<dyn Compressor>> {
    enabled.then(|| Arc::new(Lz4Compressor::new()) as Arc<dyn Compressor>)
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create new LZ4 compressor with default settings
    pub fn new() -> Self {
        Self { level: 4 }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<CompressionResult> {
        let compressed = lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| CacheError::Compression {
            algorithm: CompressionAlgorithm::Lz4.to_string(),
            reason: e.to_string(),
        })?;

        Ok(CompressionResult {
            original_size: data.len(),
            compressed_size: compressed.len(),
            data: compressed,
            algorithm: CompressionAlgorithm::Lz4,
        })
    }

    fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
        match algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Lz4 => {
                let declared = declared_size(data).ok_or_else(|| CacheError::Decompression {
                    algorithm: algorithm.to_string(),
                    reason: format!("payload of {} bytes has no length prefix", data.len()),
                })?;
                if declared > MAX_DECOMPRESSED_SIZE {
                    return Err(CacheError::Decompression {
                        algorithm: algorithm.to_string(),
                        reason: format!(
                            "declared size {} exceeds limit of {} bytes",
                            declared, MAX_DECOMPRESSED_SIZE
                        ),
                    });
                }
                lz4::block::decompress(data, None).map_err(|e| CacheError::Decompression {
                    algorithm: algorithm.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn supported_algorithms(&self) -> Vec<CompressionAlgorithm> {
        vec![CompressionAlgorithm::None, CompressionAlgorithm::Lz4]
    }
}

/// Reads the little-endian length prefix written by `lz4::block::compress`.
fn declared_size(data: &[u8]) -> Option<usize> {
    let prefix: [u8; 4] = data.get(..4)?.try_into().ok()?;
    let size = i32::from_le_bytes(prefix);
    usize::try_from(size).ok()
}

// =============================================================================
// Tests
// =============================================================================
