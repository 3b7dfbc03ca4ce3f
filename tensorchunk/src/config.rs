//! Chunk sizing configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default chunk capacity (32 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default corner-merge target: boundary chunks smaller than this are
/// coalesced into their predecessor (16 MiB)
pub const DEFAULT_CORNER_MERGE_THRESHOLD: u64 = DEFAULT_MAX_CHUNK_SIZE / 2;

/// Default zstd level
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Configuration for chunk packing and merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Maximum bytes a chunk may hold
    pub max_chunk_size: u64,
    /// First chunks of a worker smaller than this are merged at the boundary
    pub corner_merge_threshold: u64,
    /// Split oversized samples into tile chunks instead of failing
    pub tiling: bool,
    /// Compression level used by zstd
    pub zstd_level: i32,
}

impl ChunkConfig {
    /// Create config with a chunk capacity
    pub fn with_max_chunk_size(max_chunk_size: u64) -> Self {
        Self {
            max_chunk_size,
            corner_merge_threshold: max_chunk_size / 2,
            ..Self::default()
        }
    }

    /// Set the corner merge threshold
    pub fn with_corner_merge_threshold(mut self, threshold: u64) -> Self {
        self.corner_merge_threshold = threshold;
        self
    }

    /// Enable or disable tiling of oversized samples
    pub fn with_tiling(mut self, tiling: bool) -> Self {
        self.tiling = tiling;
        self
    }

    /// Set the zstd level
    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    /// Load from JSON, missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no chunk can satisfy
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::Config("max_chunk_size must be positive".into()));
        }
        if self.corner_merge_threshold > self.max_chunk_size {
            return Err(Error::Config(format!(
                "corner_merge_threshold {} exceeds max_chunk_size {}",
                self.corner_merge_threshold, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            corner_merge_threshold: DEFAULT_CORNER_MERGE_THRESHOLD,
            tiling: true,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ChunkConfig::with_max_chunk_size(300)
            .with_corner_merge_threshold(100)
            .with_tiling(false);
        assert_eq!(config.max_chunk_size, 300);
        assert_eq!(config.corner_merge_threshold, 100);
        assert!(!config.tiling);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_defaults() {
        let config = ChunkConfig::from_json(r#"{"max_chunk_size": 67108864}"#).unwrap();
        assert_eq!(config.max_chunk_size, 64 * 1024 * 1024);
        assert_eq!(config.corner_merge_threshold, DEFAULT_CORNER_MERGE_THRESHOLD);
    }

    #[test]
    fn test_invalid() {
        assert!(ChunkConfig::from_json(r#"{"max_chunk_size": 0}"#).is_err());
        assert!(ChunkConfig::with_max_chunk_size(10)
            .with_corner_merge_threshold(11)
            .validate()
            .is_err());
    }
}
