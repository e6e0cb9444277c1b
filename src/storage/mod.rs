//! bitframe storage layer
//!
//! This module holds everything below the schema:
//!
//! - **bitmap**: `BitContainer`, the roaring-backed row
//! - **cache**: per-fragment row cardinality ranking
//! - **oplog**: CRC-framed mutation log
//! - **snapshot**: fragment snapshot file format
//! - **fragment**: rows of one (frame, view, shard)
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   (row, column) → shard = column / SHARD_WIDTH → Fragment
//!                 → OpLog → rows → RowCache
//!
//! Read Path:
//!   Fragment rows (in memory) → cloned BitContainer
//! ```

pub mod bitmap;
pub mod cache;
pub mod error;
pub mod fragment;
pub mod oplog;
pub mod snapshot;

use std::path::{Path, PathBuf};

pub use bitmap::BitContainer;
pub use cache::{sort_pairs, CacheType, Pair, RowCache, DEFAULT_CACHE_SIZE};
pub use error::{StorageError, StorageResult};
pub use fragment::{Fragment, FragmentConfig, RangeOp, TopOptions, DEFAULT_MAX_OP_N};
pub use oplog::{Op, OpLog, SyncMode};
pub use snapshot::CompressionType;

/// Number of columns owned by one fragment
pub const SHARD_WIDTH: u64 = 1 << 20;

/// Shard that owns a column
pub fn shard_of(column_id: u64) -> u64 {
    column_id / SHARD_WIDTH
}

/// Runtime storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all indexes
    pub data_dir: PathBuf,
    /// Logged ops per fragment before a snapshot (default: 2000)
    pub max_op_n: usize,
    /// Op log sync strategy
    pub sync_mode: SyncMode,
    /// Snapshot body compression
    pub compression: CompressionType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("bitframe_data"),
            max_op_n: DEFAULT_MAX_OP_N,
            sync_mode: SyncMode::Batched,
            compression: CompressionType::Lz4,
        }
    }
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Get path to an index directory
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Same settings rooted somewhere else
    pub fn with_data_dir(&self, data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..self.clone()
        }
    }

    /// Fragment settings for a frame's cache choice
    pub fn fragment_config(&self, cache_type: CacheType, cache_size: u32) -> FragmentConfig {
        FragmentConfig {
            cache_type,
            cache_size,
            max_op_n: self.max_op_n,
            sync_mode: self.sync_mode,
            compression: self.compression,
        }
    }
}
