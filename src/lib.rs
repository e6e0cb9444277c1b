//! # bitframe
//!
//! Bitmap storage engine: sparse row × column bit matrices organized into
//! indexes, frames, views and shard-sized fragments.
//!
//! ## Features
//!
//! - **Roaring rows**: every row is a compressed bitmap
//! - **Durability**: CRC-framed op log plus periodic fragment snapshots
//! - **Ranking**: per-fragment row caches for top-N queries
//! - **Time views**: bits bucketed by year/month/day/hour for range reads
//! - **Integer fields**: bit-sliced values with sum and range predicates
//! - **Ingestion**: CSV bulk import and JSON records via input definitions
//!
//! ## Modules
//!
//! - [`storage`]: fragments, op log, snapshots and row caches
//! - [`schema`]: names, options, fields and time quantums
//! - [`index`]: holder, indexes, frames, views and input definitions
//! - [`import`]: CSV bit import
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bitframe::{FrameOptions, Holder, IndexOptions, StorageConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let holder = Holder::open(StorageConfig::new("./data"))?;
//!     let index = holder.create_index_if_not_exists("users", IndexOptions::default())?;
//!     let frame = index.create_frame_if_not_exists("likes", FrameOptions::default())?;
//!
//!     frame.set_bit("standard", 1, 42, None)?;
//!     println!("row 1: {:?}", frame.row("standard", 1)?.bits());
//!
//!     holder.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod import;
pub mod index;
pub mod schema;
pub mod storage;

pub use storage::{
    BitContainer, CacheType, CompressionType, Fragment, Pair, RangeOp, StorageConfig,
    StorageError, StorageResult, SyncMode, TopOptions, SHARD_WIDTH,
};

pub use schema::{Field, FieldType, FrameOptions, IndexOptions, TimeQuantum};

pub use index::{
    Action, Bit, FieldSum, Frame, Holder, Index, IndexError, IndexResult, InputDefinition,
    InputDefinitionField, InputDefinitionInfo, InputFrame, ValueDestination, View,
};

pub use import::{CsvImportResult, CsvImporter, ImportError};

pub use config::{Config, ConfigError, LoggingConfig};
