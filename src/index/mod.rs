//! bitframe index layer
//!
//! Everything above a single fragment:
//!
//! - **Holder**: root of the data directory, owns indexes by name
//! - **Index**: namespace of frames and input definitions
//! - **Frame**: schema unit owning views (standard, inverse, time, field)
//! - **View**: one fragment per shard
//! - **InputDefinition**: maps JSON records to bits
//!
//! # Architecture
//!
//! ```text
//! Holder → Index → Frame → View → Fragment (storage)
//!                ↘ InputDefinition ─ expand(records) → Frame bits
//! ```

mod catalog;
pub mod error;
mod frame;
mod holder;
mod input;
mod view;

pub use catalog::Index;
pub use error::{IndexError, IndexResult};
pub use frame::{Bit, FieldSum, Frame};
pub use holder::{FrameInfo, Holder, IndexInfo};
pub use input::{
    Action, FrameBit, InputDefinition, InputDefinitionField, InputDefinitionInfo, InputFrame,
    ValueDestination,
};
pub use view::{View, VIEW_INVERSE, VIEW_STANDARD};
