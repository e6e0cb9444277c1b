//! Schema definitions
//!
//! - **names**: index/frame name and label rules
//! - **time**: time quantums and time view naming
//! - **field**: bit-sliced integer fields
//! - **options**: frame and index options

pub mod field;
pub mod names;
pub mod options;
pub mod time;

pub use field::{Field, FieldType, FIELD_VIEW_PREFIX};
pub use names::{validate_label, validate_name, DEFAULT_COLUMN_LABEL, DEFAULT_ROW_LABEL};
pub use options::{FrameOptions, IndexOptions};
pub use time::{
    datetime_to_timestamp, parse_timestamp, timestamp_to_datetime, view_by_time_unit, views_by_time,
    views_by_time_range, TimeQuantum, TIMESTAMP_FORMAT,
};
