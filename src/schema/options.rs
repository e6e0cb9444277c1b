//! Frame and index options
//!
//! Every recognized option is a field here with its default. Options are
//! validated once, before any state changes.

use crate::index::error::{IndexError, IndexResult};
use crate::schema::field::Field;
use crate::schema::names::{validate_label, DEFAULT_COLUMN_LABEL, DEFAULT_ROW_LABEL};
use crate::schema::time::TimeQuantum;
use crate::storage::{CacheType, DEFAULT_CACHE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_row_label() -> String {
    DEFAULT_ROW_LABEL.to_string()
}

fn default_column_label() -> String {
    DEFAULT_COLUMN_LABEL.to_string()
}

fn default_cache_size() -> u32 {
    DEFAULT_CACHE_SIZE
}

/// Schema of a frame, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameOptions {
    /// Label for row ids in external records
    #[serde(default = "default_row_label")]
    pub row_label: String,
    /// Also maintain the transposed `inverse` view
    #[serde(default)]
    pub inverse_enabled: bool,
    /// Legacy flag; range queries are driven by `fields`
    #[serde(default)]
    pub range_enabled: bool,
    #[serde(default)]
    pub cache_type: CacheType,
    #[serde(default = "default_cache_size")]
    pub cache_size: u32,
    /// Empty inherits the index quantum
    #[serde(default)]
    pub time_quantum: TimeQuantum,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            row_label: default_row_label(),
            inverse_enabled: false,
            range_enabled: false,
            cache_type: CacheType::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            time_quantum: TimeQuantum::default(),
            fields: Vec::new(),
        }
    }
}

impl FrameOptions {
    pub fn validate(&self) -> IndexResult<()> {
        validate_label(&self.row_label)?;

        let mut seen = HashSet::new();
        for field in &self.fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(IndexError::FieldExists(field.name.clone()));
            }
        }
        Ok(())
    }

    /// True when the frame has fields or the legacy flag is set
    pub fn range_enabled(&self) -> bool {
        self.range_enabled || !self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Options shared by every frame of an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Label for column ids in external records
    #[serde(default = "default_column_label")]
    pub column_label: String,
    /// Default quantum for frames created without one
    #[serde(default)]
    pub time_quantum: TimeQuantum,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            column_label: default_column_label(),
            time_quantum: TimeQuantum::default(),
        }
    }
}

impl IndexOptions {
    pub fn validate(&self) -> IndexResult<()> {
        validate_label(&self.column_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = FrameOptions::default();
        assert_eq!(options.row_label, "rowID");
        assert_eq!(options.cache_type, CacheType::Ranked);
        assert_eq!(options.cache_size, 50_000);
        assert!(!options.range_enabled());
        assert!(options.validate().is_ok());

        // Missing keys fall back to the same defaults
        let parsed: FrameOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, options);

        let index: IndexOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(index.column_label, "columnID");
        assert!(index.time_quantum.is_empty());
    }

    #[test]
    fn test_fields_imply_range() {
        let options = FrameOptions {
            fields: vec![Field::int("a", 0, 10)],
            ..Default::default()
        };
        assert!(options.range_enabled());
        assert_eq!(options.field("a").map(|f| f.max), Some(10));
        assert!(options.field("b").is_none());

        let legacy = FrameOptions {
            range_enabled: true,
            ..Default::default()
        };
        assert!(legacy.validate().is_ok());
        assert!(legacy.range_enabled());
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let options = FrameOptions {
            fields: vec![Field::int("a", 0, 10), Field::int("a", 0, 5)],
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(IndexError::FieldExists(n)) if n == "a"));
    }

    #[test]
    fn test_labels_validated() {
        let options = FrameOptions {
            row_label: "9row".into(),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(IndexError::LabelInvalid(_))));

        let index = IndexOptions {
            column_label: String::new(),
            ..Default::default()
        };
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_keeps_field_order() {
        let options = FrameOptions {
            inverse_enabled: true,
            time_quantum: TimeQuantum::new("YMD").unwrap(),
            fields: vec![Field::int("field0", 10, 20), Field::int("field1", 11, 21)],
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let restored: FrameOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, options);
    }
}
