//! Schema and index error types

use crate::storage::StorageError;
use thiserror::Error;

/// Errors from index, frame and input definition operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid name: {0}")]
    NameInvalid(String),

    #[error("Invalid label: {0}")]
    LabelInvalid(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Frame already exists: {0}")]
    FrameExists(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("Invalid view: {0}")]
    InvalidView(String),

    #[error("Invalid time quantum: {0}")]
    InvalidTimeQuantum(String),

    #[error("Field name required")]
    FieldNameRequired,

    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),

    #[error("Invalid field range: {name} (min {min} > max {max})")]
    InvalidFieldRange { name: String, min: i64, max: i64 },

    #[error("Field already exists: {0}")]
    FieldExists(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Field value too low: {value} < {min}")]
    FieldValueTooLow { value: i64, min: i64 },

    #[error("Field value too high: {value} > {max}")]
    FieldValueTooHigh { value: i64, max: i64 },

    #[error("Input definition name required")]
    InputDefinitionNameRequired,

    #[error("Input definition already exists: {0}")]
    InputDefinitionExists(String),

    #[error("Input definition not found: {0}")]
    InputDefinitionNotFound(String),

    #[error("Input definition requires at least one frame and one field")]
    InputDefinitionAttrsRequired,

    #[error("Input definition requires a primary key field")]
    PrimaryKeyRequired,

    #[error("Input definition has more than one primary key field")]
    DuplicatePrimaryKey,

    #[error("Invalid input definition: {0}")]
    InvalidInputDefinition(String),

    #[error("Record is missing primary key field: {0}")]
    PrimaryKeyMissing(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Storage(err.into())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Storage(err.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for IndexError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        IndexError::Storage(err.into())
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_not_found_message() {
        let err = IndexError::FrameNotFound("f".into());
        assert!(err.to_string().contains("Frame not found"));
    }

    #[test]
    fn test_storage_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err: IndexError = io.into();
        assert!(matches!(err, IndexError::Storage(StorageError::Io(_))));

        let json = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: IndexError = json.into();
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::Serialization(_))
        ));
    }
}
