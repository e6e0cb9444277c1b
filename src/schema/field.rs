//! Bit-sliced integer fields
//!
//! A field stores `value - min` across `bit_depth` rows of its own view,
//! with one extra row at `bit_depth` marking which columns hold a value.

use crate::index::error::{IndexError, IndexResult};
use crate::schema::names::validate_name;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the view holding a field's slices
pub const FIELD_VIEW_PREFIX: &str = "field_";

/// Field value type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Int,
    /// Any type name this version does not know; rejected by validation
    Unsupported(String),
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "int" => FieldType::Int,
            _ => FieldType::Unsupported(s),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

/// Named bounded integer attribute of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub min: i64,
    pub max: i64,
}

impl Field {
    /// Integer field over the inclusive range `[min, max]`
    pub fn int(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Int,
            min,
            max,
        }
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.name.is_empty() {
            return Err(IndexError::FieldNameRequired);
        }
        // Names become view directory components
        validate_name(&self.name)?;
        if let FieldType::Unsupported(name) = &self.field_type {
            return Err(IndexError::InvalidFieldType(name.clone()));
        }
        if self.min > self.max {
            return Err(IndexError::InvalidFieldRange {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Number of slice rows needed for `max - min`
    pub fn bit_depth(&self) -> u32 {
        64 - self.range_width().leading_zeros()
    }

    fn range_width(&self) -> u64 {
        (self.max as i128 - self.min as i128) as u64
    }

    pub fn view_name(&self) -> String {
        format!("{}{}", FIELD_VIEW_PREFIX, self.name)
    }

    /// Offset a value into slice space, rejecting out-of-range values
    pub fn base_value(&self, value: i64) -> IndexResult<u64> {
        if value < self.min {
            return Err(IndexError::FieldValueTooLow {
                value,
                min: self.min,
            });
        }
        if value > self.max {
            return Err(IndexError::FieldValueTooHigh {
                value,
                max: self.max,
            });
        }
        Ok((value as i128 - self.min as i128) as u64)
    }

    /// Inverse of `base_value`
    pub fn value_from_base(&self, base: u64) -> i64 {
        (self.min as i128 + base as i128) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth() {
        assert_eq!(Field::int("f", 0, 0).bit_depth(), 0);
        assert_eq!(Field::int("f", 0, 1).bit_depth(), 1);
        assert_eq!(Field::int("f", 10, 20).bit_depth(), 4);
        assert_eq!(Field::int("f", -20, 100).bit_depth(), 7);
        assert_eq!(Field::int("f", 0, 1023).bit_depth(), 10);
        assert_eq!(Field::int("f", 0, 1024).bit_depth(), 11);
        assert_eq!(Field::int("f", i64::MIN, i64::MAX).bit_depth(), 64);
    }

    #[test]
    fn test_validate() {
        assert!(Field::int("f", 10, 20).validate().is_ok());
        assert!(Field::int("f", 5, 5).validate().is_ok());
        assert!(matches!(
            Field::int("", 0, 1).validate(),
            Err(IndexError::FieldNameRequired)
        ));
        assert!(matches!(
            Field::int("f", 100, 50).validate(),
            Err(IndexError::InvalidFieldRange { .. })
        ));

        let bad = Field {
            field_type: FieldType::Unsupported("float".into()),
            ..Field::int("f", 0, 1)
        };
        assert!(matches!(bad.validate(), Err(IndexError::InvalidFieldType(t)) if t == "float"));
    }

    #[test]
    fn test_path_like_names_rejected() {
        for name in ["a/b", "..", "../up", "Upper", "has space"] {
            assert!(
                matches!(Field::int(name, 0, 1).validate(), Err(IndexError::NameInvalid(_))),
                "{}",
                name
            );
        }
        assert!(Field::int("field_0-a", 0, 1).validate().is_ok());
    }

    #[test]
    fn test_base_values() {
        let field = Field::int("f", -20, 100);
        assert_eq!(field.base_value(-20).unwrap(), 0);
        assert_eq!(field.base_value(87).unwrap(), 107);
        assert_eq!(field.value_from_base(107), 87);
        assert!(matches!(
            field.base_value(-21),
            Err(IndexError::FieldValueTooLow { .. })
        ));
        assert!(matches!(
            field.base_value(101),
            Err(IndexError::FieldValueTooHigh { .. })
        ));

        let wide = Field::int("w", i64::MIN, i64::MAX);
        assert_eq!(wide.base_value(i64::MAX).unwrap(), u64::MAX);
        assert_eq!(wide.value_from_base(0), i64::MIN);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Field::int("age", 0, 150)).unwrap();
        assert_eq!(json, r#"{"name":"age","type":"int","min":0,"max":150}"#);

        let field: Field = serde_json::from_str(r#"{"name":"x","type":"bogus","min":0,"max":1}"#).unwrap();
        assert_eq!(field.field_type, FieldType::Unsupported("bogus".into()));
    }
}
