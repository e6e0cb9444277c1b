//! Name and label validation
//!
//! Index, frame and view-base names: lowercase letter first, then up to 63
//! lowercase letters, digits, underscores or hyphens. Labels allow upper
//! case as well.

use crate::index::error::{IndexError, IndexResult};
use regex::Regex;
use std::sync::OnceLock;

/// Default label for frame rows
pub const DEFAULT_ROW_LABEL: &str = "rowID";

/// Default label for index columns
pub const DEFAULT_COLUMN_LABEL: &str = "columnID";

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").expect("valid name pattern"))
}

fn label_regex() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]{0,63}$").expect("valid label pattern"))
}

/// Validate an index or frame name
pub fn validate_name(name: &str) -> IndexResult<()> {
    if !name_regex().is_match(name) {
        return Err(IndexError::NameInvalid(name.to_string()));
    }
    Ok(())
}

/// Validate a row or column label
pub fn validate_label(label: &str) -> IndexResult<()> {
    if !label_regex().is_match(label) {
        return Err(IndexError::LabelInvalid(label.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["a", "i0", "my-index", "my_frame_2", &"a".repeat(64)] {
            assert!(validate_name(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "ABC", "Index", "0abc", "_x", "-x", "a b", "a.b", &"a".repeat(65)] {
            assert!(
                matches!(validate_name(name), Err(IndexError::NameInvalid(_))),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_labels() {
        assert!(validate_label(DEFAULT_ROW_LABEL).is_ok());
        assert!(validate_label(DEFAULT_COLUMN_LABEL).is_ok());
        assert!(validate_label("User_Id-2").is_ok());
        assert!(matches!(validate_label("1abc"), Err(IndexError::LabelInvalid(_))));
        assert!(matches!(validate_label(""), Err(IndexError::LabelInvalid(_))));
    }
}
