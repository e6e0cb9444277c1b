//! Input definitions - mapping external records to bits
//!
//! A definition names the frames it writes to and, per record field, the
//! actions that turn a value into a row id. The primary key field supplies
//! the column id.
//!
//! # Example
//! ```text
//! record: {"id": 7, "color": "Green", "active": true}
//!
//! id     primary key             → column 7
//! color  mapping {Green: 1}      → set (frame "colors", row 1, column 7)
//! active single-row-boolean 100  → set (frame "flags", row 100, column 7)
//! ```

use crate::index::error::{IndexError, IndexResult};
use crate::index::frame::Bit;
use crate::schema::{datetime_to_timestamp, parse_timestamp, validate_name, FrameOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A frame referenced by a definition, created with `options` if absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    pub name: String,
    #[serde(default)]
    pub options: FrameOptions,
}

impl InputFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: FrameOptions::default(),
        }
    }
}

/// How an action turns a field value into a row id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueDestination {
    /// Look the value up in the action's value map
    Mapping,
    /// Use the integer value as the row id
    ValueToRow,
    /// Set the action's fixed row when the value is `true`
    SingleRowBoolean,
    /// Use the value as the timestamp for every bit of the record
    SetTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub frame: String,
    pub value_destination: ValueDestination,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_map: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<u64>,
}

impl Action {
    pub fn mapping(frame: impl Into<String>, value_map: BTreeMap<String, u64>) -> Self {
        Self {
            frame: frame.into(),
            value_destination: ValueDestination::Mapping,
            value_map,
            row_id: None,
        }
    }

    pub fn value_to_row(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            value_destination: ValueDestination::ValueToRow,
            value_map: BTreeMap::new(),
            row_id: None,
        }
    }

    pub fn single_row_boolean(frame: impl Into<String>, row_id: u64) -> Self {
        Self {
            frame: frame.into(),
            value_destination: ValueDestination::SingleRowBoolean,
            value_map: BTreeMap::new(),
            row_id: Some(row_id),
        }
    }

    pub fn set_timestamp(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            value_destination: ValueDestination::SetTimestamp,
            value_map: BTreeMap::new(),
            row_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDefinitionField {
    pub name: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl InputDefinitionField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            actions: Vec::new(),
        }
    }

    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name)
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Persisted description of an input definition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputDefinitionInfo {
    pub name: String,
    #[serde(default)]
    pub frames: Vec<InputFrame>,
    #[serde(default)]
    pub fields: Vec<InputDefinitionField>,
}

impl InputDefinitionInfo {
    /// Structural checks; the name itself is checked by the index
    pub fn validate(&self) -> IndexResult<()> {
        if self.frames.is_empty() || self.fields.is_empty() {
            return Err(IndexError::InputDefinitionAttrsRequired);
        }

        let mut frames = HashSet::new();
        for frame in &self.frames {
            validate_name(&frame.name)?;
            frame.options.validate()?;
            if !frames.insert(frame.name.as_str()) {
                return Err(IndexError::InvalidInputDefinition(format!(
                    "duplicate frame {}",
                    frame.name
                )));
            }
        }

        match self.fields.iter().filter(|f| f.primary_key).count() {
            0 => return Err(IndexError::PrimaryKeyRequired),
            1 => {}
            _ => return Err(IndexError::DuplicatePrimaryKey),
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(IndexError::FieldNameRequired);
            }
            if !names.insert(field.name.as_str()) {
                return Err(IndexError::FieldExists(field.name.clone()));
            }
            if !field.primary_key && field.actions.is_empty() {
                return Err(IndexError::InvalidInputDefinition(format!(
                    "field {} has no actions",
                    field.name
                )));
            }
            for action in &field.actions {
                validate_action(field, action, &frames)?;
            }
        }

        Ok(())
    }

    fn primary_key_field(&self) -> Option<&InputDefinitionField> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

fn validate_action(
    field: &InputDefinitionField,
    action: &Action,
    frames: &HashSet<&str>,
) -> IndexResult<()> {
    if !frames.contains(action.frame.as_str()) {
        return Err(IndexError::InvalidInputDefinition(format!(
            "field {} targets undeclared frame {}",
            field.name, action.frame
        )));
    }
    match action.value_destination {
        ValueDestination::Mapping if action.value_map.is_empty() => {
            Err(IndexError::InvalidInputDefinition(format!(
                "mapping on field {} requires a value map",
                field.name
            )))
        }
        ValueDestination::SingleRowBoolean if action.row_id.is_none() => {
            Err(IndexError::InvalidInputDefinition(format!(
                "single-row-boolean on field {} requires a row id",
                field.name
            )))
        }
        _ => Ok(()),
    }
}

/// A bit produced by expanding a record, tagged with its frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBit {
    pub frame: String,
    pub bit: Bit,
}

/// A registered input definition
#[derive(Debug)]
pub struct InputDefinition {
    name: String,
    path: PathBuf,
    info: RwLock<InputDefinitionInfo>,
}

impl InputDefinition {
    /// Persist a new definition at `path`
    pub(crate) fn create(path: impl AsRef<Path>, info: InputDefinitionInfo) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        save_info(&path, &info)?;
        Ok(Self {
            name: info.name.clone(),
            path,
            info: RwLock::new(info),
        })
    }

    /// Load a persisted definition
    pub(crate) fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)?;
        let info: InputDefinitionInfo = serde_json::from_str(&content)?;
        Ok(Self {
            name: info.name.clone(),
            path,
            info: RwLock::new(info),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> IndexResult<InputDefinitionInfo> {
        Ok(self.info.read()?.clone())
    }

    pub fn frames(&self) -> IndexResult<Vec<InputFrame>> {
        Ok(self.info.read()?.frames.clone())
    }

    pub fn fields(&self) -> IndexResult<Vec<InputDefinitionField>> {
        Ok(self.info.read()?.fields.clone())
    }

    /// Declare another frame; it is created on the next index reopen
    pub fn add_frame(&self, frame: InputFrame) -> IndexResult<()> {
        validate_name(&frame.name)?;
        frame.options.validate()?;

        let mut info = self.info.write()?;
        if info.frames.iter().any(|f| f.name == frame.name) {
            return Ok(());
        }
        info.frames.push(frame);
        save_info(&self.path, &info)
    }

    pub(crate) fn delete(&self) -> IndexResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Expand records into the bits they set, in record order
    pub fn expand(&self, records: &[Value]) -> IndexResult<Vec<FrameBit>> {
        let info = self.info.read()?;
        let primary_key = info
            .primary_key_field()
            .ok_or(IndexError::PrimaryKeyRequired)?;

        let mut bits = Vec::new();
        for record in records {
            expand_record(&info, primary_key, record, &mut bits)?;
        }
        Ok(bits)
    }
}

fn expand_record(
    info: &InputDefinitionInfo,
    primary_key: &InputDefinitionField,
    record: &Value,
    out: &mut Vec<FrameBit>,
) -> IndexResult<()> {
    let record = record.as_object().ok_or_else(|| IndexError::InvalidFieldValue {
        field: primary_key.name.clone(),
        reason: "record is not an object".into(),
    })?;

    let column_id = match record.get(&primary_key.name) {
        None | Some(Value::Null) => {
            return Err(IndexError::PrimaryKeyMissing(primary_key.name.clone()))
        }
        Some(v) => v.as_u64().ok_or_else(|| IndexError::InvalidFieldValue {
            field: primary_key.name.clone(),
            reason: format!("expected a non-negative integer, got {}", v),
        })?,
    };

    let mut timestamp = None;
    for field in &info.fields {
        let Some(value) = record.get(&field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        for action in &field.actions {
            if action.value_destination == ValueDestination::SetTimestamp {
                let t = value
                    .as_str()
                    .and_then(parse_timestamp)
                    .ok_or_else(|| IndexError::InvalidFieldValue {
                        field: field.name.clone(),
                        reason: format!("invalid timestamp {}", value),
                    })?;
                timestamp = Some(datetime_to_timestamp(t));
            }
        }
    }

    for field in info.fields.iter().filter(|f| !f.primary_key) {
        let Some(value) = record.get(&field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        for action in &field.actions {
            let row_id = match action.value_destination {
                ValueDestination::Mapping => {
                    let token = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(IndexError::InvalidFieldValue {
                                field: field.name.clone(),
                                reason: format!("cannot map {}", other),
                            })
                        }
                    };
                    match action.value_map.get(&token) {
                        Some(row_id) => *row_id,
                        None => continue,
                    }
                }
                ValueDestination::ValueToRow => {
                    value.as_u64().ok_or_else(|| IndexError::InvalidFieldValue {
                        field: field.name.clone(),
                        reason: format!("expected a row id, got {}", value),
                    })?
                }
                ValueDestination::SingleRowBoolean => {
                    let set = value.as_bool().ok_or_else(|| IndexError::InvalidFieldValue {
                        field: field.name.clone(),
                        reason: format!("expected a boolean, got {}", value),
                    })?;
                    match (set, action.row_id) {
                        (true, Some(row_id)) => row_id,
                        _ => continue,
                    }
                }
                ValueDestination::SetTimestamp => continue,
            };

            out.push(FrameBit {
                frame: action.frame.clone(),
                bit: Bit {
                    row_id,
                    column_id,
                    timestamp,
                },
            });
        }
    }

    Ok(())
}

fn save_info(path: &Path, info: &InputDefinitionInfo) -> IndexResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(info)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn colors() -> BTreeMap<String, u64> {
        [("Green".to_string(), 1), ("Red".to_string(), 2), ("7".to_string(), 7)]
            .into_iter()
            .collect()
    }

    fn sample_info() -> InputDefinitionInfo {
        InputDefinitionInfo {
            name: "people".into(),
            frames: vec![
                InputFrame::new("colors"),
                InputFrame::new("ages"),
                InputFrame::new("flags"),
            ],
            fields: vec![
                InputDefinitionField::primary_key("id"),
                InputDefinitionField::new("color").with_action(Action::mapping("colors", colors())),
                InputDefinitionField::new("age").with_action(Action::value_to_row("ages")),
                InputDefinitionField::new("active")
                    .with_action(Action::single_row_boolean("flags", 100)),
                InputDefinitionField::new("seen").with_action(Action::set_timestamp("colors")),
            ],
        }
    }

    fn definition(dir: &Path) -> InputDefinition {
        InputDefinition::create(dir.join("people"), sample_info()).unwrap()
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_info().validate().is_ok());
    }

    #[test]
    fn test_validate_structure() {
        let empty = InputDefinitionInfo {
            name: "x".into(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(IndexError::InputDefinitionAttrsRequired)));

        let mut info = sample_info();
        info.fields[0].primary_key = false;
        assert!(matches!(info.validate(), Err(IndexError::PrimaryKeyRequired)));

        let mut info = sample_info();
        info.fields[1].primary_key = true;
        assert!(matches!(info.validate(), Err(IndexError::DuplicatePrimaryKey)));

        let mut info = sample_info();
        info.fields[2].actions[0].frame = "unknown".into();
        assert!(matches!(info.validate(), Err(IndexError::InvalidInputDefinition(_))));

        let mut info = sample_info();
        info.fields[1].actions[0].value_map.clear();
        assert!(matches!(info.validate(), Err(IndexError::InvalidInputDefinition(_))));

        let mut info = sample_info();
        info.fields[3].actions[0].row_id = None;
        assert!(matches!(info.validate(), Err(IndexError::InvalidInputDefinition(_))));

        let mut info = sample_info();
        info.frames.push(InputFrame::new("Bad"));
        assert!(matches!(info.validate(), Err(IndexError::NameInvalid(_))));

        let mut info = sample_info();
        info.fields.push(InputDefinitionField::new("age").with_action(Action::value_to_row("ages")));
        assert!(matches!(info.validate(), Err(IndexError::FieldExists(_))));
    }

    #[test]
    fn test_expand_records() {
        let dir = tempdir().unwrap();
        let def = definition(dir.path());

        let bits = def
            .expand(&[
                json!({"id": 7, "color": "Green", "age": 30, "active": true}),
                json!({"id": 8, "color": "Purple", "active": false, "extra": "ignored"}),
                json!({"id": 9, "color": 7, "age": null}),
            ])
            .unwrap();

        assert_eq!(
            bits,
            vec![
                FrameBit { frame: "colors".into(), bit: Bit::new(1, 7) },
                FrameBit { frame: "ages".into(), bit: Bit::new(30, 7) },
                FrameBit { frame: "flags".into(), bit: Bit::new(100, 7) },
                FrameBit { frame: "colors".into(), bit: Bit::new(7, 9) },
            ]
        );
    }

    #[test]
    fn test_expand_timestamp_applies_to_record() {
        let dir = tempdir().unwrap();
        let def = definition(dir.path());

        let bits = def
            .expand(&[json!({"id": 1, "color": "Red", "age": 3, "seen": "2017-03-02T04:00"})])
            .unwrap();
        let expected = 1_488_427_200_000_000_000;
        assert_eq!(bits.len(), 2);
        assert!(bits.iter().all(|b| b.bit.timestamp == Some(expected)));
    }

    #[test]
    fn test_expand_errors() {
        let dir = tempdir().unwrap();
        let def = definition(dir.path());

        assert!(matches!(
            def.expand(&[json!({"color": "Green"})]),
            Err(IndexError::PrimaryKeyMissing(_))
        ));
        assert!(matches!(
            def.expand(&[json!({"id": -1})]),
            Err(IndexError::InvalidFieldValue { .. })
        ));
        assert!(matches!(
            def.expand(&[json!({"id": 1, "age": "old"})]),
            Err(IndexError::InvalidFieldValue { .. })
        ));
        assert!(matches!(
            def.expand(&[json!({"id": 1, "seen": "yesterday"})]),
            Err(IndexError::InvalidFieldValue { .. })
        ));
        assert!(matches!(
            def.expand(&[json!([1, 2])]),
            Err(IndexError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_add_frame_persists() {
        let dir = tempdir().unwrap();
        let def = definition(dir.path());
        def.add_frame(InputFrame::new("extra")).unwrap();
        def.add_frame(InputFrame::new("extra")).unwrap();
        assert!(def.add_frame(InputFrame::new("Nope")).is_err());

        let reopened = InputDefinition::open(dir.path().join("people")).unwrap();
        let names: Vec<String> = reopened.frames().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["colors", "ages", "flags", "extra"]);
        assert_eq!(reopened.info().unwrap().fields, sample_info().fields);
    }

    #[test]
    fn test_value_destination_names() {
        let json = serde_json::to_string(&ValueDestination::SingleRowBoolean).unwrap();
        assert_eq!(json, "\"single-row-boolean\"");
        let parsed: ValueDestination = serde_json::from_str("\"value-to-row\"").unwrap();
        assert_eq!(parsed, ValueDestination::ValueToRow);
    }
}
