use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::patch_api::{EditRequest, EditScope, PatchError};
use crate::patch_api::edit_label;
use crate::value::EditValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Scoped when every top-level value is an object, mass when none is,
    /// grouped when every second-level value is an object as well.
    #[default]
    Auto,
    Scoped,
    Grouped,
    Mass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    Scoped,
    Grouped,
    Mass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBatch {
    pub shape: BatchShape,
    pub edits: Vec<EditRequest>,
}

impl EditBatch {
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Parses an edit descriptor. Edits keep the key order of the JSON text.
///
/// Scoped: `{"USA": {"life_expectancy": 79.1}}`.
/// Grouped: `{"countries": {"USA": {"life_expectancy": 79.1}}}`.
/// Mass: `{"unit": "km"}`.
pub fn parse_batch(text: &str, mode: BatchMode) -> Result<EditBatch, PatchError> {
    let root: JsonValue = serde_json::from_str(text)
        .map_err(|e| PatchError::malformed(format!("edit batch is not valid JSON: {e}")))?;
    let JsonValue::Object(entries) = root else {
        return Err(PatchError::malformed(
            "edit batch must be a JSON object at the top level",
        ));
    };

    let shape = resolve_shape(&entries, mode)?;
    let mut edits = Vec::new();
    match shape {
        BatchShape::Scoped => {
            for (record_key, properties) in &entries {
                require_name("record key", record_key)?;
                let scope = EditScope::Record(record_key.clone());
                push_record_edits(&mut edits, scope, properties)?;
            }
        }
        BatchShape::Grouped => {
            for (category, records) in &entries {
                require_name("category", category)?;
                let JsonValue::Object(records) = records else {
                    return Err(PatchError::malformed(format!(
                        "category {category:?} must map to an object of records"
                    )));
                };
                for (record_key, properties) in records {
                    require_name("record key", record_key)?;
                    let scope = EditScope::Grouped {
                        category: category.clone(),
                        record: record_key.clone(),
                    };
                    push_record_edits(&mut edits, scope, properties)?;
                }
            }
        }
        BatchShape::Mass => {
            for (property, value) in &entries {
                edits.push(EditRequest {
                    scope: EditScope::Everywhere,
                    property: require_name("property name", property)?,
                    value: require_primitive(property, value)?,
                });
            }
        }
    }

    Ok(EditBatch { shape, edits })
}

fn push_record_edits(
    edits: &mut Vec<EditRequest>,
    scope: EditScope,
    properties: &JsonValue,
) -> Result<(), PatchError> {
    let JsonValue::Object(properties) = properties else {
        return Err(PatchError::malformed(format!(
            "record {:?} must map to an object of property edits",
            scope.record_key().unwrap_or_default()
        )));
    };
    for (property, value) in properties {
        let label = edit_label(&scope, property);
        edits.push(EditRequest {
            scope: scope.clone(),
            property: require_name("property name", property)?,
            value: require_primitive(&label, value)?,
        });
    }
    Ok(())
}

fn resolve_shape(
    entries: &JsonMap<String, JsonValue>,
    mode: BatchMode,
) -> Result<BatchShape, PatchError> {
    match mode {
        BatchMode::Scoped => Ok(BatchShape::Scoped),
        BatchMode::Grouped => Ok(BatchShape::Grouped),
        BatchMode::Mass => Ok(BatchShape::Mass),
        BatchMode::Auto => {
            let objects = entries.values().filter(|v| v.is_object()).count();
            if objects == entries.len() {
                let mut inner = entries
                    .values()
                    .filter_map(JsonValue::as_object)
                    .flat_map(|records| records.values())
                    .peekable();
                if inner.peek().is_some() && inner.all(JsonValue::is_object) {
                    Ok(BatchShape::Grouped)
                } else {
                    Ok(BatchShape::Scoped)
                }
            } else if objects == 0 {
                Ok(BatchShape::Mass)
            } else {
                Err(PatchError::malformed(
                    "edit batch mixes record objects and bare property values",
                ))
            }
        }
    }
}

fn require_name(what: &str, name: &str) -> Result<String, PatchError> {
    if name.trim().is_empty() {
        return Err(PatchError::malformed(format!("{what} must not be empty")));
    }
    Ok(name.to_string())
}

fn require_primitive(label: &str, value: &JsonValue) -> Result<EditValue, PatchError> {
    EditValue::from_json(value).ok_or_else(|| {
        PatchError::malformed(format!(
            "value for {label} must be a number or a string, got {value}"
        ))
    })
}
