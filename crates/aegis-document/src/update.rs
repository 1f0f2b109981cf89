//! Aegis Document Updates
//!
//! Field-level update operators. A list of operators is applied atomically
//! by [`Collection::update_one`](crate::collection::Collection::update_one);
//! the same list can be replayed on an in-memory copy of the document so a
//! caller holding that copy sees its own writes.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::collection::CollectionError;
use crate::types::{Document, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// Update Operators
// =============================================================================

/// A single update operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Set the value at a path.
    Set { path: String, value: Value },
    /// Remove the value at a path.
    Unset { path: String },
    /// Append values not already present in the array at a path.
    AddToSet { path: String, values: Vec<Value> },
    /// Remove every array element equal to one of the values.
    Pull { path: String, values: Vec<Value> },
    /// Append objects whose `key` field is not already present in the array.
    PushUniqueBy {
        path: String,
        key: String,
        values: Vec<Value>,
    },
    /// Remove array objects whose `key` field equals one of the values.
    PullBy {
        path: String,
        key: String,
        values: Vec<Value>,
    },
    /// Replace the array object whose `key` field equals `key_value`.
    SetElementBy {
        path: String,
        key: String,
        key_value: Value,
        value: Value,
    },
}

impl UpdateOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. }
            | Self::Unset { path }
            | Self::AddToSet { path, .. }
            | Self::Pull { path, .. }
            | Self::PushUniqueBy { path, .. }
            | Self::PullBy { path, .. }
            | Self::SetElementBy { path, .. } => path,
        }
    }

    /// Apply this operator to a document.
    pub fn apply(&self, doc: &mut Document) -> Result<(), CollectionError> {
        match self {
            Self::Set { path, value } => {
                doc.set_path(path, value.clone());
            }
            Self::Unset { path } => {
                doc.unset_path(path);
            }
            Self::AddToSet { path, values } => {
                let items = array_at(doc, path)?;
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            Self::Pull { path, values } => {
                if let Some(items) = existing_array_at(doc, path)? {
                    items.retain(|item| !values.contains(item));
                }
            }
            Self::PushUniqueBy { path, key, values } => {
                let items = array_at(doc, path)?;
                for value in values {
                    let Some(candidate) = value.as_object().and_then(|o| o.get(key)) else {
                        return Err(CollectionError::InvalidUpdate(format!(
                            "element pushed to {} is missing key {}",
                            path, key
                        )));
                    };
                    if !items.iter().any(|item| element_key(item, key) == Some(candidate)) {
                        items.push(value.clone());
                    }
                }
            }
            Self::PullBy { path, key, values } => {
                if let Some(items) = existing_array_at(doc, path)? {
                    items.retain(|item| {
                        element_key(item, key)
                            .map(|k| !values.contains(k))
                            .unwrap_or(true)
                    });
                }
            }
            Self::SetElementBy {
                path,
                key,
                key_value,
                value,
            } => {
                let element = existing_array_at(doc, path)?
                    .and_then(|items| {
                        items
                            .iter_mut()
                            .find(|item| element_key(item, key) == Some(key_value))
                    })
                    .ok_or_else(|| {
                        CollectionError::InvalidUpdate(format!(
                            "no element of {} has {} = {:?}",
                            path, key, key_value
                        ))
                    })?;
                *element = value.clone();
            }
        }

        Ok(())
    }

    /// Apply a list of operators in order.
    pub fn apply_all(ops: &[UpdateOp], doc: &mut Document) -> Result<(), CollectionError> {
        ops.iter().try_for_each(|op| op.apply(doc))
    }
}

fn element_key<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    item.as_object().and_then(|o| o.get(key))
}

fn array_at<'a>(doc: &'a mut Document, path: &str) -> Result<&'a mut Vec<Value>, CollectionError> {
    let missing = doc.get_path_mut(path).map(|v| v.is_null()).unwrap_or(true);
    if missing {
        doc.set_path(path, Value::Array(Vec::new()));
    }

    doc.get_path_mut(path)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| CollectionError::InvalidUpdate(format!("field {} is not an array", path)))
}

fn existing_array_at<'a>(
    doc: &'a mut Document,
    path: &str,
) -> Result<Option<&'a mut Vec<Value>>, CollectionError> {
    match doc.get_path_mut(path) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(CollectionError::InvalidUpdate(format!(
            "field {} is not an array",
            path
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
