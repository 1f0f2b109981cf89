//! Aegis Document Types
//!
//! Core data types for document storage.
//!
//! Field paths are dotted (`address.city`). Reads through [`Value::lookup`]
//! fan out over arrays the way document stores do: `groupIds._id` on a
//! document holding `groupIds: [{_id: "a"}, {_id: "b"}]` yields both ids.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use aegis_common::utils::split_path;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an identifier stored as a string value.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(Self::new)
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&DocumentId> for DocumentId {
    fn from(id: &DocumentId) -> Self {
        id.clone()
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::String(id.0)
    }
}

fn uuid() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random = nanos.wrapping_add(seq).wrapping_mul(0x5851_f42d_4c95_7f2d);
    format!("{:016x}{:08x}{:08x}", nanos, seq as u32, random as u32)
}

// =============================================================================
// Value
// =============================================================================

/// A document value that can be any JSON-compatible type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut HashMap<String, Value>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get a value at a path without fanning out over arrays; numeric
    /// segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.get_path_parts(&split_path(path))
    }

    fn get_path_parts(&self, parts: &[&str]) -> Option<&Value> {
        let Some((key, rest)) = parts.split_first() else {
            return Some(self);
        };

        match self {
            Self::Object(obj) => obj.get(*key).and_then(|v| v.get_path_parts(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .and_then(|v| v.get_path_parts(rest)),
            _ => None,
        }
    }

    pub(crate) fn get_path_parts_mut(&mut self, parts: &[&str]) -> Option<&mut Value> {
        let Some((key, rest)) = parts.split_first() else {
            return Some(self);
        };

        match self {
            Self::Object(obj) => obj.get_mut(*key).and_then(|v| v.get_path_parts_mut(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(move |idx| arr.get_mut(idx))
                .and_then(|v| v.get_path_parts_mut(rest)),
            _ => None,
        }
    }

    /// Collect every value reachable at `parts`, descending into each element
    /// when an array is met before the path is exhausted.
    pub fn lookup<'a>(&'a self, parts: &[&str], out: &mut Vec<&'a Value>) {
        let Some((key, rest)) = parts.split_first() else {
            out.push(self);
            return;
        };

        match self {
            Self::Object(obj) => {
                if let Some(v) = obj.get(*key) {
                    v.lookup(rest, out);
                }
            }
            Self::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => {
                    if let Some(v) = arr.get(idx) {
                        v.lookup(rest, out);
                    }
                }
                Err(_) => {
                    for item in arr {
                        item.lookup(parts, out);
                    }
                }
            },
            _ => {}
        }
    }

    /// Set a value at a path, creating intermediate objects.
    pub(crate) fn set_path_parts(&mut self, parts: &[&str], value: Value) {
        let Some((key, rest)) = parts.split_first() else {
            *self = value;
            return;
        };

        if !self.is_object() {
            *self = Value::Object(HashMap::new());
        }
        if let Self::Object(obj) = self {
            obj.entry(key.to_string())
                .or_default()
                .set_path_parts(rest, value);
        }
    }

    /// Remove the field at a path, descending into every array element.
    pub(crate) fn remove_path_parts(&mut self, parts: &[&str]) -> bool {
        let Some((key, rest)) = parts.split_first() else {
            return false;
        };

        match self {
            Self::Object(obj) => {
                if rest.is_empty() {
                    obj.remove(*key).is_some()
                } else {
                    obj.get_mut(*key)
                        .map(|v| v.remove_path_parts(rest))
                        .unwrap_or(false)
                }
            }
            Self::Array(arr) => arr
                .iter_mut()
                .fold(false, |removed, item| item.remove_path_parts(parts) || removed),
            _ => false,
        }
    }

    /// Convert from serde_json::Value.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => Self::Array(arr.into_iter().map(Self::from_json).collect()),
            JsonValue::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert to serde_json::Value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::Object(obj) => {
                let mut keys: Vec<&String> = obj.keys().collect();
                keys.sort();
                JsonValue::Object(
                    keys.into_iter()
                        .map(|k| (k.clone(), obj[k].to_json()))
                        .collect(),
                )
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(obj: HashMap<String, Value>) -> Self {
        Self::Object(obj)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(json)
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl Document {
    /// Create a new document with an auto-generated ID.
    pub fn new() -> Self {
        Self::with_id(DocumentId::generate())
    }

    /// Create a document with a specific ID.
    pub fn with_id(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            data: HashMap::new(),
        }
    }

    /// Create a document from a JSON object. A missing `_id` is generated.
    pub fn from_json(json: JsonValue) -> Option<Self> {
        Self::from_value(Value::from_json(json))
    }

    /// Create a document from an object value.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut data) = value else {
            return None;
        };

        let id = data
            .remove("_id")
            .and_then(|v| DocumentId::from_value(&v))
            .unwrap_or_else(DocumentId::generate);

        Some(Self { id, data })
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert("_id".to_string(), JsonValue::String(self.id.0.clone()));

        let mut keys: Vec<&String> = self.data.keys().collect();
        keys.sort();
        for k in keys {
            obj.insert(k.clone(), self.data[k].to_json());
        }

        JsonValue::Object(obj)
    }

    /// Convert into an object value carrying `_id`.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("_id".to_string(), Value::String(self.id.0));
        Value::Object(data)
    }

    /// Get a field value. `_id` is not part of `data`; use [`Document::lookup`]
    /// to address it by path.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key.split_once('.') {
            Some((head, rest)) => self.data.get(head).and_then(|v| v.get_path(rest)),
            None => self.data.get(key),
        }
    }

    /// Every value reachable at a dotted path, `_id` included.
    pub fn lookup(&self, path: &str) -> Vec<Cow<'_, Value>> {
        if path == "_id" {
            return vec![Cow::Owned(self.id.to_value())];
        }

        let parts = split_path(path);
        let Some((head, rest)) = parts.split_first() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if let Some(value) = self.data.get(*head) {
            value.lookup(rest, &mut out);
        }
        out.into_iter().map(Cow::Borrowed).collect()
    }

    /// Set a top-level field value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Set a value at a dotted path, creating intermediate objects.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let parts = split_path(path);
        let Some((head, rest)) = parts.split_first() else {
            return;
        };
        self.data
            .entry(head.to_string())
            .or_default()
            .set_path_parts(rest, value.into());
    }

    /// Mutable access to the value at a dotted path.
    pub fn get_path_mut(&mut self, path: &str) -> Option<&mut Value> {
        let parts = split_path(path);
        let (head, rest) = parts.split_first()?;
        self.data
            .get_mut(*head)
            .and_then(|v| v.get_path_parts_mut(rest))
    }

    /// Remove the value at a dotted path, descending into array elements.
    pub fn unset_path(&mut self, path: &str) -> bool {
        let parts = split_path(path);
        match parts.split_first() {
            Some((head, [])) => self.data.remove(*head).is_some(),
            Some((head, rest)) => self
                .data
                .get_mut(*head)
                .map(|v| v.remove_path_parts(rest))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Check if a field exists.
    pub fn contains(&self, key: &str) -> bool {
        key == "_id" || !self.lookup(key).is_empty()
    }

    /// Get all field names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), "custom-id");
        assert_eq!(DocumentId::from_value(&id3.to_value()), Some(id3));
    }

    #[test]
    fn test_lookup_fans_out_over_arrays() {
        let doc = Document::from_json(json!({
            "_id": "a1",
            "groupIds": [{"_id": "g1", "role": "admin"}, {"_id": "g2"}],
            "tagIds": ["t1", "t2"]
        }))
        .unwrap();

        let ids: Vec<Value> = doc.lookup("groupIds._id").into_iter().map(Cow::into_owned).collect();
        assert_eq!(ids, vec![Value::from("g1"), Value::from("g2")]);

        let tags = doc.lookup("tagIds");
        assert_eq!(tags.len(), 1);
        assert!(tags[0].is_array());

        assert_eq!(doc.lookup("_id")[0].as_str(), Some("a1"));
        assert!(doc.lookup("missing.path").is_empty());
    }

    #[test]
    fn test_set_and_unset_path() {
        let mut doc = Document::with_id("d1");
        doc.set_path("address.city", "NYC");
        assert_eq!(doc.get("address.city").and_then(|v| v.as_str()), Some("NYC"));

        assert!(doc.unset_path("address.city"));
        assert_eq!(doc.get("address"), Some(&Value::Object(HashMap::new())));
        assert!(doc.unset_path("address"));
        assert!(doc.is_empty());
    }

    #[test]
    fn test_unset_path_inside_array() {
        let mut doc = Document::from_json(json!({
            "_id": "d1",
            "items": [{"_id": "x", "n": 1}, {"_id": "y", "n": 2}]
        }))
        .unwrap();

        assert!(doc.unset_path("items.n"));
        assert_eq!(
            doc.to_json(),
            json!({"_id": "d1", "items": [{"_id": "x"}, {"_id": "y"}]})
        );
    }

    #[test]
    fn test_document_json_round_trip_keeps_id() {
        let doc = Document::from_json(json!({"_id": "doc123", "name": "Bob"})).unwrap();
        assert_eq!(doc.id.as_str(), "doc123");
        assert!(!doc.data.contains_key("_id"));

        let value = doc.clone().into_value();
        assert_eq!(value.get_path("_id").and_then(|v| v.as_str()), Some("doc123"));
        assert_eq!(Document::from_value(value), Some(doc));
    }
}
