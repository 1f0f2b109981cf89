//! Aegis Document Index
//!
//! Indexing structures for efficient document queries.
//!
//! Indexes are multikey: a document whose indexed path resolves to an array
//! (or fans out through one) is filed under every element. Documents missing
//! the path are not indexed, so unique indexes are sparse.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, DocumentId, Value};
use std::collections::{BTreeSet, HashMap, HashSet};

// =============================================================================
// Index Type
// =============================================================================

/// Type of document index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Hash index for equality lookups.
    Hash,
    /// Unique index (no duplicates allowed).
    Unique,
}

// =============================================================================
// Document Index
// =============================================================================

/// Index for efficient document queries.
pub struct DocumentIndex {
    field: String,
    index_type: IndexType,
    hash_index: HashMap<IndexKey, BTreeSet<DocumentId>>,
}

impl DocumentIndex {
    /// Create a new index.
    pub fn new(field: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            field: field.into(),
            index_type,
            hash_index: HashMap::new(),
        }
    }

    /// Get the indexed field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Get the index type.
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn is_unique(&self) -> bool {
        self.index_type == IndexType::Unique
    }

    /// Every key a document is filed under.
    pub fn keys_for(&self, doc: &Document) -> HashSet<IndexKey> {
        let mut keys = HashSet::new();
        for value in doc.lookup(&self.field) {
            match value.as_ref() {
                Value::Array(items) => keys.extend(items.iter().map(IndexKey::from_value)),
                other => {
                    keys.insert(IndexKey::from_value(other));
                }
            }
        }
        keys
    }

    /// The first key of `doc` already owned by another document, if any.
    pub fn conflict(&self, doc: &Document) -> Option<IndexKey> {
        if !self.is_unique() {
            return None;
        }

        self.keys_for(doc).into_iter().find(|key| {
            self.hash_index
                .get(key)
                .map(|ids| ids.iter().any(|id| id != &doc.id))
                .unwrap_or(false)
        })
    }

    /// Index a document.
    pub fn index_document(&mut self, doc: &Document) {
        for key in self.keys_for(doc) {
            self.hash_index.entry(key).or_default().insert(doc.id.clone());
        }
    }

    /// Remove a document from the index.
    pub fn unindex_document(&mut self, doc: &Document) {
        for key in self.keys_for(doc) {
            if let Some(ids) = self.hash_index.get_mut(&key) {
                ids.remove(&doc.id);
                if ids.is_empty() {
                    self.hash_index.remove(&key);
                }
            }
        }
    }

    /// Find documents by exact value.
    pub fn find_eq(&self, value: &Value) -> Vec<DocumentId> {
        self.hash_index
            .get(&IndexKey::from_value(value))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Find documents matching any of the values, without duplicates.
    pub fn find_in(&self, values: &[Value]) -> BTreeSet<DocumentId> {
        values
            .iter()
            .filter_map(|v| self.hash_index.get(&IndexKey::from_value(v)))
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        self.hash_index.clear();
    }

    /// Get the number of unique keys.
    pub fn key_count(&self) -> usize {
        self.hash_index.len()
    }
}

// =============================================================================
// Index Key
// =============================================================================

/// Hashable form of a [`Value`]. Also used to group documents by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Float(OrderedFloat),
    /// Arrays and objects, keyed by their canonical JSON text.
    Composite(String),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Int(*n),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Self::Int(*f as i64),
            Value::Float(f) => Self::Float(OrderedFloat(*f)),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Composite(value.to_json().to_string()),
        }
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Float(x) => write!(f, "{}", x.0),
            Self::Composite(s) => write!(f, "{}", s),
        }
    }
}

/// Wrapper for f64 that implements Eq and Hash.
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

// =============================================================================
// Tests
// =============================================================================
