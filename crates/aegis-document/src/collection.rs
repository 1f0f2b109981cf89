//! Aegis Document Collection
//!
//! Collection management for document storage.
//!
//! Documents live in identifier order, which is the natural order of every
//! unsorted query. Documents and indexes share one lock so a multi-operator
//! update is applied, validated and re-indexed as a single step.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::aggregate::{AggregateResult, Pipeline};
use crate::index::{DocumentIndex, IndexType};
use crate::query::{sort_documents, Filter, Query, QueryResult};
use crate::types::{Document, DocumentId};
use crate::update::UpdateOp;
use crate::validation::{FieldSchema, Schema};
use aegis_common::AegisError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// =============================================================================
// Collection
// =============================================================================

struct CollectionData {
    documents: BTreeMap<DocumentId, Document>,
    indexes: Vec<DocumentIndex>,
}

impl CollectionData {
    fn check_unique(&self, doc: &Document) -> Result<(), CollectionError> {
        for index in &self.indexes {
            if let Some(key) = index.conflict(doc) {
                return Err(CollectionError::UniqueViolation {
                    field: index.field().to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    fn index_document(&mut self, doc: &Document) {
        for index in self.indexes.iter_mut() {
            index.index_document(doc);
        }
    }

    fn unindex_document(&mut self, doc: &Document) {
        for index in self.indexes.iter_mut() {
            index.unindex_document(doc);
        }
    }

    /// Identifiers an index can narrow the scan to, in identifier order.
    fn candidates(&self, filters: &[Filter]) -> Option<BTreeSet<DocumentId>> {
        filters.iter().find_map(|filter| {
            let (field, values) = match filter {
                Filter::Eq { field, value } if !value.is_null() => {
                    (field, std::slice::from_ref(value))
                }
                Filter::In { field, values } if !values.iter().any(|v| v.is_null()) => {
                    (field, values.as_slice())
                }
                _ => return None,
            };

            if field == "_id" {
                return Some(
                    values
                        .iter()
                        .filter_map(DocumentId::from_value)
                        .filter(|id| self.documents.contains_key(id))
                        .collect(),
                );
            }

            self.indexes
                .iter()
                .find(|idx| idx.field() == field)
                .map(|idx| idx.find_in(values))
        })
    }

    fn matching<'a>(&'a self, filters: &'a [Filter]) -> Box<dyn Iterator<Item = &'a Document> + 'a> {
        match self.candidates(filters) {
            Some(ids) => Box::new(
                ids.into_iter()
                    .filter_map(move |id| self.documents.get(&id))
                    .filter(move |doc| filters.iter().all(|f| f.matches(doc))),
            ),
            None => Box::new(
                self.documents
                    .values()
                    .filter(move |doc| filters.iter().all(|f| f.matches(doc))),
            ),
        }
    }
}

/// A collection of documents.
pub struct Collection {
    name: String,
    data: RwLock<CollectionData>,
    schema: RwLock<Option<Schema>>,
    validate_on_write: bool,
}

impl Collection {
    /// Create a new collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(CollectionData {
                documents: BTreeMap::new(),
                indexes: Vec::new(),
            }),
            schema: RwLock::new(None),
            validate_on_write: true,
        }
    }

    /// Create a collection with schema validation.
    pub fn with_schema(name: impl Into<String>, schema: Schema) -> Self {
        let collection = Self::new(name);
        *collection.schema.write() = Some(schema);
        collection
    }

    /// Skip schema checks on writes.
    pub fn without_write_validation(mut self) -> Self {
        self.validate_on_write = false;
        self
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, doc: &Document) -> Result<(), CollectionError> {
        if !self.validate_on_write {
            return Ok(());
        }
        if let Some(ref schema) = *self.schema.read() {
            let result = schema.validate(doc);
            if !result.is_valid {
                return Err(CollectionError::ValidationFailed(result.errors));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document.
    pub fn insert(&self, doc: Document) -> Result<DocumentId, CollectionError> {
        self.validate(&doc)?;

        let id = doc.id.clone();
        let mut data = self.data.write();
        if data.documents.contains_key(&id) {
            return Err(CollectionError::DuplicateId(id));
        }
        data.check_unique(&doc)?;
        data.index_document(&doc);
        data.documents.insert(id.clone(), doc);

        Ok(id)
    }

    /// Get a document by ID.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.data.read().documents.get(id).cloned()
    }

    /// Replace a document.
    pub fn update(&self, id: &DocumentId, mut doc: Document) -> Result<(), CollectionError> {
        doc.id = id.clone();
        self.validate(&doc)?;

        let mut data = self.data.write();
        let old = data
            .documents
            .remove(id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;
        data.unindex_document(&old);

        if let Err(e) = data.check_unique(&doc) {
            data.index_document(&old);
            data.documents.insert(id.clone(), old);
            return Err(e);
        }

        data.index_document(&doc);
        data.documents.insert(id.clone(), doc);
        Ok(())
    }

    /// Apply update operators to one document atomically and return the
    /// updated document.
    pub fn update_one(&self, id: &DocumentId, ops: &[UpdateOp]) -> Result<Document, CollectionError> {
        let mut data = self.data.write();
        let old = data
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;

        let mut doc = old.clone();
        UpdateOp::apply_all(ops, &mut doc)?;
        self.validate(&doc)?;
        data.check_unique(&doc)?;

        data.unindex_document(&old);
        data.index_document(&doc);
        data.documents.insert(id.clone(), doc.clone());
        Ok(doc)
    }

    /// Apply update operators to every document matching the filters.
    /// Either every matching document is updated or none is.
    pub fn update_matching(
        &self,
        filters: &[Filter],
        ops: &[UpdateOp],
    ) -> Result<Vec<DocumentId>, CollectionError> {
        let mut data = self.data.write();

        let mut updated = Vec::new();
        for old in data.matching(filters) {
            let mut doc = old.clone();
            UpdateOp::apply_all(ops, &mut doc)?;
            self.validate(&doc)?;
            updated.push((old.clone(), doc));
        }

        for (old, _) in &updated {
            data.unindex_document(old);
        }
        for (_, doc) in &updated {
            if let Err(e) = data.check_unique(doc) {
                for (old, _) in &updated {
                    data.index_document(old);
                }
                return Err(e);
            }
        }

        let mut ids = Vec::with_capacity(updated.len());
        for (_, doc) in updated {
            data.index_document(&doc);
            ids.push(doc.id.clone());
            data.documents.insert(doc.id.clone(), doc);
        }
        Ok(ids)
    }

    /// Delete a document.
    pub fn delete(&self, id: &DocumentId) -> Result<Document, CollectionError> {
        let mut data = self.data.write();
        let doc = data
            .documents
            .remove(id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;
        data.unindex_document(&doc);
        Ok(doc)
    }

    /// Delete every document matching the filters.
    pub fn delete_matching(&self, filters: &[Filter]) -> Vec<Document> {
        let mut data = self.data.write();
        let ids: Vec<DocumentId> = data.matching(filters).map(|d| d.id.clone()).collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = data.documents.remove(&id) {
                data.unindex_document(&doc);
                removed.push(doc);
            }
        }
        removed
    }

    /// Check if a document exists.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.data.read().documents.contains_key(id)
    }

    /// Get the number of documents.
    pub fn count(&self) -> usize {
        self.data.read().documents.len()
    }

    /// Get all document IDs.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.data.read().documents.keys().cloned().collect()
    }

    /// Get all documents.
    pub fn all(&self) -> Vec<Document> {
        self.data.read().documents.values().cloned().collect()
    }

    /// Clear all documents.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.documents.clear();
        for index in data.indexes.iter_mut() {
            index.clear();
        }
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Find documents matching a query: filter, sort, skip, limit, project.
    pub fn find(&self, query: &Query) -> QueryResult {
        let start = std::time::Instant::now();
        let (mut matching, total_scanned) = {
            let data = self.data.read();
            let matching: Vec<Document> = data.matching(&query.filters).cloned().collect();
            (matching, data.documents.len())
        };

        sort_documents(&query.sort, &mut matching);

        let documents = matching
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|doc| match query.projection {
                Some(ref projection) => projection.apply(&doc),
                None => doc,
            })
            .collect();

        QueryResult {
            documents,
            total_scanned,
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Find one document matching a query.
    pub fn find_one(&self, query: &Query) -> Option<Document> {
        let mut query = query.clone();
        query.limit = Some(1);
        self.find(&query).documents.into_iter().next()
    }

    /// Count documents matching a query.
    pub fn count_matching(&self, query: &Query) -> usize {
        self.data.read().matching(&query.filters).count()
    }

    /// Run an aggregation pipeline over the collection in one pass.
    pub fn aggregate(&self, pipeline: &Pipeline) -> AggregateResult {
        let documents = {
            let data = self.data.read();
            match pipeline.leading_filters() {
                Some(filters) => data.matching(filters).cloned().collect(),
                None => data.documents.values().cloned().collect(),
            }
        };
        pipeline.run(documents)
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index on a field.
    pub fn create_index(&self, field: impl Into<String>, index_type: IndexType) -> Result<(), CollectionError> {
        let field = field.into();
        let mut data = self.data.write();
        let index = build_index(&data.documents, field.clone(), index_type)?;

        data.indexes.retain(|idx| idx.field() != field);
        data.indexes.push(index);
        Ok(())
    }

    /// Check that an index on `field` could be built over the stored documents.
    pub fn check_index(&self, field: &str, unique: bool) -> Result<(), CollectionError> {
        let index_type = if unique { IndexType::Unique } else { IndexType::Hash };
        build_index(&self.data.read().documents, field.to_string(), index_type).map(|_| ())
    }

    /// Create an index unless one of the same kind already exists.
    pub fn ensure_index(&self, field: &str, unique: bool) -> Result<(), CollectionError> {
        let index_type = if unique { IndexType::Unique } else { IndexType::Hash };
        let exists = self
            .data
            .read()
            .indexes
            .iter()
            .any(|idx| idx.field() == field && idx.index_type() == index_type);

        if exists {
            return Ok(());
        }
        self.create_index(field, index_type)
    }

    /// Drop an index.
    pub fn drop_index(&self, field: &str) {
        self.data.write().indexes.retain(|idx| idx.field() != field);
    }

    /// Get all index names.
    pub fn index_names(&self) -> Vec<String> {
        self.data
            .read()
            .indexes
            .iter()
            .map(|idx| idx.field().to_string())
            .collect()
    }

    pub fn index_type(&self, field: &str) -> Option<IndexType> {
        self.data
            .read()
            .indexes
            .iter()
            .find(|idx| idx.field() == field)
            .map(DocumentIndex::index_type)
    }

    // -------------------------------------------------------------------------
    // Schema Operations
    // -------------------------------------------------------------------------

    /// Get a copy of the collection schema.
    pub fn schema(&self) -> Option<Schema> {
        self.schema.read().clone()
    }

    /// Add a field descriptor to the schema. Returns false when the
    /// collection has no schema.
    pub fn extend_schema(&self, field: impl Into<String>, descriptor: FieldSchema) -> bool {
        match self.schema.write().as_mut() {
            Some(schema) => {
                schema.extend_field(field, descriptor);
                true
            }
            None => false,
        }
    }
}

fn build_index(
    documents: &BTreeMap<DocumentId, Document>,
    field: String,
    index_type: IndexType,
) -> Result<DocumentIndex, CollectionError> {
    let mut index = DocumentIndex::new(field.clone(), index_type);
    for doc in documents.values() {
        if let Some(key) = index.conflict(doc) {
            return Err(CollectionError::UniqueViolation {
                field,
                key: key.to_string(),
            });
        }
        index.index_document(doc);
    }
    Ok(index)
}

// =============================================================================
// Collection Error
// =============================================================================

/// Errors that can occur in collection operations.
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    #[error("Document with ID {0} already exists")]
    DuplicateId(DocumentId),

    #[error("Document with ID {0} not found")]
    NotFound(DocumentId),

    #[error("Validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    #[error("Duplicate key {key} for unique index on {field}")]
    UniqueViolation { field: String, key: String },

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl From<CollectionError> for AegisError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::DuplicateId(id) => AegisError::DuplicateId(id.0),
            CollectionError::NotFound(id) => AegisError::DocumentNotFound(id.0),
            CollectionError::ValidationFailed(errors) => AegisError::ValidationFailed(errors),
            CollectionError::UniqueViolation { .. } => AegisError::UniqueViolation(err.to_string()),
            CollectionError::InvalidUpdate(msg) => AegisError::InvalidOperation(msg),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
