//! Aegis Document Engine
//!
//! Core engine that coordinates all document store operations and delivers
//! change events to subscribed listeners.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::aggregate::{AggregateResult, Pipeline};
use crate::collection::Collection;
use crate::events::{ChangeEvent, ChangeListener};
use crate::index::IndexType;
use crate::query::{Filter, Query, QueryResult};
use crate::types::{Document, DocumentId};
use crate::update::UpdateOp;
use crate::validation::Schema;
use aegis_common::{AegisError, Result, StoreConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Document Engine
// =============================================================================

/// The main document storage and query engine.
pub struct DocumentEngine {
    config: StoreConfig,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl DocumentEngine {
    /// Create a new document engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a new document engine with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Collection Management
    // -------------------------------------------------------------------------

    /// Create a new collection.
    pub fn create_collection(&self, name: impl Into<String>) -> Result<Arc<Collection>> {
        let name = name.into();
        self.register(Collection::new(name))
    }

    /// Create a collection with a schema.
    pub fn create_collection_with_schema(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<Collection>> {
        self.register(Collection::with_schema(name, schema))
    }

    /// Get a collection, creating it when missing.
    pub fn ensure_collection(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(coll) = self.collections.read().get(name) {
            return Ok(Arc::clone(coll));
        }
        match self.create_collection(name) {
            Err(AegisError::CollectionExists(_)) => self.collection(name),
            other => other,
        }
    }

    fn register(&self, collection: Collection) -> Result<Arc<Collection>> {
        let collection = if self.config.validate_on_write {
            collection
        } else {
            collection.without_write_validation()
        };

        let mut collections = self.collections.write();
        if collections.len() >= self.config.max_collections {
            return Err(AegisError::ResourceExhausted(format!(
                "maximum number of collections ({}) reached",
                self.config.max_collections
            )));
        }
        if collections.contains_key(collection.name()) {
            return Err(AegisError::CollectionExists(collection.name().to_string()));
        }

        let collection = Arc::new(collection);
        collections.insert(collection.name().to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Check that the missing collections among `names` fit under the collection limit.
    pub fn check_capacity<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let collections = self.collections.read();
        let mut missing: Vec<&str> = names.into_iter().filter(|n| !collections.contains_key(*n)).collect();
        missing.sort_unstable();
        missing.dedup();

        if collections.len() + missing.len() > self.config.max_collections {
            return Err(AegisError::ResourceExhausted(format!(
                "maximum number of collections ({}) reached",
                self.config.max_collections
            )));
        }
        Ok(())
    }

    /// Drop a collection.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AegisError::CollectionNotFound(name.to_string()))
    }

    /// Look up a collection.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AegisError::CollectionNotFound(name.to_string()))
    }

    /// List all collection names, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a collection exists.
    pub fn collection_exists(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    // -------------------------------------------------------------------------
    // Change Notification
    // -------------------------------------------------------------------------

    /// Subscribe a listener to every change applied through this engine.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    fn emit(&self, event: ChangeEvent) -> Result<()> {
        let listeners: Vec<Arc<dyn ChangeListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_change(self, &event)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document into a collection.
    pub fn insert(&self, collection: &str, doc: Document) -> Result<DocumentId> {
        let coll = self.collection(collection)?;
        let id = coll.insert(doc.clone())?;

        self.emit(ChangeEvent::Inserted {
            collection: collection.to_string(),
            document: doc,
        })?;
        Ok(id)
    }

    /// Get a document by ID.
    pub fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.collection(collection)?.get(id))
    }

    /// Replace a document.
    pub fn update(&self, collection: &str, id: &DocumentId, doc: Document) -> Result<()> {
        let coll = self.collection(collection)?;
        let before = coll
            .get(id)
            .ok_or_else(|| AegisError::DocumentNotFound(id.to_string()))?;
        coll.update(id, doc)?;

        let after = coll
            .get(id)
            .ok_or_else(|| AegisError::DocumentNotFound(id.to_string()))?;
        self.emit(ChangeEvent::Updated {
            collection: collection.to_string(),
            before,
            after,
        })
    }

    /// Apply update operators to one document atomically.
    pub fn update_one(&self, collection: &str, id: &DocumentId, ops: &[UpdateOp]) -> Result<Document> {
        let coll = self.collection(collection)?;
        let before = coll
            .get(id)
            .ok_or_else(|| AegisError::DocumentNotFound(id.to_string()))?;
        let after = coll.update_one(id, ops)?;

        self.emit(ChangeEvent::Updated {
            collection: collection.to_string(),
            before,
            after: after.clone(),
        })?;
        Ok(after)
    }

    /// Apply update operators to every matching document.
    pub fn update_matching(
        &self,
        collection: &str,
        filters: &[Filter],
        ops: &[UpdateOp],
    ) -> Result<Vec<DocumentId>> {
        let ids = self.collection(collection)?.update_matching(filters, ops)?;
        Ok(ids)
    }

    /// Delete a document, then notify listeners.
    pub fn delete(&self, collection: &str, id: &DocumentId) -> Result<Document> {
        let doc = self.collection(collection)?.delete(id)?;

        self.emit(ChangeEvent::Deleted {
            collection: collection.to_string(),
            document: doc.clone(),
        })?;
        Ok(doc)
    }

    /// Delete every matching document, notifying listeners once per document.
    pub fn delete_matching(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>> {
        let removed = self.collection(collection)?.delete_matching(filters);

        for doc in &removed {
            self.emit(ChangeEvent::Deleted {
                collection: collection.to_string(),
                document: doc.clone(),
            })?;
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Find documents matching a query.
    pub fn find(&self, collection: &str, query: &Query) -> Result<QueryResult> {
        let result = self.collection(collection)?.find(query);
        Ok(result)
    }

    /// Find one document matching a query.
    pub fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        Ok(self.collection(collection)?.find_one(query))
    }

    /// Count documents matching a query.
    pub fn count(&self, collection: &str, query: &Query) -> Result<usize> {
        Ok(self.collection(collection)?.count_matching(query))
    }

    /// Run an aggregation pipeline.
    pub fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<AggregateResult> {
        let result = self.collection(collection)?.aggregate(pipeline);
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index on a collection field.
    pub fn create_index(
        &self,
        collection: &str,
        field: impl Into<String>,
        index_type: IndexType,
    ) -> Result<()> {
        Ok(self.collection(collection)?.create_index(field, index_type)?)
    }

    /// Create an index unless an identical one exists.
    pub fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        Ok(self.collection(collection)?.ensure_index(field, unique)?)
    }

    /// Drop an index.
    pub fn drop_index(&self, collection: &str, field: &str) -> Result<()> {
        self.collection(collection)?.drop_index(field);
        Ok(())
    }

    /// List indexes on a collection.
    pub fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.collection(collection)?.index_names())
    }
}

impl Default for DocumentEngine {
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
    use crate::events::ChangeType;
    use crate::query::QueryBuilder;
    use parking_lot::Mutex;

    #[test]
    fn test_engine_creation() {
        let engine = DocumentEngine::new();
        assert!(engine.list_collections().is_empty());
    }

    #[test]
    fn test_collection_management() {
        let engine = DocumentEngine::new();

        engine.create_collection("users").unwrap();
        assert!(engine.collection_exists("users"));
        assert!(matches!(
            engine.create_collection("users"),
            Err(AegisError::CollectionExists(_))
        ));

        let again = engine.ensure_collection("users").unwrap();
        assert_eq!(again.name(), "users");
        assert_eq!(engine.list_collections(), vec!["users".to_string()]);

        engine.drop_collection("users").unwrap();
        assert!(!engine.collection_exists("users"));
        assert!(matches!(
            engine.collection("users"),
            Err(AegisError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_collection_limit() {
        let engine = DocumentEngine::with_config(StoreConfig {
            max_collections: 1,
            ..Default::default()
        });
        engine.create_collection("a").unwrap();
        assert!(matches!(
            engine.create_collection("b"),
            Err(AegisError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_document_crud() {
        let engine = DocumentEngine::new();
        engine.create_collection("test").unwrap();

        let mut doc = Document::with_id("doc1");
        doc.set("name", "Alice");
        doc.set("age", 30i64);

        let id = engine.insert("test", doc).unwrap();
        assert_eq!(id.as_str(), "doc1");

        let retrieved = engine.get("test", &id).unwrap().unwrap();
        assert_eq!(retrieved.get("name").and_then(|v| v.as_str()), Some("Alice"));

        let updated = engine
            .update_one("test", &id, &[UpdateOp::Set { path: "name".into(), value: "Alice Smith".into() }])
            .unwrap();
        assert_eq!(updated.get("name").and_then(|v| v.as_str()), Some("Alice Smith"));

        engine.delete("test", &id).unwrap();
        assert!(engine.get("test", &id).unwrap().is_none());
        assert!(matches!(
            engine.delete("test", &id),
            Err(AegisError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_query() {
        let engine = DocumentEngine::new();
        engine.create_collection("products").unwrap();

        for i in 0..10i64 {
            let mut doc = Document::new();
            doc.set("name", format!("Product {}", i));
            doc.set("price", i * 10);
            doc.set("in_stock", i % 2 == 0);
            engine.insert("products", doc).unwrap();
        }

        let query = QueryBuilder::new().eq("in_stock", true).build();
        assert_eq!(engine.find("products", &query).unwrap().count(), 5);

        let query = QueryBuilder::new().gt("price", 50i64).build();
        assert_eq!(engine.find("products", &query).unwrap().count(), 4);
    }

    struct Recorder(Mutex<Vec<(ChangeType, String)>>);

    impl ChangeListener for Recorder {
        fn on_change(&self, _engine: &DocumentEngine, event: &ChangeEvent) -> Result<()> {
            self.0
                .lock()
                .push((event.change_type(), event.document_id().to_string()));
            Ok(())
        }
    }

    struct Failing;

    impl ChangeListener for Failing {
        fn on_change(&self, _engine: &DocumentEngine, event: &ChangeEvent) -> Result<()> {
            match event {
                ChangeEvent::Deleted { .. } => Err(AegisError::Internal("cascade failed".into())),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_change_events() {
        let engine = DocumentEngine::new();
        engine.create_collection("test").unwrap();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        engine.subscribe(recorder.clone());

        engine.insert("test", Document::with_id("a")).unwrap();
        engine.insert("test", Document::with_id("b")).unwrap();
        engine.delete_matching("test", &[]).unwrap();

        let events = recorder.0.lock().clone();
        assert_eq!(
            events,
            vec![
                (ChangeType::Inserted, "a".to_string()),
                (ChangeType::Inserted, "b".to_string()),
                (ChangeType::Deleted, "a".to_string()),
                (ChangeType::Deleted, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_listener_errors_propagate() {
        let engine = DocumentEngine::new();
        engine.create_collection("test").unwrap();
        engine.subscribe(Arc::new(Failing));

        engine.insert("test", Document::with_id("a")).unwrap();
        let err = engine.delete("test", &DocumentId::new("a")).unwrap_err();
        assert!(matches!(err, AegisError::Internal(_)));
        assert!(engine.get("test", &DocumentId::new("a")).unwrap().is_none());
    }

    #[test]
    fn test_index() {
        let engine = DocumentEngine::new();
        engine.create_collection("items").unwrap();

        engine.create_index("items", "category", IndexType::Hash).unwrap();
        assert!(engine.list_indexes("items").unwrap().contains(&"category".to_string()));

        engine.drop_index("items", "category").unwrap();
        assert!(!engine.list_indexes("items").unwrap().contains(&"category".to_string()));
    }

    #[test]
    fn test_check_capacity() {
        let engine = DocumentEngine::with_config(StoreConfig {
            max_collections: 2,
            ..StoreConfig::default()
        });
        engine.create_collection("posts").unwrap();

        engine.check_capacity(["posts", "users", "users"]).unwrap();
        let err = engine.check_capacity(["users", "tags"]).unwrap_err();
        assert!(matches!(err, AegisError::ResourceExhausted(_)));
        assert_eq!(engine.list_collections(), vec!["posts".to_string()]);
    }
}
