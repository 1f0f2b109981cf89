//! Aegis Link Accessors
//!
//! Per-document handles on one relationship. Each strategy has its own
//! accessor type; all of them read through a [`Cursor`] over the related
//! collection and write through to the local document with one atomic
//! single-document update, mirroring the change onto the bound copy.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::config::ResolveArgs;
use crate::linker::Linker;
use crate::registry::{run_firewall, Firewall};
use aegis_common::{AegisError, Principal, Result};
use aegis_document::{Document, DocumentEngine, DocumentId, Query, UpdateOp, Value};
use std::collections::HashMap;
use std::sync::Arc;

const OWNING_SIDE: &str = "operations must be performed from the owning side of the relationship";

// =============================================================================
// Targets
// =============================================================================

/// Identifiers an accessor operation applies to. Built from raw
/// identifiers, documents, or lists of either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets(Vec<DocumentId>);

impl Targets {
    pub fn ids(&self) -> &[DocumentId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalize a value: a string identifier, an object carrying `_id`,
    /// or an array of those.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut ids = Vec::new();
        collect_targets(value, &mut ids)?;
        Ok(Self(ids))
    }

    fn values(&self) -> Vec<Value> {
        self.0.iter().map(DocumentId::to_value).collect()
    }

    fn single(&self, op: &str) -> Result<&DocumentId> {
        match self.0.as_slice() {
            [id] => Ok(id),
            _ => Err(AegisError::invalid_operation(format!(
                "{} takes exactly one identifier, got {}",
                op,
                self.0.len()
            ))),
        }
    }
}

fn collect_targets(value: &Value, ids: &mut Vec<DocumentId>) -> Result<()> {
    match value {
        Value::Array(items) => items.iter().try_for_each(|item| collect_targets(item, ids)),
        Value::Object(obj) => {
            let id = obj
                .get("_id")
                .and_then(DocumentId::from_value)
                .ok_or_else(|| AegisError::invalid_operation("document target has no _id"))?;
            push_unique(ids, id);
            Ok(())
        }
        other => {
            let id = DocumentId::from_value(other).ok_or_else(|| {
                AegisError::invalid_operation(format!("{:?} is not a document identifier", other))
            })?;
            push_unique(ids, id);
            Ok(())
        }
    }
}

fn push_unique(ids: &mut Vec<DocumentId>, id: DocumentId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

impl From<DocumentId> for Targets {
    fn from(id: DocumentId) -> Self {
        Self(vec![id])
    }
}

impl From<&DocumentId> for Targets {
    fn from(id: &DocumentId) -> Self {
        Self(vec![id.clone()])
    }
}

impl From<&str> for Targets {
    fn from(id: &str) -> Self {
        Self(vec![DocumentId::new(id)])
    }
}

impl From<String> for Targets {
    fn from(id: String) -> Self {
        Self(vec![DocumentId::new(id)])
    }
}

impl From<&Document> for Targets {
    fn from(doc: &Document) -> Self {
        Self(vec![doc.id.clone()])
    }
}

impl<T: Into<Targets>> From<Vec<T>> for Targets {
    fn from(items: Vec<T>) -> Self {
        let mut ids = Vec::new();
        for item in items {
            for id in item.into().0 {
                push_unique(&mut ids, id);
            }
        }
        Self(ids)
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A lazy query over the related collection.
#[derive(Clone)]
pub struct Cursor {
    engine: Arc<DocumentEngine>,
    collection: String,
    query: Query,
}

impl Cursor {
    pub fn new(engine: Arc<DocumentEngine>, collection: impl Into<String>, query: Query) -> Self {
        Self {
            engine,
            collection: collection.into(),
            query,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn fetch(&self) -> Result<Vec<Document>> {
        Ok(self.engine.find(&self.collection, &self.query)?.documents)
    }

    pub fn count(&self) -> Result<usize> {
        self.engine.count(&self.collection, &self.query)
    }
}

// =============================================================================
// Link Accessor
// =============================================================================

/// Reads and mutates one relationship of one document.
///
/// Operations a strategy does not support fail with
/// [`AegisError::InvalidOperation`]. Every mutation and metadata operation
/// on a virtual link fails the same way.
pub trait LinkAccessor: Send + Sync {
    fn linker(&self) -> &Arc<Linker>;

    fn engine(&self) -> &Arc<DocumentEngine>;

    /// The bound copy of the local document.
    fn document(&self) -> &Document;

    /// Firewall of the related collection, applied by
    /// [`LinkAccessor::fetch_as`].
    fn firewall(&self) -> Option<&Arc<dyn Firewall>>;

    /// Cursor over the related documents, narrowed by `query`.
    fn find(&self, query: Query) -> Result<Cursor> {
        let linker = self.linker();
        let related = linker.related_collection().ok_or_else(|| {
            AegisError::InvalidStrategy(format!("link '{}' has no related collection", linker.name()))
        })?;

        let mut query = query;
        query.filters.insert(0, linker.search_filter(self.document())?);
        Ok(Cursor::new(Arc::clone(self.engine()), related, query))
    }

    /// Materialize [`LinkAccessor::find`], collapsed to one object for
    /// one-result links.
    fn fetch(&self, query: Query) -> Result<Value> {
        let docs = self.find(query)?.fetch()?;
        Ok(self.linker().collapse(docs.into_iter().map(Document::into_value).collect()))
    }

    /// Like [`LinkAccessor::fetch`], on behalf of `principal`. The related
    /// collection's firewall narrows or rejects the query first.
    fn fetch_as(&self, query: Query, principal: &Principal) -> Result<Value> {
        let mut query = query;
        if let Some(firewall) = self.firewall() {
            run_firewall(firewall.as_ref(), &mut query, principal)?;
        }
        self.fetch(query)
    }

    fn set(&mut self, _target: Targets, _metadata: Option<Value>) -> Result<()> {
        Err(unsupported(self.linker(), "set"))
    }

    fn unset(&mut self) -> Result<()> {
        Err(unsupported(self.linker(), "unset"))
    }

    fn add(&mut self, _targets: Targets, _metadata: Option<Value>) -> Result<()> {
        Err(unsupported(self.linker(), "add"))
    }

    fn remove(&mut self, _targets: Targets) -> Result<()> {
        Err(unsupported(self.linker(), "remove"))
    }

    /// Stored metadata. Many-meta links take an identifier to read one
    /// entry, or none to read them all.
    fn metadata(&self, _target: Option<Targets>) -> Result<Value> {
        Err(unsupported(self.linker(), "metadata"))
    }

    /// Merge `patch` into stored metadata and persist it.
    fn extend_metadata(&mut self, _target: Option<Targets>, _patch: Value) -> Result<()> {
        Err(unsupported(self.linker(), "extend_metadata"))
    }
}

fn unsupported(linker: &Linker, op: &str) -> AegisError {
    if linker.is_virtual() {
        return AegisError::invalid_operation(OWNING_SIDE);
    }
    AegisError::invalid_operation(format!(
        "{} is not supported on {} link '{}'",
        op,
        linker.strategy(),
        linker.name()
    ))
}

// =============================================================================
// Binding
// =============================================================================

/// State shared by every accessor.
pub(crate) struct Binding {
    linker: Arc<Linker>,
    engine: Arc<DocumentEngine>,
    doc: Document,
    firewall: Option<Arc<dyn Firewall>>,
}

impl Binding {
    pub(crate) fn new(
        linker: Arc<Linker>,
        engine: Arc<DocumentEngine>,
        doc: Document,
        firewall: Option<Arc<dyn Firewall>>,
    ) -> Self {
        Self {
            linker,
            engine,
            doc,
            firewall,
        }
    }

    fn owner(&self) -> Result<()> {
        if self.linker.is_virtual() {
            return Err(AegisError::invalid_operation(OWNING_SIDE));
        }
        Ok(())
    }

    fn field(&self) -> Result<String> {
        self.owner()?;
        self.linker
            .link_storage_field()
            .map(str::to_string)
            .ok_or_else(|| AegisError::InvalidStrategy(format!("link '{}' has no storage", self.linker.name())))
    }

    fn stored(&self, field: &str) -> Option<&Value> {
        self.doc.get(field).filter(|v| !v.is_null())
    }

    /// Persist `ops` on the local document, then mirror them onto the copy.
    fn write(&mut self, ops: Vec<UpdateOp>) -> Result<()> {
        self.engine
            .update_one(self.linker.collection(), &self.doc.id, &ops)?;
        UpdateOp::apply_all(&ops, &mut self.doc)?;
        Ok(())
    }
}

/// `{_id, ...metadata}`.
fn meta_entry(id: &DocumentId, metadata: Option<Value>) -> Result<Value> {
    let mut entry = match metadata {
        None | Some(Value::Null) => HashMap::new(),
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            return Err(AegisError::invalid_operation(format!(
                "metadata must be an object, got {:?}",
                other
            )))
        }
    };
    entry.insert("_id".to_string(), id.to_value());
    Ok(Value::Object(entry))
}

/// Shallow-merge `patch` into a stored entry, keeping its `_id`.
fn merge_entry(stored: &Value, patch: Value) -> Result<Value> {
    let Value::Object(patch) = patch else {
        return Err(AegisError::invalid_operation("metadata patch must be an object"));
    };
    let mut merged = stored.as_object().cloned().unwrap_or_default();
    for (key, value) in patch {
        if key != "_id" {
            merged.insert(key, value);
        }
    }
    Ok(Value::Object(merged))
}

fn no_metadata(metadata: &Option<Value>, linker: &Linker) -> Result<()> {
    match metadata {
        None | Some(Value::Null) => Ok(()),
        Some(_) => Err(AegisError::invalid_operation(format!(
            "link '{}' does not store metadata",
            linker.name()
        ))),
    }
}

macro_rules! bound_accessor {
    ($name:ident) => {
        impl $name {
            pub(crate) fn from_binding(binding: Binding) -> Self {
                Self { binding }
            }
        }
    };
}

macro_rules! binding_getters {
    () => {
        fn linker(&self) -> &Arc<Linker> {
            &self.binding.linker
        }

        fn engine(&self) -> &Arc<DocumentEngine> {
            &self.binding.engine
        }

        fn document(&self) -> &Document {
            &self.binding.doc
        }

        fn firewall(&self) -> Option<&Arc<dyn Firewall>> {
            self.binding.firewall.as_ref()
        }
    };
}

// =============================================================================
// Single
// =============================================================================

/// One stored identifier.
pub struct LinkOne {
    binding: Binding,
}

bound_accessor!(LinkOne);

impl LinkAccessor for LinkOne {
    binding_getters!();

    fn set(&mut self, target: Targets, metadata: Option<Value>) -> Result<()> {
        let field = self.binding.field()?;
        no_metadata(&metadata, &self.binding.linker)?;
        let id = target.single("set")?;
        self.binding.write(vec![UpdateOp::Set {
            path: field,
            value: id.to_value(),
        }])
    }

    fn unset(&mut self) -> Result<()> {
        let field = self.binding.field()?;
        self.binding.write(vec![UpdateOp::Unset { path: field }])
    }
}

// =============================================================================
// Single With Metadata
// =============================================================================

/// One stored `{_id, ...metadata}` object.
pub struct LinkOneMeta {
    binding: Binding,
}

bound_accessor!(LinkOneMeta);

impl LinkAccessor for LinkOneMeta {
    binding_getters!();

    fn set(&mut self, target: Targets, metadata: Option<Value>) -> Result<()> {
        let field = self.binding.field()?;
        let entry = meta_entry(target.single("set")?, metadata)?;
        self.binding.write(vec![UpdateOp::Set { path: field, value: entry }])
    }

    fn unset(&mut self) -> Result<()> {
        let field = self.binding.field()?;
        self.binding.write(vec![UpdateOp::Unset { path: field }])
    }

    fn metadata(&self, target: Option<Targets>) -> Result<Value> {
        let field = self.binding.field()?;
        let stored = self.binding.stored(&field).cloned().unwrap_or(Value::Null);
        match target {
            None => Ok(stored),
            Some(target) => {
                let id = target.single("metadata")?;
                if stored.get_path("_id") == Some(&id.to_value()) {
                    Ok(stored)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    fn extend_metadata(&mut self, _target: Option<Targets>, patch: Value) -> Result<()> {
        let field = self.binding.field()?;
        let stored = self.binding.stored(&field).ok_or_else(|| {
            AegisError::invalid_operation(format!(
                "link '{}' is not set, there is no metadata to extend",
                self.binding.linker.name()
            ))
        })?;
        let merged = merge_entry(stored, patch)?;
        self.binding.write(vec![UpdateOp::Set { path: field, value: merged }])
    }
}

// =============================================================================
// Many
// =============================================================================

/// An array of stored identifiers, with set semantics.
pub struct LinkMany {
    binding: Binding,
}

bound_accessor!(LinkMany);

impl LinkAccessor for LinkMany {
    binding_getters!();

    fn add(&mut self, targets: Targets, metadata: Option<Value>) -> Result<()> {
        let field = self.binding.field()?;
        no_metadata(&metadata, &self.binding.linker)?;
        if targets.is_empty() {
            return Ok(());
        }
        self.binding.write(vec![UpdateOp::AddToSet {
            path: field,
            values: targets.values(),
        }])
    }

    fn remove(&mut self, targets: Targets) -> Result<()> {
        let field = self.binding.field()?;
        if targets.is_empty() {
            return Ok(());
        }
        self.binding.write(vec![UpdateOp::Pull {
            path: field,
            values: targets.values(),
        }])
    }
}

// =============================================================================
// Many With Metadata
// =============================================================================

/// An array of `{_id, ...metadata}` objects, unique by `_id`.
pub struct LinkManyMeta {
    binding: Binding,
}

bound_accessor!(LinkManyMeta);

impl LinkManyMeta {
    fn entry(&self, field: &str, id: &DocumentId) -> Option<&Value> {
        let id = id.to_value();
        self.binding
            .stored(field)
            .and_then(Value::as_array)
            .and_then(|entries| entries.iter().find(|e| e.get_path("_id") == Some(&id)))
    }
}

impl LinkAccessor for LinkManyMeta {
    binding_getters!();

    fn add(&mut self, targets: Targets, metadata: Option<Value>) -> Result<()> {
        let field = self.binding.field()?;
        if targets.is_empty() {
            return Ok(());
        }
        let entries = targets
            .ids()
            .iter()
            .map(|id| meta_entry(id, metadata.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.binding.write(vec![UpdateOp::PushUniqueBy {
            path: field,
            key: "_id".to_string(),
            values: entries,
        }])
    }

    fn remove(&mut self, targets: Targets) -> Result<()> {
        let field = self.binding.field()?;
        if targets.is_empty() {
            return Ok(());
        }
        self.binding.write(vec![UpdateOp::PullBy {
            path: field,
            key: "_id".to_string(),
            values: targets.values(),
        }])
    }

    fn metadata(&self, target: Option<Targets>) -> Result<Value> {
        let field = self.binding.field()?;
        match target {
            None => Ok(self
                .binding
                .stored(&field)
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()))),
            Some(target) => {
                let id = target.single("metadata")?;
                Ok(self.entry(&field, id).cloned().unwrap_or(Value::Null))
            }
        }
    }

    fn extend_metadata(&mut self, target: Option<Targets>, patch: Value) -> Result<()> {
        let field = self.binding.field()?;
        let target = target.ok_or_else(|| {
            AegisError::invalid_operation("metadata of a many link is extended one entry at a time")
        })?;
        let id = target.single("extend_metadata")?.clone();
        let stored = self.entry(&field, &id).ok_or_else(|| {
            AegisError::invalid_operation(format!(
                "'{}' is not linked through '{}'",
                id,
                self.binding.linker.name()
            ))
        })?;
        let merged = merge_entry(stored, patch)?;
        self.binding.write(vec![UpdateOp::SetElementBy {
            path: field,
            key: "_id".to_string(),
            key_value: id.to_value(),
            value: merged,
        }])
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Results computed by the link's resolver function.
pub struct LinkResolve {
    binding: Binding,
}

bound_accessor!(LinkResolve);

impl LinkAccessor for LinkResolve {
    binding_getters!();

    fn find(&self, _query: Query) -> Result<Cursor> {
        Err(AegisError::invalid_operation(format!(
            "resolver link '{}' has no related collection to search, use fetch",
            self.binding.linker.name()
        )))
    }

    fn fetch(&self, query: Query) -> Result<Value> {
        self.fetch_as(query, &Principal::anonymous())
    }

    fn fetch_as(&self, query: Query, principal: &Principal) -> Result<Value> {
        let linker = &self.binding.linker;
        let resolve = linker.resolver().ok_or_else(|| {
            AegisError::InvalidStrategy(format!("link '{}' has no resolver", linker.name()))
        })?;
        let args = ResolveArgs {
            query,
            principal: principal.clone(),
        };
        let results = resolve(&self.binding.doc, &args)?;
        Ok(linker.collapse(results))
    }
}

// =============================================================================
// Tests
// =============================================================================
