//! Aegis Query Graph
//!
//! The parsed form of a nested query specification. A [`CollectionNode`]
//! stands for one traversed collection (the root, or a relationship of its
//! parent node); [`FieldNode`]s are the field paths requested on it.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use aegis_common::{AegisError, Result};
use aegis_document::{Filter, Projection, Query, Sort};
use aegis_links::Linker;
use std::sync::Arc;

// =============================================================================
// Field Node
// =============================================================================

/// A requested field, as a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub path: String,
}

impl FieldNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_id(&self) -> bool {
        self.path == "_id"
    }
}

// =============================================================================
// Node Options
// =============================================================================

/// `$options` of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Extra field paths, merged with the node's field nodes.
    pub fields: Vec<String>,
}

impl NodeOptions {
    pub fn is_sliced(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }
}

// =============================================================================
// Node Plan
// =============================================================================

/// Projection decided for a node before anything is fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePlan {
    /// `None` fetches every field.
    pub projection: Option<Projection>,
    /// Storage fields fetched only to join children; removed from output.
    pub strip: Vec<String>,
}

// =============================================================================
// Collection Node
// =============================================================================

/// One collection visited by a query.
#[derive(Debug, Clone)]
pub struct CollectionNode {
    /// `None` for resolver nodes.
    pub collection: Option<String>,
    /// Relationship this node was reached through; `None` at the root.
    pub link_name: Option<String>,
    pub linker: Option<Arc<Linker>>,
    pub fields: Vec<FieldNode>,
    pub children: Vec<CollectionNode>,
    pub filters: Vec<Filter>,
    pub options: NodeOptions,
    /// `$all`: fetch every field.
    pub all_fields: bool,
    pub plan: NodePlan,
}

impl CollectionNode {
    pub fn root(collection: impl Into<String>) -> Self {
        Self::new(Some(collection.into()), None, None)
    }

    pub fn child(link_name: impl Into<String>, linker: Arc<Linker>) -> Self {
        let collection = linker.related_collection().map(str::to_string);
        Self::new(collection, Some(link_name.into()), Some(linker))
    }

    fn new(collection: Option<String>, link_name: Option<String>, linker: Option<Arc<Linker>>) -> Self {
        Self {
            collection,
            link_name,
            linker,
            fields: Vec::new(),
            children: Vec::new(),
            filters: Vec::new(),
            options: NodeOptions::default(),
            all_fields: false,
            plan: NodePlan::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.linker.is_none()
    }

    pub fn is_resolver(&self) -> bool {
        self.linker.as_ref().map(|l| l.is_resolver()).unwrap_or(false)
    }

    /// Add a field path unless it is already requested.
    pub fn add_field(&mut self, path: impl Into<String>) {
        let field = FieldNode::new(path);
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    pub fn add_child(&mut self, child: CollectionNode) {
        self.children.push(child);
    }

    pub fn child_named(&self, link_name: &str) -> Option<&CollectionNode> {
        self.children
            .iter()
            .find(|c| c.link_name.as_deref() == Some(link_name))
    }

    pub fn collection_name(&self) -> Result<&str> {
        self.collection.as_deref().ok_or_else(|| {
            AegisError::Internal(format!(
                "resolver node '{}' has no collection",
                self.link_name.as_deref().unwrap_or_default()
            ))
        })
    }

    pub fn linker(&self) -> Result<&Arc<Linker>> {
        self.linker
            .as_ref()
            .ok_or_else(|| AegisError::Internal("the root node has no linker".into()))
    }

    pub fn link_name(&self) -> &str {
        self.link_name.as_deref().unwrap_or_default()
    }

    /// Requested paths: field nodes, then `$options.fields`.
    pub fn requested_paths(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|f| f.path.as_str())
            .chain(self.options.fields.iter().map(String::as_str))
    }

    /// Deepest relationship nesting below this node.
    pub fn depth(&self) -> usize {
        self.children.iter().map(|c| c.depth() + 1).max().unwrap_or(0)
    }

    /// Store query of this node, without any relationship filter.
    pub fn node_query(&self) -> Query {
        Query {
            filters: self.filters.clone(),
            sort: self.options.sort.clone(),
            skip: self.options.skip,
            limit: self.options.limit,
            projection: self.plan.projection.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
