//! Aegis Query Executor
//!
//! Recursive execution of a planned query graph: one store query for the
//! root, then one query per fetched row for each relationship below it.
//! The building blocks shared with the batched assembler live here too.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::graph::CollectionNode;
use aegis_common::{AegisError, Principal, Result};
use aegis_document::{Document, Query, Value};
use aegis_links::{Links, ResolveArgs};

// =============================================================================
// Shared Steps
// =============================================================================

/// Run a node's query against its collection, through the collection's
/// firewall.
pub(crate) fn find(links: &Links, collection: &str, mut query: Query, principal: &Principal) -> Result<Vec<Document>> {
    links.apply_firewall(collection, &mut query, principal)?;
    let docs = links.engine().find(collection, &query)?.documents;
    tracing::debug!("Fetched {} rows from '{}'", docs.len(), collection);
    Ok(docs)
}

/// Fetch the rows of the root node.
pub(crate) fn fetch_root(links: &Links, root: &CollectionNode, principal: &Principal) -> Result<Vec<Document>> {
    find(links, root.collection_name()?, root.node_query(), principal)
}

/// Call the resolver of `node` for one parent row. The resolver sees the
/// stored parent, not the projected row.
pub(crate) fn call_resolver(
    links: &Links,
    parent_collection: &str,
    node: &CollectionNode,
    row: &Document,
    principal: &Principal,
) -> Result<Value> {
    let linker = node.linker()?;
    let resolve = linker
        .resolver()
        .ok_or_else(|| AegisError::InvalidStrategy(format!("link '{}' has no resolver", linker.name())))?;

    let parent = links
        .engine()
        .get(parent_collection, &row.id)?
        .unwrap_or_else(|| row.clone());
    let args = ResolveArgs {
        query: node.node_query(),
        principal: principal.clone(),
    };
    Ok(linker.collapse(resolve(&parent, &args)?))
}

/// Remove the join-only storage fields of `node` from a row.
pub(crate) fn strip_join_fields(node: &CollectionNode, row: &mut Document) {
    for field in &node.plan.strip {
        row.unset_path(field);
    }
}

// =============================================================================
// Recursive Executor
// =============================================================================

/// Resolves a query graph one parent row at a time.
pub struct RecursiveExecutor<'a> {
    links: &'a Links,
    principal: &'a Principal,
}

impl<'a> RecursiveExecutor<'a> {
    pub fn new(links: &'a Links, principal: &'a Principal) -> Self {
        Self { links, principal }
    }

    /// Resolve the graph rooted at `root`.
    pub fn execute(&self, root: &CollectionNode) -> Result<Vec<Document>> {
        let mut rows = fetch_root(self.links, root, self.principal)?;
        for row in &mut rows {
            self.attach_children(root, row)?;
        }
        Ok(rows)
    }

    /// Resolve every child of `node` for `row`, then drop join-only fields.
    fn attach_children(&self, node: &CollectionNode, row: &mut Document) -> Result<()> {
        if node.children.is_empty() {
            return Ok(());
        }

        let collection = node.collection_name()?;
        let mut resolved = Vec::with_capacity(node.children.len());
        for child in &node.children {
            resolved.push((child.link_name(), self.resolve(collection, child, row)?));
        }
        for (name, value) in resolved {
            row.set(name, value);
        }

        strip_join_fields(node, row);
        Ok(())
    }

    /// Related results of `parent` for the relationship `node`.
    fn resolve(&self, parent_collection: &str, node: &CollectionNode, parent: &Document) -> Result<Value> {
        if node.is_resolver() {
            return call_resolver(self.links, parent_collection, node, parent, self.principal);
        }

        let linker = node.linker()?;
        let mut query = node.node_query();
        query.filters.insert(0, linker.search_filter(parent)?);

        let mut docs = find(self.links, node.collection_name()?, query, self.principal)?;
        for doc in &mut docs {
            self.attach_children(node, doc)?;
        }
        Ok(linker.collapse(docs.into_iter().map(Document::into_value).collect()))
    }
}

// =============================================================================
// Tests
// =============================================================================
