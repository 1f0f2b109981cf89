//! Aegis Batched Assembler
//!
//! Resolves a query graph with one store round trip per relationship node
//! instead of one per parent row. Candidates for all parents are fetched
//! together, their own children are assembled once on the deduplicated
//! candidate set, and each parent then receives its subset.
//!
//! - Owning links: one query with `_id IN` the union of stored ids. A
//!   parent's subset is selected with the link's own search filter,
//!   evaluated in memory, then sliced by the node's skip/limit.
//! - Virtual links: one aggregation pipeline grouping candidates by the
//!   owning side's storage field, sliced per group in the store or on the
//!   client depending on configuration.
//! - Resolver links: the resolver is called once per parent row.
//!
//! Results are identical to the recursive executor's.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::executor::{call_resolver, fetch_root, strip_join_fields};
use crate::graph::CollectionNode;
use crate::pipeline::group_pipeline;
use aegis_common::{AegisError, Principal, Result};
use aegis_document::{Document, DocumentId, Filter, IndexKey, Query, Slice, Value};
use aegis_links::Links;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Candidates
// =============================================================================

/// Related documents fetched for a whole parent batch, with the positions
/// each parent receives.
struct Candidates {
    documents: Vec<Document>,
    per_parent: Vec<Vec<usize>>,
}

impl Candidates {
    fn empty(parents: usize) -> Self {
        Self {
            documents: Vec::new(),
            per_parent: vec![Vec::new(); parents],
        }
    }
}

// =============================================================================
// Batched Assembler
// =============================================================================

/// Resolves a query graph one relationship node at a time.
pub struct BatchedAssembler<'a> {
    links: &'a Links,
    principal: &'a Principal,
    group_slicing: bool,
}

impl<'a> BatchedAssembler<'a> {
    pub fn new(links: &'a Links, principal: &'a Principal) -> Self {
        Self {
            links,
            principal,
            group_slicing: true,
        }
    }

    /// Slice virtual results per group inside the store pipeline rather
    /// than on the client.
    pub fn with_group_slicing(mut self, enabled: bool) -> Self {
        self.group_slicing = enabled;
        self
    }

    /// Resolve the graph rooted at `root`.
    pub fn execute(&self, root: &CollectionNode) -> Result<Vec<Document>> {
        let mut rows = fetch_root(self.links, root, self.principal)?;
        self.assemble(root, &mut rows)?;
        for row in &mut rows {
            strip_join_fields(root, row);
        }
        Ok(rows)
    }

    /// Attach every child of `node` to `rows`. Join fields stay on the rows.
    fn assemble(&self, node: &CollectionNode, rows: &mut [Document]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let collection = node.collection_name()?;
        for child in &node.children {
            if child.is_resolver() {
                for row in rows.iter_mut() {
                    let value = call_resolver(self.links, collection, child, row, self.principal)?;
                    row.set(child.link_name(), value);
                }
                continue;
            }

            let Candidates {
                mut documents,
                per_parent,
            } = if child.linker()?.is_virtual() {
                self.fetch_grouped(child, rows)?
            } else {
                self.fetch_owned(child, rows)?
            };

            self.assemble(child, &mut documents)?;
            let values: Vec<Value> = documents
                .into_iter()
                .map(|mut doc| {
                    strip_join_fields(child, &mut doc);
                    doc.into_value()
                })
                .collect();

            let linker = child.linker()?;
            for (row, positions) in rows.iter_mut().zip(per_parent) {
                let related = positions.into_iter().map(|i| values[i].clone()).collect();
                row.set(child.link_name(), linker.collapse(related));
            }
        }
        Ok(())
    }

    /// Candidates of an owning link: one `_id IN` query over every stored
    /// identifier of the batch.
    fn fetch_owned(&self, node: &CollectionNode, rows: &[Document]) -> Result<Candidates> {
        let linker = node.linker()?;

        let mut seen: HashSet<IndexKey> = HashSet::new();
        let mut ids: Vec<Value> = Vec::new();
        for row in rows {
            for id in linker.linked_ids(row) {
                if seen.insert(IndexKey::from_value(&id)) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(Candidates::empty(rows.len()));
        }

        let mut query = Query {
            skip: None,
            limit: None,
            ..node.node_query()
        };
        query.filters.insert(0, Filter::in_values("_id", ids));
        let documents = self.find(node, query)?;

        let slice = Slice::new(node.options.skip, node.options.limit);
        let mut per_parent = Vec::with_capacity(rows.len());
        for row in rows {
            let filter = linker.search_filter(row)?;
            let positions: Vec<usize> = documents
                .iter()
                .enumerate()
                .filter(|(_, doc)| filter.matches(doc))
                .map(|(i, _)| i)
                .collect();
            per_parent.push(slice.apply(positions));
        }

        Ok(Candidates {
            documents,
            per_parent,
        })
    }

    /// Candidates of a virtual link: one pipeline grouping the related
    /// documents by the owning side's join key.
    fn fetch_grouped(&self, node: &CollectionNode, rows: &[Document]) -> Result<Candidates> {
        let linker = node.linker()?;
        let key = linker
            .join_key_path()
            .ok_or_else(|| AegisError::InvalidStrategy(format!("link '{}' has no join key", linker.name())))?;
        let parent_ids: Vec<Value> = rows.iter().map(|r| r.id.to_value()).collect();

        let mut query = Query {
            skip: None,
            limit: None,
            ..node.node_query()
        };
        query.filters.insert(0, Filter::in_values(key.clone(), parent_ids));
        let narrow = query.projection.clone().filter(|p| !p.covers(&key));
        if let Some(projection) = query.projection.as_mut() {
            projection.include(key.clone());
        }

        let collection = node.collection_name()?;
        self.links.apply_firewall(collection, &mut query, self.principal)?;

        let slice = Slice::new(node.options.skip, node.options.limit);
        let pushdown = self.group_slicing.then_some(slice);
        let pipeline = group_pipeline(&query, &key, pushdown);
        let groups = self.links.engine().aggregate(collection, &pipeline)?.groups;
        tracing::debug!(
            "Grouped {} parents of '{}' from '{}' in one pipeline",
            groups.len(),
            node.link_name(),
            collection
        );

        // Array storage fields fan out to keys that are not parents of this batch.
        let parents: HashSet<&DocumentId> = rows.iter().map(|r| &r.id).collect();
        let mut documents: Vec<Document> = Vec::new();
        let mut positions: HashMap<DocumentId, usize> = HashMap::new();
        let mut by_parent: HashMap<DocumentId, Vec<usize>> = HashMap::new();
        for group in groups {
            let Some(parent) = DocumentId::from_value(&group.key).filter(|id| parents.contains(id)) else {
                continue;
            };
            let members = group
                .documents
                .into_iter()
                .map(|doc| {
                    *positions.entry(doc.id.clone()).or_insert_with(|| {
                        documents.push(doc);
                        documents.len() - 1
                    })
                })
                .collect();
            by_parent.insert(parent, members);
        }

        if let Some(projection) = narrow {
            for doc in &mut documents {
                *doc = projection.apply(doc);
            }
        }

        let per_parent = rows
            .iter()
            .map(|row| {
                let members = by_parent.remove(&row.id).unwrap_or_default();
                if self.group_slicing {
                    members
                } else {
                    slice.apply(members)
                }
            })
            .collect();

        Ok(Candidates {
            documents,
            per_parent,
        })
    }

    fn find(&self, node: &CollectionNode, query: Query) -> Result<Vec<Document>> {
        crate::executor::find(self.links, node.collection_name()?, query, self.principal)
    }
}

// =============================================================================
// Tests
// =============================================================================
