//! Aegis Query Planner
//!
//! Pre-pass deciding, for every node of a query graph, which fields are
//! fetched and which are removed again before results are returned. Both
//! execution engines read the plan and never merge projections themselves.
//!
//! Rules per node:
//! - `$all` fetches every field and removes nothing
//! - requested paths are included; a path subsumes its extensions
//! - the storage field of every non-virtual child link is included so the
//!   child can be joined, and removed afterwards unless it was requested
//! - fields read by `$filters` are included
//! - with nothing included, only `_id` is fetched
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::graph::{CollectionNode, NodePlan};
use aegis_document::Projection;

// =============================================================================
// Planner
// =============================================================================

/// Plan `node` and every node below it.
pub fn plan_graph(node: &mut CollectionNode) {
    node.plan = plan_node(node);
    for child in &mut node.children {
        plan_graph(child);
    }
}

/// Plan a single node.
pub fn plan_node(node: &CollectionNode) -> NodePlan {
    if node.all_fields {
        return NodePlan::default();
    }

    let requested = Projection::new(node.requested_paths());
    let mut projection = requested.clone();
    let mut strip = Vec::new();

    for child in &node.children {
        let Some(linker) = child.linker.as_ref() else {
            continue;
        };
        if linker.is_virtual() || linker.is_resolver() {
            continue;
        }
        if let Some(field) = linker.link_storage_field() {
            projection.include(field);
            let wanted = requested.covers(field) || requested.touches_root(field);
            if !wanted && !strip.iter().any(|s| s == field) {
                strip.push(field.to_string());
            }
        }
    }

    for filter in &node.filters {
        for field in filter.fields() {
            projection.include(field);
        }
    }

    NodePlan {
        projection: Some(projection),
        strip,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_document::Filter;
    use aegis_links::{LinkConfig, Linker};
    use std::sync::Arc;

    fn owning(name: &str, config: LinkConfig) -> CollectionNode {
        CollectionNode::child(name, Arc::new(Linker::new("posts", name, config).unwrap()))
    }

    #[test]
    fn test_requested_fields_only() {
        let mut node = CollectionNode::root("posts");
        node.add_field("title");
        node.add_field("author.name");
        node.add_field("author");

        let plan = plan_node(&node);
        assert_eq!(plan.projection.unwrap().paths(), &["author".to_string(), "title".to_string()]);
        assert!(plan.strip.is_empty());
    }

    #[test]
    fn test_storage_fields_are_forced_and_stripped() {
        let mut node = CollectionNode::root("posts");
        node.add_field("title");
        node.add_child(owning("tags", LinkConfig::many("tags").field("tagIds")));
        node.add_child(owning("category", LinkConfig::one("categories").field("categoryId")));
        node.add_field("categoryId");

        let plan = plan_node(&node);
        let projection = plan.projection.unwrap();
        assert!(projection.covers("tagIds"));
        assert!(projection.covers("categoryId"));
        assert_eq!(plan.strip, vec!["tagIds".to_string()]);
    }

    #[test]
    fn test_virtual_and_resolver_children_add_nothing() {
        let owner = Arc::new(Linker::new("posts", "author", LinkConfig::one("users").field("authorId")).unwrap());
        let posts = Arc::new(
            Linker::new_virtual("users", "posts", LinkConfig::inverse("posts", "author"), &owner).unwrap(),
        );
        let pictures = Arc::new(Linker::new("users", "pictures", LinkConfig::resolver(|_, _| Ok(vec![]))).unwrap());

        let mut node = CollectionNode::root("users");
        node.add_child(CollectionNode::child("posts", posts));
        node.add_child(CollectionNode::child("pictures", pictures));

        let plan = plan_node(&node);
        assert!(plan.projection.unwrap().is_ids_only());
        assert!(plan.strip.is_empty());
    }

    #[test]
    fn test_filter_fields_are_included() {
        let mut node = CollectionNode::root("posts");
        node.add_field("_id");
        node.filters.push(Filter::eq("published", true));

        let plan = plan_node(&node);
        assert!(plan.projection.unwrap().covers("published"));
        assert!(plan.strip.is_empty());
    }

    #[test]
    fn test_all_fields() {
        let mut node = CollectionNode::root("posts");
        node.all_fields = true;
        node.add_child(owning("tags", LinkConfig::many("tags")));
        assert_eq!(plan_node(&node), NodePlan::default());
    }

    #[test]
    fn test_plan_graph_recurses() {
        let mut root = CollectionNode::root("posts");
        let mut tags = owning("tags", LinkConfig::many("tags"));
        tags.add_field("name");
        root.add_child(tags);

        plan_graph(&mut root);
        let tags = root.child_named("tags").unwrap();
        assert!(tags.plan.projection.as_ref().unwrap().covers("name"));
        assert_eq!(root.plan.strip, vec!["tags_tags_ids".to_string()]);
    }
}
