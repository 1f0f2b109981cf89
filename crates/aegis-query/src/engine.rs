//! Aegis Query Engine - Nested Query Entry Point
//!
//! Parses a specification, plans its projections and resolves it with the
//! requested execution mode.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::assembler::BatchedAssembler;
use crate::executor::RecursiveExecutor;
use crate::graph::CollectionNode;
use crate::parser::Parser;
use crate::planner::plan_graph;
use aegis_common::{ExecutionMode, Principal, QueryConfig, Result};
use aegis_document::Document;
use aegis_links::Links;
use serde_json::Value as JsonValue;
use std::sync::Arc;

// =============================================================================
// Query Engine
// =============================================================================

/// Resolves nested query specifications against a link registry.
pub struct QueryEngine {
    links: Arc<Links>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(links: Arc<Links>) -> Self {
        Self::with_config(links, QueryConfig::default())
    }

    pub fn with_config(links: Arc<Links>, config: QueryConfig) -> Self {
        Self { links, config }
    }

    pub fn links(&self) -> &Arc<Links> {
        &self.links
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Parse and plan `spec` without running it.
    pub fn parse(&self, collection: &str, spec: &JsonValue) -> Result<CollectionNode> {
        let mut root = Parser::new(&self.links, self.config.max_depth).parse(collection, spec)?;
        plan_graph(&mut root);
        Ok(root)
    }

    /// Resolve `spec` with the configured default mode.
    pub fn resolve(&self, collection: &str, spec: &JsonValue, principal: &Principal) -> Result<Vec<Document>> {
        self.resolve_with(collection, spec, principal, self.config.default_mode)
    }

    pub fn resolve_with(
        &self,
        collection: &str,
        spec: &JsonValue,
        principal: &Principal,
        mode: ExecutionMode,
    ) -> Result<Vec<Document>> {
        let root = self.parse(collection, spec)?;
        self.execute(&root, principal, mode)
    }

    /// Resolve an already planned graph.
    pub fn execute(&self, root: &CollectionNode, principal: &Principal, mode: ExecutionMode) -> Result<Vec<Document>> {
        tracing::debug!(
            "Resolving query on '{}' ({} mode, depth {})",
            root.collection.as_deref().unwrap_or_default(),
            mode.as_str(),
            root.depth()
        );

        match mode {
            ExecutionMode::Recursive => RecursiveExecutor::new(&self.links, principal).execute(root),
            ExecutionMode::Batched => BatchedAssembler::new(&self.links, principal)
                .with_group_slicing(self.config.group_slicing)
                .execute(root),
        }
    }
}

/// Resolve `spec` on `collection` with default query settings.
pub fn resolve_query(
    links: &Arc<Links>,
    collection: &str,
    spec: &JsonValue,
    principal: &Principal,
    mode: ExecutionMode,
) -> Result<Vec<Document>> {
    QueryEngine::new(Arc::clone(links)).resolve_with(collection, spec, principal, mode)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_common::AegisError;
    use aegis_document::DocumentEngine;
    use aegis_links::LinkConfig;
    use serde_json::json;

    fn links() -> Arc<Links> {
        let links = Links::new(Arc::new(DocumentEngine::new()));
        links
            .add_links("posts", [("tags", LinkConfig::many("tags").field("tagIds"))])
            .unwrap();
        links
            .add_links("tags", [("posts", LinkConfig::inverse("posts", "tags"))])
            .unwrap();

        let engine = links.engine();
        for (id, name) in [("t1", "rust"), ("t2", "db")] {
            engine
                .insert("tags", Document::from_json(json!({"_id": id, "name": name})).unwrap())
                .unwrap();
        }
        for post in [
            json!({"_id": "p1", "title": "Zero"}),
            json!({"_id": "p2", "title": "One", "tagIds": ["t1"]}),
            json!({"_id": "p3", "title": "Two", "tagIds": ["t1", "t2"]}),
        ] {
            engine.insert("posts", Document::from_json(post).unwrap()).unwrap();
        }
        links
    }

    fn json_rows(rows: Vec<Document>) -> Vec<JsonValue> {
        rows.iter().map(Document::to_json).collect()
    }

    #[test]
    fn test_modes_agree() {
        let links = links();
        let spec = json!({"name": 1, "posts": {"title": 1, "tags": {"name": 1}}});
        let recursive = resolve_query(&links, "tags", &spec, &Principal::anonymous(), ExecutionMode::Recursive).unwrap();
        let batched = resolve_query(&links, "tags", &spec, &Principal::anonymous(), ExecutionMode::Batched).unwrap();
        assert_eq!(json_rows(recursive), json_rows(batched));
    }

    #[test]
    fn test_default_mode_from_config() {
        let links = links();
        let config = QueryConfig {
            default_mode: ExecutionMode::Batched,
            ..Default::default()
        };
        let engine = QueryEngine::with_config(Arc::clone(&links), config);
        let rows = engine
            .resolve("posts", &json!({"tags": {"name": 1}}), &Principal::anonymous())
            .unwrap();

        let lengths: Vec<usize> = json_rows(rows)
            .iter()
            .map(|r| r["tags"].as_array().map(Vec::len).unwrap_or(usize::MAX))
            .collect();
        assert_eq!(lengths, vec![0, 1, 2]);
    }

    #[test]
    fn test_depth_limit() {
        let links = links();
        let config = QueryConfig {
            max_depth: 1,
            ..Default::default()
        };
        let engine = QueryEngine::with_config(links, config);
        let err = engine
            .resolve("posts", &json!({"tags": {"posts": {"title": 1}}}), &Principal::anonymous())
            .unwrap_err();
        assert!(matches!(err, AegisError::InvalidQuery(_)));
    }

    #[test]
    fn test_parse_plans_graph() {
        let links = links();
        let root = QueryEngine::new(links).parse("posts", &json!({"tags": {"name": 1}})).unwrap();
        assert_eq!(root.plan.strip, vec!["tagIds".to_string()]);
        assert!(root.plan.projection.is_some());
    }
}
