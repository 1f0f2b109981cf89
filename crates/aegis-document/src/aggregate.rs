//! Aegis Document Aggregation
//!
//! A small aggregation pipeline: match, sort, project, skip, limit and a
//! terminal group stage. Grouping unwinds arrays at the key path, so a
//! document holding `tagIds: ["a", "b"]` lands in both the `a` and the `b`
//! group, once each.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::index::IndexKey;
use crate::projection::Projection;
use crate::query::{sort_documents, Filter, Sort};
use crate::types::{Document, Value};
use std::collections::{HashMap, HashSet};

// =============================================================================
// Pipeline
// =============================================================================

/// One non-terminal pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Vec<Filter>),
    Sort(Vec<Sort>),
    Project(Projection),
    Skip(usize),
    Limit(usize),
}

/// Skip/limit applied inside every group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Slice {
    pub fn new(skip: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            limit,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.skip == 0 && self.limit.is_none()
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Terminal grouping stage.
#[derive(Debug, Clone)]
pub struct GroupStage {
    pub key: String,
    pub slice: Option<Slice>,
}

/// An aggregation pipeline, executed in one collection call.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    group: Option<GroupStage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_filters(mut self, filters: Vec<Filter>) -> Self {
        self.stages.push(Stage::Match(filters));
        self
    }

    pub fn sort(mut self, sort: Vec<Sort>) -> Self {
        if !sort.is_empty() {
            self.stages.push(Stage::Sort(sort));
        }
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.stages.push(Stage::Project(projection));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.stages.push(Stage::Skip(skip));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.stages.push(Stage::Limit(limit));
        self
    }

    /// Group by every distinct value at `key`, optionally slicing each group.
    pub fn group_by(mut self, key: impl Into<String>, slice: Option<Slice>) -> Self {
        self.group = Some(GroupStage {
            key: key.into(),
            slice,
        });
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn group(&self) -> Option<&GroupStage> {
        self.group.as_ref()
    }

    /// Filters of a leading match stage, usable to narrow the input.
    pub fn leading_filters(&self) -> Option<&[Filter]> {
        match self.stages.first() {
            Some(Stage::Match(filters)) => Some(filters),
            _ => None,
        }
    }

    /// Run the pipeline over documents in natural order.
    pub fn run(&self, mut documents: Vec<Document>) -> AggregateResult {
        for stage in &self.stages {
            documents = match stage {
                Stage::Match(filters) => documents
                    .into_iter()
                    .filter(|doc| filters.iter().all(|f| f.matches(doc)))
                    .collect(),
                Stage::Sort(sort) => {
                    sort_documents(sort, &mut documents);
                    documents
                }
                Stage::Project(projection) => documents.iter().map(|d| projection.apply(d)).collect(),
                Stage::Skip(n) => documents.into_iter().skip(*n).collect(),
                Stage::Limit(n) => documents.into_iter().take(*n).collect(),
            };
        }

        match self.group {
            Some(ref group) => AggregateResult {
                documents: Vec::new(),
                groups: group_documents(documents, group),
            },
            None => AggregateResult {
                documents,
                groups: Vec::new(),
            },
        }
    }
}

fn group_documents(documents: Vec<Document>, stage: &GroupStage) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut positions: HashMap<IndexKey, usize> = HashMap::new();

    for doc in documents {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for value in doc.lookup(&stage.key) {
            let values = match value.as_ref() {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            for v in values {
                if seen.insert(IndexKey::from_value(&v)) {
                    keys.push(v);
                }
            }
        }

        for key in keys {
            let position = *positions.entry(IndexKey::from_value(&key)).or_insert_with(|| {
                groups.push(Group {
                    key: key.clone(),
                    documents: Vec::new(),
                });
                groups.len() - 1
            });
            groups[position].documents.push(doc.clone());
        }
    }

    if let Some(slice) = stage.slice.filter(|s| !s.is_noop()) {
        for group in groups.iter_mut() {
            group.documents = slice.apply(std::mem::take(&mut group.documents));
        }
    }

    groups
}

// =============================================================================
// Results
// =============================================================================

/// Documents sharing one key value.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Value,
    pub documents: Vec<Document>,
}

/// Result of an aggregation. `groups` is filled when the pipeline ends
/// with a group stage, `documents` otherwise.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub documents: Vec<Document>,
    pub groups: Vec<Group>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posts() -> Vec<Document> {
        vec![
            Document::from_json(json!({"_id": "p1", "rank": 3, "tagIds": ["a", "b", "a"]})).unwrap(),
            Document::from_json(json!({"_id": "p2", "rank": 1, "tagIds": ["b"]})).unwrap(),
            Document::from_json(json!({"_id": "p3", "rank": 2, "tagIds": ["b", "c"]})).unwrap(),
            Document::from_json(json!({"_id": "p4", "rank": 4})).unwrap(),
        ]
    }

    fn ids(group: &Group) -> Vec<&str> {
        group.documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_group_unwinds_arrays_once_per_document() {
        let result = Pipeline::new().group_by("tagIds", None).run(posts());

        let keys: Vec<&str> = result.groups.iter().filter_map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(ids(&result.groups[0]), vec!["p1"]);
        assert_eq!(ids(&result.groups[1]), vec!["p1", "p2", "p3"]);
        assert!(result.documents.is_empty());
    }

    #[test]
    fn test_sort_then_slice_per_group() {
        let result = Pipeline::new()
            .match_filters(vec![Filter::Exists { field: "tagIds".into(), exists: true }])
            .sort(vec![Sort { field: "rank".into(), ascending: true }])
            .project(Projection::new(["tagIds"]))
            .group_by("tagIds", Some(Slice::new(Some(1), Some(1))))
            .run(posts());

        let b = result.groups.iter().find(|g| g.key == Value::from("b")).unwrap();
        assert_eq!(ids(b), vec!["p3"]);
        assert!(b.documents[0].get("rank").is_none());

        let a = result.groups.iter().find(|g| g.key == Value::from("a")).unwrap();
        assert!(a.documents.is_empty());
    }

    #[test]
    fn test_pipeline_without_group() {
        let result = Pipeline::new()
            .sort(vec![Sort { field: "rank".into(), ascending: false }])
            .limit(2)
            .run(posts());
        let ids: Vec<&str> = result.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p4", "p1"]);
        assert!(result.groups.is_empty());
    }
}
