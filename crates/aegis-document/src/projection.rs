//! Aegis Document Projection
//!
//! Inclusion projections over dotted field paths. `_id` is always kept.
//! A path subsumes its extensions: including `address` makes
//! `address.city` redundant. Inside arrays, object elements are projected
//! one by one and scalar elements are dropped.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, Value};
use aegis_common::utils::{path_covers, split_path};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Projection
// =============================================================================

/// A normalized set of included field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    paths: Vec<String>,
}

impl Projection {
    pub fn new<S: Into<String>>(paths: impl IntoIterator<Item = S>) -> Self {
        let mut projection = Self::default();
        for path in paths {
            projection.include(path);
        }
        projection
    }

    /// Projection keeping only `_id`.
    pub fn ids_only() -> Self {
        Self::default()
    }

    /// Include a path. Returns false when it was already covered.
    pub fn include(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if path.is_empty() || path == "_id" || self.covers(&path) {
            return false;
        }
        self.paths.retain(|p| !path_covers(&path, p));
        self.paths.push(path);
        self.paths.sort();
        true
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_ids_only(&self) -> bool {
        self.paths.is_empty()
    }

    /// True if the value at `path` would be kept whole.
    pub fn covers(&self, path: &str) -> bool {
        path == "_id" || self.paths.iter().any(|p| path_covers(p, path))
    }

    /// True if any included path starts under the top-level field `root`.
    pub fn touches_root(&self, root: &str) -> bool {
        self.paths.iter().any(|p| path_covers(root, p))
    }

    /// Apply this projection to a document.
    pub fn apply(&self, doc: &Document) -> Document {
        let mut data: HashMap<String, Value> = HashMap::new();

        for path in &self.paths {
            let parts = split_path(path);
            let Some((head, rest)) = parts.split_first() else {
                continue;
            };
            let Some(source) = doc.data.get(*head) else {
                continue;
            };

            let projected = if rest.is_empty() {
                Some(source.clone())
            } else {
                project_value(source, rest)
            };

            if let Some(value) = projected {
                match data.get_mut(*head) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        data.insert(head.to_string(), value);
                    }
                }
            }
        }

        Document {
            id: doc.id.clone(),
            data,
        }
    }
}

fn project_value(source: &Value, parts: &[&str]) -> Option<Value> {
    let (key, rest) = parts.split_first()?;

    match source {
        Value::Object(obj) => {
            let mut out = HashMap::new();
            if let Some(v) = obj.get(*key) {
                let projected = if rest.is_empty() {
                    Some(v.clone())
                } else {
                    project_value(v, rest)
                };
                if let Some(p) = projected {
                    out.insert(key.to_string(), p);
                }
            }
            Some(Value::Object(out))
        }
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| project_value(item, parts)).collect(),
        )),
        _ => None,
    }
}

fn merge_values(target: &mut Value, addition: Value) {
    match (target, addition) {
        (Value::Object(left), Value::Object(right)) => {
            for (k, v) in right {
                match left.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        left.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for (l, r) in left.iter_mut().zip(right) {
                merge_values(l, r);
            }
        }
        (target, addition) => *target = addition,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::from_json(json!({
            "_id": "p1",
            "title": "Hello",
            "address": {"city": "NYC", "zip": "10001", "geo": {"lat": 1, "lng": 2}},
            "groupIds": [{"_id": "g1", "role": "admin"}, {"_id": "g2", "role": "user"}, "stray"],
            "secret": true
        }))
        .unwrap()
    }

    #[test]
    fn test_normalization() {
        let mut projection = Projection::new(["address.city", "title"]);
        assert!(!projection.include("_id"));
        assert!(projection.include("address"));
        assert_eq!(projection.paths(), &["address".to_string(), "title".to_string()]);
        assert!(!projection.include("address.zip"));
        assert!(projection.covers("address.geo.lat"));
        assert!(projection.touches_root("title"));
        assert!(!projection.touches_root("secret"));
    }

    #[test]
    fn test_ids_only() {
        let doc = Projection::ids_only().apply(&sample());
        assert_eq!(doc.to_json(), json!({"_id": "p1"}));
    }

    #[test]
    fn test_dotted_paths_merge() {
        let projection = Projection::new(["address.city", "address.geo.lat", "title"]);
        let doc = projection.apply(&sample());
        assert_eq!(
            doc.to_json(),
            json!({"_id": "p1", "title": "Hello", "address": {"city": "NYC", "geo": {"lat": 1}}})
        );
    }

    #[test]
    fn test_paths_through_arrays() {
        let projection = Projection::new(["groupIds._id"]);
        let doc = projection.apply(&sample());
        assert_eq!(
            doc.to_json(),
            json!({"_id": "p1", "groupIds": [{"_id": "g1"}, {"_id": "g2"}]})
        );

        let projection = Projection::new(["groupIds._id", "groupIds.role"]);
        let doc = projection.apply(&sample());
        assert_eq!(
            doc.to_json(),
            json!({"_id": "p1", "groupIds": [{"_id": "g1", "role": "admin"}, {"_id": "g2", "role": "user"}]})
        );
    }
}
