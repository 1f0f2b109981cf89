//! Aegis Document Query
//!
//! Query language for document filtering and retrieval.
//!
//! Filters follow document-store matching rules: a path that resolves to an
//! array matches when any element matches, and an equality against `null`
//! also matches documents where the path is missing. Selectors can be parsed
//! from JSON (`{"text": "Good", "age": {"$gt": 3}}`).
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::projection::Projection;
use crate::types::{Document, Value};
use aegis_common::{AegisError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::cmp::Ordering;

// =============================================================================
// Query
// =============================================================================

/// A query for filtering documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a document matches this query.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Add a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add several filters.
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Add a sort key; keys apply in the order they are added.
    pub fn with_sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            ascending,
        });
        self
    }

    /// Add skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Add limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Sort documents in place. The sort is stable, so ties keep their
    /// incoming order.
    pub fn sort_documents(&self, docs: &mut [Document]) {
        sort_documents(&self.sort, docs);
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, pattern: String },
    Contains { field: String, value: String },
    StartsWith { field: String, value: String },
    EndsWith { field: String, value: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// Check if a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => eq_matches(&doc.lookup(field), value),
            Self::Ne { field, value } => !eq_matches(&doc.lookup(field), value),
            Self::Gt { field, value } => {
                any_scalar(&doc.lookup(field), |v| compare_values(v, value) == Some(Ordering::Greater))
            }
            Self::Gte { field, value } => any_scalar(&doc.lookup(field), |v| {
                matches!(compare_values(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            Self::Lt { field, value } => {
                any_scalar(&doc.lookup(field), |v| compare_values(v, value) == Some(Ordering::Less))
            }
            Self::Lte { field, value } => any_scalar(&doc.lookup(field), |v| {
                matches!(compare_values(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            Self::In { field, values } => in_matches(&doc.lookup(field), values),
            Self::Nin { field, values } => !in_matches(&doc.lookup(field), values),
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Regex { field, pattern } => {
                let Ok(re) = regex::RegexBuilder::new(pattern).size_limit(1024 * 1024).build() else {
                    return false;
                };
                any_string(&doc.lookup(field), |s| re.is_match(s))
            }
            Self::Contains { field, value } => {
                any_string(&doc.lookup(field), |s| s.contains(value.as_str()))
            }
            Self::StartsWith { field, value } => {
                any_string(&doc.lookup(field), |s| s.starts_with(value.as_str()))
            }
            Self::EndsWith { field, value } => {
                any_string(&doc.lookup(field), |s| s.ends_with(value.as_str()))
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }

    /// Field paths this filter reads.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::In { field, .. }
            | Self::Nin { field, .. }
            | Self::Exists { field, .. }
            | Self::Regex { field, .. }
            | Self::Contains { field, .. }
            | Self::StartsWith { field, .. }
            | Self::EndsWith { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Self::And(filters) | Self::Or(filters) => {
                for f in filters {
                    f.collect_fields(out);
                }
            }
            Self::Not(f) => f.collect_fields(out),
        }
    }

    /// Parse a JSON selector into a list of conjunctive filters.
    pub fn parse_selector(selector: &JsonValue) -> Result<Vec<Filter>> {
        let JsonValue::Object(obj) = selector else {
            if selector.is_null() {
                return Ok(Vec::new());
            }
            return Err(AegisError::InvalidQuery(format!(
                "filter selector must be an object, got {}",
                selector
            )));
        };

        let mut filters = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            match key.as_str() {
                "$and" => filters.push(Filter::And(parse_selector_list(key, value)?)),
                "$or" => filters.push(Filter::Or(parse_selector_list(key, value)?)),
                "$nor" => filters.push(Filter::Not(Box::new(Filter::Or(parse_selector_list(
                    key, value,
                )?)))),
                "$not" => {
                    let inner = Filter::parse_selector(value)?;
                    filters.push(Filter::Not(Box::new(Filter::And(inner))));
                }
                op if op.starts_with('$') => {
                    return Err(AegisError::InvalidQuery(format!(
                        "unknown top-level operator {}",
                        op
                    )));
                }
                field => filters.extend(parse_field_condition(field, value)?),
            }
        }

        Ok(filters)
    }
}

fn parse_selector_list(op: &str, value: &JsonValue) -> Result<Vec<Filter>> {
    let JsonValue::Array(items) = value else {
        return Err(AegisError::InvalidQuery(format!("{} expects an array", op)));
    };

    items
        .iter()
        .map(|item| Filter::parse_selector(item).map(Filter::And))
        .collect()
}

fn parse_field_condition(field: &str, condition: &JsonValue) -> Result<Vec<Filter>> {
    let operators = match condition {
        JsonValue::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => obj,
        _ => return Ok(vec![Filter::eq(field, Value::from_json(condition.clone()))]),
    };

    let mut filters = Vec::with_capacity(operators.len());
    for (op, arg) in operators {
        let field = field.to_string();
        let filter = match op.as_str() {
            "$eq" => Filter::Eq { field, value: Value::from_json(arg.clone()) },
            "$ne" => Filter::Ne { field, value: Value::from_json(arg.clone()) },
            "$gt" => Filter::Gt { field, value: Value::from_json(arg.clone()) },
            "$gte" => Filter::Gte { field, value: Value::from_json(arg.clone()) },
            "$lt" => Filter::Lt { field, value: Value::from_json(arg.clone()) },
            "$lte" => Filter::Lte { field, value: Value::from_json(arg.clone()) },
            "$in" => Filter::In { field, values: parse_value_list(op, arg)? },
            "$nin" => Filter::Nin { field, values: parse_value_list(op, arg)? },
            "$exists" => Filter::Exists {
                field,
                exists: arg.as_bool().unwrap_or(true),
            },
            "$regex" => Filter::Regex {
                field,
                pattern: parse_string(op, arg)?,
            },
            "$contains" => Filter::Contains {
                field,
                value: parse_string(op, arg)?,
            },
            "$startsWith" => Filter::StartsWith {
                field,
                value: parse_string(op, arg)?,
            },
            "$endsWith" => Filter::EndsWith {
                field,
                value: parse_string(op, arg)?,
            },
            "$not" => Filter::Not(Box::new(Filter::And(parse_field_condition(&field, arg)?))),
            other => {
                return Err(AegisError::InvalidQuery(format!(
                    "unknown operator {} on field {}",
                    other, field
                )))
            }
        };
        filters.push(filter);
    }

    Ok(filters)
}

fn parse_value_list(op: &str, arg: &JsonValue) -> Result<Vec<Value>> {
    match arg {
        JsonValue::Array(items) => Ok(items.iter().cloned().map(Value::from_json).collect()),
        _ => Err(AegisError::InvalidQuery(format!("{} expects an array", op))),
    }
}

fn parse_string(op: &str, arg: &JsonValue) -> Result<String> {
    arg.as_str()
        .map(String::from)
        .ok_or_else(|| AegisError::InvalidQuery(format!("{} expects a string", op)))
}

fn eq_matches(candidates: &[Cow<'_, Value>], value: &Value) -> bool {
    if candidates.is_empty() {
        return value.is_null();
    }

    candidates.iter().any(|c| {
        let c = c.as_ref();
        c == value
            || c.as_array()
                .map(|items| items.contains(value))
                .unwrap_or(false)
    })
}

fn in_matches(candidates: &[Cow<'_, Value>], values: &[Value]) -> bool {
    if candidates.is_empty() {
        return values.iter().any(Value::is_null);
    }

    values.iter().any(|v| eq_matches(candidates, v))
}

fn any_scalar(candidates: &[Cow<'_, Value>], pred: impl Fn(&Value) -> bool) -> bool {
    candidates.iter().any(|c| match c.as_ref() {
        Value::Array(items) => items.iter().any(&pred),
        other => pred(other),
    })
}

fn any_string(candidates: &[Cow<'_, Value>], pred: impl Fn(&str) -> bool) -> bool {
    any_scalar(candidates, |v| v.as_str().map(&pred).unwrap_or(false))
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Sort specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    /// Parse `{"field": 1, "other": -1}`; key order is significant.
    pub fn parse_spec(spec: &JsonValue) -> Result<Vec<Sort>> {
        let JsonValue::Object(obj) = spec else {
            return Err(AegisError::InvalidQuery(format!(
                "sort must be an object, got {}",
                spec
            )));
        };

        obj.iter()
            .map(|(field, dir)| match dir.as_i64() {
                Some(1) => Ok(Sort { field: field.clone(), ascending: true }),
                Some(-1) => Ok(Sort { field: field.clone(), ascending: false }),
                _ => Err(AegisError::InvalidQuery(format!(
                    "sort direction for {} must be 1 or -1",
                    field
                ))),
            })
            .collect()
    }
}

/// Stable multi-key sort; missing values order first.
pub fn sort_documents(sort: &[Sort], docs: &mut [Document]) {
    if sort.is_empty() {
        return;
    }

    docs.sort_by(|a, b| {
        for key in sort {
            let left = a.lookup(&key.field);
            let right = b.lookup(&key.field);
            let ord = sort_order(left.first().map(|v| v.as_ref()), right.first().map(|v| v.as_ref()));
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Int(_) | Value::Float(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// Builder for constructing queries.
#[derive(Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::eq(field, value));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn in_values(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.query.filters.push(Filter::in_values(field, values));
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.query.filters.push(Filter::Exists {
            field: field.into(),
            exists,
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filters.push(filter);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.query.sort.push(Sort {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn project<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query.projection = Some(Projection::new(fields));
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

// =============================================================================
// Query Result
// =============================================================================

/// Result of a document query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub total_scanned: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total_scanned: 0,
            execution_time_ms: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_doc() -> Document {
        Document::from_json(json!({
            "_id": "test",
            "name": "Alice",
            "age": 30,
            "active": true,
            "email": "alice@example.com",
            "tagIds": ["t1", "t2"],
            "groups": [{"_id": "g1", "role": "admin"}, {"_id": "g2"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_eq_filter() {
        let doc = create_test_doc();
        assert!(Filter::eq("name", "Alice").matches(&doc));
        assert!(!Filter::eq("name", "Bob").matches(&doc));
        assert!(Filter::eq("_id", "test").matches(&doc));
    }

    #[test]
    fn test_array_membership() {
        let doc = create_test_doc();
        assert!(Filter::eq("tagIds", "t2").matches(&doc));
        assert!(!Filter::eq("tagIds", "t3").matches(&doc));
        assert!(Filter::eq("groups._id", "g2").matches(&doc));
        assert!(Filter::in_values("groups._id", vec!["x".into(), "g1".into()]).matches(&doc));
        assert!(!Filter::in_values("_id", vec![]).matches(&doc));
    }

    #[test]
    fn test_null_matches_missing() {
        let doc = create_test_doc();
        assert!(Filter::eq("missing", Value::Null).matches(&doc));
        assert!(!Filter::eq("name", Value::Null).matches(&doc));
    }

    #[test]
    fn test_comparison_filters() {
        let doc = create_test_doc();

        let filter = Filter::Gt {
            field: "age".to_string(),
            value: Value::Int(25),
        };
        assert!(filter.matches(&doc));

        let filter = Filter::Lt {
            field: "age".to_string(),
            value: Value::Int(25),
        };
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn test_parse_selector() {
        let doc = create_test_doc();
        let filters = Filter::parse_selector(&json!({
            "name": "Alice",
            "age": {"$gte": 30, "$lt": 40},
            "$or": [{"active": false}, {"email": {"$endsWith": ".com"}}]
        }))
        .unwrap();

        assert_eq!(filters.len(), 4);
        assert!(filters.iter().all(|f| f.matches(&doc)));

        let err = Filter::parse_selector(&json!({"age": {"$between": 1}})).unwrap_err();
        assert!(matches!(err, AegisError::InvalidQuery(_)));
    }

    #[test]
    fn test_filter_fields() {
        let filters = Filter::parse_selector(&json!({
            "text": "Good",
            "$or": [{"meta.score": {"$gt": 1}}, {"text": "Bad"}]
        }))
        .unwrap();

        let mut fields: Vec<&str> = filters.iter().flat_map(|f| f.fields()).collect();
        fields.sort();
        fields.dedup();
        assert_eq!(fields, vec!["meta.score", "text"]);
    }

    #[test]
    fn test_sort_parse_and_apply() {
        let sort = Sort::parse_spec(&json!({"rank": -1, "name": 1})).unwrap();
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0].field, "rank");
        assert!(!sort[0].ascending);

        let mut docs = vec![
            Document::from_json(json!({"_id": "1", "rank": 1, "name": "b"})).unwrap(),
            Document::from_json(json!({"_id": "2", "rank": 2, "name": "a"})).unwrap(),
            Document::from_json(json!({"_id": "3", "rank": 1, "name": "a"})).unwrap(),
            Document::from_json(json!({"_id": "4", "name": "z"})).unwrap(),
        ];
        sort_documents(&sort, &mut docs);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn test_query_builder() {
        let doc = create_test_doc();

        let query = QueryBuilder::new().eq("name", "Alice").gt("age", 25i64).build();
        assert!(query.matches(&doc));

        let query = QueryBuilder::new().eq("name", "Bob").build();
        assert!(!query.matches(&doc));
    }
}
