//! Aegis Parser - Query Specification Parser
//!
//! Builds the query graph from a JSON specification. Keys naming a
//! relationship of the current collection become child nodes; `$filters`,
//! `$options` and `$all` configure the node itself; every other key is a
//! field request, nested objects being expanded into dotted paths.
//!
//! Key Features:
//! - Relationship resolution against the link registry
//! - Dotted field expansion (`{address: {city: 1}}` -> `address.city`)
//! - Falsy values (`0`, `false`, `null`, `""`) skip their key
//! - Bounded nesting depth
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::graph::{CollectionNode, NodeOptions};
use aegis_common::utils::join_path;
use aegis_common::AegisError;
use aegis_document::{Filter, Sort};
use aegis_links::Links;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("specification nests deeper than {0} relationships")]
    TooDeep(usize),

    #[error("unknown reserved key '{0}'")]
    UnknownReservedKey(String),

    #[error("unknown $options key '{0}'")]
    UnknownOption(String),

    #[error("{key} must be {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error(transparent)]
    Link(#[from] AegisError),
}

impl From<ParseError> for AegisError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Link(err) => err,
            other => AegisError::InvalidQuery(other.to_string()),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

const FILTERS: &str = "$filters";
const OPTIONS: &str = "$options";
const ALL: &str = "$all";

// =============================================================================
// Parser
// =============================================================================

/// Turns specifications into query graphs.
pub struct Parser<'a> {
    links: &'a Links,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(links: &'a Links, max_depth: usize) -> Self {
        Self { links, max_depth }
    }

    /// Parse `spec` rooted at `collection`. A specification that is not an
    /// object yields a root requesting `_id` only.
    pub fn parse(&self, collection: &str, spec: &JsonValue) -> ParseResult<CollectionNode> {
        let mut root = CollectionNode::root(collection);
        if let JsonValue::Object(body) = spec {
            self.parse_body(&mut root, body, 0)?;
        }
        finish_node(&mut root);
        Ok(root)
    }

    fn parse_body(&self, node: &mut CollectionNode, body: &Map<String, JsonValue>, depth: usize) -> ParseResult<()> {
        for (key, value) in body {
            if is_falsy(value) {
                continue;
            }

            match key.as_str() {
                FILTERS => node.filters.extend(parse_filters(value)?),
                OPTIONS => node.options = parse_options(value)?,
                ALL => node.all_fields = true,
                reserved if reserved.starts_with('$') => {
                    return Err(ParseError::UnknownReservedKey(reserved.to_string()))
                }
                _ => self.parse_entry(node, key, value, depth)?,
            }
        }
        Ok(())
    }

    fn parse_entry(&self, node: &mut CollectionNode, key: &str, value: &JsonValue, depth: usize) -> ParseResult<()> {
        if let Some(collection) = node.collection.as_deref() {
            if self.links.is_link(collection, key) {
                let linker = self.links.linker(collection, key)?;
                if depth + 1 > self.max_depth {
                    return Err(ParseError::TooDeep(self.max_depth));
                }

                let mut child = CollectionNode::child(key, linker);
                if let JsonValue::Object(body) = value {
                    self.parse_body(&mut child, body, depth + 1)?;
                }
                finish_node(&mut child);
                node.add_child(child);
                return Ok(());
            }
        }

        match value {
            JsonValue::Object(nested) => {
                let mut paths = Vec::new();
                dotted_paths(key, nested, &mut paths);
                for path in paths {
                    node.add_field(path);
                }
            }
            _ => node.add_field(key),
        }
        Ok(())
    }
}

/// A node with nothing requested fetches identifiers only.
fn finish_node(node: &mut CollectionNode) {
    if node.fields.is_empty() && node.children.is_empty() {
        node.add_field("_id");
    }
}

fn is_falsy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => false,
    }
}

fn dotted_paths(prefix: &str, body: &Map<String, JsonValue>, out: &mut Vec<String>) {
    if body.is_empty() {
        out.push(prefix.to_string());
        return;
    }
    for (key, value) in body {
        let path = join_path(prefix, key);
        match value {
            JsonValue::Object(nested) => dotted_paths(&path, nested, out),
            v if is_falsy(v) => {}
            _ => out.push(path),
        }
    }
}

fn parse_filters(value: &JsonValue) -> ParseResult<Vec<Filter>> {
    if !value.is_object() {
        return Err(ParseError::InvalidValue {
            key: FILTERS.into(),
            expected: "an object",
        });
    }
    Ok(Filter::parse_selector(value)?)
}

fn parse_options(value: &JsonValue) -> ParseResult<NodeOptions> {
    let JsonValue::Object(obj) = value else {
        return Err(ParseError::InvalidValue {
            key: OPTIONS.into(),
            expected: "an object",
        });
    };

    let mut options = NodeOptions::default();
    for (key, value) in obj {
        match key.as_str() {
            "sort" => options.sort = Sort::parse_spec(value)?,
            "limit" => options.limit = parse_count("limit", value)?,
            "skip" => options.skip = parse_count("skip", value)?,
            "fields" => options.fields = parse_field_list(value)?,
            other => return Err(ParseError::UnknownOption(other.to_string())),
        }
    }
    Ok(options)
}

/// `0` and `null` mean "not set".
fn parse_count(key: &str, value: &JsonValue) -> ParseResult<Option<usize>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Number(n) => match n.as_u64() {
            Some(0) => Ok(None),
            Some(count) => Ok(Some(count as usize)),
            None => Err(ParseError::InvalidValue {
                key: format!("$options.{}", key),
                expected: "a non-negative integer",
            }),
        },
        _ => Err(ParseError::InvalidValue {
            key: format!("$options.{}", key),
            expected: "a non-negative integer",
        }),
    }
}

fn parse_field_list(value: &JsonValue) -> ParseResult<Vec<String>> {
    let invalid = || ParseError::InvalidValue {
        key: "$options.fields".into(),
        expected: "an object of field paths or a list of strings",
    };

    match value {
        JsonValue::Object(obj) => Ok(obj
            .iter()
            .filter(|(_, v)| !is_falsy(v))
            .map(|(k, _)| k.clone())
            .collect()),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

// =============================================================================
// Tests
// =============================================================================
