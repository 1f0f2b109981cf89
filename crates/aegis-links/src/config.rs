//! Aegis Link Configuration
//!
//! Declarations of relationships between collections, and the validation
//! that turns a raw declaration into something a [`Linker`](crate::Linker)
//! can be built from.
//!
//! A declaration is one of three kinds:
//! - a storage link, owning a field on the local document that holds one
//!   identifier, many identifiers, or identifier+metadata objects;
//! - a virtual link (`inversedBy`), the read-only mirror of a storage link
//!   declared on the related collection;
//! - a resolver link, whose results come from a function.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use aegis_common::{AegisError, Principal, Result};
use aegis_document::{Document, FieldSchema, Filter, Projection, Query, Sort, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Link Type
// =============================================================================

/// Cardinality of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    #[serde(rename = "one", alias = "1", alias = "single")]
    One,
    #[serde(rename = "many", alias = "*")]
    Many,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Many => "many",
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = AegisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one" | "1" | "single" => Ok(Self::One),
            "many" | "*" => Ok(Self::Many),
            other => Err(AegisError::invalid_config(format!(
                "unknown link type '{}', expected one of one, 1, single, many, *",
                other
            ))),
        }
    }
}

// =============================================================================
// Metadata Declaration
// =============================================================================

/// Metadata carried next to each stored identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataDecl {
    /// `true` stores free-form metadata objects.
    Flag(bool),
    /// Declared metadata fields, validated when the local collection has a schema.
    Fields(BTreeMap<String, FieldSchema>),
}

impl MetadataDecl {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Flag(enabled) => *enabled,
            Self::Fields(_) => true,
        }
    }

    /// Object schema of one metadata entry. `None` means blackbox.
    pub fn entry_schema(&self) -> Option<FieldSchema> {
        match self {
            Self::Fields(fields) if !fields.is_empty() => {
                let mut schema = FieldSchema::object()
                    .property("_id", FieldSchema::string())
                    .require("_id");
                for (name, field) in fields {
                    if name != "_id" {
                        schema = schema.property(name.clone(), field.clone());
                    }
                }
                Some(schema)
            }
            _ => None,
        }
    }
}

// =============================================================================
// Resolver Functions
// =============================================================================

/// Arguments handed to a resolver function next to the parent document.
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Filters, sort, skip, limit and field selection requested for this
    /// link in the query specification.
    pub query: Query,
    pub principal: Principal,
}

impl ResolveArgs {
    pub fn filters(&self) -> &[Filter] {
        &self.query.filters
    }

    pub fn sort(&self) -> &[Sort] {
        &self.query.sort
    }

    pub fn fields(&self) -> Option<&Projection> {
        self.query.projection.as_ref()
    }
}

/// Computes the related values of a parent document.
pub type ResolverFn = Arc<dyn Fn(&Document, &ResolveArgs) -> Result<Vec<Value>> + Send + Sync>;

// =============================================================================
// Link Config
// =============================================================================

/// One relationship declaration, as written by the user.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataDecl>,
    #[serde(rename = "inversedBy", alias = "inversed_by", skip_serializing_if = "Option::is_none")]
    pub inversed_by: Option<String>,
    pub index: bool,
    pub unique: bool,
    pub autoremove: bool,
    #[serde(skip)]
    pub resolve: Option<ResolverFn>,
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("link_type", &self.link_type)
            .field("collection", &self.collection)
            .field("field", &self.field)
            .field("metadata", &self.metadata)
            .field("inversed_by", &self.inversed_by)
            .field("index", &self.index)
            .field("unique", &self.unique)
            .field("autoremove", &self.autoremove)
            .field("resolve", &self.resolve.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl LinkConfig {
    /// A single link to `collection`.
    pub fn one(collection: impl Into<String>) -> Self {
        Self {
            link_type: Some(LinkType::One),
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    /// A many link to `collection`.
    pub fn many(collection: impl Into<String>) -> Self {
        Self {
            link_type: Some(LinkType::Many),
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    /// The virtual side of link `inversed_by` declared on `collection`.
    pub fn inverse(collection: impl Into<String>, inversed_by: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            inversed_by: Some(inversed_by.into()),
            ..Default::default()
        }
    }

    /// A link computed by a function. Results are a list unless the
    /// declaration says otherwise.
    pub fn resolver<F>(resolve: F) -> Self
    where
        F: Fn(&Document, &ResolveArgs) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            resolve: Some(Arc::new(resolve)),
            ..Default::default()
        }
    }

    pub fn link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = Some(link_type);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Free-form metadata.
    pub fn with_metadata(mut self) -> Self {
        self.metadata = Some(MetadataDecl::Flag(true));
        self
    }

    /// Declared metadata fields.
    pub fn metadata_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = (S, FieldSchema)>) -> Self {
        self.metadata = Some(MetadataDecl::Fields(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ));
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn autoremove(mut self) -> Self {
        self.autoremove = true;
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.inversed_by.is_some()
    }

    pub fn is_resolver(&self) -> bool {
        self.resolve.is_some()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().map(MetadataDecl::is_enabled).unwrap_or(false)
    }

    /// Check the declaration on its own, before the inverse side (if any)
    /// is known.
    pub fn validate(&self, name: &str) -> Result<()> {
        let fail = |msg: String| Err(AegisError::invalid_config(format!("link '{}': {}", name, msg)));

        if name.is_empty() || name.starts_with('$') || name.contains('.') || name == "_id" {
            return fail("link names must be plain field names".into());
        }

        if self.is_resolver() {
            if self.collection.is_some() {
                return fail("a resolver link must not name a related collection".into());
            }
            if self.is_virtual() || self.field.is_some() || self.metadata.is_some() {
                return fail("a resolver link has no storage, inverse or metadata".into());
            }
            if self.index || self.unique || self.autoremove {
                return fail("index, unique and autoremove need a storage link".into());
            }
            return Ok(());
        }

        match self.collection.as_deref() {
            None | Some("") => {
                return fail("a related collection is mandatory for non-resolver links".into())
            }
            Some(_) => {}
        }

        if self.is_virtual() {
            if self.inversed_by.as_deref() == Some("") {
                return fail("inversedBy must name a link".into());
            }
            if self.link_type.is_some() || self.field.is_some() || self.metadata.is_some() {
                return fail("type, field and metadata of a virtual link come from its inverse".into());
            }
            if self.index || self.unique {
                return fail("virtual links cannot be indexed or unique".into());
            }
            if self.autoremove {
                return fail("autoremove must be declared on the owning side".into());
            }
            return Ok(());
        }

        if self.unique && self.link_type == Some(LinkType::Many) {
            return fail("unique is only allowed on single links".into());
        }

        match self.field.as_deref() {
            Some("") => fail("storage field must not be empty".into()),
            Some(field) if field == name => fail(format!(
                "storage field '{}' must differ from the link name, or it would shadow fetched results",
                field
            )),
            Some("_id") => fail("storage field must not be _id".into()),
            _ => Ok(()),
        }
    }
}

/// Parse `{link: config, ...}` declarations from JSON.
pub fn parse_links(json: &serde_json::Value) -> Result<Vec<(String, LinkConfig)>> {
    let serde_json::Value::Object(obj) = json else {
        return Err(AegisError::invalid_config("link declarations must be an object"));
    };

    obj.iter()
        .map(|(name, config)| {
            serde_json::from_value::<LinkConfig>(config.clone())
                .map(|config| (name.clone(), config))
                .map_err(|e| AegisError::invalid_config(format!("link '{}': {}", name, e)))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_synonyms() {
        for (raw, expected) in [
            ("one", LinkType::One),
            ("1", LinkType::One),
            ("single", LinkType::One),
            ("many", LinkType::Many),
            ("*", LinkType::Many),
        ] {
            let parsed: LinkType = serde_json::from_value(json!(raw)).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(raw.parse::<LinkType>().unwrap(), expected);
        }
        assert!("two".parse::<LinkType>().is_err());
    }

    #[test]
    fn test_parse_links() {
        let links = parse_links(&json!({
            "comments": {"type": "*", "collection": "comments", "field": "commentIds"},
            "metaCategory": {"type": "1", "collection": "categories", "metadata": {}},
            "author": {"collection": "users", "inversedBy": "posts"},
            "metaComments": {
                "type": "many",
                "collection": "comments",
                "metadata": {"approved": {"type": "Bool", "nullable": true}}
            }
        }))
        .unwrap();

        assert_eq!(links.len(), 4);
        let (_, meta_category) = links.iter().find(|(n, _)| n == "metaCategory").unwrap();
        assert_eq!(meta_category.metadata, Some(MetadataDecl::Fields(BTreeMap::new())));
        assert!(meta_category.has_metadata());
        assert!(meta_category.metadata.as_ref().unwrap().entry_schema().is_none());

        let (_, meta_comments) = links.iter().find(|(n, _)| n == "metaComments").unwrap();
        let schema = meta_comments.metadata.as_ref().unwrap().entry_schema().unwrap();
        assert!(schema.validate(&Value::from(json!({"_id": "c1", "approved": true}))).is_ok());
        assert!(schema.validate(&Value::from(json!({"approved": true}))).is_err());

        let (_, author) = links.iter().find(|(n, _)| n == "author").unwrap();
        assert!(author.is_virtual());

        let err = parse_links(&json!({"x": {"collection": "a", "colour": "red"}})).unwrap_err();
        assert!(err.is_setup_error());
    }

    #[test]
    fn test_unique_on_many_is_rejected() {
        let err = LinkConfig::many("tags").unique().validate("tags").unwrap_err();
        assert!(matches!(err, AegisError::InvalidConfig(_)));
        assert!(LinkConfig::one("profiles").unique().validate("profile").is_ok());
    }

    #[test]
    fn test_storage_field_rules() {
        assert!(LinkConfig::one("users").field("author").validate("author").is_err());
        assert!(LinkConfig::one("users").field("").validate("author").is_err());
        assert!(LinkConfig::one("users").field("authorId").validate("author").is_ok());
        assert!(LinkConfig::default().validate("author").is_err());
    }

    #[test]
    fn test_virtual_rules() {
        assert!(LinkConfig::inverse("posts", "author").validate("posts").is_ok());
        assert!(LinkConfig::inverse("posts", "author").field("x").validate("posts").is_err());
        assert!(LinkConfig::inverse("posts", "author").index().validate("posts").is_err());
        assert!(LinkConfig::inverse("posts", "author")
            .link_type(LinkType::One)
            .validate("posts")
            .is_err());
    }

    #[test]
    fn test_resolver_rules() {
        let resolver = LinkConfig::resolver(|_, _| Ok(Vec::new()));
        assert!(resolver.is_resolver());
        assert!(resolver.validate("pictures").is_ok());

        let mut with_collection = LinkConfig::resolver(|_, _| Ok(Vec::new()));
        with_collection.collection = Some("pictures".into());
        assert!(with_collection.validate("pictures").is_err());
    }

    #[test]
    fn test_link_names() {
        assert!(LinkConfig::one("users").validate("$filters").is_err());
        assert!(LinkConfig::one("users").validate("a.b").is_err());
        assert!(LinkConfig::one("users").validate("_id").is_err());
    }
}
