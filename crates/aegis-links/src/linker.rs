//! Aegis Linker
//!
//! The resolved runtime form of one link declaration. A linker knows its
//! strategy, where the relationship is stored, how to build the filter that
//! finds the related documents of a parent, and which accessor type serves
//! it. Linkers are immutable once built and shared across queries.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::accessors::{Binding, LinkAccessor, LinkMany, LinkManyMeta, LinkOne, LinkOneMeta, LinkResolve};
use crate::registry::Firewall;
use crate::config::{LinkConfig, LinkType, MetadataDecl, ResolverFn};
use aegis_common::utils::sanitize_segment;
use aegis_common::{AegisError, Result};
use aegis_document::{Document, DocumentEngine, FieldSchema, Filter, Value};
use std::fmt;
use std::sync::{Arc, Weak};

// =============================================================================
// Strategy
// =============================================================================

/// The resolved shape of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Single,
    SingleMeta,
    Many,
    ManyMeta,
    Resolver,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::SingleMeta => "single-meta",
            Self::Many => "many",
            Self::ManyMeta => "many-meta",
            Self::Resolver => "resolver",
        }
    }

    fn storage_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Single => Some("id"),
            Self::SingleMeta => Some("meta"),
            Self::Many => Some("ids"),
            Self::ManyMeta => Some("metas"),
            Self::Resolver => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Linker
// =============================================================================

/// One declared relationship on one collection.
pub struct Linker {
    name: String,
    collection: String,
    related: Option<String>,
    link_type: LinkType,
    metadata: Option<MetadataDecl>,
    storage_field: Option<String>,
    inverse: Option<Weak<Linker>>,
    inverse_unique: bool,
    index: bool,
    unique: bool,
    autoremove: bool,
    resolver: Option<ResolverFn>,
}

impl fmt::Debug for Linker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linker")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("related", &self.related)
            .field("strategy", &self.strategy())
            .field("storage_field", &self.storage_field)
            .field("virtual", &self.is_virtual())
            .finish()
    }
}

impl Linker {
    /// Build a storage or resolver linker. Virtual declarations go through
    /// [`Linker::new_virtual`].
    pub fn new(collection: &str, name: &str, config: LinkConfig) -> Result<Self> {
        config.validate(name)?;
        if config.is_virtual() {
            return Err(AegisError::invalid_config(format!(
                "link '{}' is virtual and needs its inverse to be built",
                name
            )));
        }

        let link_type = config.link_type.unwrap_or(if config.is_resolver() {
            LinkType::Many
        } else {
            LinkType::One
        });

        let mut linker = Self {
            name: name.to_string(),
            collection: collection.to_string(),
            related: config.collection,
            link_type,
            metadata: config.metadata.filter(MetadataDecl::is_enabled),
            storage_field: None,
            inverse: None,
            inverse_unique: false,
            index: config.index,
            unique: config.unique,
            autoremove: config.autoremove,
            resolver: config.resolve,
        };

        if !linker.is_resolver() {
            linker.storage_field = Some(match config.field {
                Some(field) => field,
                None => linker.generated_field_name(),
            });
        }

        Ok(linker)
    }

    /// Build the virtual side of `inverse`. Storage field, metadata and
    /// cardinality are copied from it.
    pub fn new_virtual(collection: &str, name: &str, config: LinkConfig, inverse: &Arc<Linker>) -> Result<Self> {
        config.validate(name)?;

        let fail = |msg: &str| {
            Err(AegisError::invalid_config(format!(
                "link '{}' on '{}': inverse '{}' {}",
                name,
                collection,
                inverse.name(),
                msg
            )))
        };

        if inverse.is_virtual() {
            return fail("is itself virtual");
        }
        if inverse.is_resolver() {
            return fail("is a resolver link");
        }
        if inverse.related_collection() != Some(collection) {
            return fail("does not point back at this collection");
        }
        if config.collection.as_deref() != Some(inverse.collection()) {
            return fail("is declared on another collection");
        }

        Ok(Self {
            name: name.to_string(),
            collection: collection.to_string(),
            related: config.collection,
            link_type: inverse.link_type,
            metadata: inverse.metadata.clone(),
            storage_field: inverse.storage_field.clone(),
            inverse: Some(Arc::downgrade(inverse)),
            inverse_unique: inverse.unique,
            index: false,
            unique: false,
            autoremove: false,
            resolver: None,
        })
    }

    fn generated_field_name(&self) -> String {
        let related = self.related.as_deref().unwrap_or_default();
        let suffix = self.strategy().storage_suffix().unwrap_or_default();
        format!("{}_{}_{}", self.name, sanitize_segment(related), suffix)
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection this link is declared on.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn strategy(&self) -> Strategy {
        if self.is_resolver() {
            return Strategy::Resolver;
        }
        match (self.link_type, self.is_meta()) {
            (LinkType::One, false) => Strategy::Single,
            (LinkType::One, true) => Strategy::SingleMeta,
            (LinkType::Many, false) => Strategy::Many,
            (LinkType::Many, true) => Strategy::ManyMeta,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.inverse.is_some()
    }

    pub fn is_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn is_single(&self) -> bool {
        self.link_type == LinkType::One
    }

    pub fn is_many(&self) -> bool {
        self.link_type == LinkType::Many
    }

    pub fn is_meta(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn is_indexed(&self) -> bool {
        self.index || self.unique
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_autoremove(&self) -> bool {
        self.autoremove
    }

    pub fn metadata(&self) -> Option<&MetadataDecl> {
        self.metadata.as_ref()
    }

    /// Field holding the relationship. For a virtual link this is the
    /// inverse's field on the related documents; resolver links have none.
    pub fn link_storage_field(&self) -> Option<&str> {
        self.storage_field.as_deref()
    }

    /// `None` for resolver links.
    pub fn related_collection(&self) -> Option<&str> {
        if self.is_resolver() {
            return None;
        }
        self.related.as_deref()
    }

    /// The owning link a virtual link mirrors.
    pub fn related_linker(&self) -> Option<Arc<Linker>> {
        self.inverse.as_ref().and_then(Weak::upgrade)
    }

    pub fn resolver(&self) -> Option<&ResolverFn> {
        self.resolver.as_ref()
    }

    /// True when fetched results collapse to one object instead of a list.
    pub fn is_one_result(&self) -> bool {
        if self.is_virtual() {
            self.inverse_unique
        } else {
            self.is_single()
        }
    }

    /// Shape fetched results the way this link presents them: the first
    /// result (or null) for one-result links, a list otherwise.
    pub fn collapse(&self, mut results: Vec<Value>) -> Value {
        if !self.is_one_result() {
            return Value::Array(results);
        }
        if results.is_empty() {
            Value::Null
        } else {
            results.swap_remove(0)
        }
    }

    /// Path whose values are identifiers: the storage field itself, or its
    /// `_id` subfield when metadata is stored.
    pub fn join_key_path(&self) -> Option<String> {
        let field = self.storage_field.as_deref()?;
        Some(if self.is_meta() {
            format!("{}._id", field)
        } else {
            field.to_string()
        })
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Identifiers a storage-owning parent points at.
    pub fn linked_ids(&self, parent: &Document) -> Vec<Value> {
        let Some(path) = self.join_key_path() else {
            return Vec::new();
        };

        let mut ids: Vec<Value> = Vec::new();
        for value in parent.lookup(&path) {
            let candidates = match value.as_ref() {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            for id in candidates {
                if !id.is_null() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Filter selecting the related documents of `parent`.
    pub fn search_filter(&self, parent: &Document) -> Result<Filter> {
        let Some(path) = self.join_key_path() else {
            return Err(AegisError::InvalidStrategy(format!(
                "link '{}' has no storage to search",
                self.name
            )));
        };

        if self.is_virtual() {
            Ok(Filter::eq(path, parent.id.to_value()))
        } else {
            Ok(Filter::in_values("_id", self.linked_ids(parent)))
        }
    }

    /// Schema descriptor of the storage field.
    pub fn schema_descriptor(&self) -> Option<FieldSchema> {
        if self.is_virtual() || self.is_resolver() {
            return None;
        }

        let element = match self.metadata {
            None => FieldSchema::string(),
            Some(ref metadata) => metadata.entry_schema().unwrap_or_else(FieldSchema::blackbox),
        };

        let descriptor = if self.is_many() {
            FieldSchema::array(element)
        } else {
            element
        };
        Some(descriptor.nullable())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Create the accessor matching this link's strategy, bound to
    /// `document`. Without a document the accessor is bound to an empty,
    /// unsaved one. `firewall` guards principal-scoped reads.
    pub fn create_accessor(
        self: &Arc<Self>,
        engine: &Arc<DocumentEngine>,
        document: Option<Document>,
        firewall: Option<Arc<dyn Firewall>>,
    ) -> Result<Box<dyn LinkAccessor>> {
        let binding = Binding::new(Arc::clone(self), Arc::clone(engine), document.unwrap_or_default(), firewall);

        Ok(match self.strategy() {
            Strategy::Single => Box::new(LinkOne::from_binding(binding)),
            Strategy::SingleMeta => Box::new(LinkOneMeta::from_binding(binding)),
            Strategy::Many => Box::new(LinkMany::from_binding(binding)),
            Strategy::ManyMeta => Box::new(LinkManyMeta::from_binding(binding)),
            Strategy::Resolver => Box::new(LinkResolve::from_binding(binding)),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_document::FieldType;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_strategies_and_generated_fields() {
        let cases = [
            (LinkConfig::one("users"), Strategy::Single, "author_users_id"),
            (LinkConfig::one("users").with_metadata(), Strategy::SingleMeta, "author_users_meta"),
            (LinkConfig::many("users"), Strategy::Many, "author_users_ids"),
            (LinkConfig::many("users").with_metadata(), Strategy::ManyMeta, "author_users_metas"),
        ];

        for (config, strategy, field) in cases {
            let linker = Linker::new("posts", "author", config).unwrap();
            assert_eq!(linker.strategy(), strategy);
            assert_eq!(linker.link_storage_field(), Some(field));
        }

        let dotted = Linker::new("posts", "files", LinkConfig::many("app.files")).unwrap();
        assert_eq!(dotted.link_storage_field(), Some("files_app_files_ids"));
    }

    #[test]
    fn test_default_cardinality() {
        let mut config = LinkConfig::one("users");
        config.link_type = None;
        assert!(Linker::new("posts", "author", config).unwrap().is_single());

        let resolver = Linker::new("posts", "pictures", LinkConfig::resolver(|_, _| Ok(vec![]))).unwrap();
        assert!(resolver.is_many());
        assert_eq!(resolver.strategy(), Strategy::Resolver);
        assert_eq!(resolver.related_collection(), None);
        assert_eq!(resolver.link_storage_field(), None);
    }

    #[test]
    fn test_metadata_flag_false_is_plain() {
        let mut config = LinkConfig::many("tags");
        config.metadata = Some(MetadataDecl::Flag(false));
        assert_eq!(Linker::new("posts", "tags", config).unwrap().strategy(), Strategy::Many);
    }

    #[test]
    fn test_virtual_copies_inverse() {
        let owner = Arc::new(
            Linker::new("posts", "tags", LinkConfig::many("tags").field("tagIds").with_metadata()).unwrap(),
        );
        let posts = Linker::new_virtual("tags", "posts", LinkConfig::inverse("posts", "tags"), &owner).unwrap();

        assert!(posts.is_virtual());
        assert_eq!(posts.link_storage_field(), Some("tagIds"));
        assert_eq!(posts.strategy(), Strategy::ManyMeta);
        assert!(!posts.is_one_result());
        assert_eq!(posts.related_linker().unwrap().name(), "tags");
        assert_eq!(posts.schema_descriptor(), None);
    }

    #[test]
    fn test_virtual_rejects_wrong_inverse() {
        let owner = Arc::new(Linker::new("posts", "author", LinkConfig::one("users")).unwrap());
        let err = Linker::new_virtual("groups", "posts", LinkConfig::inverse("posts", "author"), &owner).unwrap_err();
        assert!(matches!(err, AegisError::InvalidConfig(_)));
    }

    #[test]
    fn test_one_result_rule() {
        let owner = Arc::new(Linker::new("users", "profile", LinkConfig::one("profiles").unique()).unwrap());
        let user = Linker::new_virtual("profiles", "user", LinkConfig::inverse("users", "profile"), &owner).unwrap();
        assert!(owner.is_one_result());
        assert!(user.is_one_result());

        let author = Arc::new(Linker::new("posts", "author", LinkConfig::one("users")).unwrap());
        let posts = Linker::new_virtual("users", "posts", LinkConfig::inverse("posts", "author"), &author).unwrap();
        assert!(!posts.is_one_result());
    }

    #[test]
    fn test_search_filters() {
        let tags = Linker::new("posts", "tags", LinkConfig::many("tags").field("tagIds")).unwrap();
        let post = doc(json!({"_id": "p1", "tagIds": ["t1", "t2", "t1"]}));
        assert_eq!(
            tags.search_filter(&post).unwrap(),
            Filter::in_values("_id", vec!["t1".into(), "t2".into()])
        );

        let groups = Arc::new(
            Linker::new("users", "groups", LinkConfig::many("groups").field("groupIds").with_metadata()).unwrap(),
        );
        let user = doc(json!({"_id": "u1", "groupIds": [{"_id": "g1", "role": "admin"}, {"_id": "g2"}]}));
        assert_eq!(
            groups.search_filter(&user).unwrap(),
            Filter::in_values("_id", vec!["g1".into(), "g2".into()])
        );

        let users = Linker::new_virtual("groups", "users", LinkConfig::inverse("users", "groups"), &groups).unwrap();
        let group = doc(json!({"_id": "g1"}));
        assert_eq!(users.search_filter(&group).unwrap(), Filter::eq("groupIds._id", "g1"));

        let empty = doc(json!({"_id": "p2"}));
        assert_eq!(tags.search_filter(&empty).unwrap(), Filter::in_values("_id", vec![]));
    }

    #[test]
    fn test_schema_descriptors() {
        let single = Linker::new("posts", "author", LinkConfig::one("users")).unwrap();
        assert_eq!(single.schema_descriptor().unwrap().field_type, FieldType::String);

        let many = Linker::new("posts", "tags", LinkConfig::many("tags")).unwrap();
        let descriptor = many.schema_descriptor().unwrap();
        assert_eq!(descriptor.field_type, FieldType::Array);
        assert!(descriptor.validate(&Value::from(json!(["t1"]))).is_ok());

        let meta = Linker::new(
            "posts",
            "category",
            LinkConfig::one("categories").metadata_fields([("date", FieldSchema::string())]),
        )
        .unwrap();
        let descriptor = meta.schema_descriptor().unwrap();
        assert!(descriptor.validate(&Value::from(json!({"_id": "c1", "date": "x"}))).is_ok());
        assert!(descriptor.validate(&Value::from(json!({"_id": "c1", "other": 1}))).is_err());
    }
}
