//! Aegis Link Registry
//!
//! Holds every declared relationship, per collection. Registration
//! validates a whole batch before anything is applied, extends collection
//! schemas and indexes for storage links, and binds virtual links to their
//! inverse as soon as both sides are known.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::accessors::LinkAccessor;
use crate::config::{parse_links, LinkConfig};
use crate::integrity::IntegrityManager;
use crate::linker::Linker;
use aegis_common::{AegisError, Principal, Result};
use aegis_document::{Document, DocumentEngine, DocumentId, Query};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

// =============================================================================
// Firewall
// =============================================================================

/// Pre-check run before a direct relationship query on a collection. It
/// may narrow the query with extra filters or reject it with
/// [`AegisError::AccessDenied`]. Changes to sort, skip, limit or projection
/// are discarded by [`Links::apply_firewall`].
pub trait Firewall: Send + Sync {
    fn filter(&self, query: &mut Query, principal: &Principal) -> Result<()>;
}

impl<F> Firewall for F
where
    F: Fn(&mut Query, &Principal) -> Result<()> + Send + Sync,
{
    fn filter(&self, query: &mut Query, principal: &Principal) -> Result<()> {
        self(query, principal)
    }
}

// =============================================================================
// Links
// =============================================================================

/// A virtual declaration whose inverse is not registered yet.
struct PendingLink {
    collection: String,
    name: String,
    config: LinkConfig,
}

impl PendingLink {
    fn inverse_collection(&self) -> &str {
        self.config.collection.as_deref().unwrap_or_default()
    }

    fn inverse_name(&self) -> &str {
        self.config.inversed_by.as_deref().unwrap_or_default()
    }
}

/// The relationship registry of one document engine.
pub struct Links {
    engine: Arc<DocumentEngine>,
    linkers: RwLock<HashMap<String, BTreeMap<String, Arc<Linker>>>>,
    pending: RwLock<Vec<PendingLink>>,
    firewalls: RwLock<HashMap<String, Arc<dyn Firewall>>>,
}

impl Links {
    /// Create a registry and subscribe its integrity manager to the
    /// engine's delete notifications.
    pub fn new(engine: Arc<DocumentEngine>) -> Arc<Self> {
        let links = Arc::new(Self {
            engine: Arc::clone(&engine),
            linkers: RwLock::new(HashMap::new()),
            pending: RwLock::new(Vec::new()),
            firewalls: RwLock::new(HashMap::new()),
        });
        engine.subscribe(Arc::new(IntegrityManager::new(Arc::downgrade(&links))));
        links
    }

    pub fn engine(&self) -> &Arc<DocumentEngine> {
        &self.engine
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register relationships on `collection`. The batch is applied only if
    /// every declaration in it is valid and every schema and index change
    /// it implies can be made.
    ///
    /// All checks run before the first change. The apply phase itself is
    /// not atomic against concurrent writers: a document written between the
    /// check and the index build can still make a unique index fail.
    pub fn add_links<S>(&self, collection: &str, links: impl IntoIterator<Item = (S, LinkConfig)>) -> Result<()>
    where
        S: Into<String>,
    {
        let links: Vec<(String, LinkConfig)> = links.into_iter().map(|(n, c)| (n.into(), c)).collect();

        let mut seen = HashSet::new();
        for (name, config) in &links {
            config.validate(name)?;
            if !seen.insert(name.as_str()) || self.is_declared(collection, name) {
                return Err(AegisError::invalid_config(format!(
                    "link '{}' is already declared on '{}'",
                    name, collection
                )));
            }
        }

        let touched: Vec<String> = std::iter::once(collection.to_string())
            .chain(links.iter().filter_map(|(_, c)| c.collection.clone()))
            .collect();
        self.engine.check_capacity(touched.iter().map(String::as_str))?;

        let (owning, virtuals): (Vec<_>, Vec<_>) = links.into_iter().partition(|(_, c)| !c.is_virtual());

        let mut built: Vec<Arc<Linker>> = Vec::new();
        for (name, config) in owning {
            built.push(Arc::new(Linker::new(collection, &name, config)?));
        }
        self.check_storage_fields(collection, &built)?;

        let mut waiting = Vec::new();
        for (name, config) in virtuals {
            let inverse_collection = config.collection.clone().unwrap_or_default();
            let inverse_name = config.inversed_by.clone().unwrap_or_default();
            let inverse = if inverse_collection == collection {
                built.iter().find(|l| l.name() == inverse_name).cloned()
            } else {
                None
            }
            .or_else(|| self.get_linker(&inverse_collection, &inverse_name));

            match inverse {
                Some(inverse) => built.push(Arc::new(Linker::new_virtual(collection, &name, config, &inverse)?)),
                None => waiting.push(PendingLink {
                    collection: collection.to_string(),
                    name,
                    config,
                }),
            }
        }

        let bound = self.bind_pending(collection, &built)?;
        for linker in &built {
            self.check_storage(linker)?;
        }

        for name in &touched {
            self.engine.ensure_collection(name)?;
        }
        for linker in &built {
            self.prepare_storage(linker)?;
        }

        {
            let mut linkers = self.linkers.write();
            let entry = linkers.entry(collection.to_string()).or_default();
            for linker in &built {
                entry.insert(linker.name().to_string(), Arc::clone(linker));
            }
            for linker in &bound {
                linkers
                    .entry(linker.collection().to_string())
                    .or_default()
                    .insert(linker.name().to_string(), Arc::clone(linker));
            }
        }
        tracing::info!("Registered {} links on collection '{}'", built.len(), collection);

        let mut pending = self.pending.write();
        pending.retain(|p| {
            !bound
                .iter()
                .any(|l| l.collection() == p.collection && l.name() == p.name)
        });
        for linker in &bound {
            tracing::info!(
                "Bound virtual link '{}' on '{}' to its inverse on '{}'",
                linker.name(),
                linker.collection(),
                collection
            );
        }
        for link in &waiting {
            tracing::warn!(
                "Link '{}' on '{}' waits for its inverse '{}' on '{}'",
                link.name,
                link.collection,
                link.inverse_name(),
                link.inverse_collection()
            );
        }
        pending.extend(waiting);
        Ok(())
    }

    /// Register links from a JSON object of `{name: declaration}`.
    pub fn add_links_json(&self, collection: &str, declarations: &serde_json::Value) -> Result<()> {
        self.add_links(collection, parse_links(declarations)?)
    }

    fn is_declared(&self, collection: &str, name: &str) -> bool {
        self.get_linker(collection, name).is_some() || self.is_pending(collection, name)
    }

    fn check_storage_fields(&self, collection: &str, built: &[Arc<Linker>]) -> Result<()> {
        let existing = self.linkers(collection);
        let mut fields: HashMap<String, String> = existing
            .iter()
            .filter(|l| !l.is_virtual())
            .filter_map(|l| l.link_storage_field().map(|f| (f.to_string(), l.name().to_string())))
            .collect();
        let mut names: HashSet<String> = existing.iter().map(|l| l.name().to_string()).collect();
        names.extend(built.iter().map(|l| l.name().to_string()));
        names.extend(
            self.pending
                .read()
                .iter()
                .filter(|p| p.collection == collection)
                .map(|p| p.name.clone()),
        );

        for linker in built {
            let Some(field) = linker.link_storage_field() else {
                continue;
            };
            if names.contains(field) {
                return Err(AegisError::invalid_config(format!(
                    "storage field '{}' of link '{}' shadows a link on '{}'",
                    field,
                    linker.name(),
                    collection
                )));
            }
            if let Some(other) = fields.insert(field.to_string(), linker.name().to_string()) {
                return Err(AegisError::invalid_config(format!(
                    "links '{}' and '{}' on '{}' share storage field '{}'",
                    other,
                    linker.name(),
                    collection,
                    field
                )));
            }
        }
        Ok(())
    }

    /// Index path a storage link needs, with its uniqueness.
    fn storage_index(&self, linker: &Linker) -> Option<(String, bool)> {
        if linker.is_virtual() || linker.is_resolver() {
            return None;
        }
        if !linker.is_indexed() && !self.engine.config().index_link_fields {
            return None;
        }
        linker.join_key_path().map(|path| (path, linker.is_unique()))
    }

    /// Fail if the index of a storage link cannot be built over stored data.
    fn check_storage(&self, linker: &Linker) -> Result<()> {
        let Some((path, unique)) = self.storage_index(linker) else {
            return Ok(());
        };
        match self.engine.collection(linker.collection()) {
            Ok(collection) => Ok(collection.check_index(&path, unique)?),
            Err(AegisError::CollectionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Schema extension and indexing of a storage link.
    fn prepare_storage(&self, linker: &Linker) -> Result<()> {
        if linker.is_virtual() || linker.is_resolver() {
            return Ok(());
        }

        let collection = self.engine.collection(linker.collection())?;
        if let (Some(field), Some(descriptor)) = (linker.link_storage_field(), linker.schema_descriptor()) {
            if collection.extend_schema(field, descriptor) {
                tracing::debug!("Extended schema of '{}' with link field '{}'", linker.collection(), field);
            }
        }

        if let Some((path, unique)) = self.storage_index(linker) {
            collection.ensure_index(&path, unique)?;
        }
        Ok(())
    }

    /// Build the pending virtual links whose inverse is among `built`.
    /// Nothing is removed from the pending list here.
    fn bind_pending(&self, collection: &str, built: &[Arc<Linker>]) -> Result<Vec<Arc<Linker>>> {
        let pending = self.pending.read();
        let mut bound = Vec::new();
        for link in pending.iter().filter(|p| p.inverse_collection() == collection) {
            let Some(inverse) = built.iter().find(|l| l.name() == link.inverse_name()) else {
                continue;
            };
            bound.push(Arc::new(Linker::new_virtual(
                &link.collection,
                &link.name,
                link.config.clone(),
                inverse,
            )?));
        }
        Ok(bound)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// The bound linker `name` on `collection`. Pending links are not
    /// returned.
    pub fn get_linker(&self, collection: &str, name: &str) -> Option<Arc<Linker>> {
        self.linkers
            .read()
            .get(collection)
            .and_then(|links| links.get(name))
            .cloned()
    }

    /// Like [`Links::get_linker`], failing with `InvalidConfig` for
    /// pending or unknown links.
    pub fn linker(&self, collection: &str, name: &str) -> Result<Arc<Linker>> {
        if let Some(linker) = self.get_linker(collection, name) {
            return Ok(linker);
        }
        if self.is_pending(collection, name) {
            return Err(AegisError::invalid_config(format!(
                "link '{}' on '{}' is virtual and its inverse has not been declared",
                name, collection
            )));
        }
        Err(AegisError::invalid_config(format!(
            "no link named '{}' on '{}'",
            name, collection
        )))
    }

    /// Every bound linker of `collection`, ordered by name.
    pub fn linkers(&self, collection: &str) -> Vec<Arc<Linker>> {
        self.linkers
            .read()
            .get(collection)
            .map(|links| links.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_link(&self, collection: &str, name: &str) -> bool {
        self.is_declared(collection, name)
    }

    pub fn is_pending(&self, collection: &str, name: &str) -> bool {
        self.pending
            .read()
            .iter()
            .any(|p| p.collection == collection && p.name == name)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Accessor for relationship `name` of `document`. Without a document
    /// the accessor is bound to an empty placeholder. The firewall of the
    /// related collection goes with it for [`LinkAccessor::fetch_as`].
    pub fn create_link(
        &self,
        collection: &str,
        document: Option<Document>,
        name: &str,
    ) -> Result<Box<dyn LinkAccessor>> {
        let linker = self.linker(collection, name)?;
        let firewall = linker.related_collection().and_then(|related| self.firewall(related));
        linker.create_accessor(&self.engine, document, firewall)
    }

    /// Accessor for relationship `name` of the stored document `id`.
    pub fn link_of(&self, collection: &str, id: &DocumentId, name: &str) -> Result<Box<dyn LinkAccessor>> {
        let document = self
            .engine
            .get(collection, id)?
            .ok_or_else(|| AegisError::DocumentNotFound(id.to_string()))?;
        self.create_link(collection, Some(document), name)
    }

    /// Delete a document through the engine so integrity cascades run.
    pub fn remove(&self, collection: &str, id: &DocumentId) -> Result<Document> {
        self.engine.delete(collection, id)
    }

    // -------------------------------------------------------------------------
    // Firewalls
    // -------------------------------------------------------------------------

    pub fn set_firewall(&self, collection: &str, firewall: impl Firewall + 'static) {
        self.firewalls
            .write()
            .insert(collection.to_string(), Arc::new(firewall));
    }

    pub fn firewall(&self, collection: &str) -> Option<Arc<dyn Firewall>> {
        self.firewalls.read().get(collection).cloned()
    }

    /// Run the firewall of `collection`, if any, over `query`.
    pub fn apply_firewall(&self, collection: &str, query: &mut Query, principal: &Principal) -> Result<()> {
        match self.firewall(collection) {
            Some(firewall) => run_firewall(firewall.as_ref(), query, principal),
            None => Ok(()),
        }
    }
}

/// Run `firewall` over `query`. Only the filters it adds are kept; sort,
/// skip, limit and projection stay as the caller set them.
pub(crate) fn run_firewall(firewall: &dyn Firewall, query: &mut Query, principal: &Principal) -> Result<()> {
    let sort = query.sort.clone();
    let (skip, limit) = (query.skip, query.limit);
    let projection = query.projection.clone();
    firewall.filter(query, principal)?;

    query.sort = sort;
    query.skip = skip;
    query.limit = limit;
    query.projection = projection;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
