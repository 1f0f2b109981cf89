//! Aegis Link Integrity
//!
//! Referential-integrity cascades, run when the document engine reports a
//! deletion. Deleting the target of a virtual link detaches it from every
//! owning document; deleting the owner of an `autoremove` link deletes the
//! documents it points at.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::registry::Links;
use aegis_common::Result;
use aegis_document::{ChangeEvent, ChangeListener, Document, DocumentEngine, Filter, Query};
use std::sync::Weak;

// =============================================================================
// Integrity Manager
// =============================================================================

/// Listener executing link cascades for one [`Links`] registry.
pub struct IntegrityManager {
    links: Weak<Links>,
}

impl IntegrityManager {
    pub fn new(links: Weak<Links>) -> Self {
        Self { links }
    }

    /// Unset or pull `removed` from every document owning a link to it.
    fn detach(&self, links: &Links, collection: &str, removed: &Document) -> Result<usize> {
        let mut detached = 0;

        for linker in links.linkers(collection).into_iter().filter(|l| l.is_virtual()) {
            let Some(owner) = linker.related_linker() else {
                continue;
            };
            let query = Query::new().with_filter(linker.search_filter(removed)?);
            let owners = links.engine().find(owner.collection(), &query)?.documents;

            for doc in owners {
                let mut accessor = owner.create_accessor(links.engine(), Some(doc), None)?;
                if owner.is_single() {
                    accessor.unset()?;
                } else {
                    accessor.remove(removed.into())?;
                }
                detached += 1;
            }
        }
        Ok(detached)
    }

    /// Delete every document an `autoremove` link of `removed` points at.
    fn autoremove(&self, links: &Links, collection: &str, removed: &Document) -> Result<usize> {
        let mut deleted = 0;

        for linker in links.linkers(collection) {
            if linker.is_virtual() || !linker.is_autoremove() {
                continue;
            }
            let Some(related) = linker.related_collection() else {
                continue;
            };
            let ids = linker.linked_ids(removed);
            if ids.is_empty() {
                continue;
            }
            deleted += links
                .engine()
                .delete_matching(related, &[Filter::in_values("_id", ids)])?
                .len();
        }
        Ok(deleted)
    }
}

impl ChangeListener for IntegrityManager {
    fn on_change(&self, _engine: &DocumentEngine, event: &ChangeEvent) -> Result<()> {
        let ChangeEvent::Deleted { collection, document } = event else {
            return Ok(());
        };
        let Some(links) = self.links.upgrade() else {
            return Ok(());
        };

        let detached = self.detach(&links, collection, document)?;
        let deleted = self.autoremove(&links, collection, document)?;
        if detached > 0 || deleted > 0 {
            tracing::debug!(
                "Delete of '{}' in '{}' detached {} owners and removed {} related documents",
                document.id,
                collection,
                detached,
                deleted
            );
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
