//! Aegis Document Events
//!
//! Change notifications emitted by the document engine after a write has
//! been applied. Listeners run synchronously on the writing thread and may
//! issue further writes through the engine they are handed.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::engine::DocumentEngine;
use crate::types::{Document, DocumentId};
use aegis_common::Result;

// =============================================================================
// Change Type
// =============================================================================

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Inserted,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

// =============================================================================
// Change Event
// =============================================================================

/// A change applied to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Inserted {
        collection: String,
        document: Document,
    },
    Updated {
        collection: String,
        before: Document,
        after: Document,
    },
    Deleted {
        collection: String,
        document: Document,
    },
}

impl ChangeEvent {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Inserted { .. } => ChangeType::Inserted,
            Self::Updated { .. } => ChangeType::Updated,
            Self::Deleted { .. } => ChangeType::Deleted,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Inserted { collection, .. }
            | Self::Updated { collection, .. }
            | Self::Deleted { collection, .. } => collection,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Inserted { document, .. } | Self::Deleted { document, .. } => &document.id,
            Self::Updated { after, .. } => &after.id,
        }
    }
}

// =============================================================================
// Change Listener
// =============================================================================

/// Receives change events from a [`DocumentEngine`].
///
/// An error returned here is handed back to the caller whose write raised
/// the event. The write itself stays applied.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, engine: &DocumentEngine, event: &ChangeEvent) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================
