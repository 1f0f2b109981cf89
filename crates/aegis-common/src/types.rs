//! Aegis Types - Core Data Types
//!
//! Types threaded through every layer without being interpreted by it.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Principal
// =============================================================================

/// Identity of the caller on whose behalf a query runs.
///
/// The core never inspects it; it is handed to collection firewalls and to
/// resolver functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(Option<String>);

impl Principal {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "<anonymous>"),
        }
    }
}

// =============================================================================
// Execution Mode
// =============================================================================

/// Strategy used to resolve a nested query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One store query per parent row and relationship.
    #[default]
    Recursive,
    /// One store query (or aggregation) per relationship level, joined in memory.
    Batched,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recursive => "recursive",
            Self::Batched => "batched",
        }
    }
}
