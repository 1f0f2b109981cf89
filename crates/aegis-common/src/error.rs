//! Aegis Error - Unified Error Types
//!
//! Error handling shared by the store, link and query layers. Setup errors
//! (malformed link declarations) are fatal to collection initialisation;
//! everything else is raised at call time and is recoverable by the caller.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Aegis operations.
#[derive(Error, Debug)]
pub enum AegisError {
    // Link errors
    #[error("invalid link config: {0}")]
    InvalidConfig(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    // Store errors
    #[error("validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("duplicate document id: {0}")]
    DuplicateId(String),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    // Query errors
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("resolver error: {0}")]
    Resolver(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Aegis operations.
pub type Result<T> = std::result::Result<T, AegisError>;

// =============================================================================
// Error Classification
// =============================================================================

impl AegisError {
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AegisError::InvalidOperation(_)
                | AegisError::ValidationFailed(_)
                | AegisError::DocumentNotFound(_)
                | AegisError::DuplicateId(_)
                | AegisError::UniqueViolation(_)
                | AegisError::InvalidQuery(_)
                | AegisError::AccessDenied(_)
        )
    }

    /// Returns true if the error is raised while declaring collections and
    /// links, before any query runs.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            AegisError::InvalidConfig(_) | AegisError::Configuration(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
