//! Aegis Config - Configuration Structures
//!
//! Configuration for the document store and the nested query engine.
//! Supports loading from TOML files and programmatic construction, with
//! defaults suitable for development.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Store Configuration
// =============================================================================

/// Configuration for the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_collections: usize,
    pub validate_on_write: bool,
    /// Index every owning-side link storage field, even when the link did
    /// not ask for it.
    pub index_link_fields: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_collections: 1000,
            validate_on_write: true,
            index_link_fields: false,
        }
    }
}

// =============================================================================
// Query Configuration
// =============================================================================

/// Configuration for nested query resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_mode: ExecutionMode,
    /// Maximum relationship nesting accepted in one specification.
    pub max_depth: usize,
    /// Apply per-parent skip/limit inside the aggregation group stage.
    pub group_slicing: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::Recursive,
            max_depth: 16,
            group_slicing: true,
        }
    }
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::AegisError::Configuration(e.to_string()))
    }

    /// Configuration that resolves every query with the batched engine.
    pub fn batched() -> Self {
        Self {
            query: QueryConfig {
                default_mode: ExecutionMode::Batched,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.query.default_mode, ExecutionMode::Recursive);
        assert_eq!(config.query.max_depth, 16);
        assert!(config.query.group_slicing);
        assert!(config.store.validate_on_write);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [query]
            default_mode = "batched"
            group_slicing = false
            "#,
        )
        .unwrap();

        assert_eq!(config.query.default_mode, ExecutionMode::Batched);
        assert!(!config.query.group_slicing);
        assert_eq!(config.query.max_depth, 16);
        assert_eq!(config.store.max_collections, 1000);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("query = 3").unwrap_err();
        assert!(err.is_setup_error());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let path = temp_dir.path().join("aegis.toml");
        std::fs::write(
            &path,
            "[store]\nmax_collections = 8\nindex_link_fields = true\n\n[query]\nmax_depth = 4\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.store.max_collections, 8);
        assert!(config.store.index_link_fields);
        assert_eq!(config.query.max_depth, 4);
        assert_eq!(config.query.default_mode, ExecutionMode::Recursive);

        let err = Config::from_file(temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, crate::AegisError::Io(_)));
    }
}
