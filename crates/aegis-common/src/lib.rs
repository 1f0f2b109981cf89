//! Aegis Common - Shared Types and Utilities
//!
//! Foundational types used by every layer of the Aegis link graph: the
//! document store, the relationship layer and the nested query engine.
//!
//! Key Features:
//! - Unified error type with user/setup error classification
//! - Configuration structures loadable from TOML
//! - Opaque caller identity and execution mode selection
//! - Dotted field path helpers
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{Config, QueryConfig, StoreConfig};
pub use error::{AegisError, Result};
pub use types::{ExecutionMode, Principal};
