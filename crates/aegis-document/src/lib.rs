//! Aegis Document - Document Store Engine
//!
//! Schemaless document storage backing the link graph. Provides dotted-path
//! filters with array fan-out, inclusion projections, atomic update
//! operators, multikey indexes, a grouping aggregation pipeline and change
//! notifications.
//!
//! Key Features:
//! - Mongo-style selectors parsed from JSON
//! - Field-level update operators applied atomically per document
//! - Hash and unique indexes over array-valued fields
//! - Runtime-extensible schema validation
//! - Post-write change events for integrity listeners
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod types;
pub mod collection;
pub mod index;
pub mod query;
pub mod projection;
pub mod update;
pub mod aggregate;
pub mod validation;
pub mod events;
pub mod engine;

pub use types::{Document, DocumentId, Value};
pub use collection::{Collection, CollectionError};
pub use index::{DocumentIndex, IndexKey, IndexType};
pub use query::{Filter, Query, QueryBuilder, QueryResult, Sort};
pub use projection::Projection;
pub use update::UpdateOp;
pub use aggregate::{AggregateResult, Group, Pipeline, Slice};
pub use validation::{FieldSchema, FieldType, Schema, ValidationResult};
pub use events::{ChangeEvent, ChangeListener, ChangeType};
pub use engine::DocumentEngine;
