//! Aegis Query - Nested Query Resolution
//!
//! Resolves nested query specifications over linked document collections.
//! A specification names fields and relationships of a root collection;
//! the result is a tree of documents with every relationship attached
//! under its name.
//!
//! Key Features:
//! - JSON specifications with `$filters`, `$options` and `$all` per node
//! - Projection planning before any store call
//! - Recursive execution, one store query per parent row
//! - Batched execution, one store round trip per relationship level
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod graph;
pub mod parser;
pub mod planner;
pub mod executor;
pub mod pipeline;
pub mod assembler;
pub mod engine;

pub use graph::{CollectionNode, FieldNode, NodeOptions, NodePlan};
pub use parser::{ParseError, Parser};
pub use planner::{plan_graph, plan_node};
pub use executor::RecursiveExecutor;
pub use pipeline::group_pipeline;
pub use assembler::BatchedAssembler;
pub use engine::{resolve_query, QueryEngine};
