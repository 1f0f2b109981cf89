//! Aegis Links - Relationships Between Collections
//!
//! Declares how documents of one collection relate to documents of another
//! and gives per-document access to those relationships. Relationship data
//! lives in a storage field of the owning document; the other side can be
//! declared virtually and is resolved through the owner's field.
//!
//! Key Features:
//! - Five strategies: single, single-meta, many, many-meta and resolver
//! - Virtual (inverse) links bound lazily to their owning side
//! - Schema extension and indexing of storage fields at registration
//! - Integrity cascades on delete: detach from owners, autoremove related
//! - Per-collection firewalls for relationship queries
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod linker;
pub mod accessors;
pub mod registry;
pub mod integrity;

pub use config::{parse_links, LinkConfig, LinkType, MetadataDecl, ResolveArgs, ResolverFn};
pub use linker::{Linker, Strategy};
pub use accessors::{
    Cursor, LinkAccessor, LinkMany, LinkManyMeta, LinkOne, LinkOneMeta, LinkResolve, Targets,
};
pub use registry::{Firewall, Links};
pub use integrity::IntegrityManager;
