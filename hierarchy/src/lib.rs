//! Atlas hierarchy store
//!
//! Owns the tree of directories and the versioned documents and chunks
//! attached to them. Pure data access: nothing in this crate reasons about
//! relevance.
//!
//! - [`HierarchyStore`]: tenant-scoped read contract used at query time
//! - [`HierarchyWriter`]: unscoped write contract used by ingestion
//! - [`MemoryHierarchy`]: arena-backed store (tests, embedding callers)
//! - [`SqliteHierarchy`]: rusqlite-backed store (CLI)

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod errors;
pub mod ids;
pub mod memory;
pub mod model;
pub mod path;
pub mod sqlite;
pub mod store;

pub use errors::{EntityKind, HierarchyError, Result};
pub use ids::{ChunkId, ContentRef, DirectoryId, DocumentId, LineageId, SubtenantId};
pub use memory::MemoryHierarchy;
pub use model::{
    Chunk, Directory, Document, NewChunk, NewDocument, NewVersion, Ownership, TenantScope,
    VersionPolicy,
};
pub use sqlite::SqliteHierarchy;
pub use store::{DirectoryRef, HierarchyStore, HierarchyWriter};
