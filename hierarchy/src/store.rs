//! Store contracts

use crate::errors::Result;
use crate::ids::{ChunkId, ContentRef, DirectoryId, DocumentId, LineageId};
use crate::model::{
    Chunk, Directory, Document, NewChunk, NewDocument, NewVersion, Ownership, TenantScope,
    VersionPolicy,
};
use async_trait::async_trait;

/// Address of a directory: canonical path or id.
#[derive(Debug, Clone, Copy)]
pub enum DirectoryRef<'a> {
    Path(&'a str),
    Id(DirectoryId),
}

/// Tenant-scoped, read-only view used at query time.
///
/// A caller scoped to sub-tenant T sees shared items plus items private to
/// T. Documents and chunks are visible only when their directory chain is.
/// An id outside the caller's scope yields `TenantViolation`; a path
/// outside it yields `NotFound`. Listings are never errors when empty.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn root(&self) -> Result<Directory>;

    async fn directory(&self, reference: DirectoryRef<'_>, scope: &TenantScope)
    -> Result<Directory>;

    /// Visible children ordered by path.
    async fn list_children(&self, id: DirectoryId, scope: &TenantScope) -> Result<Vec<Directory>>;

    /// Visible documents ordered by name then version.
    async fn list_documents(
        &self,
        id: DirectoryId,
        scope: &TenantScope,
        policy: &VersionPolicy,
    ) -> Result<Vec<Document>>;

    /// Chunks of one document version ordered by ordinal.
    async fn list_chunks(&self, document: DocumentId, scope: &TenantScope) -> Result<Vec<Chunk>>;

    async fn chunk_content(&self, chunk: ChunkId, scope: &TenantScope) -> Result<String>;
}

/// Unscoped write side used by ingestion.
#[async_trait]
pub trait HierarchyWriter: HierarchyStore {
    /// Return the directory at `path`, creating it and any missing
    /// ancestors with `ownership`.
    async fn ensure_directory(&self, path: &str, ownership: Ownership) -> Result<Directory>;

    async fn get_directory(&self, id: DirectoryId) -> Result<Directory>;

    async fn put_content(&self, text: String) -> Result<ContentRef>;

    async fn content(&self, reference: ContentRef) -> Result<String>;

    /// Version 1 of a fresh lineage.
    async fn create_document(&self, new: NewDocument) -> Result<Document>;

    /// Next version of `lineage`.
    async fn create_next_version(&self, lineage: LineageId, new: NewVersion) -> Result<Document>;

    /// Attach the full chunk set of a document version. Ordinals are
    /// assigned from 0 in input order; a second call is a `Conflict`.
    async fn attach_chunks(&self, document: DocumentId, chunks: Vec<NewChunk>)
    -> Result<Vec<Chunk>>;

    async fn document(&self, id: DocumentId) -> Result<Document>;

    /// Every version of a lineage, oldest first.
    async fn lineage_versions(&self, lineage: LineageId) -> Result<Vec<Document>>;

    async fn children_of(&self, id: DirectoryId) -> Result<Vec<Directory>>;

    /// Latest version of every lineage in the directory.
    async fn documents_in(&self, id: DirectoryId) -> Result<Vec<Document>>;

    async fn chunks_of(&self, document: DocumentId) -> Result<Vec<Chunk>>;

    async fn set_directory_summary(&self, id: DirectoryId, summary: String) -> Result<()>;

    async fn set_document_summary(&self, id: DocumentId, summary: String) -> Result<()>;

    async fn set_chunk_summary(&self, id: ChunkId, summary: String) -> Result<()>;
}
