//! Arena-backed hierarchy store
//!
//! Nodes live in id-keyed maps; structure is held in explicit
//! parent→children, directory→documents, lineage→versions and
//! document→chunks indexes. One `RwLock` guards the whole arena, and no
//! lock is held across an await.

use crate::errors::{EntityKind, HierarchyError, Result};
use crate::ids::{ChunkId, ContentRef, DirectoryId, DocumentId, LineageId, SubtenantId};
use crate::model::{
    Chunk, Directory, Document, NewChunk, NewDocument, NewVersion, Ownership, TenantScope,
    VersionPolicy, sort_directories,
};
use crate::path;
use crate::store::{DirectoryRef, HierarchyStore, HierarchyWriter};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct MemoryHierarchy {
    arena: RwLock<Arena>,
}

struct Arena {
    root: DirectoryId,
    directories: HashMap<DirectoryId, Directory>,
    children: HashMap<DirectoryId, Vec<DirectoryId>>,
    path_index: HashMap<(Option<SubtenantId>, String), DirectoryId>,
    documents: HashMap<DocumentId, Document>,
    directory_documents: HashMap<DirectoryId, Vec<DocumentId>>,
    lineages: HashMap<LineageId, Vec<DocumentId>>,
    chunks: HashMap<ChunkId, Chunk>,
    document_chunks: HashMap<DocumentId, Vec<ChunkId>>,
    contents: HashMap<ContentRef, String>,
}

impl Default for MemoryHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHierarchy {
    pub fn new() -> Self {
        let root = Directory {
            id: DirectoryId::new(),
            name: String::new(),
            path: path::ROOT.to_string(),
            parent: None,
            summary: None,
            ownership: Ownership::shared(),
            created_at: Utc::now(),
        };
        let arena = Arena {
            root: root.id,
            path_index: HashMap::from([((None, root.path.clone()), root.id)]),
            directories: HashMap::from([(root.id, root)]),
            children: HashMap::new(),
            documents: HashMap::new(),
            directory_documents: HashMap::new(),
            lineages: HashMap::new(),
            chunks: HashMap::new(),
            document_chunks: HashMap::new(),
            contents: HashMap::new(),
        };
        Self {
            arena: RwLock::new(arena),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Arena>> {
        self.arena
            .read()
            .map_err(|_| HierarchyError::storage("hierarchy lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Arena>> {
        self.arena
            .write()
            .map_err(|_| HierarchyError::storage("hierarchy lock poisoned"))
    }

    /// Verify structural invariants: every path matches its parent chain,
    /// the parent graph is acyclic and reaches the root, indexes agree with
    /// the records, versions count up from 1 and chunk ordinals are
    /// contiguous from 0.
    pub fn check_integrity(&self) -> Result<()> {
        let arena = self.read()?;
        arena.check_integrity()
    }
}

fn integrity(message: String) -> HierarchyError {
    HierarchyError::storage(format!("integrity violation: {message}"))
}

impl Arena {
    fn dir(&self, id: DirectoryId) -> Result<&Directory> {
        self.directories
            .get(&id)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Directory, id))
    }

    fn doc(&self, id: DocumentId) -> Result<&Document> {
        self.documents
            .get(&id)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Document, id))
    }

    fn chain_visible(&self, id: DirectoryId, scope: &TenantScope) -> bool {
        let mut current = Some(id);
        let mut steps = 0usize;
        while let Some(cursor) = current {
            let Some(dir) = self.directories.get(&cursor) else {
                return false;
            };
            if !dir.ownership.visible_to(scope) {
                return false;
            }
            steps += 1;
            if steps > self.directories.len() {
                return false;
            }
            current = dir.parent;
        }
        true
    }

    fn scoped_dir(&self, id: DirectoryId, scope: &TenantScope) -> Result<&Directory> {
        let dir = self.dir(id)?;
        if !self.chain_visible(id, scope) {
            return Err(HierarchyError::tenant_violation(
                EntityKind::Directory,
                id,
                scope,
            ));
        }
        Ok(dir)
    }

    fn scoped_doc(&self, id: DocumentId, scope: &TenantScope) -> Result<&Document> {
        let doc = self.doc(id)?;
        if !doc.ownership.visible_to(scope) || !self.chain_visible(doc.directory_id, scope) {
            return Err(HierarchyError::tenant_violation(
                EntityKind::Document,
                id,
                scope,
            ));
        }
        Ok(doc)
    }

    /// Caller's private directory first, then the shared one.
    fn lookup_path(&self, path: &str, scope: &TenantScope) -> Option<&Directory> {
        let private = scope
            .subtenant()
            .and_then(|owner| self.path_index.get(&(Some(owner), path.to_string())));
        private
            .or_else(|| self.path_index.get(&(None, path.to_string())))
            .and_then(|id| self.directories.get(id))
    }

    fn insert_directory(&mut self, parent: &Directory, name: &str, ownership: Ownership) -> Directory {
        let dir = Directory {
            id: DirectoryId::new(),
            name: name.to_string(),
            path: path::join(&parent.path, name),
            parent: Some(parent.id),
            summary: None,
            ownership,
            created_at: Utc::now(),
        };
        self.path_index
            .insert((ownership.scope_key(), dir.path.clone()), dir.id);
        self.children.entry(parent.id).or_default().push(dir.id);
        self.directories.insert(dir.id, dir.clone());
        tracing::debug!(path = %dir.path, id = %dir.id, "created directory");
        dir
    }

    fn require_content(&self, reference: ContentRef) -> Result<()> {
        if self.contents.contains_key(&reference) {
            Ok(())
        } else {
            Err(HierarchyError::not_found(EntityKind::Content, reference))
        }
    }

    fn children_of(&self, id: DirectoryId) -> Vec<Directory> {
        let mut dirs: Vec<Directory> = self
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.directories.get(child).cloned())
            .collect();
        sort_directories(&mut dirs);
        dirs
    }

    fn documents_of(&self, id: DirectoryId) -> Vec<Document> {
        self.directory_documents
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|doc| self.documents.get(doc).cloned())
            .collect()
    }

    fn chunks_of(&self, id: DocumentId) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .document_chunks
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|chunk| self.chunks.get(chunk).cloned())
            .collect();
        chunks.sort_by_key(|chunk| chunk.ordinal);
        chunks
    }

    fn check_integrity(&self) -> Result<()> {
        let root = self.dir(self.root)?;
        if root.parent.is_some() || root.path != path::ROOT {
            return Err(integrity("root must be '/' without a parent".to_string()));
        }

        for dir in self.directories.values() {
            if path::validate(&dir.path).is_err() {
                return Err(integrity(format!("malformed path {}", dir.path)));
            }
            if self.path_index.get(&(dir.ownership.scope_key(), dir.path.clone())) != Some(&dir.id)
            {
                return Err(integrity(format!("path index disagrees for {}", dir.path)));
            }
            let Some(parent_id) = dir.parent else {
                if dir.id != self.root {
                    return Err(integrity(format!("{} has no parent", dir.path)));
                }
                continue;
            };
            let parent = self
                .directories
                .get(&parent_id)
                .ok_or_else(|| integrity(format!("{} has a dangling parent", dir.path)))?;
            if dir.path != path::join(&parent.path, &dir.name) {
                return Err(integrity(format!(
                    "{} does not match parent path {}",
                    dir.path, parent.path
                )));
            }
            let listed = self
                .children
                .get(&parent_id)
                .is_some_and(|children| children.contains(&dir.id));
            if !listed {
                return Err(integrity(format!("{} missing from parent index", dir.path)));
            }
            if !dir.ownership.may_nest_under(&parent.ownership) {
                return Err(integrity(format!("{} nests under a foreign parent", dir.path)));
            }
            // Walk to the root; more steps than nodes means a cycle.
            let mut cursor = dir.parent;
            let mut steps = 0usize;
            while let Some(id) = cursor {
                steps += 1;
                if steps > self.directories.len() {
                    return Err(integrity(format!("cycle above {}", dir.path)));
                }
                cursor = self.directories.get(&id).and_then(|d| d.parent);
            }
        }

        for (lineage, versions) in &self.lineages {
            for (index, id) in versions.iter().enumerate() {
                let doc = self.doc(*id)?;
                if doc.lineage != *lineage || doc.version as usize != index + 1 {
                    return Err(integrity(format!(
                        "lineage {lineage} has a gap at version {}",
                        index + 1
                    )));
                }
            }
        }

        for (document, chunk_ids) in &self.document_chunks {
            let chunks = self.chunks_of(*document);
            if chunks.len() != chunk_ids.len() {
                return Err(integrity(format!("document {document} lost chunks")));
            }
            for (index, chunk) in chunks.iter().enumerate() {
                if chunk.document_id != *document || chunk.ordinal as usize != index {
                    return Err(integrity(format!(
                        "document {document} has non-contiguous ordinals"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for MemoryHierarchy {
    async fn root(&self) -> Result<Directory> {
        let arena = self.read()?;
        arena.dir(arena.root).cloned()
    }

    async fn directory(
        &self,
        reference: DirectoryRef<'_>,
        scope: &TenantScope,
    ) -> Result<Directory> {
        let arena = self.read()?;
        match reference {
            DirectoryRef::Id(id) => arena.scoped_dir(id, scope).cloned(),
            DirectoryRef::Path(raw) => {
                path::validate(raw)?;
                arena
                    .lookup_path(raw, scope)
                    .filter(|dir| arena.chain_visible(dir.id, scope))
                    .cloned()
                    .ok_or_else(|| HierarchyError::not_found(EntityKind::Directory, raw))
            }
        }
    }

    async fn list_children(&self, id: DirectoryId, scope: &TenantScope) -> Result<Vec<Directory>> {
        let arena = self.read()?;
        arena.scoped_dir(id, scope)?;
        Ok(arena
            .children_of(id)
            .into_iter()
            .filter(|dir| dir.ownership.visible_to(scope))
            .collect())
    }

    async fn list_documents(
        &self,
        id: DirectoryId,
        scope: &TenantScope,
        policy: &VersionPolicy,
    ) -> Result<Vec<Document>> {
        let arena = self.read()?;
        arena.scoped_dir(id, scope)?;
        let visible = arena
            .documents_of(id)
            .into_iter()
            .filter(|doc| doc.ownership.visible_to(scope))
            .collect();
        Ok(policy.apply(visible))
    }

    async fn list_chunks(&self, document: DocumentId, scope: &TenantScope) -> Result<Vec<Chunk>> {
        let arena = self.read()?;
        arena.scoped_doc(document, scope)?;
        Ok(arena.chunks_of(document))
    }

    async fn chunk_content(&self, chunk: ChunkId, scope: &TenantScope) -> Result<String> {
        let arena = self.read()?;
        let record = arena
            .chunks
            .get(&chunk)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Chunk, chunk))?;
        arena
            .scoped_doc(record.document_id, scope)
            .map_err(|err| match err {
                HierarchyError::TenantViolation { scope, .. } => HierarchyError::TenantViolation {
                    entity: EntityKind::Chunk,
                    key: chunk.to_string(),
                    scope,
                },
                other => other,
            })?;
        arena
            .contents
            .get(&record.content)
            .cloned()
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Content, record.content))
    }
}

#[async_trait]
impl HierarchyWriter for MemoryHierarchy {
    async fn ensure_directory(&self, raw: &str, ownership: Ownership) -> Result<Directory> {
        path::validate(raw)?;
        let mut arena = self.write()?;
        let lookup_scope = ownership.as_scope();
        let segments = path::segments(raw);
        let mut current = arena.dir(arena.root)?.clone();

        for (index, segment) in segments.iter().enumerate() {
            let child_path = path::join(&current.path, segment);
            let is_target = index + 1 == segments.len();
            let existing = if is_target {
                arena
                    .path_index
                    .get(&(ownership.scope_key(), child_path.clone()))
                    .and_then(|id| arena.directories.get(id))
                    .cloned()
            } else {
                arena.lookup_path(&child_path, &lookup_scope).cloned()
            };

            current = match existing {
                Some(dir) if is_target && dir.ownership != ownership => {
                    return Err(HierarchyError::conflict(format!(
                        "{child_path} already exists with different ownership"
                    )));
                }
                Some(dir) if !arena.chain_visible(dir.id, &lookup_scope) => {
                    return Err(HierarchyError::conflict(format!(
                        "{child_path} belongs to another sub-tenant"
                    )));
                }
                Some(dir) => dir,
                None => {
                    if !ownership.may_nest_under(&current.ownership) {
                        return Err(HierarchyError::conflict(format!(
                            "cannot create {child_path} under a directory owned by another sub-tenant"
                        )));
                    }
                    arena.insert_directory(&current, segment, ownership)
                }
            };
        }
        Ok(current)
    }

    async fn get_directory(&self, id: DirectoryId) -> Result<Directory> {
        self.read()?.dir(id).cloned()
    }

    async fn put_content(&self, text: String) -> Result<ContentRef> {
        let reference = ContentRef::new();
        self.write()?.contents.insert(reference, text);
        Ok(reference)
    }

    async fn content(&self, reference: ContentRef) -> Result<String> {
        self.read()?
            .contents
            .get(&reference)
            .cloned()
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Content, reference))
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let mut arena = self.write()?;
        let dir = arena.dir(new.directory_id)?;
        if !new.ownership.may_nest_under(&dir.ownership) {
            return Err(HierarchyError::conflict(format!(
                "document {} cannot live in {} owned by another sub-tenant",
                new.name, dir.path
            )));
        }
        arena.require_content(new.content)?;

        let doc = Document {
            id: DocumentId::new(),
            lineage: LineageId::new(),
            name: new.name,
            directory_id: new.directory_id,
            version: 1,
            summary: None,
            ownership: new.ownership,
            content: new.content,
            original_filename: new.original_filename,
            mime_type: new.mime_type,
            created_at: Utc::now(),
        };
        arena.lineages.insert(doc.lineage, vec![doc.id]);
        arena
            .directory_documents
            .entry(doc.directory_id)
            .or_default()
            .push(doc.id);
        arena.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn create_next_version(&self, lineage: LineageId, new: NewVersion) -> Result<Document> {
        let mut arena = self.write()?;
        let previous_id = arena
            .lineages
            .get(&lineage)
            .and_then(|versions| versions.last().copied())
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Lineage, lineage))?;
        let previous = arena.doc(previous_id)?.clone();
        arena.require_content(new.content)?;

        let doc = Document {
            id: DocumentId::new(),
            lineage,
            name: previous.name,
            directory_id: previous.directory_id,
            version: previous.version + 1,
            summary: None,
            ownership: previous.ownership,
            content: new.content,
            original_filename: new.original_filename,
            mime_type: new.mime_type,
            created_at: Utc::now(),
        };
        arena.lineages.entry(lineage).or_default().push(doc.id);
        arena
            .directory_documents
            .entry(doc.directory_id)
            .or_default()
            .push(doc.id);
        arena.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn attach_chunks(
        &self,
        document: DocumentId,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Chunk>> {
        let mut arena = self.write()?;
        arena.doc(document)?;
        if arena.document_chunks.contains_key(&document) {
            return Err(HierarchyError::conflict(format!(
                "document {document} already has chunks"
            )));
        }
        for chunk in &chunks {
            arena.require_content(chunk.content)?;
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let ordinal = u32::try_from(index)
                .map_err(|_| HierarchyError::conflict("too many chunks for one document"))?;
            created.push(Chunk {
                id: ChunkId::new(),
                document_id: document,
                ordinal,
                title: chunk.title,
                summary: None,
                content: chunk.content,
                created_at: now,
            });
        }
        arena
            .document_chunks
            .insert(document, created.iter().map(|chunk| chunk.id).collect());
        for chunk in &created {
            arena.chunks.insert(chunk.id, chunk.clone());
        }
        Ok(created)
    }

    async fn document(&self, id: DocumentId) -> Result<Document> {
        self.read()?.doc(id).cloned()
    }

    async fn lineage_versions(&self, lineage: LineageId) -> Result<Vec<Document>> {
        let arena = self.read()?;
        let versions = arena
            .lineages
            .get(&lineage)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Lineage, lineage))?;
        versions
            .iter()
            .map(|id| arena.doc(*id).cloned())
            .collect()
    }

    async fn children_of(&self, id: DirectoryId) -> Result<Vec<Directory>> {
        let arena = self.read()?;
        arena.dir(id)?;
        Ok(arena.children_of(id))
    }

    async fn documents_in(&self, id: DirectoryId) -> Result<Vec<Document>> {
        let arena = self.read()?;
        arena.dir(id)?;
        Ok(VersionPolicy::Latest.apply(arena.documents_of(id)))
    }

    async fn chunks_of(&self, document: DocumentId) -> Result<Vec<Chunk>> {
        let arena = self.read()?;
        arena.doc(document)?;
        Ok(arena.chunks_of(document))
    }

    async fn set_directory_summary(&self, id: DirectoryId, summary: String) -> Result<()> {
        let mut arena = self.write()?;
        let dir = arena
            .directories
            .get_mut(&id)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Directory, id))?;
        dir.summary = Some(summary);
        Ok(())
    }

    async fn set_document_summary(&self, id: DocumentId, summary: String) -> Result<()> {
        let mut arena = self.write()?;
        let doc = arena
            .documents
            .get_mut(&id)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Document, id))?;
        doc.summary = Some(summary);
        Ok(())
    }

    async fn set_chunk_summary(&self, id: ChunkId, summary: String) -> Result<()> {
        let mut arena = self.write()?;
        let chunk = arena
            .chunks
            .get_mut(&id)
            .ok_or_else(|| HierarchyError::not_found(EntityKind::Chunk, id))?;
        chunk.summary = Some(summary);
        Ok(())
    }
}
