//! Hierarchy data model
//!
//! Directories form a tree rooted at `/`. Documents are immutable versions
//! grouped by lineage and attached to exactly one directory. Chunks
//! partition one document version by contiguous ordinals.

use crate::errors::{HierarchyError, Result};
use crate::ids::{ChunkId, ContentRef, DirectoryId, DocumentId, LineageId, SubtenantId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Tenancy
// ─────────────────────────────────────────────────────────────────────────────

/// Who owns an item and whether other sub-tenants may see it.
///
/// A private item always has an owner. An owned but non-private item is
/// visible to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Ownership {
    owner: Option<SubtenantId>,
    private: bool,
}

impl Ownership {
    pub fn shared() -> Self {
        Self::default()
    }

    pub fn owned(owner: SubtenantId) -> Self {
        Self {
            owner: Some(owner),
            private: false,
        }
    }

    pub fn private(owner: SubtenantId) -> Self {
        Self {
            owner: Some(owner),
            private: true,
        }
    }

    pub fn new(owner: Option<SubtenantId>, private: bool) -> Result<Self> {
        if private && owner.is_none() {
            return Err(HierarchyError::conflict("private items require an owner"));
        }
        Ok(Self { owner, private })
    }

    pub fn owner(&self) -> Option<SubtenantId> {
        self.owner
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn visible_to(&self, scope: &TenantScope) -> bool {
        if !self.private {
            return true;
        }
        matches!((self.owner, scope.subtenant()), (Some(owner), Some(caller)) if owner == caller)
    }

    /// Key under which a directory path must be unique: the owner for
    /// private directories, `None` for everything visible to all.
    pub fn scope_key(&self) -> Option<SubtenantId> {
        if self.private { self.owner } else { None }
    }

    /// Whether an item with this ownership may live under a parent with
    /// `parent` ownership.
    pub fn may_nest_under(&self, parent: &Ownership) -> bool {
        !parent.private || self.owner == parent.owner
    }

    /// Scope whose reads see everything this ownership can see.
    pub fn as_scope(&self) -> TenantScope {
        match self.owner {
            Some(owner) => TenantScope::Subtenant(owner),
            None => TenantScope::Shared,
        }
    }
}

/// Caller identity for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum TenantScope {
    /// Sees shared items only.
    #[default]
    Shared,
    /// Sees shared items plus items private to this sub-tenant.
    Subtenant(SubtenantId),
}

impl TenantScope {
    pub fn subtenant(&self) -> Option<SubtenantId> {
        match self {
            Self::Shared => None,
            Self::Subtenant(id) => Some(*id),
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Subtenant(id) => write!(f, "subtenant:{id}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directory {
    pub id: DirectoryId,
    pub name: String,
    pub path: String,
    pub parent: Option<DirectoryId>,
    pub summary: Option<String>,
    pub ownership: Ownership,
    pub created_at: DateTime<Utc>,
}

impl Directory {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub lineage: LineageId,
    pub name: String,
    pub directory_id: DirectoryId,
    /// Starts at 1 and grows by one per new version of the lineage.
    pub version: u32,
    pub summary: Option<String>,
    pub ownership: Ownership,
    pub content: ContentRef,
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: u32,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: ContentRef,
    pub created_at: DateTime<Utc>,
}

/// First version of a new lineage.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub directory_id: DirectoryId,
    pub name: String,
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub ownership: Ownership,
    pub content: ContentRef,
}

/// Next version of an existing lineage. Name, directory and ownership are
/// inherited from the previous version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub original_filename: String,
    pub mime_type: Option<String>,
    pub content: ContentRef,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub title: Option<String>,
    pub content: ContentRef,
}

// ─────────────────────────────────────────────────────────────────────────────
// Version resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Which versions of each lineage a document listing returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Highest version of every lineage.
    #[default]
    Latest,
    /// Pinned lineages resolve to exactly the given version (and are left
    /// out when it does not exist); the rest resolve to latest.
    Pinned(BTreeMap<LineageId, u32>),
    /// Every version.
    All,
}

impl VersionPolicy {
    pub fn admits(&self, doc: &Document, latest: u32) -> bool {
        match self {
            Self::Latest => doc.version == latest,
            Self::All => true,
            Self::Pinned(pins) => match pins.get(&doc.lineage) {
                Some(version) => doc.version == *version,
                None => doc.version == latest,
            },
        }
    }

    /// Filter `docs` by this policy and order the survivors by name, then
    /// version.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut latest: HashMap<LineageId, u32> = HashMap::new();
        for doc in &docs {
            let entry = latest.entry(doc.lineage).or_insert(doc.version);
            *entry = (*entry).max(doc.version);
        }
        let mut kept: Vec<Document> = docs
            .into_iter()
            .filter(|doc| {
                latest
                    .get(&doc.lineage)
                    .is_some_and(|max| self.admits(doc, *max))
            })
            .collect();
        sort_documents(&mut kept);
        kept
    }
}

pub fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.version.cmp(&b.version))
            .then(a.id.cmp(&b.id))
    });
}

pub fn sort_directories(dirs: &mut [Directory]) {
    dirs.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
}
