//! Hierarchy store errors

use std::fmt;
use thiserror::Error;

/// Kind of hierarchy entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Directory,
    Document,
    Lineage,
    Chunk,
    Content,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Document => "document",
            Self::Lineage => "lineage",
            Self::Chunk => "chunk",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: EntityKind, key: String },

    #[error("{entity} {key} is outside tenant scope {scope}")]
    TenantViolation {
        entity: EntityKind,
        key: String,
        scope: String,
    },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HierarchyError {
    pub fn not_found(entity: EntityKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn tenant_violation(
        entity: EntityKind,
        key: impl fmt::Display,
        scope: impl fmt::Display,
    ) -> Self {
        Self::TenantViolation {
            entity,
            key: key.to_string(),
            scope: scope.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_tenant_violation(&self) -> bool {
        matches!(self, Self::TenantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, HierarchyError>;
