//! Retrieval error types
//!
//! Transient capability failures are retried inside the gateway and partial
//! losses land in the trace. Only malformed input, scope errors and a stage
//! that lost every call surface here.

use crate::trace::{QueryId, Stage};
use atlas_hierarchy::HierarchyError;
use thiserror::Error;

/// Stable error kind for logs and machine consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    TenantViolation,
    InvalidQuery,
    InvalidConfig,
    QueryAborted,
    StoreError,
}

impl ErrorKind {
    /// Machine-readable code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::TenantViolation => "TENANT_VIOLATION",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::QueryAborted => "QUERY_ABORTED",
            Self::StoreError => "STORE_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("tenant violation: {message}")]
    TenantViolation { message: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid retrieval config: {message}")]
    InvalidConfig { message: String },

    /// Every capability call of a stage failed. `query_id` names the trace
    /// for `explain` when the query asked for persistence.
    #[error(
        "query {query_id} aborted: every {stage} call failed ({failed} call(s), last error: {last_error})"
    )]
    QueryAborted {
        query_id: QueryId,
        stage: Stage,
        failed: usize,
        last_error: String,
    },

    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<HierarchyError>,
    },
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::TenantViolation { .. } => ErrorKind::TenantViolation,
            Self::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::QueryAborted { .. } => ErrorKind::QueryAborted,
            Self::Store { .. } => ErrorKind::StoreError,
        }
    }

    /// Query whose trace recorded this failure, when the search got far
    /// enough to have one worth explaining.
    pub fn query_id(&self) -> Option<QueryId> {
        match self {
            Self::QueryAborted { query_id, .. } => Some(*query_id),
            _ => None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<HierarchyError> for RetrievalError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::NotFound { .. } => Self::NotFound {
                message: err.to_string(),
            },
            HierarchyError::TenantViolation { .. } => Self::TenantViolation {
                message: err.to_string(),
            },
            HierarchyError::InvalidPath { .. } => Self::InvalidQuery {
                reason: err.to_string(),
            },
            other => Self::Store {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
