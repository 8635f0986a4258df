//! Request and response types of a retrieval query

use crate::trace::{QueryId, ReasoningTrace};
use atlas_hierarchy::{ChunkId, DirectoryId, DocumentId, LineageId, TenantScope, VersionPolicy};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub scope: TenantScope,
    /// Falls back to `RetrievalConfig::default_top_k`.
    pub top_k: Option<usize>,
    /// Budget from the moment the query starts.
    pub deadline: Option<Duration>,
    /// Subtree to search instead of the root.
    pub start_path: Option<String>,
    pub versions: VersionPolicy,
    /// Falls back to `RetrievalConfig::persist_traces`.
    pub persist_trace: Option<bool>,
    pub cancel: CancellationToken,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: TenantScope::Shared,
            top_k: None,
            deadline: None,
            start_path: None,
            versions: VersionPolicy::Latest,
            persist_trace: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scope(mut self, scope: TenantScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn start_at(mut self, path: impl Into<String>) -> Self {
        self.start_path = Some(path.into());
        self
    }

    pub fn versions(mut self, versions: VersionPolicy) -> Self {
        self.versions = versions;
        self
    }

    pub fn persist_trace(mut self, persist: bool) -> Self {
        self.persist_trace = Some(persist);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One ranked chunk with the identity of everything enclosing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub ordinal: u32,
    pub title: Option<String>,
    pub document_id: DocumentId,
    pub lineage: LineageId,
    pub document_name: String,
    pub version: u32,
    pub directory_id: DirectoryId,
    pub directory_path: String,
    pub final_score: f64,
    pub explanation: String,
    /// Relevance from the chunk stage.
    pub relevance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_span: Option<String>,
    /// False when ranking did not run and `final_score` is the chunk-stage
    /// relevance.
    pub ranked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query_id: QueryId,
    pub results: Vec<RankedResult>,
    /// Budget, deadline or cancellation cut the search short.
    pub incomplete: bool,
    pub trace: ReasoningTrace,
}
