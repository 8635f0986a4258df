//! Reasoning capability contract
//!
//! The capability supplies judgment only. It receives a query plus typed
//! candidates and answers with raw verdicts that echo candidate ids as
//! strings; the gateway decides which of those verdicts are usable.

use async_trait::async_trait;
use atlas_hierarchy::{ChunkId, DirectoryId, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The four capability operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AnalyzeDirectories,
    SelectDocuments,
    IdentifyChunks,
    RankAndExplain,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeDirectories => "analyze_directories",
            Self::SelectDocuments => "select_documents",
            Self::IdentifyChunks => "identify_chunks",
            Self::RankAndExplain => "rank_and_explain",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidates
// ─────────────────────────────────────────────────────────────────────────────

/// Anything the gateway can validate verdicts against.
pub trait Candidate {
    type Id;

    fn candidate_id(&self) -> Self::Id;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryCandidate {
    pub id: DirectoryId,
    pub path: String,
    pub name: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentCandidate {
    pub id: DocumentId,
    pub name: String,
    pub version: u32,
    pub directory_path: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkCandidate {
    pub id: ChunkId,
    pub ordinal: u32,
    pub title: Option<String>,
    pub document_name: String,
    /// Chunk summary, or raw content when the orchestrator runs in
    /// content-evidence mode.
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankCandidate {
    pub id: ChunkId,
    pub title: Option<String>,
    pub document_name: String,
    pub directory_path: String,
    pub summary: Option<String>,
    pub content: Option<String>,
}

impl Candidate for DirectoryCandidate {
    type Id = DirectoryId;

    fn candidate_id(&self) -> DirectoryId {
        self.id
    }
}

impl Candidate for DocumentCandidate {
    type Id = DocumentId;

    fn candidate_id(&self) -> DocumentId {
        self.id
    }
}

impl Candidate for ChunkCandidate {
    type Id = ChunkId;

    fn candidate_id(&self) -> ChunkId {
        self.id
    }
}

impl Candidate for RankCandidate {
    type Id = ChunkId;

    fn candidate_id(&self) -> ChunkId {
        self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw verdicts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDirectoryVerdict {
    pub id: String,
    pub relevance: f64,
    pub should_expand: bool,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocumentVerdict {
    pub id: String,
    pub relevance: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChunkVerdict {
    pub id: String,
    pub relevance: f64,
    #[serde(default)]
    pub matched_span: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRankedVerdict {
    pub id: String,
    pub final_score: f64,
    #[serde(default)]
    pub explanation: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single capability exchange.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("capability call timed out")]
    Timeout,

    /// Connection failures, HTTP 5xx and 429.
    #[error("capability unavailable: {message}")]
    Unavailable {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Any other HTTP 4xx. Not worth retrying.
    #[error("capability rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed capability response: {0}")]
    Malformed(String),
}

impl CapabilityError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retry_after: None,
        }
    }
}

#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn analyze_directories(
        &self,
        query: &str,
        candidates: &[DirectoryCandidate],
    ) -> Result<Vec<RawDirectoryVerdict>, CapabilityError>;

    async fn select_documents(
        &self,
        query: &str,
        candidates: &[DocumentCandidate],
    ) -> Result<Vec<RawDocumentVerdict>, CapabilityError>;

    async fn identify_chunks(
        &self,
        query: &str,
        candidates: &[ChunkCandidate],
    ) -> Result<Vec<RawChunkVerdict>, CapabilityError>;

    async fn rank_and_explain(
        &self,
        query: &str,
        candidates: &[RankCandidate],
    ) -> Result<Vec<RawRankedVerdict>, CapabilityError>;
}
