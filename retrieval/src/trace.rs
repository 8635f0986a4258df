//! Reasoning trace
//!
//! Ordered record of what every stage considered, what the capability said
//! about it and what was kept. Owned by one query; cached only on request.

use atlas_hierarchy::TenantScope;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Identifier handed back with every response; `explain` looks traces up
/// by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for QueryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DirectoryScan,
    DocumentScan,
    ChunkScan,
    Rank,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectoryScan => "directory_scan",
            Self::DocumentScan => "document_scan",
            Self::ChunkScan => "chunk_scan",
            Self::Rank => "rank",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the per-query state machine ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Init,
    DirectoryScan,
    DocumentScan,
    ChunkScan,
    Rank,
    Done,
    Failed,
}

impl QueryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::DirectoryScan => "directory_scan",
            Self::DocumentScan => "document_scan",
            Self::ChunkScan => "chunk_scan",
            Self::Rank => "rank",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Depth,
    Nodes,
}

/// Something worth knowing about a stage that is not a verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceNote {
    /// Expansion stopped early; the result is incomplete.
    BudgetExceeded { budget: Budget, detail: String },
    /// A node had no summary and was never shown to the capability.
    Unsummarized { entity: String, id: String, label: String },
    /// The capability said nothing about this candidate.
    NoVerdict { id: String, label: String },
    /// The gateway refused the capability's entry.
    InvalidVerdict { id: String, reason: String },
    /// One call failed after retries; its candidates were dropped.
    CallFailed {
        error: String,
        message: String,
        candidates: usize,
    },
    /// The deadline passed before this stage could issue its calls.
    DeadlineReached { stage: Stage },
    Cancelled { stage: Stage },
    /// Ranking did not run for these candidates.
    Unranked { candidates: usize },
}

impl fmt::Display for TraceNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded { budget, detail } => {
                let budget = match budget {
                    Budget::Depth => "depth",
                    Budget::Nodes => "nodes",
                };
                write!(f, "budget exceeded ({budget}): {detail}")
            }
            Self::Unsummarized { entity, label, .. } => {
                write!(f, "{entity} {label}: unsummarized, excluded")
            }
            Self::NoVerdict { label, .. } => write!(f, "{label}: no verdict, dropped"),
            Self::InvalidVerdict { id, reason } => write!(f, "invalid verdict for {id}: {reason}"),
            Self::CallFailed {
                error,
                message,
                candidates,
            } => write!(f, "call failed ({error}), {candidates} candidate(s) dropped: {message}"),
            Self::DeadlineReached { stage } => write!(f, "deadline reached before {stage}"),
            Self::Cancelled { stage } => write!(f, "cancelled before {stage}"),
            Self::Unranked { candidates } => {
                write!(f, "{candidates} candidate(s) returned unranked")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub id: String,
    /// Path, document name or chunk title.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictRecord {
    pub id: String,
    pub label: String,
    pub score: f64,
    pub kept: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_expand: Option<bool>,
    /// Enclosing directory path for documents and chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One stage, or one level of the directory scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    /// Directory level (1 = children of the start) or rank batch count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    pub candidates: Vec<CandidateRecord>,
    pub verdicts: Vec<VerdictRecord>,
    pub notes: Vec<TraceNote>,
    pub calls: usize,
    pub failed_calls: usize,
    pub elapsed_ms: u64,
}

impl StageRecord {
    pub fn new(stage: Stage, level: Option<u32>) -> Self {
        Self {
            stage,
            level,
            candidates: Vec::new(),
            verdicts: Vec::new(),
            notes: Vec::new(),
            calls: 0,
            failed_calls: 0,
            elapsed_ms: 0,
        }
    }

    pub fn kept(&self) -> impl Iterator<Item = &VerdictRecord> {
        self.verdicts.iter().filter(|v| v.kept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningTrace {
    pub query_id: QueryId,
    pub query: String,
    pub scope: TenantScope,
    pub started_at: DateTime<Utc>,
    pub state: QueryState,
    pub incomplete: bool,
    pub stages: Vec<StageRecord>,
    /// Notes that belong to the query rather than one stage.
    pub notes: Vec<TraceNote>,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ReasoningTrace {
    pub fn start(query_id: QueryId, query: &str, scope: TenantScope) -> Self {
        Self {
            query_id,
            query: query.to_string(),
            scope,
            started_at: Utc::now(),
            state: QueryState::Init,
            incomplete: false,
            stages: Vec::new(),
            notes: Vec::new(),
            result_count: 0,
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn stages_of(&self, stage: Stage) -> impl Iterator<Item = &StageRecord> {
        self.stages.iter().filter(move |s| s.stage == stage)
    }

    /// Every note, query-level first, then stage notes in stage order.
    pub fn all_notes(&self) -> impl Iterator<Item = &TraceNote> {
        self.notes
            .iter()
            .chain(self.stages.iter().flat_map(|s| s.notes.iter()))
    }
}
