//! Response validation
//!
//! Raw verdicts are checked entry by entry against the candidates of the
//! call. A bad entry costs only its own candidate: it is rejected with a
//! reason and the rest of the response is still used.

use crate::capability::{
    Candidate, RawChunkVerdict, RawDirectoryVerdict, RawDocumentVerdict, RawRankedVerdict,
};
use atlas_hierarchy::{ChunkId, DirectoryId, DocumentId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryVerdict {
    pub id: DirectoryId,
    pub relevance: f64,
    pub should_expand: bool,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentVerdict {
    pub id: DocumentId,
    pub relevance: f64,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkVerdict {
    pub id: ChunkId,
    pub relevance: f64,
    pub matched_span: Option<String>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedVerdict {
    pub id: ChunkId,
    pub final_score: f64,
    pub explanation: String,
}

/// Typed verdict built from a raw capability entry.
pub trait Verdict: Sized {
    type Id: Copy + Eq + Hash + FromStr + fmt::Display + fmt::Debug + Serialize;
    type Raw;

    fn raw_id(raw: &Self::Raw) -> &str;
    fn raw_score(raw: &Self::Raw) -> f64;
    fn from_raw(id: Self::Id, raw: Self::Raw) -> Self;
    fn id(&self) -> Self::Id;
    fn score(&self) -> f64;
}

impl Verdict for DirectoryVerdict {
    type Id = DirectoryId;
    type Raw = RawDirectoryVerdict;

    fn raw_id(raw: &RawDirectoryVerdict) -> &str {
        &raw.id
    }

    fn raw_score(raw: &RawDirectoryVerdict) -> f64 {
        raw.relevance
    }

    fn from_raw(id: DirectoryId, raw: RawDirectoryVerdict) -> Self {
        Self {
            id,
            relevance: raw.relevance,
            should_expand: raw.should_expand,
            reasoning: raw.reasoning,
        }
    }

    fn id(&self) -> DirectoryId {
        self.id
    }

    fn score(&self) -> f64 {
        self.relevance
    }
}

impl Verdict for DocumentVerdict {
    type Id = DocumentId;
    type Raw = RawDocumentVerdict;

    fn raw_id(raw: &RawDocumentVerdict) -> &str {
        &raw.id
    }

    fn raw_score(raw: &RawDocumentVerdict) -> f64 {
        raw.relevance
    }

    fn from_raw(id: DocumentId, raw: RawDocumentVerdict) -> Self {
        Self {
            id,
            relevance: raw.relevance,
            reasoning: raw.reasoning,
        }
    }

    fn id(&self) -> DocumentId {
        self.id
    }

    fn score(&self) -> f64 {
        self.relevance
    }
}

impl Verdict for ChunkVerdict {
    type Id = ChunkId;
    type Raw = RawChunkVerdict;

    fn raw_id(raw: &RawChunkVerdict) -> &str {
        &raw.id
    }

    fn raw_score(raw: &RawChunkVerdict) -> f64 {
        raw.relevance
    }

    fn from_raw(id: ChunkId, raw: RawChunkVerdict) -> Self {
        Self {
            id,
            relevance: raw.relevance,
            matched_span: raw.matched_span,
            reasoning: raw.reasoning,
        }
    }

    fn id(&self) -> ChunkId {
        self.id
    }

    fn score(&self) -> f64 {
        self.relevance
    }
}

impl Verdict for RankedVerdict {
    type Id = ChunkId;
    type Raw = RawRankedVerdict;

    fn raw_id(raw: &RawRankedVerdict) -> &str {
        &raw.id
    }

    fn raw_score(raw: &RawRankedVerdict) -> f64 {
        raw.final_score
    }

    fn from_raw(id: ChunkId, raw: RawRankedVerdict) -> Self {
        Self {
            id,
            final_score: raw.final_score,
            explanation: raw.explanation,
        }
    }

    fn id(&self) -> ChunkId {
        self.id
    }

    fn score(&self) -> f64 {
        self.final_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    UnknownId,
    ScoreOutOfRange { score: f64 },
    Duplicate,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownId => f.write_str("unknown id"),
            Self::ScoreOutOfRange { score } => write!(f, "score {score} outside [0, 1]"),
            Self::Duplicate => f.write_str("duplicate verdict"),
        }
    }
}

/// A raw entry the gateway refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    pub id: String,
    pub reason: RejectReason,
}

/// Verdicts of one call after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validated<V: Verdict> {
    /// Usable verdicts in candidate order.
    pub accepted: Vec<V>,
    pub rejected: Vec<RejectedEntry>,
    /// Candidates that received no entry at all.
    pub missing: Vec<V::Id>,
}

impl<V: Verdict> Validated<V> {
    pub fn empty() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// Check `raw` against `candidates`.
///
/// Unknown ids and scores that are non-finite or outside [0, 1] are
/// rejected; for repeated ids the first entry wins.
pub fn validate<V, C>(candidates: &[C], raw: Vec<V::Raw>) -> Validated<V>
where
    V: Verdict,
    C: Candidate<Id = V::Id>,
{
    let known: HashSet<V::Id> = candidates.iter().map(Candidate::candidate_id).collect();
    let mut seen: HashSet<V::Id> = HashSet::new();
    let mut accepted: HashMap<V::Id, V> = HashMap::new();
    let mut rejected = Vec::new();

    for entry in raw {
        let raw_id = V::raw_id(&entry).trim().to_string();
        let Some(id) = raw_id.parse::<V::Id>().ok().filter(|id| known.contains(id)) else {
            rejected.push(RejectedEntry {
                id: raw_id,
                reason: RejectReason::UnknownId,
            });
            continue;
        };
        if !seen.insert(id) {
            rejected.push(RejectedEntry {
                id: raw_id,
                reason: RejectReason::Duplicate,
            });
            continue;
        }
        let score = V::raw_score(&entry);
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            rejected.push(RejectedEntry {
                id: raw_id,
                reason: RejectReason::ScoreOutOfRange { score },
            });
            continue;
        }
        accepted.insert(id, V::from_raw(id, entry));
    }

    let mut ordered = Vec::with_capacity(accepted.len());
    let mut missing = Vec::new();
    for candidate in candidates {
        let id = candidate.candidate_id();
        match accepted.remove(&id) {
            Some(verdict) => ordered.push(verdict),
            None if !seen.contains(&id) => missing.push(id),
            None => {}
        }
    }

    Validated {
        accepted: ordered,
        rejected,
        missing,
    }
}
