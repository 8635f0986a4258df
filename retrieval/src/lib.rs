//! Atlas retrieval orchestrator
//!
//! Answers a query by walking the hierarchy with the reasoning gateway:
//! directories are scored level by level, the chosen ones have their
//! documents and then their chunks scored, and the surviving chunks are
//! ranked and explained. Every step lands in a [`ReasoningTrace`].

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod errors;
pub mod explain;
pub mod orchestrator;
pub mod request;
pub mod selection;
pub mod service;
pub mod trace;
pub mod trace_cache;

pub use config::{ChunkEvidence, RetrievalConfig};
pub use errors::{ErrorKind, Result, RetrievalError};
pub use explain::{ExplainReport, render_markdown};
pub use orchestrator::{Orchestrator, QueryOutcome, UNRANKED_EXPLANATION};
pub use request::{RankedResult, RetrievalRequest, RetrievalResponse};
pub use service::RetrievalService;
pub use trace::{
    Budget, CandidateRecord, QueryId, QueryState, ReasoningTrace, Stage, StageRecord, TraceNote,
    VerdictRecord,
};
pub use trace_cache::TraceCache;
