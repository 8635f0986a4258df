//! Atlas reasoning gateway
//!
//! The only path from retrieval to the external reasoning capability.
//! [`ReasoningGateway`] turns four capability operations into typed,
//! validated verdicts:
//!
//! - `analyze_directories`: relevance + expand decision per directory
//! - `select_documents`: relevance per document
//! - `identify_chunks`: relevance (+ matched span) per chunk
//! - `rank_and_explain`: final score + explanation per chunk

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod capability;
pub mod chat;
pub mod client;
pub mod errors;
pub mod gateway;
pub mod parse;
pub mod prompts;
pub mod retry;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
pub mod validate;

pub use capability::{
    Candidate, CapabilityError, ChunkCandidate, DirectoryCandidate, DocumentCandidate, Operation,
    RankCandidate, RawChunkVerdict, RawDirectoryVerdict, RawDocumentVerdict, RawRankedVerdict,
    ReasoningCapability,
};
pub use chat::ChatCapability;
pub use client::{ChatClient, ChatConfig, ChatError};
pub use errors::{GatewayError, Result};
pub use gateway::{CallOptions, GatewayPolicy, ReasoningGateway};
pub use retry::{RetryClassifiable, RetryPolicy};
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptedCapability, ScriptedFailure};
pub use validate::{
    ChunkVerdict, DirectoryVerdict, DocumentVerdict, RankedVerdict, RejectReason, RejectedEntry,
    Validated, Verdict,
};
