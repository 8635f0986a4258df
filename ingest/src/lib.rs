//! Atlas ingestion
//!
//! Turns already-converted text into a document version in the hierarchy:
//! chunking by file type, then chunk, document and directory summaries.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod chunk;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod summarize;

pub use chunk::{
    Chunker, ChunkerRegistry, MarkdownChunker, PlainChunker, PythonChunker, TextChunk,
};
pub use config::IngestConfig;
pub use errors::{IngestError, Result, SummaryError};
pub use pipeline::{IngestOutcome, IngestRequest, IngestionPipeline};
pub use summarize::{ChatSummarizer, DirectoryEntry, ExtractiveSummarizer, Summarizer};
