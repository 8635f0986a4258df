//! Ingestion configuration (`[ingest]` table).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target size of plain-text chunks, in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Cap for a single Markdown section before it is cut.
    #[serde(default = "default_markdown_max_chunk")]
    pub markdown_max_chunk: usize,
    /// Ask the chat service for summaries; extractive summaries otherwise.
    #[serde(default = "default_use_llm_summaries")]
    pub use_llm_summaries: bool,
}

fn default_chunk_size() -> usize {
    2_000
}

fn default_markdown_max_chunk() -> usize {
    3_000
}

fn default_use_llm_summaries() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            markdown_max_chunk: default_markdown_max_chunk(),
            use_llm_summaries: default_use_llm_summaries(),
        }
    }
}
