//! Retrieval configuration
//!
//! One immutable value per orchestrator invocation. Every field has a
//! serde default so a partial `[retrieval]` table is enough.

use crate::errors::{Result, RetrievalError};
use atlas_reasoning::GatewayPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `identify_chunks` judges each chunk by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkEvidence {
    #[default]
    Summary,
    Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_threshold")]
    pub directory_threshold: f64,
    #[serde(default = "default_threshold")]
    pub document_threshold: f64,
    #[serde(default = "default_threshold")]
    pub chunk_threshold: f64,

    /// Directories kept per level (W).
    #[serde(default = "default_directory_width")]
    pub directory_width: usize,
    /// Documents kept across the document stage (W2).
    #[serde(default = "default_document_width")]
    pub document_width: usize,
    /// Chunks kept per document (W3).
    #[serde(default = "default_chunk_width")]
    pub chunk_width: usize,

    /// Scored levels below the start directory (D).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Directories sent for scoring per query (N).
    #[serde(default = "default_max_directory_visits")]
    pub max_directory_visits: usize,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Chunks per `rank_and_explain` call.
    #[serde(default = "default_rank_batch_size")]
    pub rank_batch_size: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    #[serde(default)]
    pub chunk_evidence: ChunkEvidence,
    #[serde(default = "default_rank_with_content")]
    pub rank_with_content: bool,

    /// Extra time in-flight calls get once the deadline passes.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    #[serde(default)]
    pub persist_traces: bool,
    #[serde(default = "default_trace_retention_secs")]
    pub trace_retention_secs: u64,
    #[serde(default = "default_trace_cache_capacity")]
    pub trace_cache_capacity: u64,

    #[serde(default)]
    pub gateway: GatewayPolicy,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_directory_width() -> usize {
    5
}

fn default_document_width() -> usize {
    10
}

fn default_chunk_width() -> usize {
    5
}

fn default_max_depth() -> u32 {
    6
}

fn default_max_directory_visits() -> usize {
    200
}

fn default_top_k() -> usize {
    10
}

fn default_rank_batch_size() -> usize {
    20
}

fn default_max_query_chars() -> usize {
    4_000
}

fn default_rank_with_content() -> bool {
    true
}

fn default_grace_period_ms() -> u64 {
    500
}

fn default_trace_retention_secs() -> u64 {
    900
}

fn default_trace_cache_capacity() -> u64 {
    1_024
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            directory_threshold: default_threshold(),
            document_threshold: default_threshold(),
            chunk_threshold: default_threshold(),
            directory_width: default_directory_width(),
            document_width: default_document_width(),
            chunk_width: default_chunk_width(),
            max_depth: default_max_depth(),
            max_directory_visits: default_max_directory_visits(),
            default_top_k: default_top_k(),
            rank_batch_size: default_rank_batch_size(),
            max_query_chars: default_max_query_chars(),
            chunk_evidence: ChunkEvidence::default(),
            rank_with_content: default_rank_with_content(),
            grace_period_ms: default_grace_period_ms(),
            persist_traces: false,
            trace_retention_secs: default_trace_retention_secs(),
            trace_cache_capacity: default_trace_cache_capacity(),
            gateway: GatewayPolicy::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn trace_retention(&self) -> Duration {
        Duration::from_secs(self.trace_retention_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("directory_threshold", self.directory_threshold),
            ("document_threshold", self.document_threshold),
            ("chunk_threshold", self.chunk_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RetrievalError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        for (name, value) in [
            ("directory_width", self.directory_width),
            ("document_width", self.document_width),
            ("chunk_width", self.chunk_width),
            ("max_directory_visits", self.max_directory_visits),
            ("default_top_k", self.default_top_k),
            ("rank_batch_size", self.rank_batch_size),
            ("max_query_chars", self.max_query_chars),
        ] {
            if value == 0 {
                return Err(RetrievalError::invalid_config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.max_depth == 0 {
            return Err(RetrievalError::invalid_config(
                "max_depth must be greater than zero",
            ));
        }
        self.gateway
            .retry
            .validate()
            .map_err(|reason| RetrievalError::invalid_config(format!("gateway.retry.{reason}")))?;
        if self.trace_cache_capacity == 0 && self.persist_traces {
            tracing::warn!("persist_traces is set but trace_cache_capacity is 0; traces will not be kept");
        }
        Ok(())
    }
}
