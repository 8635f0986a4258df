use atlas_hierarchy::HierarchyError;
use atlas_reasoning::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid filename {filename:?}: {reason}")]
    InvalidFilename {
        filename: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Why a summarizer produced nothing. The pipeline recovers from all of
/// these with an extractive summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("chat service: {0}")]
    Chat(#[from] ChatError),

    #[error("summarizer returned an empty summary")]
    Empty,
}
