use thiserror::Error;

use crate::tracker::TrackerError;

/// Fatal failures of a detection run.
///
/// Label attachment has no variant here; the reporter downgrades it to a
/// warning and the run continues.
#[derive(Debug, Error)]
pub enum DedupError {
    /// Missing or invalid run configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Trigger payload could not be read or has the wrong shape
    #[error("invalid event payload: {0}")]
    Payload(String),

    /// Reading from the issue tracker failed
    #[error("issue tracker unavailable: {0}")]
    SourceUnavailable(#[source] TrackerError),

    /// The embedding model could not be loaded or failed to encode
    #[error("embedding failed: {0:#}")]
    EmbeddingFailure(#[source] anyhow::Error),

    /// Query and candidate vectors disagree on dimension
    #[error(
        "embedding dimension mismatch: query has {expected} dimensions, candidate {index} has {found}"
    )]
    DimensionMismatch {
        expected: usize,
        found: usize,
        index: usize,
    },

    /// The scorer named a candidate the corpus does not have
    #[error("best match index {index} is outside a corpus of {corpus_size}")]
    IndexOutOfRange { index: usize, corpus_size: usize },

    /// Posting the duplicate notice failed
    #[error("failed to comment on issue #{issue}: {source}")]
    ReportFailure {
        issue: u64,
        #[source]
        source: TrackerError,
    },
}

impl DedupError {
    /// Process exit code for this error.
    ///
    /// Configuration and payload problems are caught before any external
    /// call and exit with 2; everything else exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            DedupError::Config(_) | DedupError::Payload(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
