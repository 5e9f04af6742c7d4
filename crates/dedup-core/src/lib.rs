//! Dedup Core - semantic duplicate detection for issue trackers
//!
//! This crate provides:
//! - Issue records and the tracker seam (`IssueTracker`)
//! - Comparison corpus assembly
//! - Embedding model integration (Candle)
//! - Cosine similarity scoring and threshold gating
//! - The duplicate notice reporter
//! - Configuration and trigger payload parsing

pub mod config;
pub mod corpus;
pub mod decision;
pub mod embeddings;
pub mod error;
pub mod issue;
pub mod payload;
pub mod pipeline;
pub mod reporter;
pub mod similarity;
pub mod tracker;

// Re-export commonly used types
pub use config::{DetectorConfig, ModelSource, Repository, Threshold};
pub use corpus::{Corpus, EmbeddedCorpus};
pub use decision::{DecisionOutcome, DuplicateGate};
pub use embeddings::{Embedder, EmbeddingVector, SentenceEmbedder};
pub use error::{DedupError, Result};
pub use issue::{IssueRecord, TrackerItem};
pub use payload::TriggerEvent;
pub use pipeline::{Detection, DuplicateDetector};
pub use reporter::{ActionReporter, LabelOutcome, ReportSummary};
pub use similarity::SimilarityResult;
pub use tracker::{IssueTracker, TrackerError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
