//! Single-pass duplicate detection
//!
//! ```text
//! Start -> CorpusBuilt -> EmptyCorpus -> NoMatch
//!                      -> Embedded -> Scored -> Decided (NoMatch | MatchFound)
//! ```
//!
//! Nothing is retried or persisted; each run walks the graph once.

use tracing::info;

use crate::config::DetectorConfig;
use crate::corpus::Corpus;
use crate::decision::{DecisionOutcome, DuplicateGate};
use crate::embeddings::{embed_texts, Embedder};
use crate::error::{DedupError, Result};
use crate::issue::IssueRecord;
use crate::similarity::{best_match, SimilarityResult};
use crate::tracker::IssueTracker;

/// Result of a detection run
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The triggering issue
    pub query: IssueRecord,
    pub outcome: DecisionOutcome,
    /// Issues compared against
    pub corpus_size: usize,
    /// Best candidate regardless of threshold; `None` for an empty corpus
    pub best: Option<SimilarityResult>,
}

/// Score a query text against a corpus and decide.
///
/// The embedder is called exactly twice for a non-empty corpus (once for the
/// whole corpus, once for the query) and never for an empty one.
pub fn evaluate(
    query_text: &str,
    corpus: Corpus,
    embedder: &dyn Embedder,
    gate: &DuplicateGate,
) -> Result<(Option<SimilarityResult>, DecisionOutcome)> {
    if corpus.is_empty() {
        return Ok((None, DecisionOutcome::NoMatch));
    }

    let corpus = corpus.embed(embedder)?;
    let query_vector = embed_texts(embedder, &[query_text])?
        .pop()
        .ok_or_else(|| DedupError::EmbeddingFailure(anyhow::anyhow!("no vector for query")))?;

    let best = best_match(&query_vector, corpus.vectors())?;
    let outcome = gate.decide(best, corpus.records())?;

    Ok((best, outcome))
}

/// Runs detection for one triggering issue against a tracker
pub struct DuplicateDetector<'a> {
    config: &'a DetectorConfig,
    tracker: &'a dyn IssueTracker,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(config: &'a DetectorConfig, tracker: &'a dyn IssueTracker) -> Self {
        Self { config, tracker }
    }

    /// Detect whether `issue_number` duplicates an open issue.
    ///
    /// `load_embedder` runs at most once, and only when there is something
    /// to compare against, so an empty corpus never pays the model-load cost.
    pub async fn detect<E, F>(&self, issue_number: u64, load_embedder: F) -> Result<Detection>
    where
        E: Embedder,
        F: FnOnce() -> anyhow::Result<E>,
    {
        let query = self
            .tracker
            .get_issue(issue_number)
            .await
            .map_err(DedupError::SourceUnavailable)?
            .record;

        let corpus = Corpus::fetch(self.tracker, issue_number).await?;
        let corpus_size = corpus.len();

        if corpus.is_empty() {
            info!(issue = issue_number, "no other open issues to compare against");
            return Ok(Detection {
                query,
                outcome: DecisionOutcome::NoMatch,
                corpus_size,
                best: None,
            });
        }

        info!(issue = issue_number, corpus = corpus_size, "comparing against open issues");

        let embedder = load_embedder().map_err(DedupError::EmbeddingFailure)?;
        let gate = DuplicateGate::new(self.config.threshold);
        let (best, outcome) = evaluate(&query.comparison_text(), corpus, &embedder, &gate)?;

        if let Some(best) = best {
            info!(
                score = %format!("{:.2}%", best.score * 100.0),
                threshold = self.config.threshold.value(),
                "best similarity"
            );
        }

        Ok(Detection {
            query,
            outcome,
            corpus_size,
            best,
        })
    }
}
