//! Comparison corpus assembly
//!
//! The corpus holds every open issue except the one that triggered the run,
//! with pull requests filtered out. Records, texts and (after embedding)
//! vectors are kept index-aligned.

use tracing::debug;

use crate::embeddings::{embed_texts, Embedder, EmbeddingVector};
use crate::error::{DedupError, Result};
use crate::issue::{IssueRecord, TrackerItem};
use crate::tracker::IssueTracker;

/// Open issues to compare against, paired with their comparison texts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    records: Vec<IssueRecord>,
    texts: Vec<String>,
}

impl Corpus {
    /// Build a corpus from the tracker listing, excluding `trigger` and any
    /// pull request.
    pub fn build(items: Vec<TrackerItem>, trigger: u64) -> Self {
        let mut corpus = Self::default();
        let mut skipped_prs = 0usize;

        for item in items {
            if item.record.number == trigger {
                continue;
            }
            if item.is_pull_request {
                skipped_prs += 1;
                continue;
            }
            corpus.texts.push(item.record.comparison_text());
            corpus.records.push(item.record);
        }

        debug!(
            issues = corpus.len(),
            skipped_pull_requests = skipped_prs,
            "built comparison corpus"
        );

        corpus
    }

    /// Fetch the open-item list and build a corpus from it.
    ///
    /// A failed fetch is fatal; no partial corpus is returned.
    pub async fn fetch(tracker: &dyn IssueTracker, trigger: u64) -> Result<Self> {
        let items = tracker
            .list_open_items()
            .await
            .map_err(DedupError::SourceUnavailable)?;
        Ok(Self::build(items, trigger))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Embed every text in one batched call
    pub fn embed(self, embedder: &dyn Embedder) -> Result<EmbeddedCorpus> {
        let texts: Vec<&str> = self.texts.iter().map(String::as_str).collect();
        let vectors = embed_texts(embedder, &texts)?;

        Ok(EmbeddedCorpus {
            records: self.records,
            texts: self.texts,
            vectors,
        })
    }
}

/// A corpus whose texts have been embedded
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCorpus {
    records: Vec<IssueRecord>,
    texts: Vec<String>,
    vectors: Vec<EmbeddingVector>,
}

impl EmbeddedCorpus {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn vectors(&self) -> &[EmbeddingVector] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(number: u64, title: &str, body: Option<&str>) -> IssueRecord {
        IssueRecord {
            number,
            title: Some(title.to_string()),
            body: body.map(String::from),
            author: "octocat".into(),
            url: format!("https://github.com/octo/widgets/issues/{}", number),
        }
    }

    struct FixedEmbedder;

    impl Embedder for FixedEmbedder {
        fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<EmbeddingVector>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_excludes_trigger_and_pull_requests() {
        let items = vec![
            TrackerItem::issue(record(1, "Login fails", Some("on mobile"))),
            TrackerItem::issue(record(7, "Mobile login is broken", None)),
            TrackerItem::pull_request(record(3, "Fix login", Some("closes #1"))),
            TrackerItem::issue(record(4, "App crashes on launch", None)),
        ];

        let corpus = Corpus::build(items, 7);

        let numbers: Vec<u64> = corpus.records().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 4]);
        assert_eq!(
            corpus.texts(),
            &["Login fails on mobile".to_string(), "App crashes on launch ".to_string()]
        );
    }

    #[test]
    fn test_empty_when_only_trigger_is_open() {
        let items = vec![TrackerItem::issue(record(7, "Only me", None))];
        let corpus = Corpus::build(items, 7);
        assert!(corpus.is_empty());
        assert_eq!(corpus.len(), 0);
    }

    #[test]
    fn test_embed_keeps_alignment() {
        let items = vec![
            TrackerItem::issue(record(1, "a", None)),
            TrackerItem::issue(record(2, "bbb", None)),
        ];
        let embedded = Corpus::build(items, 99).embed(&FixedEmbedder).unwrap();

        assert_eq!(embedded.len(), 2);
        assert_eq!(embedded.records().len(), embedded.vectors().len());
        assert_eq!(embedded.texts().len(), embedded.vectors().len());
        assert_eq!(embedded.vectors()[1], vec![4.0, 1.0]);
    }
}
