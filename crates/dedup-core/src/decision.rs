//! Threshold gating of the best similarity match
//!
//! Routes the scorer's result to one of two outcomes:
//! - score >= threshold: `MatchFound` carrying the matched record
//! - anything else, or no candidate at all: `NoMatch`
//!
//! The gate is pure; acting on the outcome is the reporter's job.

use serde::Serialize;

use crate::config::Threshold;
use crate::error::{DedupError, Result};
use crate::issue::IssueRecord;
use crate::similarity::SimilarityResult;

/// Terminal value of a detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecisionOutcome {
    NoMatch,
    MatchFound { record: IssueRecord, score: f32 },
}

impl DecisionOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, DecisionOutcome::MatchFound { .. })
    }
}

/// Decides whether a best match is strong enough to act on
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGate {
    threshold: Threshold,
}

impl DuplicateGate {
    pub fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Decide on the scorer's result.
    ///
    /// `records` is the corpus the result indexes into; an index outside it
    /// is [`DedupError::IndexOutOfRange`] whatever the score.
    pub fn decide(
        &self,
        best: Option<SimilarityResult>,
        records: &[IssueRecord],
    ) -> Result<DecisionOutcome> {
        let Some(best) = best else {
            return Ok(DecisionOutcome::NoMatch);
        };

        let record = records
            .get(best.index)
            .ok_or(DedupError::IndexOutOfRange {
                index: best.index,
                corpus_size: records.len(),
            })?;

        if !self.threshold.is_met_by(best.score) {
            return Ok(DecisionOutcome::NoMatch);
        }

        Ok(DecisionOutcome::MatchFound {
            record: record.clone(),
            score: best.score,
        })
    }
}


// Property tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn record() -> IssueRecord {
        IssueRecord {
            number: 1,
            title: None,
            body: None,
            author: "a".into(),
            url: "u".into(),
        }
    }

    proptest! {
        /// Property: a score equal to the threshold always matches, the next
        /// representable value below never does
        #[test]
        fn boundary_is_inclusive(threshold in 0.001f32..1.0) {
            let gate = DuplicateGate::new(Threshold::new(threshold).unwrap());
            let records = vec![record()];
            let below = f32::from_bits(threshold.to_bits() - 1);

            let at_threshold = gate
                .decide(Some(SimilarityResult { index: 0, score: threshold }), &records)
                .unwrap()
                .is_match();
            let below_threshold = gate
                .decide(Some(SimilarityResult { index: 0, score: below }), &records)
                .unwrap()
                .is_match();
            prop_assert!(at_threshold);
            prop_assert!(!below_threshold);
        }
    }
}
