//! Cosine similarity scoring of a query against the corpus
//!
//! Scores are accumulated in `f64` and clamped to [-1, 1], so rounding can
//! never push two identical vectors past 1.0. A candidate whose score is
//! undefined (zero magnitude on either side, or non-finite components)
//! scores 0.0 instead of propagating NaN into the argmax.

use crate::embeddings::EmbeddingVector;
use crate::error::{DedupError, Result};

/// Best-scoring corpus entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    /// Index into the corpus
    pub index: usize,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0) as f32
}

/// Check that every candidate has the query's dimension
fn check_dimensions(query: &[f32], candidates: &[EmbeddingVector]) -> Result<()> {
    match candidates
        .iter()
        .enumerate()
        .find(|(_, candidate)| candidate.len() != query.len())
    {
        Some((index, candidate)) => Err(DedupError::DimensionMismatch {
            expected: query.len(),
            found: candidate.len(),
            index,
        }),
        None => Ok(()),
    }
}

/// Score the query against every candidate, in corpus order
pub fn score_all(query: &[f32], candidates: &[EmbeddingVector]) -> Result<Vec<f32>> {
    check_dimensions(query, candidates)?;
    Ok(candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect())
}

/// Index and value of the maximum score; the first index wins ties.
pub fn argmax(scores: &[f32]) -> Option<SimilarityResult> {
    let mut best: Option<SimilarityResult> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some(current) if score <= current.score => {}
            _ => best = Some(SimilarityResult { index, score }),
        }
    }
    best
}

/// Find the candidate most similar to the query.
///
/// Returns `Ok(None)` for an empty candidate list and
/// [`DedupError::DimensionMismatch`] if any candidate's dimension differs
/// from the query's.
pub fn best_match(
    query: &[f32],
    candidates: &[EmbeddingVector],
) -> Result<Option<SimilarityResult>> {
    let scores = score_all(query, candidates)?;
    Ok(argmax(&scores))
}


// Property tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn vectors(dim: usize, count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Vec<f32>>> {
        prop::collection::vec(prop::collection::vec(-10.0f32..10.0, dim), count)
    }

    proptest! {
        /// Property: scores always stay inside the cosine range
        #[test]
        fn score_is_bounded(a in prop::collection::vec(-100.0f32..100.0, 8),
                            b in prop::collection::vec(-100.0f32..100.0, 8)) {
            let score = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&score));
        }

        /// Property: cosine similarity is symmetric
        #[test]
        fn score_is_symmetric(a in prop::collection::vec(-10.0f32..10.0, 6),
                              b in prop::collection::vec(-10.0f32..10.0, 6)) {
            prop_assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        }

        /// Property: the best index is in range and carries the true maximum
        #[test]
        fn best_is_true_maximum(query in prop::collection::vec(-10.0f32..10.0, 4),
                                corpus in vectors(4, 1..20)) {
            let scores = score_all(&query, &corpus).unwrap();
            let best = best_match(&query, &corpus).unwrap().unwrap();

            prop_assert!(best.index < corpus.len());
            prop_assert!(scores.iter().all(|&s| s <= best.score));
            prop_assert_eq!(scores[best.index], best.score);
            prop_assert!(scores[..best.index].iter().all(|&s| s < best.score));
        }
    }
}
