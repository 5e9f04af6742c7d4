//! Text embedding
//!
//! [`Embedder`] is the seam the pipeline embeds through; [`SentenceEmbedder`]
//! is the Candle-backed implementation used in production.

mod model;

pub use model::{BertConfig, SentenceEmbedder, MAX_SEQ_LEN};

use anyhow::anyhow;

use crate::error::{DedupError, Result};

/// Dense vector for one text
pub type EmbeddingVector = Vec<f32>;

/// Maps texts to fixed-dimension vectors, one per input, in input order
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<EmbeddingVector>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<EmbeddingVector>> {
        (**self).embed(texts)
    }
}

/// Embed `texts` and check that one vector came back per input.
///
/// Any failure is reported as [`DedupError::EmbeddingFailure`].
pub fn embed_texts(embedder: &dyn Embedder, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
    let vectors = embedder
        .embed(texts)
        .map_err(DedupError::EmbeddingFailure)?;

    if vectors.len() != texts.len() {
        return Err(DedupError::EmbeddingFailure(anyhow!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }

    Ok(vectors)
}
