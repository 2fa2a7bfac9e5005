//! Embedding generation for semantic retrieval.
//!
//! All language understanding is delegated to the external provider; this
//! module maps text to fixed-dimension vectors through a pinned model and
//! provides the cosine-similarity primitive the store's `match_docs` uses.

mod openai;

pub use openai::OpenAiEmbedder;

use async_trait::async_trait;

use crate::error::LlmError;

/// Pinned embedding dimension. Every stored chunk has exactly one
/// embedding of this dimension; a mismatch invalidates reuse.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Pinned embedding model. Changing this requires re-indexing.
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Maximum texts per embedding request.
pub const MAX_EMBED_BATCH: usize = 100;

/// Retry attempts for upstream embedding failures.
pub const MAX_EMBED_RETRIES: u32 = 3;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe; the indexer and retrieval engine
/// share one instance across concurrent requests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Returns the pinned model identifier.
    fn model(&self) -> &str;

    /// Generates embeddings for a batch of texts.
    ///
    /// The result has exactly one vector per input text, in input order,
    /// each of [`Embedder::dimensions`] length.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] after retries are exhausted; the caller decides
    /// whether that is fatal (indexing) or degradable (retrieval).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, LlmError>;

    /// Generates an embedding for one text.
    ///
    /// # Errors
    ///
    /// Same as [`Embedder::embed_batch`].
    async fn embed(&self, text: &str) -> Result<Vec<f64>, LlmError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch.pop().ok_or(LlmError::BatchMismatch {
            sent: 1,
            received: 0,
        })
    }
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical), or 0.0 if
/// the vectors differ in length or either has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }
}
