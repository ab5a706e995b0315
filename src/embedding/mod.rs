//! Embedding generation for the semantic-similarity wikification pass.
//!
//! The design notes call this out as a capability interface: the core
//! never implements vector indexing itself (chunking, on-disk index files,
//! ANN search are an implementation concern left to a real embedding
//! service). What lives here is the narrow seam the semantic linker
//! consumes — generate a fixed-dimension vector for a chunk of text — plus
//! a cosine-similarity helper and a deterministic fallback so the pipeline
//! still runs end to end without a model download.

#![allow(clippy::cast_precision_loss)]

mod deterministic;
#[cfg(feature = "semantic-embeddings")]
mod fastembed_backend;

pub use deterministic::DeterministicEmbedder;
#[cfg(feature = "semantic-embeddings")]
pub use fastembed_backend::FastEmbedEmbedder;

use crate::Result;

/// Trait for embedding generators.
///
/// Implementations are synchronous: local embedding inference (hashing or
/// an on-device ONNX model) has no network round trip, unlike the
/// [`crate::llm::LlmClient`] subprocess seam.
pub trait Embedder: Send + Sync {
    /// The dimensionality of embedding vectors this embedder produces.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts. The default implementation
    /// embeds one at a time; batching implementations may override this to
    /// amortize model overhead.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Constructs the default embedder for the running binary: the real
/// `all-MiniLM-L6-v2` model when built with `semantic-embeddings`,
/// otherwise the dependency-free [`DeterministicEmbedder`] fallback.
///
/// # Errors
///
/// With `semantic-embeddings` enabled, propagates a model-load failure
/// (no cache and no network, or an unsupported platform).
pub fn default_embedder() -> Result<std::sync::Arc<dyn Embedder>> {
    #[cfg(feature = "semantic-embeddings")]
    {
        Ok(std::sync::Arc::new(FastEmbedEmbedder::new()?))
    }
    #[cfg(not(feature = "semantic-embeddings"))]
    {
        Ok(std::sync::Arc::new(DeterministicEmbedder::new()))
    }
}

/// Cosine similarity between two equal-length vectors, clamped to
/// `[-1.0, 1.0]` to absorb floating-point drift. Returns `0.0` for a
/// zero-length or mismatched-length pair rather than dividing by zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Summary statistics for the `maintain index` command: how much of the
/// corpus the semantic linker has material to work with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingIndexStats {
    /// Non-deleted documents long enough to be embedded.
    pub indexed_docs: usize,
    /// Chunks produced from those documents. This embedder has no
    /// chunking strategy of its own (§9 leaves chunking as an
    /// implementation concern), so one chunk equals one whole document.
    pub indexed_chunks: usize,
    /// `indexed_docs / total_docs * 100`, or `100.0` when the corpus is empty.
    pub coverage_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.1_f32, 0.2, 0.3, 0.4];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
    }

    #[test]
    fn mismatched_lengths_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_returns_zero_rather_than_nan() {
        let result = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(result, 0.0);
    }
}
