//! Deterministic pseudo-embedder: a dependency-free fallback so the
//! semantic-linking pass runs end to end without a model download.
//!
//! Unlike the teacher's own `FallbackEmbedder` (which returns an empty
//! vector and disables vector search entirely, falling back to text
//! search), this hashes word features into a fixed-width bucket vector —
//! closer to a degenerate bag-of-words embedding than a no-op. Cosine
//! similarity between two documents' vectors tracks shared-vocabulary
//! overlap; semantically-related-but-differently-worded documents won't
//! score well under it. `semantic-embeddings` swaps in
//! [`super::FastEmbedEmbedder`] for real vector semantics.

use sha2::{Digest, Sha256};

use super::Embedder;
use crate::Result;

/// Bucket count. 256 keeps cosine similarity reasonably discriminating for
/// short-to-medium markdown documents without the memory footprint of a
/// real embedding model.
const DIMENSIONS: usize = 256;

/// Feature-hashes word tokens into a fixed-width vector and L2-normalizes
/// it, so cosine similarity behaves the same way it would over a real
/// embedding: `[-1, 1]`, `1.0` for identical inputs.
pub struct DeterministicEmbedder;

impl DeterministicEmbedder {
    /// Creates a new deterministic embedder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(token: &str) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let index = u64::from_le_bytes(digest[0..8].try_into().unwrap_or_default());
    (index % DIMENSIONS as u64) as usize
}

impl Embedder for DeterministicEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; DIMENSIONS];
        let lowercase = text.to_lowercase();
        let tokens: Vec<&str> = lowercase.split_whitespace().collect();
        for token in &tokens {
            vector[bucket_of(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            vector[bucket_of(&bigram)] += 0.5;
        }

        let norm = vector.iter().map(|&v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn same_text_embeds_to_the_same_vector() {
        let embedder = DeterministicEmbedder::new();
        let a = embedder.embed("the quick brown fox jumps").unwrap();
        let b = embedder.embed("the quick brown fox jumps").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_disjoint_vocabulary() {
        let embedder = DeterministicEmbedder::new();
        let a = embedder.embed("falcon scheduler event loop task coordination").unwrap();
        let b = embedder.embed("falcon scheduler event loop bottleneck optimization").unwrap();
        let c = embedder.embed("banana bread recipe instructions for baking").unwrap();

        let close = cosine_similarity(&a, &b);
        let far = cosine_similarity(&a, &c);
        assert!(close > far, "expected {close} > {far}");
    }

    #[test]
    fn empty_text_embeds_to_the_zero_vector() {
        let embedder = DeterministicEmbedder::new();
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn dimensions_matches_vector_length() {
        let embedder = DeterministicEmbedder::new();
        let v = embedder.embed("hello world").unwrap();
        assert_eq!(v.len(), embedder.dimensions());
    }
}
