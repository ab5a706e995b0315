//! FastEmbed-backed embedder: local ONNX inference, no network calls once
//! the model cache is warm. Mirrors the teacher's own
//! `embedding::FastEmbedEmbedder` seam, wired up to a real model instead of
//! left as a `todo!()`.

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::Embedder;
use crate::{Error, Result};

/// `all-MiniLM-L6-v2` embedding dimensionality.
const DIMENSIONS: usize = 384;

/// FastEmbed embedder using `all-MiniLM-L6-v2`.
///
/// The underlying `TextEmbedding` session is not `Sync`-safe for
/// concurrent inference, so calls are serialized behind a mutex — fine for
/// the semantic-linking pass, which is not on any latency-sensitive path.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedEmbedder {
    /// Default embedding dimensions for `all-MiniLM-L6-v2`.
    pub const DEFAULT_DIMENSIONS: usize = DIMENSIONS;

    /// Downloads (if not already cached) and loads the `all-MiniLM-L6-v2`
    /// model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalToolFailed`] if the model can't be loaded
    /// (no cache and no network, corrupted cache, unsupported platform).
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|err| Error::ExternalToolFailed(format!("fastembed model load failed: {err}")))?;
        Ok(Self { model: Mutex::new(model) })
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().unwrap_or_else(|p| p.into_inner());
        let mut vectors = model
            .embed(vec![text], None)
            .map_err(|err| Error::ExternalToolFailed(format!("fastembed inference failed: {err}")))?;
        Ok(vectors.pop().unwrap_or_else(|| vec![0.0; DIMENSIONS]))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock().unwrap_or_else(|p| p.into_inner());
        model
            .embed(texts.to_vec(), None)
            .map_err(|err| Error::ExternalToolFailed(format!("fastembed inference failed: {err}")))
    }
}
