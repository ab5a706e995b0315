//! Semantic-similarity wikifier: the third layered link-generation pass
//! (§2 data flow; vector similarity), producing `method = "auto"` links
//! from embedding cosine similarity rather than literal text matching.
//!
//! The embedding capability itself is a narrow seam
//! ([`crate::embedding::Embedder`]) per the design notes — this module
//! only consumes it: embed the target document, embed every candidate,
//! link the ones above a similarity threshold. Chunking and a persistent
//! vector index are out of scope; one embedding covers one whole document.

use crate::embedding::{Embedder, EmbeddingIndexStats, cosine_similarity};
use crate::models::LinkMethod;
use crate::{Result, Store};

/// Documents shorter than this (trimmed character count) are skipped —
/// too little material for a meaningful embedding, mirroring the
/// near-duplicate detector's own floor (C8).
const MIN_CONTENT_LEN: usize = 50;
/// Maximum new links created per document in one run, matching the
/// entity-match wikifier's cap (§9: "a reasonable default is 15").
const MAX_SEMANTIC_LINKS: usize = 15;

/// Result of semantically wikifying a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticWikifyResult {
    /// New links created.
    pub created: usize,
    /// Candidates scoring above threshold but already linked.
    pub existing_skipped: usize,
    /// Candidates embedded and scored (after the length/project filters).
    pub candidates_considered: usize,
}

/// Sum of [`SemanticWikifyResult`] across a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SemanticWikifyBatchResult {
    /// Documents scanned.
    pub documents_processed: usize,
    /// Links created across all documents.
    pub created: usize,
    /// Already-linked candidates skipped across all documents.
    pub existing_skipped: usize,
}

impl Store {
    /// Embeds `document_id`'s content and every other eligible candidate's
    /// content (optionally scoped to the same project), links every
    /// candidate whose cosine similarity is at least `threshold`, capped
    /// at [`MAX_SEMANTIC_LINKS`] per run, highest-similarity first. Each
    /// link carries `method = "auto"` and `score` equal to the cosine
    /// similarity.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and any error the embedder raises.
    pub fn semantic_wikify(
        &self,
        document_id: i64,
        embedder: &dyn Embedder,
        threshold: f64,
        same_project_only: bool,
    ) -> Result<SemanticWikifyResult> {
        let document = self.require_document(document_id)?;
        if document.content.trim().chars().count() < MIN_CONTENT_LEN {
            return Ok(SemanticWikifyResult::default());
        }

        let project = if same_project_only { document.project.as_deref() } else { None };
        let candidates = self.list_document_contents(project)?;

        let mut ids = Vec::new();
        let mut texts = Vec::new();
        for (id, _title, content, _project) in &candidates {
            if *id == document_id || content.trim().chars().count() < MIN_CONTENT_LEN {
                continue;
            }
            ids.push(*id);
            texts.push(content.as_str());
        }

        let source_vector = embedder.embed(&document.content)?;
        let candidate_vectors = embedder.embed_batch(&texts)?;

        let mut scored: Vec<(i64, f64)> = ids
            .into_iter()
            .zip(candidate_vectors)
            .map(|(id, vector)| (id, cosine_similarity(&source_vector, &vector)))
            .filter(|&(_, score)| score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

        let mut existing_skipped = 0usize;
        let mut edges = Vec::new();
        for (candidate_id, score) in &scored {
            if edges.len() >= MAX_SEMANTIC_LINKS {
                break;
            }
            if self.link_exists(document_id, *candidate_id)? {
                existing_skipped += 1;
                continue;
            }
            edges.push((document_id, *candidate_id, *score, LinkMethod::Auto));
        }

        let created = self.create_links_batch(&edges)?;
        Ok(SemanticWikifyResult {
            created,
            existing_skipped,
            candidates_considered: scored.len(),
        })
    }

    /// Runs [`Store::semantic_wikify`] over every non-deleted document.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and any error the embedder raises.
    pub fn semantic_wikify_all(
        &self,
        embedder: &dyn Embedder,
        threshold: f64,
        same_project_only: bool,
    ) -> Result<SemanticWikifyBatchResult> {
        let documents = self.list_documents(None, 1_000_000)?;
        let mut batch = SemanticWikifyBatchResult::default();
        for doc in &documents {
            let result = self.semantic_wikify(doc.id, embedder, threshold, same_project_only)?;
            batch.documents_processed += 1;
            batch.created += result.created;
            batch.existing_skipped += result.existing_skipped;
        }
        Ok(batch)
    }

    /// Reports how much of the corpus has enough content to be embedded —
    /// the `indexed_docs` / `indexed_chunks` / `coverage_percent` summary
    /// the design notes describe for the `maintain index` command.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn embedding_index_stats(&self, embedder: &dyn Embedder) -> Result<EmbeddingIndexStats> {
        let _ = embedder.dimensions();
        let contents = self.list_document_contents(None)?;
        let total = contents.len();
        let indexed = contents
            .iter()
            .filter(|(_, _, content, _)| content.trim().chars().count() >= MIN_CONTENT_LEN)
            .count();
        let coverage_percent = if total == 0 { 100.0 } else { (indexed as f64 / total as f64) * 100.0 };
        Ok(EmbeddingIndexStats {
            indexed_docs: indexed,
            indexed_chunks: indexed,
            coverage_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicEmbedder;
    use crate::models::DocType;

    #[test]
    fn similar_documents_link_above_threshold() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let a = store
            .save_document(
                "Falcon Scheduler Design",
                "falcon scheduler event loop task coordination pipeline architecture",
                None,
                &[],
                None,
                DocType::User,
            )
            .unwrap();
        let b = store
            .save_document(
                "Falcon Performance Report",
                "falcon scheduler event loop task coordination pipeline bottleneck",
                None,
                &[],
                None,
                DocType::User,
            )
            .unwrap();

        let result = store.semantic_wikify(a, &embedder, 0.5, false).unwrap();
        assert_eq!(result.created, 1);
        assert!(store.link_exists(a, b).unwrap());
        let links = store.get_links_for_document(a).unwrap();
        assert_eq!(links[0].link.method, LinkMethod::Auto);
    }

    #[test]
    fn dissimilar_documents_do_not_link() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let a = store
            .save_document("Falcon Scheduler Design", "falcon scheduler event loop task coordination pipeline", None, &[], None, DocType::User)
            .unwrap();
        store
            .save_document("Banana Bread Recipe", "banana bread recipe instructions flour sugar eggs baking", None, &[], None, DocType::User)
            .unwrap();

        let result = store.semantic_wikify(a, &embedder, 0.5, false).unwrap();
        assert_eq!(result.created, 0);
    }

    #[test]
    fn short_documents_are_skipped_entirely() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let a = store.save_document("Short", "too short", None, &[], None, DocType::User).unwrap();
        store
            .save_document("Other", "falcon scheduler event loop task coordination pipeline bottleneck", None, &[], None, DocType::User)
            .unwrap();
        let result = store.semantic_wikify(a, &embedder, 0.0, false).unwrap();
        assert_eq!(result, SemanticWikifyResult::default());
    }

    #[test]
    fn is_idempotent_once_linked() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let a = store
            .save_document("Falcon Scheduler Design", "falcon scheduler event loop task coordination pipeline", None, &[], None, DocType::User)
            .unwrap();
        store
            .save_document("Falcon Performance Report", "falcon scheduler event loop task coordination pipeline bottleneck", None, &[], None, DocType::User)
            .unwrap();

        let first = store.semantic_wikify(a, &embedder, 0.5, false).unwrap();
        assert_eq!(first.created, 1);
        let second = store.semantic_wikify(a, &embedder, 0.5, false).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.existing_skipped, 1);
    }

    #[test]
    fn project_scoping_excludes_cross_project_candidates() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let a = store
            .save_document("Quantum Flux Refactor", "falcon scheduler event loop task coordination pipeline", Some("alpha"), &[], None, DocType::User)
            .unwrap();
        store
            .save_document("Session Bug Report", "falcon scheduler event loop task coordination pipeline bottleneck", Some("beta"), &[], None, DocType::User)
            .unwrap();

        let scoped = store.semantic_wikify(a, &embedder, 0.5, true).unwrap();
        assert_eq!(scoped.created, 0);
        let cross = store.semantic_wikify(a, &embedder, 0.5, false).unwrap();
        assert_eq!(cross.created, 1);
    }

    #[test]
    fn index_stats_report_coverage() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        store.save_document("Long", "falcon scheduler event loop task coordination pipeline", None, &[], None, DocType::User).unwrap();
        store.save_document("Too Short", "short", None, &[], None, DocType::User).unwrap();

        let stats = store.embedding_index_stats(&embedder).unwrap();
        assert_eq!(stats.indexed_docs, 1);
        assert!((stats.coverage_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_store_reports_full_coverage() {
        let store = Store::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new();
        let stats = store.embedding_index_stats(&embedder).unwrap();
        assert_eq!(stats.coverage_percent, 100.0);
    }
}
