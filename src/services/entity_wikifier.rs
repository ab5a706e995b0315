//! Entity-match wikifier (C7): cross-references documents that share
//! extracted entities and links them, weighted by how many entities they
//! share.

use std::collections::HashMap;

use crate::models::LinkMethod;
use crate::{Result, Store};

/// Minimum shared-entity count required before two documents are linked.
const MIN_SHARED_ENTITIES: usize = 2;
/// Maximum new links created per document in one run.
const MAX_ENTITY_LINKS: usize = 15;

/// Result of entity-matching a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityWikifyResult {
    /// New links created.
    pub created: usize,
    /// Candidate ids considered but already linked.
    pub existing_skipped: usize,
}

impl Store {
    /// Cross-references `document_id`'s entities against every other
    /// document's entities (optionally scoped to the same project),
    /// requiring at least [`MIN_SHARED_ENTITIES`] shared entities, and
    /// links the top [`MAX_ENTITY_LINKS`] candidates by shared count.
    /// Each link's score is `0.5 + 0.5 * (shared / max_shared_in_batch)`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from entity lookup or link insertion.
    pub fn entity_match_wikify(
        &self,
        document_id: i64,
        same_project_only: bool,
    ) -> Result<EntityWikifyResult> {
        let document = self.require_document(document_id)?;
        let entities = self.entities_for_document(document_id)?;
        let project = if same_project_only {
            document.project.as_deref()
        } else {
            None
        };

        let mut shared_counts: HashMap<i64, usize> = HashMap::new();
        for entity in &entities {
            for candidate_id in self.documents_sharing_entity(&entity.entity, document_id, project)? {
                *shared_counts.entry(candidate_id).or_insert(0) += 1;
            }
        }

        let mut qualifying: Vec<(i64, usize)> = shared_counts
            .into_iter()
            .filter(|&(_, count)| count >= MIN_SHARED_ENTITIES)
            .collect();
        qualifying.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let max_shared = qualifying.iter().map(|&(_, c)| c).max().unwrap_or(1) as f64;

        let mut existing_skipped = 0usize;
        let mut edges = Vec::new();
        for (candidate_id, count) in qualifying {
            if edges.len() >= MAX_ENTITY_LINKS {
                break;
            }
            if self.link_exists(document_id, candidate_id)? {
                existing_skipped += 1;
                continue;
            }
            let score = 0.5 + 0.5 * (count as f64 / max_shared);
            edges.push((document_id, candidate_id, score, LinkMethod::EntityMatch));
        }

        let created = self.create_links_batch(&edges)?;
        Ok(EntityWikifyResult {
            created,
            existing_skipped,
        })
    }

    /// Deletes every existing `entity_match` link and re-runs
    /// [`Store::entity_match_wikify`] over every non-deleted document.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from deletion or the rebuild pass.
    pub fn rebuild_entity_match_links(&self, same_project_only: bool) -> Result<usize> {
        self.delete_links_by_method(LinkMethod::EntityMatch)?;
        let documents = self.list_documents(None, 1_000_000)?;
        let mut total = 0usize;
        for doc in &documents {
            total += self.entity_match_wikify(doc.id, same_project_only)?.created;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, EntityType};

    #[test]
    fn two_shared_entities_link_but_one_does_not() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_document("A", "a", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("B", "b", None, &[], None, DocType::User).unwrap();

        store.save_entities(a, &[("one".into(), EntityType::Concept, 0.9)]).unwrap();
        store.save_entities(b, &[("one".into(), EntityType::Concept, 0.9)]).unwrap();
        let one_shared = store.entity_match_wikify(a, false).unwrap();
        assert_eq!(one_shared.created, 0);

        store.save_entities(a, &[("two".into(), EntityType::Concept, 0.9)]).unwrap();
        store.save_entities(b, &[("two".into(), EntityType::Concept, 0.9)]).unwrap();
        let two_shared = store.entity_match_wikify(a, false).unwrap();
        assert_eq!(two_shared.created, 1);
        assert!(store.link_exists(a, b).unwrap());
    }

    #[test]
    fn score_is_in_expected_range() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_document("A", "a", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("B", "b", None, &[], None, DocType::User).unwrap();
        for name in ["one", "two", "three"] {
            store.save_entities(a, &[(name.into(), EntityType::Concept, 0.9)]).unwrap();
            store.save_entities(b, &[(name.into(), EntityType::Concept, 0.9)]).unwrap();
        }
        store.entity_match_wikify(a, false).unwrap();
        let link = store.get_links_for_document(a).unwrap();
        assert_eq!(link.len(), 1);
        assert!(link[0].link.similarity_score > 0.5 && link[0].link.similarity_score <= 1.0);
    }

    #[test]
    fn rebuild_clears_existing_entity_match_links_first() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_document("A", "a", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("B", "b", None, &[], None, DocType::User).unwrap();
        for name in ["one", "two"] {
            store.save_entities(a, &[(name.into(), EntityType::Concept, 0.9)]).unwrap();
            store.save_entities(b, &[(name.into(), EntityType::Concept, 0.9)]).unwrap();
        }
        store.entity_match_wikify(a, false).unwrap();
        assert!(store.link_exists(a, b).unwrap());

        let rebuilt = store.rebuild_entity_match_links(false).unwrap();
        assert!(rebuilt > 0);
        assert!(store.link_exists(a, b).unwrap());
    }
}
