//! Entity index generator (C11): scores every extracted entity for
//! page-worthiness, assigns a glossary tier, and (for page-worthy
//! entities) gathers mention snippets and PMI-ranked related entities.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::models::EntityType;
use crate::{Result, Store};

/// Below this document frequency an entity is considered noise and
/// dropped entirely, per spec.md §4.11.
const NOISE_DF_CUTOFF: usize = 2;
/// Tier A requires `df >= 5` and `score >= 30`.
const TIER_A_MIN_DF: usize = 5;
const TIER_A_MIN_SCORE: f64 = 30.0;
/// Tier B requires `df >= 3`.
const TIER_B_MIN_DF: usize = 3;
/// Snippet window width, centered on the match.
const SNIPPET_WINDOW: usize = 250;
/// Minimum documents two entities must co-occur in before PMI is computed.
const MIN_COOCCURRENCE: usize = 2;
/// Related entities kept per page.
const MAX_RELATED: usize = 10;
/// Dedup key length for snippets (lowercased leading characters).
const SNIPPET_DEDUP_PREFIX: usize = 80;

static HEADING_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("heading regex"));

/// Page-worthiness tier assigned to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTier {
    /// Full detailed page.
    A,
    /// Stub page.
    B,
    /// Alphabetic index entry only.
    C,
}

impl EntityTier {
    /// SQLite/display string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

/// One scored, tiered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIndexEntry {
    /// Normalized entity string.
    pub entity: String,
    /// Most common extracted type for this entity.
    pub entity_type: EntityType,
    /// Number of distinct documents mentioning it.
    pub doc_frequency: usize,
    /// Mean extraction confidence across mentioning documents.
    pub mean_confidence: f64,
    /// `df * idf * mean_confidence * type_weight`.
    pub score: f64,
    /// Assigned glossary tier.
    pub tier: EntityTier,
}

/// One mention snippet, for a Tier-A entity's detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// Mentioning document id.
    pub document_id: i64,
    /// Mentioning document title.
    pub document_title: String,
    /// Nearest heading above the mention, if any.
    pub heading: Option<String>,
    /// ~250-char window of content centered on the mention.
    pub text: String,
}

/// A related entity, ranked by positive pointwise mutual information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    /// Positive PMI score.
    pub pmi: f64,
}

/// A full Tier-A/B detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPage {
    /// The entity this page is about.
    pub entity: String,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Assigned tier.
    pub tier: EntityTier,
    /// Document frequency.
    pub doc_frequency: usize,
    /// Deduplicated mention snippets, one per document at most.
    pub snippets: Vec<Snippet>,
    /// Top co-occurring entities by positive PMI, descending.
    pub related: Vec<(String, RelatedEntity)>,
}

fn score_to_tier(doc_frequency: usize, score: f64) -> Option<EntityTier> {
    if doc_frequency >= TIER_A_MIN_DF && score >= TIER_A_MIN_SCORE {
        Some(EntityTier::A)
    } else if doc_frequency >= TIER_B_MIN_DF {
        Some(EntityTier::B)
    } else if doc_frequency >= NOISE_DF_CUTOFF {
        Some(EntityTier::C)
    } else {
        None
    }
}

/// Builds a fuzzy, whitespace-tolerant, case-insensitive regex that
/// matches `entity` as it might appear verbatim in markdown prose.
fn entity_match_regex(entity: &str) -> Option<Regex> {
    let escaped_words: Vec<String> = entity.split_whitespace().map(regex::escape).collect();
    if escaped_words.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i){}", escaped_words.join(r"\s+"));
    Regex::new(&pattern).ok()
}

fn nearest_heading_above(content: &str, byte_offset: usize) -> Option<String> {
    content[..byte_offset.min(content.len())]
        .lines()
        .rev()
        .find_map(|line| HEADING_PATTERN.captures(line).map(|c| c[1].trim().to_string()))
}

fn window_around(content: &str, start: usize, end: usize) -> String {
    let half = SNIPPET_WINDOW / 2;
    let win_start = start.saturating_sub(half);
    let win_end = (end + half).min(content.len());
    // Snap to char boundaries.
    let win_start = (0..=win_start).rev().find(|&i| content.is_char_boundary(i)).unwrap_or(0);
    let win_end = (win_end..=content.len())
        .find(|&i| content.is_char_boundary(i))
        .unwrap_or(content.len());
    content[win_start..win_end].trim().to_string()
}

impl Store {
    /// Scores and tiers every extracted entity, largest-score first.
    /// Entities below `df = 2` are treated as noise and excluded.
    ///
    /// # Errors
    ///
    /// Propagates storage errors reading the entity matrix/type map.
    pub fn build_entity_index(&self) -> Result<Vec<EntityIndexEntry>> {
        let matrix = self.entity_matrix(None)?;
        let total_docs = matrix.len().max(1);

        let mut confidences: HashMap<String, Vec<f64>> = HashMap::new();
        let mut type_votes: HashMap<String, HashMap<EntityType, usize>> = HashMap::new();
        for entities in matrix.values() {
            for (entity, &confidence) in entities {
                confidences.entry(entity.clone()).or_default().push(confidence);
            }
        }
        for (entity, ty) in self.entity_types()? {
            *type_votes.entry(entity).or_default().entry(ty).or_insert(0) += 1;
        }

        let mut entries = Vec::new();
        for (entity, confs) in confidences {
            let doc_frequency = confs.len();
            if doc_frequency < NOISE_DF_CUTOFF {
                continue;
            }
            let mean_confidence = confs.iter().sum::<f64>() / confs.len() as f64;
            let idf = (1.0 + total_docs as f64 / doc_frequency as f64).ln();
            let entity_type = type_votes
                .get(&entity)
                .and_then(|votes| votes.iter().max_by_key(|(_, &count)| count))
                .map_or(EntityType::Concept, |(ty, _)| *ty);
            let score = doc_frequency as f64 * idf * mean_confidence * entity_type.weight();
            let Some(tier) = score_to_tier(doc_frequency, score) else {
                continue;
            };
            entries.push(EntityIndexEntry {
                entity,
                entity_type,
                doc_frequency,
                mean_confidence,
                score,
                tier,
            });
        }

        entries.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.entity.cmp(&b.entity)));
        Ok(entries)
    }

    /// Builds the detail page for one entity: snippets plus PMI-ranked
    /// related entities. Returns `None` if the entity has no surviving
    /// index entry.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn entity_page(&self, entity: &str, index: &[EntityIndexEntry]) -> Result<Option<EntityPage>> {
        let Some(entry) = index.iter().find(|e| e.entity == entity) else {
            return Ok(None);
        };

        let matrix = self.entity_matrix(None)?;
        let mentioning_docs: Vec<i64> = matrix
            .iter()
            .filter(|(_, entities)| entities.contains_key(entity))
            .map(|(&doc_id, _)| doc_id)
            .collect();

        let mut snippets = Vec::new();
        let mut seen_prefixes = std::collections::HashSet::new();
        if let Some(pattern) = entity_match_regex(entity) {
            for doc_id in &mentioning_docs {
                let Some((title, content)) = self.fetch_title_content(*doc_id)? else {
                    continue;
                };
                let Some(m) = pattern.find(&content) else {
                    continue;
                };
                let text = window_around(&content, m.start(), m.end());
                let prefix: String = text.to_lowercase().chars().take(SNIPPET_DEDUP_PREFIX).collect();
                if !seen_prefixes.insert(prefix) {
                    continue;
                }
                snippets.push(Snippet {
                    document_id: *doc_id,
                    document_title: title,
                    heading: nearest_heading_above(&content, m.start()),
                    text,
                });
            }
        }

        let total_docs = matrix.len().max(1);
        let mut cooccur: HashMap<String, usize> = HashMap::new();
        for doc_id in &mentioning_docs {
            if let Some(entities) = matrix.get(doc_id) {
                for other in entities.keys() {
                    if other != entity {
                        *cooccur.entry(other.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        let df_a = entry.doc_frequency as f64;
        let mut related: Vec<(String, RelatedEntity)> = cooccur
            .into_iter()
            .filter(|(_, count)| *count >= MIN_COOCCURRENCE)
            .filter_map(|(other, count)| {
                let df_b = index.iter().find(|e| e.entity == other)?.doc_frequency as f64;
                let pmi = (total_docs as f64 * count as f64 / (df_a * df_b)).log2();
                (pmi > 0.0).then_some((other, RelatedEntity { pmi }))
            })
            .collect();
        related.sort_by(|a, b| b.1.pmi.total_cmp(&a.1.pmi).then_with(|| a.0.cmp(&b.0)));
        related.truncate(MAX_RELATED);

        Ok(Some(EntityPage {
            entity: entry.entity.clone(),
            entity_type: entry.entity_type,
            tier: entry.tier,
            doc_frequency: entry.doc_frequency,
            snippets,
            related,
        }))
    }

    /// Fetches `(title, content)` without the access-count/cache side
    /// effects of [`Store::get_document`] — entity indexing is a
    /// read-only batch sweep, not a user-facing view.
    fn fetch_title_content(&self, document_id: i64) -> Result<Option<(String, String)>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT title, content FROM documents WHERE id = ?1 AND is_deleted = 0",
                params![document_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;
    use crate::models::EntityType as ET;

    fn save(store: &Store, title: &str, content: &str) -> i64 {
        store.save_document(title, content, None, &[], None, DocType::User).unwrap()
    }

    #[test]
    fn entities_below_noise_cutoff_are_excluded() {
        let store = Store::open_in_memory().unwrap();
        let id = save(&store, "Doc", "content");
        store
            .save_entities(id, &[("rare term".to_string(), ET::Concept, 0.9)])
            .unwrap();
        let index = store.build_entity_index().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn frequent_entity_gets_tiered_and_paged() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            let id = save(
                &store,
                &format!("Doc {i}"),
                "## Falcon Overview\n\nThe falcon scheduler coordinates everything here.",
            );
            store
                .save_entities(id, &[("falcon scheduler".to_string(), ET::ProperNoun, 0.9)])
                .unwrap();
        }
        let index = store.build_entity_index().unwrap();
        let entry = index.iter().find(|e| e.entity == "falcon scheduler").unwrap();
        assert_eq!(entry.doc_frequency, 5);
        assert_eq!(entry.tier, EntityTier::A);

        let page = store.entity_page("falcon scheduler", &index).unwrap().unwrap();
        assert_eq!(page.snippets.len(), 5);
        assert_eq!(page.snippets[0].heading.as_deref(), Some("Falcon Overview"));
    }

    #[test]
    fn pmi_surfaces_cooccurring_entities() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..4 {
            let id = save(&store, &format!("Doc {i}"), "content");
            store
                .save_entities(
                    id,
                    &[
                        ("alpha entity".to_string(), ET::ProperNoun, 0.9),
                        ("beta entity".to_string(), ET::ProperNoun, 0.9),
                    ],
                )
                .unwrap();
        }
        let index = store.build_entity_index().unwrap();
        let page = store.entity_page("alpha entity", &index).unwrap().unwrap();
        assert!(page.related.iter().any(|(e, _)| e == "beta entity"));
    }
}
