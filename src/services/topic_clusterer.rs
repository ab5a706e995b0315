//! Topic clusterer (C10): builds an IDF-weighted entity co-occurrence
//! graph over documents and partitions it into topics via a CPM-style
//! community-detection pass.
//!
//! No crate in the ecosystem ships Leiden/CPM directly, so community
//! detection here is a hand-rolled weighted local-moving pass over a
//! [`petgraph::graph::UnGraph`]: repeatedly move each node into whichever
//! neighboring community maximizes the CPM quality gain, until no node
//! moves or an iteration cap is hit. This is the same algorithmic shape
//! Leiden's local-moving phase uses, without the refinement/aggregation
//! phases the full algorithm adds for very large graphs.

use std::collections::{HashMap, HashSet};

use md5::{Digest, Md5};
use petgraph::graph::{NodeIndex, UnGraph};

use crate::config::ClusteringConfig;
use crate::models::EntityType;
use crate::{LlmClient, LlmRequest, Result, Store};

/// Maximum local-moving iterations before the pass is forced to stop.
const MAX_MOVE_ITERATIONS: usize = 50;
/// Entities contributing to a cluster label/fingerprint, kept for metadata.
const LABEL_METADATA_SIZE: usize = 10;
/// Entities actually joined into the human-readable label.
const LABEL_HEADLINE_SIZE: usize = 3;
/// Maximum slug length.
const MAX_SLUG_LEN: usize = 80;

/// One cluster discovered by [`Store::discover_topics`], ready for
/// [`Store::save_topics`] once the caller is happy with the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTopic {
    /// URL-safe, derived slug (not yet checked for global uniqueness —
    /// [`Store::save_topics`] replaces the whole table so collisions
    /// within one discovery run are resolved by de-duplicating suffixes).
    pub slug: String,
    /// Human label: top 3 label entities joined by `" / "`.
    pub label: String,
    /// Top 10 label entities (by class-TF-IDF score), for display.
    pub label_entities: Vec<String>,
    /// First 16 hex chars of the MD5 of the sorted union of all member
    /// documents' entities.
    pub entity_fingerprint: String,
    /// Average pairwise intra-cluster IDF-weighted Jaccard similarity.
    pub coherence_score: f64,
    /// Member document ids.
    pub member_doc_ids: Vec<i64>,
}

/// Full result of one `discover_topics` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterResult {
    /// Discovered clusters, largest first.
    pub topics: Vec<DiscoveredTopic>,
    /// Documents considered (had at least one surviving entity).
    pub documents_considered: usize,
    /// Entities surviving document-frequency pruning.
    pub entities_considered: usize,
}

fn idf(total_docs: usize, df: usize) -> f64 {
    (1.0 + total_docs as f64 / df as f64).ln()
}

/// IDF-weighted Jaccard between two entity-confidence maps, per spec.md
/// §4.10 step 4: numerator sums `idf(e) * max(conf_i, conf_j)` over shared
/// entities, denominator sums `idf(e)` over the union.
fn weighted_jaccard(
    a: &HashMap<String, f64>,
    b: &HashMap<String, f64>,
    idf_by_entity: &HashMap<String, f64>,
) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut seen = HashSet::new();
    for (entity, conf_a) in a {
        let Some(&weight) = idf_by_entity.get(entity) else {
            continue;
        };
        seen.insert(entity.as_str());
        let combined = b.get(entity).map_or(*conf_a, |conf_b| conf_a.max(*conf_b));
        numerator += weight * combined;
        denominator += weight;
    }
    for (entity, _) in b {
        if seen.contains(entity.as_str()) {
            continue;
        }
        if let Some(&weight) = idf_by_entity.get(entity) {
            denominator += weight;
        }
    }
    if denominator <= 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn prune_entities(
    matrix: &HashMap<i64, HashMap<String, f64>>,
    entity_types: Option<&[EntityType]>,
    types_by_entity: &HashMap<String, EntityType>,
    config: &ClusteringConfig,
) -> (HashMap<String, usize>, usize) {
    let mut df: HashMap<String, usize> = HashMap::new();
    for entities in matrix.values() {
        for entity in entities.keys() {
            if let Some(allowed) = entity_types
                && let Some(ty) = types_by_entity.get(entity)
                && !allowed.contains(ty)
            {
                continue;
            }
            *df.entry(entity.clone()).or_insert(0) += 1;
        }
    }

    let total_docs = matrix.len();
    let max_df = ((config.max_df_ratio * total_docs as f64) as usize).max(config.max_df_floor as usize);
    df.retain(|_, &mut count| count >= config.min_df as usize && count <= max_df);
    let surviving = df.len();
    (df, surviving)
}

pub(crate) fn derive_slug(label: &str) -> String {
    let mut slug = String::new();
    let mut last_was_sep = true;
    for ch in label.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    let truncated = truncated.trim_end_matches('-');
    if truncated.is_empty() {
        "topic".to_string()
    } else {
        truncated.to_string()
    }
}

fn entity_fingerprint(entities: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = entities.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let joined = sorted.join(",");
    let digest = Md5::digest(joined.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// One local-moving pass of CPM-style community detection, run to a fixed
/// point or [`MAX_MOVE_ITERATIONS`].
fn run_community_detection(
    graph: &UnGraph<i64, f64>,
    resolution: f64,
) -> HashMap<NodeIndex, usize> {
    let mut community: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .enumerate()
        .map(|(i, idx)| (idx, i))
        .collect();
    let mut community_size: HashMap<usize, usize> =
        community.values().map(|&c| (c, 1)).collect();

    for _ in 0..MAX_MOVE_ITERATIONS {
        let mut moved = false;
        for node in graph.node_indices() {
            let current = community[&node];
            let mut weight_to: HashMap<usize, f64> = HashMap::new();
            for edge in graph.edges(node) {
                let neighbor = if edge.source() == node { edge.target() } else { edge.source() };
                let neighbor_comm = community[&neighbor];
                *weight_to.entry(neighbor_comm).or_insert(0.0) += *edge.weight();
            }

            let current_size = community_size.get(&current).copied().unwrap_or(1);
            let mut best_comm = current;
            let mut best_gain = weight_to.get(&current).copied().unwrap_or(0.0)
                - resolution * ((current_size.saturating_sub(1)) as f64);

            for (&candidate, &w) in &weight_to {
                if candidate == current {
                    continue;
                }
                let candidate_size = community_size.get(&candidate).copied().unwrap_or(0);
                let gain = w - resolution * candidate_size as f64;
                if gain > best_gain {
                    best_gain = gain;
                    best_comm = candidate;
                }
            }

            if best_comm != current {
                *community_size.entry(current).or_insert(1) -= 1;
                *community_size.entry(best_comm).or_insert(0) += 1;
                community.insert(node, best_comm);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    community
}

impl Store {
    /// Runs the full clustering pipeline (prune -> IDF -> weighted-Jaccard
    /// graph -> community detection -> label/coherence/slug) without
    /// persisting anything. Call [`Store::save_topics`] with the result's
    /// member lists to commit.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from reading the entity matrix.
    pub fn discover_topics(
        &self,
        entity_types: Option<&[EntityType]>,
        config: &ClusteringConfig,
    ) -> Result<ClusterResult> {
        let full_matrix = self.entity_matrix(None)?;
        let restricted_matrix = if entity_types.is_some() {
            self.entity_matrix(entity_types)?
        } else {
            full_matrix.clone()
        };
        let types_by_entity = self.entity_types()?;

        let (df, entities_considered) =
            prune_entities(&restricted_matrix, entity_types, &types_by_entity, config);

        let total_docs = restricted_matrix.len();
        let idf_by_entity: HashMap<String, f64> = df
            .iter()
            .map(|(entity, &count)| (entity.clone(), idf(total_docs, count)))
            .collect();

        // Keep only surviving entities per document.
        let pruned: HashMap<i64, HashMap<String, f64>> = restricted_matrix
            .iter()
            .map(|(&doc_id, entities)| {
                let kept: HashMap<String, f64> = entities
                    .iter()
                    .filter(|(e, _)| idf_by_entity.contains_key(e.as_str()))
                    .map(|(e, &c)| (e.clone(), c))
                    .collect();
                (doc_id, kept)
            })
            .filter(|(_, entities)| !entities.is_empty())
            .collect();

        let doc_ids: Vec<i64> = pruned.keys().copied().collect();
        let documents_considered = doc_ids.len();

        let mut graph: UnGraph<i64, f64> = UnGraph::new_undirected();
        let mut node_by_doc: HashMap<i64, NodeIndex> = HashMap::new();
        for &doc_id in &doc_ids {
            node_by_doc.insert(doc_id, graph.add_node(doc_id));
        }

        let mut pairwise_weight: HashMap<(i64, i64), f64> = HashMap::new();
        for i in 0..doc_ids.len() {
            for j in (i + 1)..doc_ids.len() {
                let (a_id, b_id) = (doc_ids[i], doc_ids[j]);
                let weight = weighted_jaccard(&pruned[&a_id], &pruned[&b_id], &idf_by_entity);
                let key = (a_id.min(b_id), a_id.max(b_id));
                pairwise_weight.insert(key, weight);
                if weight >= config.min_edge_weight {
                    graph.add_edge(node_by_doc[&a_id], node_by_doc[&b_id], weight);
                }
            }
        }

        let communities = run_community_detection(&graph, config.resolution);

        let mut by_community: HashMap<usize, Vec<i64>> = HashMap::new();
        for (&node, &comm) in &communities {
            let doc_id = graph[node];
            by_community.entry(comm).or_default().push(doc_id);
        }

        let mut clusters: Vec<Vec<i64>> = by_community
            .into_values()
            .filter(|members| members.len() >= config.min_cluster_size)
            .collect();
        clusters.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut used_slugs: HashSet<String> = HashSet::new();
        let mut topics = Vec::with_capacity(clusters.len());
        for members in clusters {
            let topic = build_topic(
                &members,
                &pruned,
                &full_matrix,
                &idf_by_entity,
                &types_by_entity,
                &pairwise_weight,
                &mut used_slugs,
            );
            topics.push(topic);
        }

        Ok(ClusterResult {
            topics,
            documents_considered,
            entities_considered,
        })
    }

    /// Attempts to improve each topic's computed label via the LLM
    /// subprocess (a short prompt listing the topic's top entities,
    /// expecting a single-line label back). Falls back to the
    /// already-computed label, unchanged, whenever the CLI is missing —
    /// per spec.md §4.10's "graceful fallback" behavior.
    ///
    /// Returns the number of topics whose label was actually updated.
    ///
    /// # Errors
    ///
    /// Propagates storage errors; LLM failures other than
    /// [`crate::Error::ExternalToolMissing`] are also swallowed per-topic
    /// (a labeling nicety must never abort discovery).
    pub async fn auto_label_clusters(
        &self,
        llm: &dyn LlmClient,
        model: &str,
        timeout: std::time::Duration,
    ) -> Result<usize> {
        let mut updated = 0usize;
        for summary in self.get_topics()? {
            let request = LlmRequest {
                system: "Propose a concise 2-6 word title for a wiki topic given its \
                         most salient entities. Reply with the title only, no quotes, \
                         no punctuation at the end."
                    .to_string(),
                user: format!(
                    "Current label: {}\nTop entities: {}",
                    summary.topic.label,
                    summary.topic.label.replace(" / ", ", ")
                ),
                model: model.to_string(),
                timeout,
            };
            match llm.run(&request).await {
                Ok(response) => {
                    let proposed = response.text.trim();
                    if !proposed.is_empty() && proposed != summary.topic.label {
                        let slug = derive_slug(proposed);
                        if self.rename_topic(summary.topic.id, proposed, &slug).is_ok() {
                            updated += 1;
                        }
                    }
                }
                Err(crate::Error::ExternalToolMissing(_)) => break,
                Err(_) => continue,
            }
        }
        Ok(updated)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_topic(
    members: &[i64],
    pruned: &HashMap<i64, HashMap<String, f64>>,
    full_matrix: &HashMap<i64, HashMap<String, f64>>,
    idf_by_entity: &HashMap<String, f64>,
    types_by_entity: &HashMap<String, EntityType>,
    pairwise_weight: &HashMap<(i64, i64), f64>,
    used_slugs: &mut HashSet<String>,
) -> DiscoveredTopic {
    // Class-TF-IDF: sum confidences per entity across the cluster,
    // weighted by entity-type weight and IDF.
    let mut class_scores: HashMap<String, f64> = HashMap::new();
    for &doc_id in members {
        let Some(entities) = pruned.get(&doc_id) else {
            continue;
        };
        for (entity, &conf) in entities {
            let type_weight = types_by_entity
                .get(entity)
                .map_or(0.5, |t| t.weight());
            let weight = idf_by_entity.get(entity).copied().unwrap_or(0.0);
            *class_scores.entry(entity.clone()).or_insert(0.0) += conf * type_weight * weight;
        }
    }

    let mut ranked: Vec<(String, f64)> = class_scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let label_entities: Vec<String> = ranked
        .iter()
        .take(LABEL_METADATA_SIZE)
        .map(|(e, _)| e.clone())
        .collect();
    let label = if label_entities.is_empty() {
        "Untitled Topic".to_string()
    } else {
        label_entities
            .iter()
            .take(LABEL_HEADLINE_SIZE)
            .cloned()
            .collect::<Vec<_>>()
            .join(" / ")
    };

    let base_slug = derive_slug(&label);
    let mut slug = base_slug.clone();
    let mut suffix = 2;
    while used_slugs.contains(&slug) {
        slug = format!("{base_slug}-{suffix}");
        suffix += 1;
    }
    used_slugs.insert(slug.clone());

    let mut pair_count = 0usize;
    let mut pair_sum = 0.0;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            let key = (members[i].min(members[j]), members[i].max(members[j]));
            pair_sum += pairwise_weight.get(&key).copied().unwrap_or(0.0);
            pair_count += 1;
        }
    }
    let coherence_score = if pair_count == 0 { 0.0 } else { pair_sum / pair_count as f64 };

    let mut all_entities: HashSet<String> = HashSet::new();
    for &doc_id in members {
        if let Some(entities) = full_matrix.get(&doc_id) {
            all_entities.extend(entities.keys().cloned());
        }
    }

    DiscoveredTopic {
        slug,
        label,
        label_entities,
        entity_fingerprint: entity_fingerprint(&all_entities),
        coherence_score,
        member_doc_ids: members.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;
    use crate::models::EntityType as ET;

    fn config() -> ClusteringConfig {
        ClusteringConfig {
            min_df: 2,
            max_df_ratio: 0.15,
            max_df_floor: 5,
            min_edge_weight: 0.05,
            resolution: 0.05,
            min_cluster_size: 3,
        }
    }

    fn save(store: &Store, title: &str, content: &str) -> i64 {
        store.save_document(title, content, None, &[], None, DocType::User).unwrap()
    }

    #[test]
    fn discovers_a_cluster_of_related_documents() {
        let store = Store::open_in_memory().unwrap();
        let mut ids = vec![];
        for i in 0..4 {
            let id = save(&store, &format!("Falcon Doc {i}"), "content");
            store
                .save_entities(
                    id,
                    &[
                        ("falcon scheduler".to_string(), ET::ProperNoun, 0.9),
                        ("event loop".to_string(), ET::TechTerm, 0.9),
                        ("task queue".to_string(), ET::TechTerm, 0.8),
                    ],
                )
                .unwrap();
            ids.push(id);
        }
        for i in 0..2 {
            let id = save(&store, &format!("Unrelated Doc {i}"), "content");
            store
                .save_entities(
                    id,
                    &[("something else entirely".to_string(), ET::Concept, 0.5)],
                )
                .unwrap();
        }

        let result = store.discover_topics(None, &config()).unwrap();
        assert!(!result.topics.is_empty());
        let biggest = &result.topics[0];
        assert!(biggest.member_doc_ids.len() >= 3);
        assert!(biggest.coherence_score > 0.0);
        assert!(!biggest.slug.is_empty());
    }

    #[test]
    fn empty_store_yields_no_topics() {
        let store = Store::open_in_memory().unwrap();
        let result = store.discover_topics(None, &config()).unwrap();
        assert!(result.topics.is_empty());
    }

    #[test]
    fn slug_derivation_is_bounded_and_lowercase() {
        let slug = derive_slug("Falcon Scheduler / Event Loop & Task Queue!!!");
        assert_eq!(slug, slug.to_lowercase());
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.contains(' '));
    }
}
