//! Link-graph maintenance: wikification, entity extraction, duplicate
//! detection, and read-only analytics (C4-C9).

use std::sync::Arc;

use clap::{Args, Subcommand};

use crate::config::AppConfig;
use crate::models::{EntityType, LinkMethod};
use crate::{Error, LlmClient, Result, Store};

use super::Output;

/// `maintain <subcommand>`.
#[derive(Debug, Subcommand)]
pub enum MaintainCommand {
    /// Create a manual link between two documents.
    Link(LinkArgs),
    /// Remove the link between two documents.
    Unlink(UnlinkArgs),
    /// Title-match and entity-match wikification.
    Wikify(WikifyArgs),
    /// Entity extraction and listing.
    Entities(EntitiesArgs),
    /// Semantic-similarity wikification and embedding coverage.
    Index(IndexArgs),
    /// Exact and near-duplicate detection.
    Duplicates(DuplicatesArgs),
    /// Abandoned task-structure drift report.
    Drift(DriftArgs),
    /// Per-document freshness scoring.
    Freshness(FreshnessArgs),
    /// Tag/link/project coverage gaps.
    Gaps(GapsArgs),
}

pub fn dispatch(cmd: &MaintainCommand, store: &Store, config: &AppConfig, llm: &Arc<dyn LlmClient>) -> Result<Output> {
    match cmd {
        MaintainCommand::Link(args) => link(store, args),
        MaintainCommand::Unlink(args) => unlink(store, args),
        MaintainCommand::Wikify(args) => wikify(store, args, config),
        MaintainCommand::Entities(args) => entities(store, args, config, llm),
        MaintainCommand::Index(args) => index(store, args, config),
        MaintainCommand::Duplicates(args) => duplicates(store, args, config),
        MaintainCommand::Drift(args) => drift(store, args),
        MaintainCommand::Freshness(args) => freshness(store, args),
        MaintainCommand::Gaps(args) => gaps(store, args),
    }
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    /// Source document id.
    pub source: i64,
    /// Target document id.
    pub target: i64,
    /// Similarity score to record.
    #[arg(long, default_value_t = 1.0)]
    pub score: f64,
}

fn link(store: &Store, args: &LinkArgs) -> Result<Output> {
    let id = store.create_link(args.source, args.target, args.score, LinkMethod::Manual)?;
    Ok(Output::new(
        serde_json::json!({ "created": id.is_some(), "link_id": id }),
        if id.is_some() {
            format!("linked {} <-> {}", args.source, args.target)
        } else {
            "no link created (self-link or already linked)".to_string()
        },
    ))
}

#[derive(Debug, Args)]
pub struct UnlinkArgs {
    /// Source document id.
    pub source: i64,
    /// Target document id.
    pub target: i64,
}

fn unlink(store: &Store, args: &UnlinkArgs) -> Result<Output> {
    let removed = store.delete_link(args.source, args.target)?;
    Ok(Output::new(serde_json::json!({ "removed": removed }), if removed { "unlinked" } else { "no such link" }))
}

#[derive(Debug, Args)]
pub struct WikifyArgs {
    /// Restrict to a single document id; omit to wikify every document.
    pub document_id: Option<i64>,
    /// Preview title matches without creating links.
    #[arg(long)]
    pub dry_run: bool,
    /// Allow title matches to cross project boundaries.
    #[arg(long)]
    pub cross_project: bool,
    /// Rebuild entity-match links from scratch instead of an incremental run.
    #[arg(long)]
    pub rebuild: bool,
}

fn wikify(store: &Store, args: &WikifyArgs, config: &AppConfig) -> Result<Output> {
    if args.rebuild {
        let created = store.rebuild_entity_match_links(!args.cross_project)?;
        return Ok(Output::new(serde_json::json!({ "entity_links_created": created }), format!("rebuilt entity-match links: {created} created")));
    }

    let _ = &config.synthesis;
    if let Some(id) = args.document_id {
        let title_result = store.title_match_wikify(id, args.dry_run, args.cross_project)?;
        let entity_result = if args.dry_run {
            None
        } else {
            Some(store.entity_match_wikify(id, !args.cross_project)?)
        };
        return Ok(Output::new(
            serde_json::json!({ "title_match": {
                "created": title_result.created,
                "matched_ids": title_result.matched_ids,
                "existing_skipped": title_result.existing_skipped,
                "dry_run": title_result.dry_run,
            }, "entity_match": entity_result.as_ref().map(|r| serde_json::json!({
                "created": r.created, "existing_skipped": r.existing_skipped,
            })) }),
            format!(
                "title-match: {} created, {} matched, {} skipped{}",
                title_result.created,
                title_result.matched_ids.len(),
                title_result.existing_skipped,
                entity_result.map(|r| format!("; entity-match: {} created", r.created)).unwrap_or_default()
            ),
        ));
    }

    let batch = store.wikify_all_titles(args.dry_run, args.cross_project)?;
    Ok(Output::new(
        serde_json::json!({ "documents_processed": batch.documents_processed, "created": batch.created, "existing_skipped": batch.existing_skipped }),
        format!("wikified {} documents: {} links created, {} already linked", batch.documents_processed, batch.created, batch.existing_skipped),
    ))
}

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    /// Document id to extract entities from; omit to list the corpus' top entities.
    pub document_id: Option<i64>,
    /// Use the LLM extraction path instead of the heuristic extractor.
    #[arg(long)]
    pub llm: bool,
}

fn entities(store: &Store, args: &EntitiesArgs, config: &AppConfig, llm: &Arc<dyn LlmClient>) -> Result<Output> {
    let Some(document_id) = args.document_id else {
        return Err(Error::BadInput("a document id is required".to_string()));
    };
    if args.llm {
        let rt = tokio::runtime::Runtime::new().map_err(crate::Error::Io)?;
        let result = rt.block_on(store.extract_and_save_entities_llm(
            document_id,
            llm,
            &config.llm.default_model,
            config.llm.max_entity_extraction_chars,
            config.llm.timeout,
        ))?;
        return Ok(Output::new(
            serde_json::json!({
                "entities_saved": result.entities_saved,
                "relationships_saved": result.relationships_saved,
                "input_tokens": result.input_tokens,
                "output_tokens": result.output_tokens,
                "cost_usd": result.cost_usd,
            }),
            format!("saved {} entities, {} relationships (${:.4})", result.entities_saved, result.relationships_saved, result.cost_usd),
        ));
    }
    let saved = store.extract_and_save_entities_heuristic(document_id)?;
    Ok(Output::new(serde_json::json!({ "entities_saved": saved }), format!("saved {saved} entities")))
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Restrict to a single document id; omit with `--all` to index every document.
    pub document_id: Option<i64>,
    /// Semantically wikify every document instead of just `document_id`.
    #[arg(long)]
    pub all: bool,
    /// Override the configured minimum cosine similarity.
    #[arg(long, short = 't')]
    pub threshold: Option<f64>,
    /// Allow matches to cross project boundaries.
    #[arg(long)]
    pub cross_project: bool,
}

fn index(store: &Store, args: &IndexArgs, config: &AppConfig) -> Result<Output> {
    let embedder = crate::embedding::default_embedder()?;
    let threshold = args.threshold.unwrap_or(config.semantic.similarity_threshold);

    if args.all {
        let batch = store.semantic_wikify_all(embedder.as_ref(), threshold, !args.cross_project)?;
        return Ok(Output::new(
            serde_json::json!({
                "documents_processed": batch.documents_processed,
                "created": batch.created,
                "existing_skipped": batch.existing_skipped,
            }),
            format!(
                "semantically wikified {} documents: {} links created, {} already linked",
                batch.documents_processed, batch.created, batch.existing_skipped
            ),
        ));
    }

    let Some(document_id) = args.document_id else {
        let stats = store.embedding_index_stats(embedder.as_ref())?;
        return Ok(Output::new(
            serde_json::json!({
                "indexed_docs": stats.indexed_docs,
                "indexed_chunks": stats.indexed_chunks,
                "coverage_percent": stats.coverage_percent,
            }),
            format!("{} documents indexed ({:.1}% coverage)", stats.indexed_docs, stats.coverage_percent),
        ));
    };

    let result = store.semantic_wikify(document_id, embedder.as_ref(), threshold, !args.cross_project)?;
    Ok(Output::new(
        serde_json::json!({
            "created": result.created,
            "existing_skipped": result.existing_skipped,
            "candidates_considered": result.candidates_considered,
        }),
        format!("semantic match: {} created, {} already linked, {} candidates considered", result.created, result.existing_skipped, result.candidates_considered),
    ))
}

#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Only report near-duplicates above this estimated Jaccard similarity.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Skip the exact-hash pass and only run near-duplicate detection.
    #[arg(long)]
    pub near_only: bool,
    /// Cap the number of documents scanned for near-duplicates.
    #[arg(long)]
    pub limit: Option<usize>,
}

fn duplicates(store: &Store, args: &DuplicatesArgs, config: &AppConfig) -> Result<Output> {
    let exact = if args.near_only { Vec::new() } else { store.find_exact_duplicates()? };
    let threshold = args.threshold.unwrap_or(config.duplicates.similarity_threshold);
    let near = store.find_near_duplicates(threshold, Some(config.duplicates.minhash_perms), args.limit)?;

    let human = format!("{} exact duplicate groups, {} near-duplicate pairs (>= {threshold:.2})", exact.len(), near.len());
    Ok(Output::new(
        serde_json::json!({
            "exact_groups": exact.iter().map(|g| serde_json::json!({ "content_hash": g.content_hash, "document_ids": g.document_ids })).collect::<Vec<_>>(),
            "near_pairs": near.iter().map(|p| serde_json::json!({ "a": p.a, "b": p.b, "estimated_jaccard": p.estimated_jaccard })).collect::<Vec<_>>(),
        }),
        human,
    ))
}

#[derive(Debug, Args)]
pub struct DriftArgs {
    /// Staleness window in days.
    #[arg(long, default_value_t = 30)]
    pub days: i64,
}

fn drift(store: &Store, args: &DriftArgs) -> Result<Output> {
    let report = store.drift_report(args.days)?;
    let human = report.to_summary();
    Ok(Output::new(serde_json::to_value(&report).unwrap_or_default(), human))
}

#[derive(Debug, Args)]
pub struct FreshnessArgs {
    /// Score below which a document is considered stale.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Only list stale documents.
    #[arg(long)]
    pub stale_only: bool,
}

fn freshness(store: &Store, args: &FreshnessArgs) -> Result<Output> {
    let report = store.freshness_report(args.threshold, args.stale_only)?;
    let human = report.to_summary();
    Ok(Output::new(
        serde_json::json!({
            "total_docs": report.total_docs,
            "scored_docs": report.scored_docs,
            "stale_count": report.stale_count,
            "threshold": report.threshold,
            "entries": report.entries.iter().map(|e| serde_json::json!({
                "document_id": e.document_id, "title": e.title, "score": e.score,
            })).collect::<Vec<_>>(),
        }),
        human,
    ))
}

#[derive(Debug, Args)]
pub struct GapsArgs {
    /// Days of inactivity before a tag is considered stale.
    #[arg(long)]
    pub stale_days: Option<i64>,
}

fn gaps(store: &Store, args: &GapsArgs) -> Result<Output> {
    let report = store.gap_report(args.stale_days)?;
    let human = report.to_summary();
    Ok(Output::new(serde_json::to_value(&report).unwrap_or_default(), human))
}

#[allow(dead_code)]
fn parse_entity_types(raw: &str) -> Vec<EntityType> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(EntityType::parse).collect()
}
