//! Topic clustering, wiki synthesis, editorial controls, and export.

use std::sync::Arc;

use clap::{Args, Subcommand};

use crate::config::AppConfig;
use crate::models::{EntityType, TopicStatus};
use crate::services::{AudienceMode, GenerateOptions};
use crate::storage::wiki::NewTopic;
use crate::{Error, LlmClient, Result, Store};

use super::Output;

/// `wiki <subcommand>`.
#[derive(Debug, Subcommand)]
pub enum WikiCommand {
    /// Preview (and optionally persist) a fresh clustering pass.
    Topics(TopicsArgs),
    /// List saved topics with member counts.
    List,
    /// Set a topic's editorial status directly.
    Status(StatusArgs),
    /// Exclude a topic from batch generation.
    Skip(TopicIdArgs),
    /// Re-include a previously skipped topic.
    Unskip(TopicIdArgs),
    /// Protect a topic from the up-to-date skip check.
    Pin(TopicIdArgs),
    /// Remove pinned protection.
    Unpin(TopicIdArgs),
    /// Generate (or regenerate) one or all active topics' articles.
    Generate(GenerateArgs),
    /// List past batch-synthesis runs.
    Runs(RunsArgs),
    /// Fraction of active topics with an up-to-date article.
    Coverage,
    /// Summary of the most recent batch run.
    Progress,
    /// Unified diff between an article's current and previous content.
    Diff(TopicIdArgs),
    /// Rate an article 1-5 stars.
    Rate(RateArgs),
    /// Rename a topic's label (and derived slug).
    Rename(RenameArgs),
    /// Sweep active topics, adopting each article's first heading as the title.
    Retitle,
    /// Merge secondary topics into a primary one.
    Merge(MergeArgs),
    /// Split documents out of a topic into a new one.
    Split(SplitArgs),
    /// List a topic's member documents with weight/inclusion state.
    Sources(TopicIdArgs),
    /// Set a member document's relevance weight.
    Weight(WeightArgs),
    /// Exclude a member document from synthesis.
    Exclude(MemberArgs),
    /// Re-include a previously excluded member document.
    Include(MemberArgs),
    /// Set a per-topic model override.
    Model(ModelArgs),
    /// Set a per-topic editorial-guidance prompt.
    Prompt(PromptArgs),
    /// Render the static-site export tree.
    Export(ExportArgs),
    /// Build (and optionally render) the entity glossary.
    Entities(EntitiesIndexArgs),
    /// Flag topics needing editorial attention.
    Triage,
    /// First-run bootstrap: wikify, extract entities, discover and save topics.
    Setup(SetupArgs),
}

pub fn dispatch(cmd: &WikiCommand, store: &Store, config: &AppConfig, llm: &Arc<dyn LlmClient>) -> Result<Output> {
    match cmd {
        WikiCommand::Topics(args) => topics(store, args, config),
        WikiCommand::List => list(store),
        WikiCommand::Status(args) => status(store, args),
        WikiCommand::Skip(args) => set_status(store, args.topic_id, TopicStatus::Skipped),
        WikiCommand::Unskip(args) => set_status(store, args.topic_id, TopicStatus::Active),
        WikiCommand::Pin(args) => set_status(store, args.topic_id, TopicStatus::Pinned),
        WikiCommand::Unpin(args) => set_status(store, args.topic_id, TopicStatus::Active),
        WikiCommand::Generate(args) => generate(store, args, config, llm),
        WikiCommand::Runs(args) => runs(store, args),
        WikiCommand::Coverage => coverage(store),
        WikiCommand::Progress => progress(store),
        WikiCommand::Diff(args) => diff(store, args),
        WikiCommand::Rate(args) => rate(store, args),
        WikiCommand::Rename(args) => rename(store, args),
        WikiCommand::Retitle => retitle(store),
        WikiCommand::Merge(args) => merge(store, args),
        WikiCommand::Split(args) => split(store, args),
        WikiCommand::Sources(args) => sources(store, args),
        WikiCommand::Weight(args) => weight(store, args),
        WikiCommand::Exclude(args) => set_included(store, args, false),
        WikiCommand::Include(args) => set_included(store, args, true),
        WikiCommand::Model(args) => model(store, args),
        WikiCommand::Prompt(args) => prompt(store, args),
        WikiCommand::Export(args) => export(store, args, config),
        WikiCommand::Entities(args) => entities_index(store, args),
        WikiCommand::Triage => triage(store),
        WikiCommand::Setup(args) => setup(store, args, config),
    }
}

fn run_async<F: std::future::Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().map_err(Error::Io)?;
    Ok(rt.block_on(future))
}

fn parse_entity_types(raw: &str) -> Vec<EntityType> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(EntityType::parse).collect()
}

#[derive(Debug, Args)]
pub struct TopicsArgs {
    /// Restrict clustering to these comma-separated entity types.
    #[arg(long)]
    pub entity_types: Option<String>,
    /// Persist the discovered clusters (replacing the saved topic set).
    #[arg(long)]
    pub save: bool,
}

fn topics(store: &Store, args: &TopicsArgs, config: &AppConfig) -> Result<Output> {
    let types = args.entity_types.as_deref().map(parse_entity_types);
    let result = store.discover_topics(types.as_deref(), &config.clustering)?;
    if args.save {
        let new_topics: Vec<NewTopic> = result
            .topics
            .iter()
            .map(|t| NewTopic {
                slug: t.slug.clone(),
                label: t.label.clone(),
                entity_fingerprint: t.entity_fingerprint.clone(),
                coherence_score: t.coherence_score,
                member_doc_ids: t.member_doc_ids.clone(),
            })
            .collect();
        let saved = store.save_topics(&new_topics)?;
        return Ok(Output::new(
            serde_json::json!({ "saved": saved }),
            format!("saved {saved} topics ({} documents considered)", result.documents_considered),
        ));
    }
    let human = result
        .topics
        .iter()
        .map(|t| format!("{} ({} docs, coherence {:.2})", t.label, t.member_doc_ids.len(), t.coherence_score))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(
        serde_json::json!({
            "documents_considered": result.documents_considered,
            "entities_considered": result.entities_considered,
            "topics": result.topics.iter().map(|t| serde_json::json!({
                "slug": t.slug, "label": t.label, "coherence_score": t.coherence_score,
                "member_doc_ids": t.member_doc_ids,
            })).collect::<Vec<_>>(),
        }),
        human,
    ))
}

fn list(store: &Store) -> Result<Output> {
    let topics = store.get_topics()?;
    let human = topics
        .iter()
        .map(|t| format!("[{}] {} ({} members, {})", t.topic.id, t.topic.label, t.member_count, t.topic.status.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(serde_json::to_value(&topics).unwrap_or_default(), human))
}

#[derive(Debug, Args)]
pub struct TopicIdArgs {
    /// Topic id.
    pub topic_id: i64,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Topic id.
    pub topic_id: i64,
    /// `active`, `skipped`, or `pinned`.
    pub status: String,
}

fn status(store: &Store, args: &StatusArgs) -> Result<Output> {
    let status = match args.status.as_str() {
        "active" => TopicStatus::Active,
        "skipped" => TopicStatus::Skipped,
        "pinned" => TopicStatus::Pinned,
        other => return Err(Error::BadInput(format!("unknown status {other:?}; expected active, skipped, or pinned"))),
    };
    set_status(store, args.topic_id, status)
}

fn set_status(store: &Store, topic_id: i64, status: TopicStatus) -> Result<Output> {
    store.set_topic_status(topic_id, status)?;
    Ok(Output::new(serde_json::json!({ "topic_id": topic_id, "status": status.as_str() }), format!("topic {topic_id} set to {}", status.as_str())))
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Generate a single topic by id.
    pub topic_id: Option<i64>,
    /// Generate every active topic instead of one.
    #[arg(long)]
    pub all: bool,
    /// Cap on topics processed in an `--all` batch.
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
    /// Audience privacy mode: `me`, `team`, or `public`.
    #[arg(long, default_value = "team")]
    pub audience: String,
    /// Explicit model override.
    #[arg(long)]
    pub model: Option<String>,
    /// Estimate cost without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

fn generate_options(args: &GenerateArgs, config: &AppConfig) -> GenerateOptions {
    GenerateOptions {
        audience: AudienceMode::parse(&args.audience),
        model_override: args.model.clone(),
        default_model: config.llm.default_model.clone(),
        dry_run: args.dry_run,
        timeout: config.llm.timeout,
        config: config.synthesis,
    }
}

fn generate(store: &Store, args: &GenerateArgs, config: &AppConfig, llm: &Arc<dyn LlmClient>) -> Result<Output> {
    let options = generate_options(args, config);

    if args.all {
        let topic_ids: Vec<i64> = store
            .get_topics()?
            .into_iter()
            .filter(|t| t.topic.status != TopicStatus::Skipped)
            .map(|t| t.topic.id)
            .collect();
        let (run_id, outcomes) = run_async(store.generate_wiki(&topic_ids, args.limit, llm.as_ref(), &options))??;
        let generated = outcomes.iter().filter(|o| matches!(o, crate::services::SynthesisOutcome::Generated(_))).count();
        let skipped = outcomes.iter().filter(|o| matches!(o, crate::services::SynthesisOutcome::Skipped(_))).count();
        let failed = outcomes.iter().filter(|o| matches!(o, crate::services::SynthesisOutcome::Failed { .. })).count();
        return Ok(Output::new(
            serde_json::json!({ "run_id": run_id, "generated": generated, "skipped": skipped, "failed": failed }),
            format!("run {run_id}: {generated} generated, {skipped} skipped, {failed} failed"),
        ));
    }

    let Some(topic_id) = args.topic_id else {
        return Err(Error::BadInput("a topic id is required without --all".to_string()));
    };
    let result = run_async(store.generate_article(topic_id, llm.as_ref(), &options))??;
    let human = if result.skipped {
        format!("topic {topic_id} skipped: {}", result.skip_reason.as_deref().unwrap_or("unknown"))
    } else {
        format!("topic {topic_id} generated (version {}, ${:.4})", result.version, result.cost_usd)
    };
    Ok(Output::new(
        serde_json::json!({
            "topic_id": result.topic_id, "document_id": result.document_id, "skipped": result.skipped,
            "skip_reason": result.skip_reason, "model": result.model, "input_tokens": result.input_tokens,
            "output_tokens": result.output_tokens, "cost_usd": result.cost_usd, "version": result.version,
            "warnings": result.warnings,
        }),
        human,
    ))
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    /// Result cap.
    #[arg(long, short = 'l', default_value_t = 20)]
    pub limit: usize,
}

fn runs(store: &Store, args: &RunsArgs) -> Result<Output> {
    let runs = store.list_wiki_runs(args.limit)?;
    let human = runs
        .iter()
        .map(|r| format!("[{}] {} generated, {} skipped ({})", r.id, r.topics_generated, r.topics_skipped, r.started_at))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(serde_json::to_value(&runs).unwrap_or_default(), human))
}

fn coverage(store: &Store) -> Result<Output> {
    let topics = store.get_topics()?;
    let active: Vec<_> = topics.into_iter().filter(|t| t.topic.status != TopicStatus::Skipped).collect();
    let total = active.len();
    let mut up_to_date = 0usize;
    for summary in &active {
        if let Some(article) = store.get_article_for_topic(summary.topic.id)?
            && !article.is_stale
        {
            up_to_date += 1;
        }
    }
    let ratio = if total == 0 { 0.0 } else { up_to_date as f64 / total as f64 };
    Ok(Output::new(
        serde_json::json!({ "total_active_topics": total, "up_to_date": up_to_date, "coverage": ratio }),
        format!("{up_to_date}/{total} active topics up to date ({:.0}%)", ratio * 100.0),
    ))
}

fn progress(store: &Store) -> Result<Output> {
    let Some(latest) = store.list_wiki_runs(1)?.into_iter().next() else {
        return Ok(Output::new(serde_json::json!({ "runs": 0 }), "no runs yet"));
    };
    let percent = if latest.topics_attempted == 0 {
        0.0
    } else {
        (latest.topics_generated + latest.topics_skipped) as f64 / latest.topics_attempted as f64 * 100.0
    };
    let status = if latest.completed_at.is_some() { "completed" } else { "in progress" };
    Ok(Output::new(
        serde_json::to_value(&latest).unwrap_or_default(),
        format!(
            "run {} ({status}): {}/{} topics processed ({:.0}%)",
            latest.id, latest.topics_generated + latest.topics_skipped, latest.topics_attempted, percent
        ),
    ))
}

fn diff(store: &Store, args: &TopicIdArgs) -> Result<Output> {
    let diff = store.get_article_diff(args.topic_id)?;
    let human = diff.clone().unwrap_or_else(|| "no previous version to diff against".to_string());
    Ok(Output::new(serde_json::json!({ "diff": diff }), human))
}

#[derive(Debug, Args)]
pub struct RateArgs {
    /// Article id (see `wiki list` / `wiki sources`).
    pub article_id: i64,
    /// Rating, 1-5.
    pub rating: u8,
}

fn rate(store: &Store, args: &RateArgs) -> Result<Output> {
    store.rate_article(args.article_id, args.rating)?;
    Ok(Output::new(serde_json::json!({ "article_id": args.article_id, "rating": args.rating }), format!("rated article {} as {}", args.article_id, args.rating)))
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Topic id.
    pub topic_id: i64,
    /// New display label.
    pub label: String,
}

fn rename(store: &Store, args: &RenameArgs) -> Result<Output> {
    let slug = crate::services::derive_slug(&args.label);
    store.rename_topic(args.topic_id, &args.label, &slug)?;
    Ok(Output::new(serde_json::json!({ "topic_id": args.topic_id, "label": args.label, "slug": slug }), format!("renamed topic {} to {:?}", args.topic_id, args.label)))
}

fn retitle(store: &Store) -> Result<Output> {
    let topics = store.get_topics()?;
    let mut renamed = 0usize;
    for summary in &topics {
        if summary.topic.status == TopicStatus::Skipped {
            continue;
        }
        let Some(article) = store.get_article_for_topic(summary.topic.id)? else {
            continue;
        };
        let Some(document) = store.get_document(crate::storage::documents::DocRef::Id(article.document_id))? else {
            continue;
        };
        let Some(h1) = document.content.lines().find_map(|line| line.strip_prefix("# ").map(str::trim)) else {
            continue;
        };
        if h1.is_empty() || h1 == summary.topic.label {
            continue;
        }
        let slug = crate::services::derive_slug(h1);
        match store.rename_topic(summary.topic.id, h1, &slug) {
            Ok(()) => renamed += 1,
            Err(Error::Conflict(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(Output::new(serde_json::json!({ "renamed": renamed }), format!("retitled {renamed} topics")))
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Surviving topic id.
    pub primary_topic_id: i64,
    /// Topic ids to merge into the primary, comma-separated.
    #[arg(value_delimiter = ',')]
    pub secondary_topic_ids: Vec<i64>,
}

fn merge(store: &Store, args: &MergeArgs) -> Result<Output> {
    store.merge_topics(args.primary_topic_id, &args.secondary_topic_ids)?;
    Ok(Output::new(
        serde_json::json!({ "primary_topic_id": args.primary_topic_id, "merged": args.secondary_topic_ids }),
        format!("merged {:?} into topic {}", args.secondary_topic_ids, args.primary_topic_id),
    ))
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    /// Source topic id.
    pub topic_id: i64,
    /// New topic's label.
    pub new_label: String,
    /// Document ids to move into the new topic, comma-separated.
    #[arg(value_delimiter = ',')]
    pub document_ids: Vec<i64>,
}

fn split(store: &Store, args: &SplitArgs) -> Result<Output> {
    let new_topic_id = store.split_topic(args.topic_id, &args.document_ids, &args.new_label)?;
    Ok(Output::new(
        serde_json::json!({ "new_topic_id": new_topic_id }),
        format!("split {} documents out of topic {} into new topic {new_topic_id}", args.document_ids.len(), args.topic_id),
    ))
}

fn sources(store: &Store, args: &TopicIdArgs) -> Result<Output> {
    let members = store.get_topic_members(args.topic_id)?;
    let human = members
        .iter()
        .map(|m| format!("doc {} weight {:.2} {}", m.document_id, m.relevance_score, if m.is_primary { "included" } else { "excluded" }))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(serde_json::to_value(&members).unwrap_or_default(), human))
}

#[derive(Debug, Args)]
pub struct WeightArgs {
    /// Topic id.
    pub topic_id: i64,
    /// Member document id.
    pub document_id: i64,
    /// New relevance weight, in `[0, 1]`.
    pub weight: f64,
}

fn weight(store: &Store, args: &WeightArgs) -> Result<Output> {
    store.set_member_weight(args.topic_id, args.document_id, args.weight)?;
    Ok(Output::new(serde_json::json!({ "topic_id": args.topic_id, "document_id": args.document_id, "weight": args.weight }), "weight updated"))
}

#[derive(Debug, Args)]
pub struct MemberArgs {
    /// Topic id.
    pub topic_id: i64,
    /// Member document id.
    pub document_id: i64,
}

fn set_included(store: &Store, args: &MemberArgs, included: bool) -> Result<Output> {
    store.set_member_included(args.topic_id, args.document_id, included)?;
    Ok(Output::new(
        serde_json::json!({ "topic_id": args.topic_id, "document_id": args.document_id, "included": included }),
        if included { "member included" } else { "member excluded" },
    ))
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Topic id.
    pub topic_id: i64,
    /// Model override; omit to clear it.
    pub model: Option<String>,
}

fn model(store: &Store, args: &ModelArgs) -> Result<Output> {
    store.set_topic_model_override(args.topic_id, args.model.as_deref())?;
    Ok(Output::new(
        serde_json::json!({ "topic_id": args.topic_id, "model": args.model }),
        args.model.as_deref().map_or_else(|| "model override cleared".to_string(), |m| format!("model override set to {m}")),
    ))
}

#[derive(Debug, Args)]
pub struct PromptArgs {
    /// Topic id.
    pub topic_id: i64,
    /// Editorial guidance text; omit to clear it.
    pub prompt: Option<String>,
}

fn prompt(store: &Store, args: &PromptArgs) -> Result<Output> {
    store.set_topic_editorial_prompt(args.topic_id, args.prompt.as_deref())?;
    Ok(Output::new(
        serde_json::json!({ "topic_id": args.topic_id, "has_prompt": args.prompt.is_some() }),
        if args.prompt.is_some() { "editorial prompt set" } else { "editorial prompt cleared" },
    ))
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Output directory for the static-site tree.
    pub out_dir: Option<String>,
    /// Restrict to one topic's article.
    #[arg(long)]
    pub topic_id: Option<i64>,
}

fn export(store: &Store, args: &ExportArgs, config: &AppConfig) -> Result<Output> {
    let out_dir = args.out_dir.clone().map_or_else(|| config.export_dir.clone(), std::path::PathBuf::from);
    let summary = store.export_wiki(&out_dir, args.topic_id)?;
    Ok(Output::new(
        serde_json::json!({ "articles_written": summary.articles_written, "entities_written": summary.entities_written, "out_dir": out_dir }),
        format!("wrote {} articles and {} entity pages to {}", summary.articles_written, summary.entities_written, out_dir.display()),
    ))
}

#[derive(Debug, Args)]
pub struct EntitiesIndexArgs {
    /// Show the detail page for one entity instead of the index.
    pub entity: Option<String>,
}

fn entities_index(store: &Store, args: &EntitiesIndexArgs) -> Result<Output> {
    let index = store.build_entity_index()?;
    if let Some(entity) = &args.entity {
        let page = store.entity_page(entity, &index)?.ok_or_else(|| Error::NotFound(format!("entity {entity:?}")))?;
        let human = format!("{} ({}, tier {}) — {} mentions", page.entity, page.entity_type.as_str(), page.tier.as_str(), page.doc_frequency);
        return Ok(Output::new(serde_json::to_value(&page).unwrap_or_default(), human));
    }
    let human = index
        .iter()
        .map(|e| format!("{} (tier {}, df {})", e.entity, e.tier.as_str(), e.doc_frequency))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(serde_json::to_value(&index).unwrap_or_default(), human))
}

fn triage(store: &Store) -> Result<Output> {
    let topics = store.get_topics()?;
    let mut flagged = Vec::new();
    for summary in &topics {
        let article = store.get_article_for_topic(summary.topic.id)?;
        let reason = match (&summary.topic.status, &article) {
            (TopicStatus::Skipped, _) => continue,
            (_, None) => Some("no article yet".to_string()),
            (_, Some(a)) if a.is_stale => Some(format!("stale: {}", a.stale_reason.clone().unwrap_or_default())),
            (_, Some(a)) if a.rating.is_some_and(|r| r <= 2) => Some(format!("low rating ({})", a.rating.unwrap())),
            _ => None,
        };
        if let Some(reason) = reason {
            flagged.push(serde_json::json!({ "topic_id": summary.topic.id, "label": summary.topic.label, "reason": reason }));
        }
    }
    let human = if flagged.is_empty() {
        "nothing needs attention".to_string()
    } else {
        flagged
            .iter()
            .map(|f| format!("[{}] {}: {}", f["topic_id"], f["label"].as_str().unwrap_or(""), f["reason"].as_str().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(Output::new(serde_json::json!({ "flagged": flagged }), human))
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Skip the title/entity wikification passes and only cluster+save.
    #[arg(long)]
    pub skip_wikify: bool,
}

fn setup(store: &Store, args: &SetupArgs, config: &AppConfig) -> Result<Output> {
    let mut extracted = 0usize;
    let mut wikified = 0usize;
    if !args.skip_wikify {
        for doc in store.list_documents(None, 1_000_000)? {
            extracted += store.extract_and_save_entities_heuristic(doc.id)?;
        }
        wikified = store.wikify_all_titles(false, false)?.created;
        wikified += store.rebuild_entity_match_links(true)?;
    }
    let result = store.discover_topics(None, &config.clustering)?;
    let new_topics: Vec<NewTopic> = result
        .topics
        .iter()
        .map(|t| NewTopic {
            slug: t.slug.clone(),
            label: t.label.clone(),
            entity_fingerprint: t.entity_fingerprint.clone(),
            coherence_score: t.coherence_score,
            member_doc_ids: t.member_doc_ids.clone(),
        })
        .collect();
    let topics_saved = store.save_topics(&new_topics)?;
    Ok(Output::new(
        serde_json::json!({ "entities_extracted": extracted, "links_created": wikified, "topics_saved": topics_saved }),
        format!("extracted {extracted} entities, created {wikified} links, saved {topics_saved} topics"),
    ))
}
