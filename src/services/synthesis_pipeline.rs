//! Synthesis pipeline (C13): the central orchestrator that turns a
//! clustered topic into an LLM-authored wiki article through six timed
//! steps — PREPARE, ROUTE, OUTLINE, WRITE, VALIDATE, SAVE — plus the
//! RETITLE post-step and the full editorial-control surface.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::SynthesisConfig;
use crate::llm::{estimate_cost_usd, resolve_model_shorthand, LlmRequest};
use crate::models::{DocType, WikiArticleTiming};
use crate::{Error, LlmClient, Result, Store};

use super::privacy_filter::{self, AudienceMode};

/// Maximum entity-focus terms surfaced to the OUTLINE/WRITE steps.
const MAX_FOCUS_ENTITIES: usize = 8;
/// Member count thresholds for progressively richer section hints.
const ARCHITECTURE_SECTION_MIN_SOURCES: usize = 5;
const IMPLEMENTATION_SECTION_MIN_SOURCES: usize = 8;
/// Estimated dry-run token constants, per spec.md §4.13.
const DRY_RUN_CHARS_PER_TOKEN: f64 = 4.0;
const DRY_RUN_BASE_OUTPUT_TOKENS: u64 = 500;
const DRY_RUN_MAX_OUTPUT_TOKENS: u64 = 4000;

/// `stuff` (single call) vs `hierarchical` (chunk-summarize-then-merge)
/// WRITE strategy, chosen by total filtered source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// All sources fit in one prompt.
    Stuff,
    /// Sources are chunked, summarized, then merged.
    Hierarchical,
}

/// Options controlling one `generate_article` call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Privacy filtering intensity.
    pub audience: AudienceMode,
    /// Explicit model override; beats the topic's `model_override`, which
    /// beats `default_model`.
    pub model_override: Option<String>,
    /// Default model id/shorthand, used absent any override.
    pub default_model: String,
    /// Estimate cost and skip all writes/LLM calls.
    pub dry_run: bool,
    /// Per-call LLM subprocess timeout.
    pub timeout: Duration,
    /// Synthesis constants (chunking, routing threshold, per-source cap).
    pub config: SynthesisConfig,
}

/// Full result of one `generate_article` call.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiArticleResult {
    /// The topic that was (or wasn't) generated.
    pub topic_id: i64,
    /// The document holding the rendered content, if one was saved.
    pub document_id: Option<i64>,
    /// Whether generation was skipped (up-to-date, dry run, or no sources).
    pub skipped: bool,
    /// Why generation was skipped, if it was.
    pub skip_reason: Option<String>,
    /// Resolved model id actually used (or that would have been used).
    pub model: String,
    /// Total input tokens across every LLM call this generation made.
    pub input_tokens: u64,
    /// Total output tokens across every LLM call this generation made.
    pub output_tokens: u64,
    /// Estimated or actual USD cost.
    pub cost_usd: f64,
    /// Article version after this call (unchanged if skipped).
    pub version: i64,
    /// Layer 1/3 privacy warnings accumulated during this run.
    pub warnings: Vec<String>,
    /// Per-step timings in milliseconds.
    pub timing: WikiArticleTiming,
}

/// One topic's outcome inside a batch `generate_wiki` run.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    /// A new or updated article was produced.
    Generated(WikiArticleResult),
    /// Generation was skipped (already up to date, or excluded).
    Skipped(WikiArticleResult),
    /// The topic failed; the batch continues regardless.
    Failed {
        /// The topic that failed.
        topic_id: i64,
        /// What went wrong.
        error: String,
    },
}

fn short_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn combined_source_hash(sources: &[(i64, String)]) -> String {
    let mut parts: Vec<String> = sources.iter().map(|(id, hash)| format!("{id}:{hash}")).collect();
    parts.sort_unstable();
    let digest = Sha256::digest(parts.join(",").as_bytes());
    hex::encode(digest)[..32].to_string()
}

fn resolve_model(options: &GenerateOptions, topic_override: Option<&str>) -> String {
    let shorthand = options
        .model_override
        .as_deref()
        .or(topic_override)
        .unwrap_or(&options.default_model);
    resolve_model_shorthand(shorthand)
}

fn suggested_title(label: &str) -> String {
    let parts: Vec<&str> = label.split(" / ").map(str::trim).filter(|s| !s.is_empty()).collect();
    match parts.len() {
        0 => "Untitled Topic".to_string(),
        1 => parts[0].to_string(),
        2 => format!("{} & {}", parts[0], parts[1]),
        _ => match parts.split_last() {
            Some((last, rest)) => format!("{} & {}", rest.join(", "), last),
            None => "Untitled Topic".to_string(),
        },
    }
}

fn section_hints(source_count: usize) -> Vec<&'static str> {
    let mut hints = vec!["Overview", "Key Concepts"];
    if source_count >= ARCHITECTURE_SECTION_MIN_SOURCES {
        hints.push("Architecture & Design Decisions");
    }
    if source_count >= IMPLEMENTATION_SECTION_MIN_SOURCES {
        hints.push("Implementation Details");
    }
    hints.push("Related Topics");
    hints
}

fn system_prompt(
    suggested_title: &str,
    hints: &[&str],
    focus_entities: &[String],
    audience: AudienceMode,
    editorial_prompt: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are writing a wiki article that synthesizes several source documents.\n\n\
         ## Output Format\n\
         - Begin with a single `# {suggested_title}` H1 (or a better title you derive \
           from the sources) and nothing before it.\n\
         - No preamble, no meta-commentary about the task.\n\
         - Preserve code blocks verbatim.\n\
         - If sources disagree, note the disagreement rather than silently picking one.\n\
         - Suggested sections, in order: {}\n\
         - Focus especially on: {}\n\n",
        hints.join(", "),
        if focus_entities.is_empty() { "(no specific focus entities)".to_string() } else { focus_entities.join(", ") },
    );
    prompt.push_str(&privacy_filter::prompt_section(audience));
    if let Some(editorial) = editorial_prompt {
        prompt.push_str("\n\n## Editorial Guidance\n");
        prompt.push_str(editorial);
    }
    prompt
}

struct PreparedSource {
    document_id: i64,
    title: String,
    content: String,
    content_hash: String,
}

impl Store {
    /// Runs the full PREPARE -> ROUTE -> OUTLINE -> WRITE -> VALIDATE ->
    /// SAVE -> RETITLE pipeline for one topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown topic id. Propagates
    /// storage errors. LLM failures surface as
    /// [`Error::ExternalToolMissing`]/[`Error::ExternalToolFailed`]/
    /// [`Error::Timeout`] — callers running a batch should catch these per
    /// topic rather than letting one failure abort the run.
    pub async fn generate_article(
        &self,
        topic_id: i64,
        llm: &dyn LlmClient,
        options: &GenerateOptions,
    ) -> Result<WikiArticleResult> {
        let mut timing = WikiArticleTiming::default();
        let mut warnings = Vec::new();

        // PREPARE
        let prepare_start = Instant::now();
        let topic = self
            .get_topic(topic_id)?
            .ok_or_else(|| Error::NotFound(format!("wiki topic {topic_id}")))?;
        let member_ids = self.get_topic_docs(topic_id)?;
        let members = self.get_topic_members(topic_id)?;
        let relevance: HashMap<i64, f64> = members
            .into_iter()
            .filter(|m| m.is_primary)
            .map(|m| (m.document_id, m.relevance_score))
            .collect();

        let model = resolve_model(options, topic.model_override.as_deref());

        let mut prepared = Vec::new();
        for &doc_id in &member_ids {
            let relevance_score = relevance.get(&doc_id).copied().unwrap_or(1.0);
            let budget = (options.config.max_doc_chars as f64 * relevance_score) as usize;
            if budget == 0 {
                continue;
            }
            let document = self.require_document(doc_id)?;
            let (redacted, _) = privacy_filter::redact(&document.content);
            let truncated: String = redacted.chars().take(budget).collect();
            let content_hash = short_hash(&truncated);
            prepared.push(PreparedSource {
                document_id: doc_id,
                title: document.title,
                content: truncated,
                content_hash,
            });
        }

        let source_pairs: Vec<(i64, String)> = prepared
            .iter()
            .map(|p| (p.document_id, p.content_hash.clone()))
            .collect();
        let source_hash = combined_source_hash(&source_pairs);

        timing.prepare_ms = prepare_start.elapsed().as_millis() as u64;

        if !matches!(topic.status, crate::models::TopicStatus::Pinned)
            && let Some(existing) = self.get_article_for_topic(topic_id)?
            && existing.source_hash == source_hash
            && !existing.is_stale
        {
            return Ok(WikiArticleResult {
                topic_id,
                document_id: Some(existing.document_id),
                skipped: true,
                skip_reason: Some("Article up to date".to_string()),
                model,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                version: existing.version,
                warnings,
                timing,
            });
        }

        if prepared.is_empty() {
            return Ok(WikiArticleResult {
                topic_id,
                document_id: None,
                skipped: true,
                skip_reason: Some("no eligible source documents".to_string()),
                model,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                version: 0,
                warnings,
                timing,
            });
        }

        // ROUTE
        let route_start = Instant::now();
        let total_chars: usize = prepared.iter().map(|p| p.content.len()).sum();
        let strategy = if total_chars < options.config.stuff_threshold_chars {
            RoutingStrategy::Stuff
        } else {
            RoutingStrategy::Hierarchical
        };
        timing.route_ms = route_start.elapsed().as_millis() as u64;

        // OUTLINE
        let outline_start = Instant::now();
        let title_hint = suggested_title(&topic.label);
        let hints = section_hints(prepared.len());
        let focus_entities = self.top_focus_entities(&member_ids)?;
        let system = system_prompt(&title_hint, &hints, &focus_entities, options.audience, topic.editorial_prompt.as_deref());
        timing.outline_ms = outline_start.elapsed().as_millis() as u64;

        if options.dry_run {
            let input_tokens = (total_chars as f64 / DRY_RUN_CHARS_PER_TOKEN) as u64 + DRY_RUN_BASE_OUTPUT_TOKENS;
            let output_tokens = (input_tokens / 2).min(DRY_RUN_MAX_OUTPUT_TOKENS);
            let cost_usd = estimate_cost_usd(&model, input_tokens, output_tokens);
            return Ok(WikiArticleResult {
                topic_id,
                document_id: None,
                skipped: true,
                skip_reason: Some("dry run".to_string()),
                model,
                input_tokens,
                output_tokens,
                cost_usd,
                version: 0,
                warnings,
                timing,
            });
        }

        // WRITE
        let write_start = Instant::now();
        let (content, input_tokens, output_tokens) =
            write_article(llm, &system, &prepared, strategy, &model, options).await?;
        timing.write_ms = write_start.elapsed().as_millis() as u64;
        let cost_usd = estimate_cost_usd(&model, input_tokens, output_tokens);

        // VALIDATE
        let validate_start = Instant::now();
        let (validated_content, validation) = privacy_filter::validate(&content);
        warnings.extend(validation.warnings);
        timing.validate_ms = validate_start.elapsed().as_millis() as u64;

        // SAVE
        let save_start = Instant::now();
        let existing_article = self.get_article_for_topic(topic_id)?;
        let (document_id, previous_content) = if let Some(ref article) = existing_article {
            let prior = self.require_document(article.document_id)?;
            self.update_document(article.document_id, &title_hint, &validated_content)?;
            (article.document_id, Some(prior.content))
        } else {
            let new_id = self.save_document(
                &title_hint,
                &validated_content,
                None,
                &["wiki-article".to_string()],
                None,
                DocType::Wiki,
            )?;
            (new_id, None)
        };
        let article_id = self.save_article(
            topic_id,
            document_id,
            previous_content.as_deref(),
            &source_hash,
            &model,
            input_tokens,
            output_tokens,
            cost_usd,
            timing,
            &source_pairs,
        )?;
        let article = self.get_article(article_id)?.ok_or_else(|| {
            Error::Integrity(format!("article {article_id} vanished immediately after save"))
        })?;
        timing.save_ms = save_start.elapsed().as_millis() as u64;

        // RETITLE
        self.retitle_from_article(topic_id, &topic.label, &validated_content)?;

        Ok(WikiArticleResult {
            topic_id,
            document_id: Some(document_id),
            skipped: false,
            skip_reason: None,
            model,
            input_tokens,
            output_tokens,
            cost_usd,
            version: article.version,
            warnings,
            timing,
        })
    }

    /// Runs [`Store::generate_article`] over `topic_ids` (capped at
    /// `limit`), bracketed by a `wiki_run` row. Sequentially for now —
    /// callers wanting N>1 concurrency should use
    /// [`Store::generate_wiki_concurrent`].
    ///
    /// # Errors
    ///
    /// Propagates storage errors creating/completing the run row. A
    /// single topic's LLM failure is recorded as
    /// [`SynthesisOutcome::Failed`] and does not abort the batch.
    pub async fn generate_wiki(
        &self,
        topic_ids: &[i64],
        limit: usize,
        llm: &dyn LlmClient,
        options: &GenerateOptions,
    ) -> Result<(i64, Vec<SynthesisOutcome>)> {
        let model = resolve_model(options, None);
        let run_id = self.create_wiki_run(&model, options.dry_run)?;

        let mut outcomes = Vec::new();
        let mut generated = 0i64;
        let mut skipped = 0i64;
        let mut total_input = 0u64;
        let mut total_output = 0u64;
        let mut total_cost = 0.0;

        for &topic_id in topic_ids.iter().take(limit) {
            match self.generate_article(topic_id, llm, options).await {
                Ok(result) => {
                    total_input += result.input_tokens;
                    total_output += result.output_tokens;
                    total_cost += result.cost_usd;
                    if result.skipped {
                        skipped += 1;
                        outcomes.push(SynthesisOutcome::Skipped(result));
                    } else {
                        generated += 1;
                        outcomes.push(SynthesisOutcome::Generated(result));
                    }
                }
                Err(err) => {
                    outcomes.push(SynthesisOutcome::Failed {
                        topic_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        self.complete_wiki_run(
            run_id,
            topic_ids.len().min(limit) as i64,
            generated,
            skipped,
            total_input,
            total_output,
            total_cost,
        )?;

        Ok((run_id, outcomes))
    }

    /// Top entity-focus terms for the OUTLINE/WRITE steps: the
    /// highest-confidence, highest-weight entities shared across a
    /// topic's member documents.
    fn top_focus_entities(&self, member_ids: &[i64]) -> Result<Vec<String>> {
        let mut scores: HashMap<String, f64> = HashMap::new();
        for &doc_id in member_ids {
            for entity in self.entities_for_document(doc_id)? {
                *scores.entry(entity.entity).or_insert(0.0) += entity.confidence * entity.entity_type.weight();
            }
        }
        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(MAX_FOCUS_ENTITIES).map(|(e, _)| e).collect())
    }

    /// RETITLE: if the generated markdown's first H1 differs from the
    /// topic's current label and its derived slug doesn't collide with
    /// another topic, adopts it as the new label/slug/document title.
    fn retitle_from_article(&self, topic_id: i64, current_label: &str, content: &str) -> Result<()> {
        let Some(h1) = content.lines().find_map(|line| line.strip_prefix("# ").map(str::trim)) else {
            return Ok(());
        };
        if h1.is_empty() || h1 == current_label {
            return Ok(());
        }
        let slug = super::topic_clusterer::derive_slug(h1);
        match self.rename_topic(topic_id, h1, &slug) {
            Ok(()) | Err(Error::Conflict(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Unified diff between a topic's current article content and the
    /// content it replaced, or `None` if no article exists yet or this is
    /// its first version.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_article_diff(&self, topic_id: i64) -> Result<Option<String>> {
        let Some(article) = self.get_article_for_topic(topic_id)? else {
            return Ok(None);
        };
        let Some(previous) = article.previous_content else {
            return Ok(None);
        };
        let current = self.require_document(article.document_id)?.content;
        let diff = similar::TextDiff::from_lines(&previous, &current)
            .unified_diff()
            .header("previous", "current")
            .to_string();
        Ok(Some(diff))
    }

    /// Merges `secondary_topic_ids` into `primary_topic_id`: every member
    /// document moves over, and the secondary topics (with whatever
    /// articles they'd generated) are deleted. The primary's article, if
    /// any, is marked stale so the next `generate_article` call picks up
    /// the newly merged membership.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `primary_topic_id` doesn't exist.
    /// Propagates storage errors.
    pub fn merge_topics(&self, primary_topic_id: i64, secondary_topic_ids: &[i64]) -> Result<()> {
        if self.get_topic(primary_topic_id)?.is_none() {
            return Err(Error::NotFound(format!("wiki topic {primary_topic_id}")));
        }
        for &secondary_id in secondary_topic_ids {
            if secondary_id == primary_topic_id {
                continue;
            }
            for member in self.get_topic_members(secondary_id)? {
                self.move_topic_member(member.document_id, secondary_id, primary_topic_id)?;
            }
            self.delete_article_for_topic(secondary_id)?;
            self.delete_topic(secondary_id)?;
        }
        if let Some(article) = self.get_article_for_topic(primary_topic_id)? {
            self.mark_stale(article.document_id, "topic merged with another topic")?;
        }
        Ok(())
    }

    /// Splits `document_ids` out of `topic_id` into a brand new topic
    /// labeled `new_label`. Returns the new topic's id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] if `document_ids` is empty. Propagates
    /// storage errors, including a slug collision on the derived slug.
    pub fn split_topic(&self, topic_id: i64, document_ids: &[i64], new_label: &str) -> Result<i64> {
        if document_ids.is_empty() {
            return Err(Error::BadInput("split_topic requires at least one document id".to_string()));
        }
        let slug = super::topic_clusterer::derive_slug(new_label);
        let new_topic_id = self.insert_topic(&slug, new_label)?;
        for &doc_id in document_ids {
            self.move_topic_member(doc_id, topic_id, new_topic_id)?;
        }
        if let Some(article) = self.get_article_for_topic(topic_id)? {
            self.mark_stale(article.document_id, "topic split into a new topic")?;
        }
        Ok(new_topic_id)
    }
}

async fn write_article(
    llm: &dyn LlmClient,
    system: &str,
    sources: &[PreparedSource],
    strategy: RoutingStrategy,
    model: &str,
    options: &GenerateOptions,
) -> Result<(String, u64, u64)> {
    match strategy {
        RoutingStrategy::Stuff => {
            let user = render_sources(sources);
            let response = llm
                .run(&LlmRequest {
                    system: system.to_string(),
                    user,
                    model: model.to_string(),
                    timeout: options.timeout,
                })
                .await?;
            Ok((response.text, response.input_tokens, response.output_tokens))
        }
        RoutingStrategy::Hierarchical => {
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;
            let mut chunk_summaries = Vec::new();
            for (i, chunk) in sources.chunks(options.config.hierarchical_chunk_size).enumerate() {
                let user = render_sources(chunk);
                let response = llm
                    .run(&LlmRequest {
                        system: "Summarize these sources in 500-1000 words. No preamble, no \
                                 meta-commentary — just the summary."
                            .to_string(),
                        user,
                        model: model.to_string(),
                        timeout: options.timeout,
                    })
                    .await?;
                input_tokens += response.input_tokens;
                output_tokens += response.output_tokens;
                chunk_summaries.push(PreparedSource {
                    document_id: -(i as i64) - 1,
                    title: format!("Chunk {} summary", i + 1),
                    content: response.text,
                    content_hash: String::new(),
                });
            }
            let user = render_sources(&chunk_summaries);
            let response = llm
                .run(&LlmRequest {
                    system: system.to_string(),
                    user,
                    model: model.to_string(),
                    timeout: options.timeout,
                })
                .await?;
            input_tokens += response.input_tokens;
            output_tokens += response.output_tokens;
            Ok((response.text, input_tokens, output_tokens))
        }
    }
}

fn render_sources(sources: &[PreparedSource]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("### Source {} — {}\n\n{}", i + 1, s.title, s.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::models::EntityType as ET;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn run(&self, _request: &LlmRequest) -> Result<crate::llm::LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                text: "# Falcon Scheduler\n\nBody text about the falcon scheduler.".to_string(),
                input_tokens: 100,
                output_tokens: 200,
            })
        }
    }

    fn options(dry_run: bool) -> GenerateOptions {
        GenerateOptions {
            audience: AudienceMode::Team,
            model_override: None,
            default_model: "haiku".to_string(),
            dry_run,
            timeout: Duration::from_secs(5),
            config: SynthesisConfig {
                max_doc_chars: 12_000,
                stuff_threshold_chars: 80_000,
                hierarchical_chunk_size: 5,
                min_shared_entities: 2,
                max_entity_links: 15,
            },
        }
    }

    fn topic_with_docs(store: &Store) -> i64 {
        let a = store.save_document("Doc A", "Falcon scheduler notes", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("Doc B", "More falcon scheduler notes", None, &[], None, DocType::User).unwrap();
        store
            .save_entities(a, &[("falcon scheduler".to_string(), ET::ProperNoun, 0.9)])
            .unwrap();
        store
            .save_entities(b, &[("falcon scheduler".to_string(), ET::ProperNoun, 0.9)])
            .unwrap();
        store
            .save_topics(&[crate::storage::wiki::NewTopic {
                slug: "falcon-scheduler".to_string(),
                label: "Falcon Scheduler".to_string(),
                entity_fingerprint: "abc123".to_string(),
                coherence_score: 0.8,
                member_doc_ids: vec![a, b],
            }])
            .unwrap();
        store.get_topics().unwrap()[0].topic.id
    }

    #[tokio::test]
    async fn dry_run_estimates_without_writing() {
        let store = Store::open_in_memory().unwrap();
        let topic_id = topic_with_docs(&store);
        let llm = FakeLlm { calls: AtomicUsize::new(0) };

        let result = store.generate_article(topic_id, &llm, &options(true)).await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.skip_reason.as_deref(), Some("dry run"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(result.input_tokens > 0);
        assert!(store.get_article_for_topic(topic_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn generation_saves_article_and_regeneration_bumps_version() {
        let store = Store::open_in_memory().unwrap();
        let topic_id = topic_with_docs(&store);
        let llm = FakeLlm { calls: AtomicUsize::new(0) };

        let first = store.generate_article(topic_id, &llm, &options(false)).await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.version, 1);

        // Second call with unchanged sources should skip.
        let second = store.generate_article(topic_id, &llm, &options(false)).await.unwrap();
        assert!(second.skipped);

        // Force regeneration by marking stale.
        let article = store.get_article_for_topic(topic_id).unwrap().unwrap();
        store.mark_stale(article.document_id, "test forced regeneration").ok();
        store.set_topic_status(topic_id, crate::models::TopicStatus::Pinned).unwrap();
        let third = store.generate_article(topic_id, &llm, &options(false)).await.unwrap();
        assert!(!third.skipped);
        assert_eq!(third.version, 2);

        let diff = store.get_article_diff(topic_id).unwrap();
        assert!(diff.is_some());
    }

    #[test]
    fn suggested_title_joins_label_parts() {
        assert_eq!(suggested_title("Falcon"), "Falcon");
        assert_eq!(suggested_title("Falcon / Scheduler"), "Falcon & Scheduler");
        assert_eq!(suggested_title("A / B / C"), "A, B & C");
    }

    #[test]
    fn section_hints_scale_with_source_count() {
        assert_eq!(section_hints(2), vec!["Overview", "Key Concepts", "Related Topics"]);
        assert!(section_hints(5).contains(&"Architecture & Design Decisions"));
        assert!(section_hints(8).contains(&"Implementation Details"));
    }
}
