//! The entity extractor (C6): heuristic markdown scanning plus an optional
//! LLM-backed path for richer entity and relationship extraction.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::llm::{LlmClient, LlmRequest, estimate_cost_usd, resolve_model_shorthand};
use crate::models::EntityType;
use crate::storage::documents::DocRef;
use crate::{Error, Result, Store};

/// Entities shorter than this (after normalization) are dropped as noise.
const MIN_ENTITY_LEN: usize = 4;

static GENERIC_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "this", "that", "these", "those", "with", "from", "into", "your", "their", "have",
        "has", "will", "would", "should", "could", "also", "more", "other", "some", "each",
    ]
    .into_iter()
    .collect()
});

/// Noisy, purely-structural heading text that carries no topical signal.
static HEADING_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["summary", "overview", "conclusion", "introduction", "notes", "todo", "references"]
        .into_iter()
        .collect()
});

static TRAILING_NOISE_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["the", "a", "an", "is", "are", "was", "were", "and", "or"].into_iter().collect());

static LEADING_ARTICLES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["the", "a", "an", "of", "in", "on", "for", "with"].into_iter().collect());

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").unwrap());
static BACKTICK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
/// Two or more consecutive Title-Case words.
static PROPER_NOUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z0-9]*(?:\s+[A-Z][a-zA-Z0-9]*)+)\b").unwrap());
/// A shell-command-ish backtick span: contains whitespace *and* a shell
/// metacharacter, e.g. `` `grep -r foo | less` ``.
static SHELL_LIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s.*[/$|>]|[/$|>].*\s").unwrap());

/// Normalizes an extracted surface string: lowercase, collapse whitespace.
#[must_use]
pub fn normalize_entity(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn strip_trailing_noise(words: &[&str]) -> Vec<&str> {
    let mut end = words.len();
    while end > 0 && TRAILING_NOISE_WORDS.contains(words[end - 1].to_lowercase().as_str()) {
        end -= 1;
    }
    words[..end].to_vec()
}

fn strip_leading_article(words: &[&str]) -> Vec<&str> {
    let mut start = 0;
    while start < words.len() && LEADING_ARTICLES.contains(words[start].to_lowercase().as_str()) {
        start += 1;
    }
    words[start..].to_vec()
}

fn is_noise(normalized: &str, heading_context: bool) -> bool {
    if normalized.chars().count() < MIN_ENTITY_LEN {
        return true;
    }
    if GENERIC_STOPWORDS.contains(normalized) {
        return true;
    }
    if heading_context && HEADING_STOPWORDS.contains(normalized) {
        return true;
    }
    false
}

/// One `(normalized entity, type, confidence)` candidate before dedup.
type Candidate = (String, EntityType, f64);

/// Runs the four heuristic passes over `content`, excluding `own_title`,
/// and returns deduplicated, normalized candidates (highest confidence
/// wins when the same normalized string is found by more than one pass).
#[must_use]
pub fn extract_heuristic(title: &str, content: &str) -> Vec<Candidate> {
    let own_title_normalized = normalize_entity(title);
    let mut best: std::collections::HashMap<String, (EntityType, f64)> =
        std::collections::HashMap::new();

    let mut consider = |raw: &str, entity_type: EntityType, confidence: f64, heading_context: bool| {
        let normalized = normalize_entity(raw);
        if normalized.is_empty() || normalized == own_title_normalized {
            return;
        }
        if is_noise(&normalized, heading_context) {
            return;
        }
        best.entry(normalized)
            .and_modify(|(existing_type, existing_conf)| {
                if confidence > *existing_conf {
                    *existing_type = entity_type;
                    *existing_conf = confidence;
                }
            })
            .or_insert((entity_type, confidence));
    };

    for caps in HEADING_RE.captures_iter(content) {
        consider(&caps[1], EntityType::Heading, 0.95, true);
    }

    for caps in BACKTICK_RE.captures_iter(content) {
        let span = &caps[1];
        if SHELL_LIKE_RE.is_match(span) {
            continue;
        }
        consider(span, EntityType::TechTerm, 0.9, false);
    }

    for caps in BOLD_RE.captures_iter(content) {
        let span = caps[1].trim();
        if span.chars().count() >= MIN_ENTITY_LEN {
            consider(span, EntityType::Concept, 0.85, false);
        }
    }

    for caps in PROPER_NOUN_RE.captures_iter(content) {
        let words: Vec<&str> = caps[1].split_whitespace().collect();
        let words = strip_leading_article(&words);
        let words = strip_trailing_noise(&words);
        if words.len() >= 2 {
            consider(&words.join(" "), EntityType::ProperNoun, 0.7, false);
        }
    }

    best.into_iter().map(|(e, (t, c))| (e, t, c)).collect()
}

impl Store {
    /// Runs heuristic extraction over `document_id`'s title/content and
    /// persists the surviving entities. Idempotent: a repeat run inserts
    /// no new rows thanks to the `(document_id, entity)` uniqueness
    /// constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the document doesn't exist, or
    /// propagates storage errors.
    pub fn extract_and_save_entities_heuristic(&self, document_id: i64) -> Result<usize> {
        let document = self.require_document(document_id)?;
        let candidates = extract_heuristic(&document.title, &document.content);
        self.save_entities(document_id, &candidates)
    }
}

// ---------------------------------------------------------------------
// LLM-backed extraction (optional path)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    entity_type: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct LlmRelationship {
    source: String,
    target: String,
    relationship_type: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

const fn default_confidence() -> f64 {
    0.7
}

#[derive(Debug, Deserialize)]
struct LlmExtractionResponse {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relationships: Vec<LlmRelationship>,
}

/// Outcome of an LLM-backed extraction run, including usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmExtractionResult {
    /// Entities persisted.
    pub entities_saved: usize,
    /// Relationships persisted.
    pub relationships_saved: usize,
    /// Estimated input tokens for the call.
    pub input_tokens: u64,
    /// Estimated output tokens for the call.
    pub output_tokens: u64,
    /// Estimated USD cost at the resolved model's price.
    pub cost_usd: f64,
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract entities and relationships from a markdown document.
Respond with ONLY a JSON object of this exact shape, no prose, no code fences:
{"entities": [{"name": "...", "entity_type": "person|organization|technology|location|event|project|tool|api|library|concept", "confidence": 0.0-1.0}], "relationships": [{"source": "...", "target": "...", "relationship_type": "...", "confidence": 0.0-1.0}]}"#;

impl Store {
    /// Extracts entities (and, where the document supports it,
    /// relationships between them) via the LLM subprocess capability, and
    /// persists both. Falls back to [`EntityType::Concept`] for any
    /// `entity_type` the model reports that isn't one of the known
    /// variants, and drops relationships whose endpoints aren't among the
    /// entities just saved.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the document doesn't exist.
    /// - [`Error::ExternalToolMissing`] / [`Error::ExternalToolFailed`] /
    ///   [`Error::Timeout`] per the LLM client's contract.
    /// - [`Error::ExternalToolFailed`] if the response isn't valid JSON
    ///   after code-fence stripping.
    pub async fn extract_and_save_entities_llm(
        &self,
        document_id: i64,
        llm: &Arc<dyn LlmClient>,
        model_shorthand: &str,
        max_content_chars: usize,
        timeout: std::time::Duration,
    ) -> Result<LlmExtractionResult> {
        let document = self.require_document(document_id)?;
        let truncated: String = document.content.chars().take(max_content_chars).collect();
        let model = resolve_model_shorthand(model_shorthand);

        let request = LlmRequest {
            system: EXTRACTION_SYSTEM_PROMPT.to_string(),
            user: format!("Title: {}\n\nContent:\n{truncated}", document.title),
            model: model.clone(),
            timeout,
        };
        let response = llm.run(&request).await?;

        let parsed = parse_llm_extraction_response(&response.text)?;

        let own_title_normalized = normalize_entity(&document.title);
        let mut accepted_names = HashSet::new();
        let mut entities = Vec::new();
        for entity in parsed.entities {
            let normalized = normalize_entity(&entity.name);
            if normalized.is_empty() || normalized == own_title_normalized {
                continue;
            }
            if is_noise(&normalized, false) {
                continue;
            }
            let entity_type = parse_llm_entity_type(&entity.entity_type);
            let confidence = entity.confidence.clamp(0.0, 1.0);
            accepted_names.insert(normalized.clone());
            entities.push((normalized, entity_type, confidence));
        }
        let entities_saved = self.save_entities(document_id, &entities)?;

        let mut relationships = Vec::new();
        for rel in parsed.relationships {
            let source = normalize_entity(&rel.source);
            let target = normalize_entity(&rel.target);
            if source.is_empty() || target.is_empty() {
                continue;
            }
            if !accepted_names.contains(&source) || !accepted_names.contains(&target) {
                continue;
            }
            relationships.push((source, target, rel.relationship_type, rel.confidence.clamp(0.0, 1.0)));
        }
        let relationships_saved = self.save_entity_relationships(document_id, &relationships)?;

        let cost_usd = estimate_cost_usd(&model, response.input_tokens, response.output_tokens);
        Ok(LlmExtractionResult {
            entities_saved,
            relationships_saved,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost_usd,
        })
    }
}

fn parse_llm_entity_type(raw: &str) -> EntityType {
    match raw.to_lowercase().as_str() {
        "person" => EntityType::Person,
        "organization" => EntityType::Organization,
        "technology" => EntityType::Technology,
        "location" => EntityType::Location,
        "event" => EntityType::Event,
        "project" => EntityType::Project,
        "tool" => EntityType::Tool,
        "api" => EntityType::Api,
        "library" => EntityType::Library,
        "heading" => EntityType::Heading,
        "tech_term" => EntityType::TechTerm,
        "proper_noun" => EntityType::ProperNoun,
        _ => EntityType::Concept,
    }
}

fn parse_llm_extraction_response(text: &str) -> Result<LlmExtractionResponse> {
    let stripped = crate::llm::strip_code_fence(text);
    serde_json::from_str(stripped)
        .map_err(|err| Error::ExternalToolFailed(format!("invalid entity-extraction JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;
    use std::time::Duration;

    struct FakeLlm {
        response: String,
    }

    #[async_trait::async_trait]
    impl LlmClient for FakeLlm {
        async fn run(&self, _request: &LlmRequest) -> Result<crate::llm::LlmResponse> {
            Ok(crate::llm::LlmResponse {
                text: self.response.clone(),
                input_tokens: 100,
                output_tokens: 40,
            })
        }
    }

    #[test]
    fn heading_entities_get_highest_confidence() {
        let candidates = extract_heuristic("My Doc", "## Falcon Pipeline\n\nSome prose.");
        assert!(candidates.iter().any(|(e, t, c)| e == "falcon pipeline" && *t == EntityType::Heading && (*c - 0.95).abs() < 1e-9));
    }

    #[test]
    fn shell_like_backtick_spans_are_dropped() {
        let candidates = extract_heuristic("Doc", "Run `grep -r foo | less` to search.");
        assert!(candidates.iter().all(|(e, ..)| e != "grep -r foo | less"));
    }

    #[test]
    fn tech_term_backtick_span_is_kept() {
        let candidates = extract_heuristic("Doc", "Use the `event_loop` for scheduling.");
        assert!(candidates.iter().any(|(e, t, _)| e == "event_loop" && *t == EntityType::TechTerm));
    }

    #[test]
    fn own_title_is_excluded() {
        let candidates = extract_heuristic("Falcon Pipeline", "# Falcon Pipeline\n\nDetails.");
        assert!(candidates.is_empty());
    }

    #[test]
    fn proper_noun_strips_leading_article_and_trailing_noise() {
        let candidates = extract_heuristic("Doc", "The Quantum Flux Team and more prose.");
        assert!(candidates.iter().any(|(e, t, _)| e == "quantum flux team" && *t == EntityType::ProperNoun));
    }

    #[test]
    fn extraction_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .save_document("Doc", "## Falcon Pipeline\n\nUses `event_loop`.", None, &[], None, DocType::User)
            .unwrap();
        let first = store.extract_and_save_entities_heuristic(id).unwrap();
        let second = store.extract_and_save_entities_heuristic(id).unwrap();
        assert!(first > 0);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn llm_extraction_filters_unknown_relationship_endpoints() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save_document("Doc", "content", None, &[], None, DocType::User).unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm {
            response: r#"{"entities":[{"name":"Falcon","entity_type":"project","confidence":0.9}],
                "relationships":[{"source":"Falcon","target":"Ghost","relationship_type":"depends_on","confidence":0.8}]}"#
                .to_string(),
        });
        let result = store
            .extract_and_save_entities_llm(id, &llm, "haiku", 8000, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.entities_saved, 1);
        assert_eq!(result.relationships_saved, 0);
        assert!(result.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn llm_extraction_tolerates_markdown_fences() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save_document("Doc", "content", None, &[], None, DocType::User).unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm {
            response: "```json\n{\"entities\":[{\"name\":\"Ghost Runtime\",\"entity_type\":\"weird_type\",\"confidence\":1.5}],\"relationships\":[]}\n```".to_string(),
        });
        let result = store
            .extract_and_save_entities_llm(id, &llm, "haiku", 8000, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.entities_saved, 1);
        let entities = store.entities_for_document(id).unwrap();
        assert_eq!(entities[0].entity_type, EntityType::Concept);
        assert!((entities[0].confidence - 1.0).abs() < 1e-9);
    }
}
