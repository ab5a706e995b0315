//! End-to-end scenarios across ingestion, wikification, and synthesis.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use async_trait::async_trait;
use wikigraph::config::AppConfig;
use wikigraph::llm::{LlmRequest, LlmResponse};
use wikigraph::models::{DocType, LinkMethod, SearchOptions};
use wikigraph::services::{AudienceMode, GenerateOptions};
use wikigraph::storage::wiki::NewTopic;
use wikigraph::{LlmClient, Result, Store};

/// Returns a fixed markdown article, for deterministic WRITE-step tests.
struct FakeLlm {
    response: String,
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn run(&self, _request: &LlmRequest) -> Result<LlmResponse> {
        Ok(LlmResponse {
            text: self.response.clone(),
            input_tokens: 120,
            output_tokens: 40,
        })
    }
}

fn generate_options(config: wikigraph::config::SynthesisConfig) -> GenerateOptions {
    GenerateOptions {
        audience: AudienceMode::Team,
        model_override: None,
        default_model: "haiku".to_string(),
        dry_run: false,
        timeout: Duration::from_secs(30),
        config,
    }
}

#[test]
fn hyphenated_search_round_trip() {
    let store = Store::open_in_memory().expect("open store");
    let id = store
        .save_document(
            "Event-Driven Architecture",
            "Learn about event-driven programming patterns",
            None,
            &[],
            None,
            DocType::User,
        )
        .expect("save document");

    let hits = store
        .search_documents("event-driven", &SearchOptions::default())
        .expect("search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
}

#[test]
fn soft_delete_respected_by_search() {
    let store = Store::open_in_memory().expect("open store");
    let a = store
        .save_document("Python Basics", "Python is a language", None, &[], None, DocType::User)
        .expect("save a");
    let _b = store
        .save_document("Python Advanced", "More Python content", None, &[], None, DocType::User)
        .expect("save b");

    store.delete_document(a, false).expect("soft delete");

    let hits = store
        .search_documents("Python", &SearchOptions::default())
        .expect("search Python");
    assert_eq!(hits.len(), 1);

    let all = store
        .search_documents("*", &SearchOptions::default())
        .expect("search wildcard");
    assert_eq!(all.len(), 1);

    let listed = store.list_documents(None, 50).expect("list");
    assert!(listed.iter().all(|d| d.id != a));

    store.restore(a).expect("restore");
    let listed_after_restore = store.list_documents(None, 50).expect("list after restore");
    assert!(listed_after_restore.iter().any(|d| d.id == a));
}

#[test]
fn title_and_entity_match_stack() {
    let store = Store::open_in_memory().expect("open store");
    let a = store
        .save_document(
            "Falcon Scheduler Design",
            "## Falcon Pipeline\n\nThe `event_loop` processes falcon events using the `task_scheduler` for coordination.",
            None,
            &[],
            None,
            DocType::User,
        )
        .expect("save a");
    let b = store
        .save_document(
            "Falcon Performance Report",
            "## Falcon Bottleneck\n\nThe `event_loop` is slow and the `task_scheduler` needs optimization.",
            None,
            &[],
            None,
            DocType::User,
        )
        .expect("save b");

    store.extract_and_save_entities_heuristic(a).expect("extract entities for a");
    store.extract_and_save_entities_heuristic(b).expect("extract entities for b");

    let result = store.entity_match_wikify(b, false).expect("entity match wikify");
    assert_eq!(result.created, 1);

    let links = store.get_links_for_document(a).expect("links for a");
    let link = links
        .iter()
        .find(|l| l.link.method == LinkMethod::EntityMatch)
        .expect("entity-match link exists");
    assert!(link.link.similarity_score > 0.5 && link.link.similarity_score <= 1.0);
    assert!(store.link_exists(a, b).expect("link_exists a,b"));
    assert!(store.link_exists(b, a).expect("link_exists b,a"));
}

#[test]
fn wikification_is_project_scoped() {
    let store = Store::open_in_memory().expect("open store");
    store
        .save_document("Quantum Flux Refactor", "content about the refactor", Some("alpha"), &[], None, DocType::User)
        .expect("save alpha doc");
    let beta_doc = store
        .save_document(
            "Session Bug Report",
            "See Quantum Flux Refactor for background.",
            Some("beta"),
            &[],
            None,
            DocType::User,
        )
        .expect("save beta doc");

    let scoped = store.title_match_wikify(beta_doc, false, false).expect("scoped wikify");
    assert_eq!(scoped.created, 0);

    let cross = store.title_match_wikify(beta_doc, false, true).expect("cross-project wikify");
    assert_eq!(cross.created, 1);
}

#[test]
fn wiki_generate_dry_run_estimates_without_writing() {
    let store = Store::open_in_memory().expect("open store");
    let doc_ids: Vec<i64> = (0..3)
        .map(|i| {
            store
                .save_document(&format!("Source {i}"), &"x".repeat(2000), None, &[], None, DocType::User)
                .expect("save source doc")
        })
        .collect();

    let topic_id = store
        .save_topics(&[NewTopic {
            slug: "dry-run-topic".to_string(),
            label: "Dry Run Topic".to_string(),
            entity_fingerprint: "abc123".to_string(),
            coherence_score: 0.8,
            member_doc_ids: doc_ids,
        }])
        .map(|_| store.get_topics().expect("topics")[0].topic.id)
        .expect("save topic");

    let config = AppConfig::default().synthesis;
    let mut options = generate_options(config);
    options.dry_run = true;

    let llm = FakeLlm { response: String::new() };
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let result = rt
        .block_on(store.generate_article(topic_id, &llm, &options))
        .expect("generate_article dry run");

    assert!(result.skipped);
    assert_eq!(result.skip_reason.as_deref(), Some("dry run"));
    assert!(result.timing.prepare_ms < 1_000_000_000);
    assert_eq!(result.timing.write_ms, 0);
    assert_eq!(result.timing.validate_ms, 0);
    assert_eq!(result.timing.save_ms, 0);
}

#[test]
fn wiki_regeneration_stashes_previous_content_and_bumps_version() {
    let store = Store::open_in_memory().expect("open store");
    let source_doc = store
        .save_document("Source One", "first revision content", None, &[], None, DocType::User)
        .expect("save source");

    let topic_id = store
        .save_topics(&[NewTopic {
            slug: "regen-topic".to_string(),
            label: "Regen Topic".to_string(),
            entity_fingerprint: "def456".to_string(),
            coherence_score: 0.9,
            member_doc_ids: vec![source_doc],
        }])
        .map(|_| store.get_topics().expect("topics")[0].topic.id)
        .expect("save topic");

    let config = AppConfig::default().synthesis;
    let options = generate_options(config);
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");

    let first_llm = FakeLlm { response: "# Regen Topic\n\nX".to_string() };
    let first = rt
        .block_on(store.generate_article(topic_id, &first_llm, &options))
        .expect("first generation");
    assert!(!first.skipped);
    assert_eq!(first.version, 1);

    store.update_document(source_doc, "Source One", "second revision content, now different").expect("update source");
    store.mark_stale(source_doc, "source document changed").expect("mark stale");

    let second_llm = FakeLlm { response: "# Regen Topic\n\nY, now with more words".to_string() };
    let second = rt
        .block_on(store.generate_article(topic_id, &second_llm, &options))
        .expect("second generation");

    assert!(!second.skipped);
    assert_eq!(second.version, 2);

    let article = store.get_article_for_topic(topic_id).expect("article").expect("article exists");
    assert_eq!(article.version, 2);
    assert!(!article.is_stale);
    assert_eq!(article.previous_content.as_deref(), Some("# Regen Topic\n\nX"));

    let diff = store.get_article_diff(topic_id).expect("diff").expect("non-empty diff");
    assert!(!diff.is_empty());
}

#[test]
fn self_link_is_a_no_op() {
    let store = Store::open_in_memory().expect("open store");
    let id = store
        .save_document("Solo Document", "stands alone", None, &[], None, DocType::User)
        .expect("save document");

    let link = store.create_link(id, id, 1.0, LinkMethod::Manual).expect("self link attempt");
    assert!(link.is_none());
}

#[test]
fn link_creation_is_symmetric_and_singular() {
    let store = Store::open_in_memory().expect("open store");
    let a = store.save_document("A", "a content", None, &[], None, DocType::User).expect("save a");
    let b = store.save_document("B", "b content", None, &[], None, DocType::User).expect("save b");

    let first = store.create_link(a, b, 0.9, LinkMethod::Manual).expect("first link");
    assert!(first.is_some());
    let second = store.create_link(b, a, 0.9, LinkMethod::Manual).expect("reverse link attempt");
    assert!(second.is_none());

    assert_eq!(store.get_link_count(a).expect("count a"), 1);
}

#[test]
fn semantic_wikification_links_similar_documents_above_threshold() {
    use wikigraph::embedding::DeterministicEmbedder;

    let store = Store::open_in_memory().expect("open store");
    let embedder = DeterministicEmbedder::new();
    let a = store
        .save_document(
            "Falcon Scheduler Design",
            "falcon scheduler event loop task coordination pipeline architecture notes",
            None,
            &[],
            None,
            DocType::User,
        )
        .expect("save a");
    let b = store
        .save_document(
            "Falcon Performance Report",
            "falcon scheduler event loop task coordination pipeline bottleneck report",
            None,
            &[],
            None,
            DocType::User,
        )
        .expect("save b");
    store
        .save_document("Banana Bread Recipe", "banana bread recipe flour sugar eggs baking instructions", None, &[], None, DocType::User)
        .expect("save unrelated");

    let result = store.semantic_wikify(a, &embedder, 0.5, false).expect("semantic wikify");
    assert_eq!(result.created, 1);
    assert!(store.link_exists(a, b).expect("link exists"));

    let links = store.get_links_for_document(a).expect("links for a");
    let link = links.iter().find(|l| l.link.method == LinkMethod::Auto).expect("auto link exists");
    assert!(link.link.similarity_score > 0.5 && link.link.similarity_score <= 1.0);

    // Re-running with no new documents is idempotent: already linked.
    let again = store.semantic_wikify(a, &embedder, 0.5, false).expect("second semantic wikify");
    assert_eq!(again.created, 0);
    assert_eq!(again.existing_skipped, 1);
}

#[test]
fn empty_database_boundary_behaviors() {
    let store = Store::open_in_memory().expect("open store");
    let hits = store.search_documents("*", &SearchOptions::default()).expect("wildcard search");
    assert!(hits.is_empty());

    let topics = store.get_topics().expect("get_topics on empty db");
    assert!(topics.is_empty());

    let freshness = store.freshness_report(None, false).expect("freshness report");
    assert_eq!(freshness.total_docs, 0);
    assert_eq!(freshness.stale_count, 0);
}
