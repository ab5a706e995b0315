//! Wiki export (C14): renders generated articles and Tier-A entity pages
//! as a static-site source tree — front-matter-prefixed markdown under
//! `docs/articles/` and `docs/entities/`, an `index.md`, and a generated
//! `mkdocs.yml`-style site config.

use std::fs;
use std::path::Path;

use crate::models::TopicStatus;
use crate::storage::documents::DocRef;
use crate::{Error, Result, Store};

use super::entity_index::{EntityPage, EntityTier};

/// Counts of what an export run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Article pages written under `docs/articles/`.
    pub articles_written: usize,
    /// Tier-A entity pages written under `docs/entities/`.
    pub entities_written: usize,
}

fn slugify_for_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_hyphen = false;
    for ch in s.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn yaml_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

impl Store {
    /// Renders the export tree rooted at `out_dir`. If `topic_id` is
    /// `Some`, only that topic's article is (re)written and the index,
    /// entity pages, and site config are left untouched.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and any I/O failure writing the tree.
    pub fn export_wiki(&self, out_dir: impl AsRef<Path>, topic_id: Option<i64>) -> Result<ExportSummary> {
        let out_dir = out_dir.as_ref();
        let mut summary = ExportSummary::default();

        if let Some(topic_id) = topic_id {
            if self.write_article_page(out_dir, topic_id)?.is_some() {
                summary.articles_written += 1;
            }
            return Ok(summary);
        }

        let topics = self.get_topics()?;
        let mut article_links = Vec::new();
        for summary_row in &topics {
            if summary_row.topic.status == TopicStatus::Skipped {
                continue;
            }
            if let Some((slug, title)) = self.write_article_page(out_dir, summary_row.topic.id)? {
                summary.articles_written += 1;
                article_links.push((slug, title));
            }
        }

        let index = self.build_entity_index()?;
        let mut entity_links = Vec::new();
        for entry in &index {
            if entry.tier != EntityTier::A {
                continue;
            }
            let Some(page) = self.entity_page(&entry.entity, &index)? else {
                continue;
            };
            let slug = slugify_for_path(&page.entity);
            let content = render_entity_page(&page, &slug);
            write_file(&out_dir.join("docs/entities").join(format!("{slug}.md")), &content)?;
            summary.entities_written += 1;
            entity_links.push((slug, page.entity.clone()));
        }

        write_file(&out_dir.join("docs/index.md"), &render_index(&article_links, &entity_links))?;
        write_file(&out_dir.join("mkdocs.yml"), &render_site_config())?;

        Ok(summary)
    }

    /// Writes one article's markdown page and returns its `(slug, title)`,
    /// or `None` if the topic has no generated article.
    fn write_article_page(&self, out_dir: &Path, topic_id: i64) -> Result<Option<(String, String)>> {
        let Some(topic) = self.get_topic(topic_id)? else {
            return Ok(None);
        };
        let Some(article) = self.get_article_for_topic(topic_id)? else {
            return Ok(None);
        };
        let document = self
            .get_document(DocRef::Id(article.document_id))?
            .ok_or_else(|| Error::NotFound(format!("document {}", article.document_id)))?;
        let sources = self.get_article_sources(article.id)?;

        let slug = topic.slug.clone();
        let content = render_article_page(&topic.label, &article, &document.content, sources.len());
        write_file(&out_dir.join("docs/articles").join(format!("{slug}.md")), &content)?;
        Ok(Some((slug, document.title)))
    }
}

fn render_article_page(label: &str, article: &crate::models::WikiArticle, body: &str, source_count: usize) -> String {
    let mut front = String::new();
    front.push_str("---\n");
    front.push_str(&format!("title: {}\n", yaml_quote(label)));
    front.push_str(&format!("topic_id: {}\n", article.topic_id));
    front.push_str(&format!("version: {}\n", article.version));
    front.push_str(&format!("model: {}\n", yaml_quote(&article.model)));
    front.push_str(&format!("sources: {source_count}\n"));
    if let Some(rating) = article.rating {
        front.push_str(&format!("rating: {rating}\n"));
    }
    front.push_str(&format!("generated_at: {}\n", yaml_quote(&article.updated_at)));
    front.push_str("---\n\n");
    front.push_str(body.trim_end());
    front.push('\n');
    front
}

fn render_entity_page(page: &EntityPage, slug: &str) -> String {
    let _ = slug;
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("title: {}\n", yaml_quote(&page.entity)));
    out.push_str(&format!("entity_type: {}\n", page.entity_type.as_str()));
    out.push_str(&format!("tier: {}\n", page.tier.as_str()));
    out.push_str(&format!("doc_frequency: {}\n", page.doc_frequency));
    out.push_str("---\n\n");
    out.push_str(&format!("# {}\n\n", page.entity));

    out.push_str("## Documents\n\n");
    for snippet in &page.snippets {
        if let Some(heading) = &snippet.heading {
            out.push_str(&format!("- **{}** ({}): {}\n", snippet.document_title, heading, snippet.text));
        } else {
            out.push_str(&format!("- **{}**: {}\n", snippet.document_title, snippet.text));
        }
    }
    out.push('\n');

    out.push_str("## Related Entities\n\n");
    for (name, related) in &page.related {
        out.push_str(&format!("- {} (PMI {:.2})\n", name, related.pmi));
    }
    out.push('\n');
    out
}

fn render_index(articles: &[(String, String)], entities: &[(String, String)]) -> String {
    let mut out = String::from("# Wiki\n\n## Articles\n\n");
    for (slug, title) in articles {
        out.push_str(&format!("- [{title}](articles/{slug}.md)\n"));
    }
    out.push_str("\n## Glossary\n\n");
    for (slug, name) in entities {
        out.push_str(&format!("- [{name}](entities/{slug}.md)\n"));
    }
    out
}

fn render_site_config() -> String {
    r"site_name: Wiki
theme:
  name: material
  palette:
    scheme: default
plugins:
  - search
nav:
  - Home: index.md
  - Articles: articles/
  - Glossary: entities/
"
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::{LlmRequest, LlmResponse};
    use crate::services::GenerateOptions;
    use crate::{LlmClient, Result as CrateResult};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FakeLlm;

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn run(&self, _req: &LlmRequest) -> CrateResult<LlmResponse> {
            Ok(LlmResponse {
                text: "# Falcon Overview\n\nBody text about falcons.\n".to_string(),
                input_tokens: 100,
                output_tokens: 50,
            })
        }
    }

    fn seed_topic(store: &Store) -> i64 {
        use crate::models::DocType;
        use crate::storage::wiki::NewTopic;

        let a = store
            .save_document("Falcon Design", "## Falcon\n\nThe falcon scheduler.", None, &[], None, DocType::User)
            .unwrap();
        let b = store
            .save_document(
                "Falcon Ops",
                "## Falcon\n\nOperating the falcon scheduler.",
                None,
                &[],
                None,
                DocType::User,
            )
            .unwrap();
        store.extract_and_save_entities_heuristic(a).unwrap();
        store.extract_and_save_entities_heuristic(b).unwrap();
        store
            .save_topics(&[NewTopic {
                slug: "falcon".into(),
                label: "Falcon".into(),
                entity_fingerprint: "abc".into(),
                coherence_score: 0.9,
                member_doc_ids: vec![a, b],
            }])
            .unwrap();
        store.get_topics().unwrap()[0].topic.id
    }

    #[tokio::test]
    async fn export_writes_article_and_index() {
        let store = Store::open_in_memory().unwrap();
        let topic_id = seed_topic(&store);
        let llm = FakeLlm;
        let opts = GenerateOptions {
            audience: crate::services::AudienceMode::Team,
            model_override: None,
            default_model: "haiku".to_string(),
            dry_run: false,
            timeout: std::time::Duration::from_secs(5),
            config: AppConfig::default().synthesis,
        };
        let result = store.generate_article(topic_id, &llm, &opts).await.unwrap();
        assert!(!result.skipped);

        let dir = tempdir().unwrap();
        let summary = store.export_wiki(dir.path(), None).unwrap();
        assert_eq!(summary.articles_written, 1);

        let index = fs::read_to_string(dir.path().join("docs/index.md")).unwrap();
        assert!(index.contains("Articles"));
        assert!(dir.path().join("mkdocs.yml").exists());
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify_for_path("Event-Driven / Falcon"), "event-driven-falcon");
    }
}
