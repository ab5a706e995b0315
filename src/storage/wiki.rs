//! Persistence for wiki topics, topic members, articles, article
//! provenance, and batch runs — backing the topic clusterer (C10) and the
//! synthesis pipeline (C13).

use rusqlite::{OptionalExtension, Row, params};

use crate::models::{
    TopicStatus, WikiArticle, WikiArticleSource, WikiArticleTiming, WikiRun, WikiTopic,
    WikiTopicMember, WikiTopicSummary,
};
use crate::{Error, Result};

use super::Store;

/// One discovered cluster, ready to be persisted by [`Store::save_topics`].
pub struct NewTopic {
    /// URL-safe, globally-unique slug.
    pub slug: String,
    /// Human-readable label.
    pub label: String,
    /// First 16 hex chars of the MD5 of the sorted union of member entities.
    pub entity_fingerprint: String,
    /// Average pairwise intra-cluster Jaccard similarity.
    pub coherence_score: f64,
    /// Member document ids, ordered by relevance descending.
    pub member_doc_ids: Vec<i64>,
}

fn row_to_topic(row: &Row<'_>) -> rusqlite::Result<WikiTopic> {
    Ok(WikiTopic {
        id: row.get("id")?,
        slug: row.get("slug")?,
        label: row.get("label")?,
        entity_fingerprint: row.get("entity_fingerprint")?,
        coherence_score: row.get("coherence_score")?,
        status: TopicStatus::parse(&row.get::<_, String>("status")?),
        model_override: row.get("model_override")?,
        editorial_prompt: row.get("editorial_prompt")?,
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<WikiArticle> {
    Ok(WikiArticle {
        id: row.get("id")?,
        topic_id: row.get("topic_id")?,
        document_id: row.get("document_id")?,
        source_hash: row.get("source_hash")?,
        model: row.get("model")?,
        input_tokens: row.get::<_, i64>("input_tokens")?.try_into().unwrap_or(0),
        output_tokens: row.get::<_, i64>("output_tokens")?.try_into().unwrap_or(0),
        cost_usd: row.get("cost_usd")?,
        version: row.get("version")?,
        is_stale: row.get::<_, i64>("is_stale")? != 0,
        stale_reason: row.get("stale_reason")?,
        previous_content: row.get("previous_content")?,
        rating: row
            .get::<_, Option<i64>>("rating")?
            .map(|r| r as u8),
        timing: WikiArticleTiming {
            prepare_ms: row.get::<_, i64>("timing_prepare_ms")?.try_into().unwrap_or(0),
            route_ms: row.get::<_, i64>("timing_route_ms")?.try_into().unwrap_or(0),
            outline_ms: row.get::<_, i64>("timing_outline_ms")?.try_into().unwrap_or(0),
            write_ms: row.get::<_, i64>("timing_write_ms")?.try_into().unwrap_or(0),
            validate_ms: row.get::<_, i64>("timing_validate_ms")?.try_into().unwrap_or(0),
            save_ms: row.get::<_, i64>("timing_save_ms")?.try_into().unwrap_or(0),
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Store {
    /// Replaces `wiki_topics`/`wiki_topic_members` wholesale with the
    /// supplied clusters, inside a single transaction. Every member is
    /// inserted with `relevance_score = 1.0`, `is_primary = 1`; per-member
    /// relevance weighting is applied afterward via [`Store::set_member_weight`].
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn save_topics(&self, topics: &[NewTopic]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM wiki_topic_members", [])?;
            tx.execute("DELETE FROM wiki_topics", [])?;
            {
                let mut insert_topic = tx.prepare(
                    "INSERT INTO wiki_topics (slug, label, entity_fingerprint, coherence_score) \
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                let mut insert_member = tx.prepare(
                    "INSERT INTO wiki_topic_members \
                     (topic_id, document_id, relevance_score, is_primary) VALUES (?1, ?2, 1.0, 1)",
                )?;
                for topic in topics {
                    insert_topic.execute(params![
                        topic.slug,
                        topic.label,
                        topic.entity_fingerprint,
                        topic.coherence_score
                    ])?;
                    let topic_id = tx.last_insert_rowid();
                    for doc_id in &topic.member_doc_ids {
                        insert_member.execute(params![topic_id, doc_id])?;
                    }
                }
            }
            tx.commit()?;
            Ok(topics.len())
        })
    }

    /// Every topic joined with its member count, largest first.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_topics(&self) -> Result<Vec<WikiTopicSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.*, COUNT(m.id) AS member_count FROM wiki_topics t \
                 LEFT JOIN wiki_topic_members m ON m.topic_id = t.id \
                 GROUP BY t.id ORDER BY member_count DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(WikiTopicSummary {
                        topic: row_to_topic(row)?,
                        member_count: row.get("member_count")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// A single topic by id.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_topic(&self, topic_id: i64) -> Result<Option<WikiTopic>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT * FROM wiki_topics WHERE id = ?1", params![topic_id], row_to_topic)
                .optional()?)
        })
    }

    /// Primary member document ids for `topic_id`, ordered by relevance
    /// score descending.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_topic_docs(&self, topic_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT document_id FROM wiki_topic_members \
                 WHERE topic_id = ?1 AND is_primary = 1 ORDER BY relevance_score DESC",
            )?;
            let rows = stmt
                .query_map(params![topic_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Every member row (primary and excluded) for `topic_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_topic_members(&self, topic_id: i64) -> Result<Vec<WikiTopicMember>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic_id, document_id, relevance_score, is_primary \
                 FROM wiki_topic_members WHERE topic_id = ?1 ORDER BY relevance_score DESC",
            )?;
            let rows = stmt
                .query_map(params![topic_id], |row| {
                    Ok(WikiTopicMember {
                        id: row.get(0)?,
                        topic_id: row.get(1)?,
                        document_id: row.get(2)?,
                        relevance_score: row.get(3)?,
                        is_primary: row.get::<_, i64>(4)? != 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Sets a member's relevance weight, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member row doesn't exist.
    pub fn set_member_weight(&self, topic_id: i64, document_id: i64, weight: f64) -> Result<()> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE wiki_topic_members SET relevance_score = ?1 \
                 WHERE topic_id = ?2 AND document_id = ?3",
                params![weight.clamp(0.0, 1.0), topic_id, document_id],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::NotFound(format!(
                "topic {topic_id} member {document_id}"
            )));
        }
        Ok(())
    }

    /// Sets a member's inclusion flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member row doesn't exist.
    pub fn set_member_included(&self, topic_id: i64, document_id: i64, included: bool) -> Result<()> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE wiki_topic_members SET is_primary = ?1 \
                 WHERE topic_id = ?2 AND document_id = ?3",
                params![i64::from(included), topic_id, document_id],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::NotFound(format!(
                "topic {topic_id} member {document_id}"
            )));
        }
        Ok(())
    }

    /// Sets a topic's lifecycle status (`active`/`skipped`/`pinned`).
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn set_topic_status(&self, topic_id: i64, status: TopicStatus) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_topics SET status = ?1 WHERE id = ?2",
                params![status.as_str(), topic_id],
            )?;
            Ok(())
        })
    }

    /// Sets or clears a topic's per-topic model override.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn set_topic_model_override(&self, topic_id: i64, model: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_topics SET model_override = ?1 WHERE id = ?2",
                params![model, topic_id],
            )?;
            Ok(())
        })
    }

    /// Sets or clears a topic's editorial-guidance prompt.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn set_topic_editorial_prompt(&self, topic_id: i64, prompt: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_topics SET editorial_prompt = ?1 WHERE id = ?2",
                params![prompt, topic_id],
            )?;
            Ok(())
        })
    }

    /// Renames a topic's label and slug, checking the new slug for
    /// uniqueness against every other topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if `new_slug` is already in use by a
    /// different topic.
    pub fn rename_topic(&self, topic_id: i64, new_label: &str, new_slug: &str) -> Result<()> {
        self.with_conn(|conn| {
            let collision: Option<i64> = conn
                .query_row(
                    "SELECT id FROM wiki_topics WHERE slug = ?1 AND id <> ?2",
                    params![new_slug, topic_id],
                    |row| row.get(0),
                )
                .optional()?;
            if collision.is_some() {
                return Err(Error::Conflict(format!("slug '{new_slug}' already in use")));
            }
            conn.execute(
                "UPDATE wiki_topics SET label = ?1, slug = ?2 WHERE id = ?3",
                params![new_label, new_slug, topic_id],
            )?;
            Ok(())
        })
    }

    /// Fetches the article for `topic_id`, if one has been generated.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_article_for_topic(&self, topic_id: i64) -> Result<Option<WikiArticle>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM wiki_articles WHERE topic_id = ?1",
                    params![topic_id],
                    row_to_article,
                )
                .optional()?)
        })
    }

    /// Fetches an article by id.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_article(&self, article_id: i64) -> Result<Option<WikiArticle>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM wiki_articles WHERE id = ?1",
                    params![article_id],
                    row_to_article,
                )
                .optional()?)
        })
    }

    /// Atomically saves (insert-or-update) an article for `topic_id`: if
    /// one already exists, its current content-holding document is
    /// updated in place, the prior content is stashed into
    /// `previous_content`, `version` is incremented, and `is_stale` is
    /// reset; provenance rows are replaced wholesale. All in one
    /// transaction, per the atomicity guarantee on a single topic's save.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    #[allow(clippy::too_many_arguments)]
    pub fn save_article(
        &self,
        topic_id: i64,
        document_id: i64,
        previous_content: Option<&str>,
        source_hash: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        timing: WikiArticleTiming,
        sources: &[(i64, String)],
    ) -> Result<i64> {
        let now = crate::now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM wiki_articles WHERE topic_id = ?1",
                    params![topic_id],
                    |row| row.get(0),
                )
                .optional()?;

            let article_id = if let Some(id) = existing_id {
                tx.execute(
                    "UPDATE wiki_articles SET document_id = ?1, source_hash = ?2, model = ?3, \
                     input_tokens = ?4, output_tokens = ?5, cost_usd = ?6, version = version + 1, \
                     is_stale = 0, stale_reason = NULL, previous_content = ?7, \
                     timing_prepare_ms = ?8, timing_route_ms = ?9, timing_outline_ms = ?10, \
                     timing_write_ms = ?11, timing_validate_ms = ?12, timing_save_ms = ?13, \
                     updated_at = ?14 WHERE id = ?15",
                    params![
                        document_id,
                        source_hash,
                        model,
                        i64::try_from(input_tokens).unwrap_or(i64::MAX),
                        i64::try_from(output_tokens).unwrap_or(i64::MAX),
                        cost_usd,
                        previous_content,
                        i64::try_from(timing.prepare_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.route_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.outline_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.write_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.validate_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.save_ms).unwrap_or(i64::MAX),
                        now,
                        id,
                    ],
                )?;
                tx.execute(
                    "DELETE FROM wiki_article_sources WHERE article_id = ?1",
                    params![id],
                )?;
                id
            } else {
                tx.execute(
                    "INSERT INTO wiki_articles \
                     (topic_id, document_id, source_hash, model, input_tokens, output_tokens, \
                      cost_usd, timing_prepare_ms, timing_route_ms, timing_outline_ms, \
                      timing_write_ms, timing_validate_ms, timing_save_ms, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                    params![
                        topic_id,
                        document_id,
                        source_hash,
                        model,
                        i64::try_from(input_tokens).unwrap_or(i64::MAX),
                        i64::try_from(output_tokens).unwrap_or(i64::MAX),
                        cost_usd,
                        i64::try_from(timing.prepare_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.route_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.outline_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.write_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.validate_ms).unwrap_or(i64::MAX),
                        i64::try_from(timing.save_ms).unwrap_or(i64::MAX),
                        now,
                    ],
                )?;
                tx.last_insert_rowid()
            };

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO wiki_article_sources (article_id, document_id, content_hash) \
                     VALUES (?1, ?2, ?3)",
                )?;
                for (doc_id, hash) in sources {
                    stmt.execute(params![article_id, doc_id, hash])?;
                }
            }

            tx.commit()?;
            Ok(article_id)
        })
    }

    /// Provenance rows for `article_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_article_sources(&self, article_id: i64) -> Result<Vec<WikiArticleSource>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, article_id, document_id, content_hash \
                 FROM wiki_article_sources WHERE article_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![article_id], |row| {
                    Ok(WikiArticleSource {
                        id: row.get(0)?,
                        article_id: row.get(1)?,
                        document_id: row.get(2)?,
                        content_hash: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Sets a 1-5 star rating on `article_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] if `rating` is out of range.
    pub fn rate_article(&self, article_id: i64, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(Error::BadInput(format!("rating {rating} out of range 1-5")));
        }
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_articles SET rating = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(rating), crate::now_rfc3339(), article_id],
            )?;
            Ok(())
        })
    }

    /// Deletes a topic's article row (used by merge, when the losing
    /// topic's article is discarded).
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn delete_article_for_topic(&self, topic_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM wiki_articles WHERE topic_id = ?1", params![topic_id])?;
            Ok(())
        })
    }

    /// Deletes a topic and its members (used by split, after moving the
    /// matching documents to a new topic).
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn delete_topic(&self, topic_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM wiki_topics WHERE id = ?1", params![topic_id])?;
            Ok(())
        })
    }

    /// Inserts a new topic directly (used by split, to create the
    /// resulting second topic) and returns its id.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn insert_topic(&self, slug: &str, label: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wiki_topics (slug, label) VALUES (?1, ?2)",
                params![slug, label],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Moves a member row from one topic to another.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn move_topic_member(&self, document_id: i64, from_topic: i64, to_topic: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_topic_members SET topic_id = ?1 WHERE topic_id = ?2 AND document_id = ?3",
                params![to_topic, from_topic, document_id],
            )?;
            Ok(())
        })
    }

    /// Starts a wiki run record.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn create_wiki_run(&self, model: &str, dry_run: bool) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wiki_runs (model, dry_run, started_at) VALUES (?1, ?2, ?3)",
                params![model, i64::from(dry_run), crate::now_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Completes a wiki run with final counts and totals.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_wiki_run(
        &self,
        run_id: i64,
        attempted: i64,
        generated: i64,
        skipped: i64,
        total_input_tokens: u64,
        total_output_tokens: u64,
        total_cost_usd: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE wiki_runs SET completed_at = ?1, topics_attempted = ?2, \
                 topics_generated = ?3, topics_skipped = ?4, total_input_tokens = ?5, \
                 total_output_tokens = ?6, total_cost_usd = ?7 WHERE id = ?8",
                params![
                    crate::now_rfc3339(),
                    attempted,
                    generated,
                    skipped,
                    i64::try_from(total_input_tokens).unwrap_or(i64::MAX),
                    i64::try_from(total_output_tokens).unwrap_or(i64::MAX),
                    total_cost_usd,
                    run_id,
                ],
            )?;
            Ok(())
        })
    }

    /// Every completed and in-flight wiki run, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn list_wiki_runs(&self, limit: usize) -> Result<Vec<WikiRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM wiki_runs ORDER BY started_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                    Ok(WikiRun {
                        id: row.get("id")?,
                        model: row.get("model")?,
                        dry_run: row.get::<_, i64>("dry_run")? != 0,
                        started_at: row.get("started_at")?,
                        completed_at: row.get("completed_at")?,
                        topics_attempted: row.get("topics_attempted")?,
                        topics_generated: row.get("topics_generated")?,
                        topics_skipped: row.get("topics_skipped")?,
                        total_input_tokens: row
                            .get::<_, i64>("total_input_tokens")?
                            .try_into()
                            .unwrap_or(0),
                        total_output_tokens: row
                            .get::<_, i64>("total_output_tokens")?
                            .try_into()
                            .unwrap_or(0),
                        total_cost_usd: row.get("total_cost_usd")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    fn store_with_doc(store: &Store, title: &str) -> i64 {
        store
            .save_document(title, "content", None, &[], None, DocType::User)
            .unwrap()
    }

    #[test]
    fn save_topics_replaces_prior_clusters() {
        let store = Store::open_in_memory().unwrap();
        let a = store_with_doc(&store, "A");
        let b = store_with_doc(&store, "B");

        store
            .save_topics(&[NewTopic {
                slug: "first".into(),
                label: "First".into(),
                entity_fingerprint: "abc".into(),
                coherence_score: 0.5,
                member_doc_ids: vec![a],
            }])
            .unwrap();
        store
            .save_topics(&[NewTopic {
                slug: "second".into(),
                label: "Second".into(),
                entity_fingerprint: "def".into(),
                coherence_score: 0.7,
                member_doc_ids: vec![a, b],
            }])
            .unwrap();

        let topics = store.get_topics().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic.slug, "second");
        assert_eq!(topics[0].member_count, 2);
    }

    #[test]
    fn get_topic_docs_contains_every_primary_member() {
        let store = Store::open_in_memory().unwrap();
        let a = store_with_doc(&store, "A");
        let b = store_with_doc(&store, "B");
        store
            .save_topics(&[NewTopic {
                slug: "t".into(),
                label: "T".into(),
                entity_fingerprint: "x".into(),
                coherence_score: 0.5,
                member_doc_ids: vec![a, b],
            }])
            .unwrap();
        let topic_id = store.get_topics().unwrap()[0].topic.id;
        let docs = store.get_topic_docs(topic_id).unwrap();
        assert!(docs.contains(&a));
        assert!(docs.contains(&b));
    }

    #[test]
    fn rename_topic_rejects_slug_collision() {
        let store = Store::open_in_memory().unwrap();
        let a = store_with_doc(&store, "A");
        store
            .save_topics(&[
                NewTopic {
                    slug: "one".into(),
                    label: "One".into(),
                    entity_fingerprint: String::new(),
                    coherence_score: 0.0,
                    member_doc_ids: vec![a],
                },
            ])
            .unwrap();
        let topic_id = store.get_topics().unwrap()[0].topic.id;
        store.insert_topic("two", "Two").unwrap();

        let result = store.rename_topic(topic_id, "Two", "two");
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn save_article_regeneration_stashes_content_and_bumps_version() {
        let store = Store::open_in_memory().unwrap();
        let source = store_with_doc(&store, "Source");
        store
            .save_topics(&[NewTopic {
                slug: "t".into(),
                label: "T".into(),
                entity_fingerprint: String::new(),
                coherence_score: 0.0,
                member_doc_ids: vec![source],
            }])
            .unwrap();
        let topic_id = store.get_topics().unwrap()[0].topic.id;

        let doc1 = store
            .save_document("Article", "X", None, &[], None, DocType::Wiki)
            .unwrap();
        store
            .save_article(
                topic_id,
                doc1,
                None,
                "hash1",
                "haiku",
                100,
                50,
                0.01,
                WikiArticleTiming::default(),
                &[(source, "h1".to_string())],
            )
            .unwrap();

        store
            .save_article(
                topic_id,
                doc1,
                Some("X"),
                "hash2",
                "haiku",
                110,
                55,
                0.02,
                WikiArticleTiming::default(),
                &[(source, "h2".to_string())],
            )
            .unwrap();

        let article = store.get_article_for_topic(topic_id).unwrap().unwrap();
        assert_eq!(article.version, 2);
        assert_eq!(article.previous_content.as_deref(), Some("X"));
        assert!(!article.is_stale);
    }

    #[test]
    fn rate_article_rejects_out_of_range() {
        let store = Store::open_in_memory().unwrap();
        let result = store.rate_article(1, 6);
        assert!(matches!(result, Err(Error::BadInput(_))));
    }
}
