//! Document CRUD, tag association, and the `mark_stale` cascade (C1).

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{DocType, Document, DocumentListItem, Tag};
use crate::{Error, Result};

use super::{Store, classify_sqlite_error};

/// Either an id or a title, the two ways `get_document` may be addressed.
pub enum DocRef<'a> {
    /// Look up by row id.
    Id(i64),
    /// Look up by exact title match.
    Title(&'a str),
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        project: row.get("project")?,
        parent_id: row.get("parent_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        accessed_at: row.get("accessed_at")?,
        access_count: row.get("access_count")?,
        is_deleted: row.get::<_, i64>("is_deleted")? != 0,
        deleted_at: row.get("deleted_at")?,
        doc_type: DocType::parse(&row.get::<_, String>("doc_type")?),
    })
}

const DOCUMENT_COLUMNS: &str = "id, title, content, project, parent_id, created_at, updated_at, \
     accessed_at, access_count, is_deleted, deleted_at, doc_type";

impl Store {
    /// Inserts a new document, associates it with `tags` (creating any tag
    /// that doesn't already exist and bumping its usage count), and
    /// returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if a uniqueness constraint is violated.
    #[allow(clippy::too_many_arguments)]
    pub fn save_document(
        &self,
        title: &str,
        content: &str,
        project: Option<&str>,
        tags: &[String],
        parent_id: Option<i64>,
        doc_type: DocType,
    ) -> Result<i64> {
        let now = crate::now_rfc3339();
        let id = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO documents \
                 (title, content, project, parent_id, created_at, updated_at, accessed_at, doc_type) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, ?6)",
                params![title, content, project, parent_id, now, doc_type.as_str()],
            )
            .map_err(classify_sqlite_error)?;
            let id = tx.last_insert_rowid();
            attach_tags(&tx, id, tags)?;
            tx.commit()?;
            Ok(id)
        })?;
        self.cache.documents.clear();
        self.cache.search.clear();
        Ok(id)
    }

    /// Fetches a document by id or exact title, incrementing its access
    /// counter via the coalesced write-behind buffer (flushed immediately
    /// if this call crosses the batch/interval threshold). Returns `None`
    /// for an unknown or soft-deleted reference.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the lookup or an eager flush.
    pub fn get_document(&self, reference: DocRef<'_>) -> Result<Option<Document>> {
        let doc = self.with_conn(|conn| {
            let result = match reference {
                DocRef::Id(id) => conn
                    .query_row(
                        &format!(
                            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND is_deleted = 0"
                        ),
                        params![id],
                        row_to_document,
                    )
                    .optional()?,
                DocRef::Title(title) => conn
                    .query_row(
                        &format!(
                            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE title = ?1 AND is_deleted = 0"
                        ),
                        params![title],
                        row_to_document,
                    )
                    .optional()?,
            };
            Ok(result)
        })?;

        if let Some(ref document) = doc {
            let should_flush = self.cache.access_buffer().record(document.id);
            if should_flush {
                self.flush_access_buffer()?;
            }
        }
        Ok(doc)
    }

    /// Updates `title`/`content` in place, bumps `updated_at`, and marks
    /// every article that used this document as a source as stale. Returns
    /// `false` if the document doesn't exist or is soft-deleted.
    pub fn update_document(&self, id: i64, title: &str, content: &str) -> Result<bool> {
        let now = crate::now_rfc3339();
        let changed = self.with_conn(|conn| {
            let rows = conn
                .execute(
                    "UPDATE documents SET title = ?1, content = ?2, updated_at = ?3 \
                     WHERE id = ?4 AND is_deleted = 0",
                    params![title, content, now, id],
                )
                .map_err(classify_sqlite_error)?;
            Ok(rows > 0)
        })?;

        if changed {
            self.mark_stale(id, "source document updated")?;
            self.cache.documents.clear();
            self.cache.search.clear();
        }
        Ok(changed)
    }

    /// Soft-deletes (default) or hard-deletes a document. Hard delete
    /// cascades through link, entity, tag-join, member, and article-source
    /// rows via `ON DELETE CASCADE`. Returns `false` if the document is
    /// unknown, or already soft-deleted when `hard` is false.
    pub fn delete_document(&self, id: i64, hard: bool) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            let rows = if hard {
                conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?
            } else {
                let now = crate::now_rfc3339();
                conn.execute(
                    "UPDATE documents SET is_deleted = 1, deleted_at = ?1 \
                     WHERE id = ?2 AND is_deleted = 0",
                    params![now, id],
                )?
            };
            Ok(rows > 0)
        })?;

        if changed {
            self.cache.documents.clear();
            self.cache.search.clear();
        }
        Ok(changed)
    }

    /// Restores a previously soft-deleted document. Returns `false` if the
    /// document is unknown or not currently deleted.
    pub fn restore(&self, id: i64) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE documents SET is_deleted = 0, deleted_at = NULL WHERE id = ?1 AND is_deleted = 1",
                params![id],
            )?;
            Ok(rows > 0)
        })?;
        if changed {
            self.cache.documents.clear();
            self.cache.search.clear();
        }
        Ok(changed)
    }

    /// Lists non-deleted documents, optionally restricted to `project`,
    /// newest-updated first. Applies no `doc_type` filter.
    pub fn list_documents(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DocumentListItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, project, created_at, updated_at FROM documents \
                 WHERE is_deleted = 0 AND (?1 IS NULL OR project = ?1) \
                 ORDER BY updated_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![project, i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                    Ok(DocumentListItem {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        project: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Fetches `(id, title, content, project)` for every non-deleted
    /// document, optionally restricted to `project`. Unlike
    /// [`Store::get_document`] this never touches the access counter or
    /// `accessed_at` — it exists for batch analytics/linking passes (the
    /// entity- and semantic-match wikifiers, duplicate detection) that scan
    /// the whole corpus and must not record a "view" per document.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn list_document_contents(&self, project: Option<&str>) -> Result<Vec<(i64, String, String, Option<String>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content, project FROM documents \
                 WHERE is_deleted = 0 AND (?1 IS NULL OR project = ?1) \
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![project], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Lists soft-deleted documents, optionally restricted to the last
    /// `days` since deletion.
    pub fn list_deleted(&self, days: Option<i64>, limit: usize) -> Result<Vec<DocumentListItem>> {
        self.with_conn(|conn| {
            let cutoff = days.map(|d| (chrono::Utc::now() - chrono::Duration::days(d)).to_rfc3339());
            let mut stmt = conn.prepare(
                "SELECT id, title, project, created_at, updated_at FROM documents \
                 WHERE is_deleted = 1 AND (?1 IS NULL OR deleted_at >= ?1) \
                 ORDER BY deleted_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff, i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                    Ok(DocumentListItem {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        project: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Hard-deletes soft-deleted documents older than `older_than_days`
    /// (all of them, if `None`). Returns the number purged.
    pub fn purge_deleted(&self, older_than_days: Option<i64>) -> Result<usize> {
        let purged = self.with_conn(|conn| {
            let cutoff =
                older_than_days.map(|d| (chrono::Utc::now() - chrono::Duration::days(d)).to_rfc3339());
            let rows = conn.execute(
                "DELETE FROM documents WHERE is_deleted = 1 AND (?1 IS NULL OR deleted_at < ?1)",
                params![cutoff],
            )?;
            Ok(rows)
        })?;
        if purged > 0 {
            self.cache.documents.clear();
        }
        Ok(purged)
    }

    /// Returns the tags attached to `document_id`.
    pub fn tags_for_document(&self, document_id: i64) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.name, t.usage_count FROM tags t \
                 JOIN document_tags dt ON dt.tag_id = t.id WHERE dt.document_id = ?1 \
                 ORDER BY t.name",
            )?;
            let rows = stmt
                .query_map(params![document_id], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        usage_count: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Marks every article whose provenance includes `doc_id` as stale
    /// with `reason`, so the next synthesis run regenerates it. A single
    /// `UPDATE` joined on `wiki_article_sources`, per the design notes.
    pub fn mark_stale(&self, doc_id: i64, reason: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE wiki_articles SET is_stale = 1, stale_reason = ?1 \
                 WHERE id IN (SELECT article_id FROM wiki_article_sources WHERE document_id = ?2)",
                params![reason, doc_id],
            )?;
            Ok(rows)
        })
    }

    /// Drains the access-count buffer and applies it to `documents` in a
    /// single transaction, bumping `access_count` and `accessed_at`.
    pub fn flush_access_buffer(&self) -> Result<()> {
        let counts = self.cache.access_buffer().take();
        if counts.is_empty() {
            return Ok(());
        }
        let now = crate::now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for (doc_id, delta) in counts {
                tx.execute(
                    "UPDATE documents SET access_count = access_count + ?1, accessed_at = ?2 \
                     WHERE id = ?3",
                    params![delta, now, doc_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

fn attach_tags(conn: &Connection, document_id: i64, tags: &[String]) -> Result<()> {
    for name in tags {
        conn.execute(
            "INSERT INTO tags (name, usage_count) VALUES (?1, 1) \
             ON CONFLICT(name) DO UPDATE SET usage_count = usage_count + 1",
            params![name],
        )?;
        let tag_id: i64 =
            conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                row.get(0)
            })?;
        conn.execute(
            "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
            params![document_id, tag_id],
        )?;
    }
    Ok(())
}

impl Store {
    /// Convenience wrapper erroring instead of returning `None` for
    /// callers that consider a missing document a [`Error::NotFound`].
    pub fn require_document(&self, id: i64) -> Result<Document> {
        self.get_document(DocRef::Id(id))?
            .ok_or_else(|| Error::NotFound(format!("document {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn save_then_get_round_trip() {
        let store = store();
        let id = store
            .save_document("Title", "Content", Some("proj"), &[], None, DocType::User)
            .unwrap();
        let doc = store.get_document(DocRef::Id(id)).unwrap().unwrap();
        assert_eq!(doc.title, "Title");
        assert_eq!(doc.content, "Content");
        assert_eq!(doc.project.as_deref(), Some("proj"));
    }

    #[test]
    fn get_document_by_title() {
        let store = store();
        store
            .save_document("Unique Title", "x", None, &[], None, DocType::User)
            .unwrap();
        let doc = store
            .get_document(DocRef::Title("Unique Title"))
            .unwrap()
            .unwrap();
        assert_eq!(doc.title, "Unique Title");
    }

    #[test]
    fn soft_delete_then_restore_preserves_content() {
        let store = store();
        let id = store
            .save_document("T", "C", None, &[], None, DocType::User)
            .unwrap();
        assert!(store.delete_document(id, false).unwrap());
        assert!(store.get_document(DocRef::Id(id)).unwrap().is_none());
        assert!(store.restore(id).unwrap());
        let doc = store.get_document(DocRef::Id(id)).unwrap().unwrap();
        assert_eq!(doc.content, "C");
    }

    #[test]
    fn soft_delete_of_already_deleted_returns_false() {
        let store = store();
        let id = store
            .save_document("T", "C", None, &[], None, DocType::User)
            .unwrap();
        assert!(store.delete_document(id, false).unwrap());
        assert!(!store.delete_document(id, false).unwrap());
    }

    #[test]
    fn hard_delete_removes_row_entirely() {
        let store = store();
        let id = store
            .save_document("T", "C", None, &[], None, DocType::User)
            .unwrap();
        assert!(store.delete_document(id, true).unwrap());
        assert!(!store.restore(id).unwrap());
    }

    #[test]
    fn list_documents_excludes_soft_deleted() {
        let store = store();
        let a = store
            .save_document("A", "a", None, &[], None, DocType::User)
            .unwrap();
        store
            .save_document("B", "b", None, &[], None, DocType::User)
            .unwrap();
        store.delete_document(a, false).unwrap();

        let listed = store.list_documents(None, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "B");
    }

    #[test]
    fn tags_are_interned_and_counted() {
        let store = store();
        store
            .save_document(
                "A",
                "a",
                None,
                &["rust".to_string(), "wiki".to_string()],
                None,
                DocType::User,
            )
            .unwrap();
        let id2 = store
            .save_document("B", "b", None, &["rust".to_string()], None, DocType::User)
            .unwrap();

        let tags = store.tags_for_document(id2).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "rust");
        assert_eq!(tags[0].usage_count, 2);
    }

    #[test]
    fn update_document_marks_dependent_articles_stale() {
        let store = store();
        let source_id = store
            .save_document("Source", "content", None, &[], None, DocType::User)
            .unwrap();
        let article_doc_id = store
            .save_document("Article", "rendered", None, &[], None, DocType::Wiki)
            .unwrap();

        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO wiki_topics (slug, label) VALUES ('t', 'T')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO wiki_articles \
                     (topic_id, document_id, source_hash, model, created_at, updated_at) \
                     VALUES (1, ?1, 'hash', 'haiku', 'now', 'now')",
                    params![article_doc_id],
                )?;
                conn.execute(
                    "INSERT INTO wiki_article_sources (article_id, document_id, content_hash) \
                     VALUES (1, ?1, 'h')",
                    params![source_id],
                )?;
                Ok(())
            })
            .unwrap();

        store
            .update_document(source_id, "Source", "changed content")
            .unwrap();

        let is_stale: bool = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT is_stale FROM wiki_articles WHERE id = 1",
                    [],
                    |row| row.get::<_, i64>(0),
                )? != 0)
            })
            .unwrap();
        assert!(is_stale);
    }

    #[test]
    fn access_buffer_flushes_at_threshold_and_updates_access_count() {
        let store = store();
        let id = store
            .save_document("T", "C", None, &[], None, DocType::User)
            .unwrap();
        for _ in 0..60 {
            store.get_document(DocRef::Id(id)).unwrap();
        }
        store.flush_access_buffer().unwrap();
        let doc = store.get_document(DocRef::Id(id)).unwrap().unwrap();
        assert!(doc.access_count > 0);
    }
}
