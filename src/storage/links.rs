//! The link store (C4): CRUD and batch operations over the bidirectional
//! document-link edge set.

use rusqlite::{OptionalExtension, Row, params};
use std::collections::HashMap;

use crate::models::{DocumentLink, DocumentLinkDetail, LinkMethod};
use crate::Result;

use super::Store;

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<DocumentLink> {
    Ok(DocumentLink {
        id: row.get("id")?,
        source_doc_id: row.get("source_doc_id")?,
        target_doc_id: row.get("target_doc_id")?,
        similarity_score: row.get("similarity_score")?,
        created_at: row.get("created_at")?,
        method: LinkMethod::parse(&row.get::<_, String>("method")?),
    })
}

impl Store {
    /// Creates a directed link from `src` to `dst`. Returns `None` (rather
    /// than raising) if `src == dst`, or if a link between the two already
    /// exists in either direction — per the idempotent-insert invariant.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn create_link(
        &self,
        src: i64,
        dst: i64,
        score: f64,
        method: LinkMethod,
    ) -> Result<Option<i64>> {
        if src == dst {
            return Ok(None);
        }
        if self.link_exists(src, dst)? {
            return Ok(None);
        }
        let now = crate::now_rfc3339();
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO document_links \
                 (source_doc_id, target_doc_id, similarity_score, method, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![src, dst, score, method.as_str(), now],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Some(id))
    }

    /// Inserts every `(src, dst, score, method)` edge in `edges` inside a
    /// single transaction, silently skipping self-links and links whose
    /// pair already exists (in either direction, including earlier entries
    /// in the same batch). Returns the number actually inserted.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn create_links_batch(
        &self,
        edges: &[(i64, i64, f64, LinkMethod)],
    ) -> Result<usize> {
        let now = crate::now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            {
                let mut exists_stmt = tx.prepare(
                    "SELECT 1 FROM document_links \
                     WHERE (source_doc_id = ?1 AND target_doc_id = ?2) \
                        OR (source_doc_id = ?2 AND target_doc_id = ?1)",
                )?;
                let mut insert_stmt = tx.prepare(
                    "INSERT INTO document_links \
                     (source_doc_id, target_doc_id, similarity_score, method, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for &(src, dst, score, method) in edges {
                    if src == dst {
                        continue;
                    }
                    let already = exists_stmt
                        .query_row(params![src, dst], |_| Ok(()))
                        .optional()?
                        .is_some();
                    if already {
                        continue;
                    }
                    insert_stmt.execute(params![src, dst, score, method.as_str(), now])?;
                    inserted += 1;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Whether a link between `a` and `b` exists in either direction.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn link_exists(&self, a: i64, b: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM document_links \
                     WHERE (source_doc_id = ?1 AND target_doc_id = ?2) \
                        OR (source_doc_id = ?2 AND target_doc_id = ?1) LIMIT 1",
                    params![a, b],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Removes the link between `a` and `b`, undirected. Returns whether a
    /// row was removed.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn delete_link(&self, a: i64, b: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM document_links \
                 WHERE (source_doc_id = ?1 AND target_doc_id = ?2) \
                    OR (source_doc_id = ?2 AND target_doc_id = ?1)",
                params![a, b],
            )?;
            Ok(rows > 0)
        })
    }

    /// Removes every link touching `doc_id`, in either direction. Returns
    /// the number of rows removed.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn delete_links_for_document(&self, doc_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM document_links WHERE source_doc_id = ?1 OR target_doc_id = ?1",
                params![doc_id],
            )?)
        })
    }

    /// Removes every `entity_match` link, globally. Used by the
    /// entity-match wikifier's rebuild variant before regenerating.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn delete_links_by_method(&self, method: LinkMethod) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM document_links WHERE method = ?1",
                params![method.as_str()],
            )?)
        })
    }

    /// Links touching `doc_id`, joined with both endpoint titles, excluding
    /// any link whose source or target is soft-deleted.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_links_for_document(&self, doc_id: i64) -> Result<Vec<DocumentLinkDetail>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.source_doc_id, l.target_doc_id, l.similarity_score, \
                        l.method, l.created_at, s.title AS source_title, t.title AS target_title \
                 FROM document_links l \
                 JOIN documents s ON s.id = l.source_doc_id \
                 JOIN documents t ON t.id = l.target_doc_id \
                 WHERE (l.source_doc_id = ?1 OR l.target_doc_id = ?1) \
                   AND s.is_deleted = 0 AND t.is_deleted = 0 \
                 ORDER BY l.created_at DESC",
            )?;
            let rows = stmt
                .query_map(params![doc_id], |row| {
                    Ok(DocumentLinkDetail {
                        link: row_to_link(row)?,
                        source_title: row.get("source_title")?,
                        target_title: row.get("target_title")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// The bare neighbor id list for `doc_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_linked_doc_ids(&self, doc_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN source_doc_id = ?1 THEN target_doc_id ELSE source_doc_id END \
                 FROM document_links WHERE source_doc_id = ?1 OR target_doc_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![doc_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// The number of links touching `doc_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn get_link_count(&self, doc_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM document_links WHERE source_doc_id = ?1 OR target_doc_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Link counts for every id in `ids`, always returning a zero entry for
    /// ids with no links.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn batch_get_link_counts(&self, ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let mut counts: HashMap<i64, i64> = ids.iter().map(|&id| (id, 0)).collect();
        if ids.is_empty() {
            return Ok(counts);
        }
        self.with_conn(|conn| {
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT source_doc_id, target_doc_id FROM document_links \
                 WHERE source_doc_id IN ({placeholders}) OR target_doc_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let id_set: std::collections::HashSet<i64> = ids.iter().copied().collect();
            let params: Vec<&dyn rusqlite::ToSql> =
                ids.iter().chain(ids.iter()).map(|i| i as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (src, dst) in rows {
                if id_set.contains(&src) {
                    *counts.entry(src).or_insert(0) += 1;
                }
                if id_set.contains(&dst) {
                    *counts.entry(dst).or_insert(0) += 1;
                }
            }
            Ok(())
        })?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    fn store_with_docs(n: usize) -> (Store, Vec<i64>) {
        let store = Store::open_in_memory().unwrap();
        let ids = (0..n)
            .map(|i| {
                store
                    .save_document(&format!("Doc {i}"), "content", None, &[], None, DocType::User)
                    .unwrap()
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn create_link_rejects_self_link() {
        let (store, ids) = store_with_docs(1);
        assert!(store
            .create_link(ids[0], ids[0], 1.0, LinkMethod::Manual)
            .unwrap()
            .is_none());
    }

    #[test]
    fn create_link_is_idempotent_in_either_direction() {
        let (store, ids) = store_with_docs(2);
        let first = store
            .create_link(ids[0], ids[1], 1.0, LinkMethod::TitleMatch)
            .unwrap();
        assert!(first.is_some());

        assert!(store
            .create_link(ids[0], ids[1], 1.0, LinkMethod::TitleMatch)
            .unwrap()
            .is_none());
        assert!(store
            .create_link(ids[1], ids[0], 1.0, LinkMethod::TitleMatch)
            .unwrap()
            .is_none());
        assert!(store.link_exists(ids[0], ids[1]).unwrap());
        assert!(store.link_exists(ids[1], ids[0]).unwrap());
    }

    #[test]
    fn batch_insert_skips_duplicates_and_self_links() {
        let (store, ids) = store_with_docs(3);
        let edges = vec![
            (ids[0], ids[1], 0.9, LinkMethod::EntityMatch),
            (ids[1], ids[0], 0.9, LinkMethod::EntityMatch),
            (ids[2], ids[2], 1.0, LinkMethod::EntityMatch),
            (ids[0], ids[2], 0.7, LinkMethod::EntityMatch),
        ];
        let inserted = store.create_links_batch(&edges).unwrap();
        assert_eq!(inserted, 2);
    }

    #[test]
    fn delete_links_for_document_removes_all_touching_edges() {
        let (store, ids) = store_with_docs(3);
        store.create_link(ids[0], ids[1], 1.0, LinkMethod::Manual).unwrap();
        store.create_link(ids[0], ids[2], 1.0, LinkMethod::Manual).unwrap();
        let removed = store.delete_links_for_document(ids[0]).unwrap();
        assert_eq!(removed, 2);
        assert!(!store.link_exists(ids[0], ids[1]).unwrap());
    }

    #[test]
    fn get_links_for_document_excludes_soft_deleted_endpoints() {
        let (store, ids) = store_with_docs(2);
        store.create_link(ids[0], ids[1], 1.0, LinkMethod::Manual).unwrap();
        store.delete_document(ids[1], false).unwrap();

        let links = store.get_links_for_document(ids[0]).unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn batch_link_counts_zero_fills_unlinked_ids() {
        let (store, ids) = store_with_docs(3);
        store.create_link(ids[0], ids[1], 1.0, LinkMethod::Manual).unwrap();

        let counts = store.batch_get_link_counts(&ids).unwrap();
        assert_eq!(counts[&ids[0]], 1);
        assert_eq!(counts[&ids[1]], 1);
        assert_eq!(counts[&ids[2]], 0);
    }

    #[test]
    fn rebuild_deletes_only_entity_match_links() {
        let (store, ids) = store_with_docs(2);
        store.create_link(ids[0], ids[1], 1.0, LinkMethod::TitleMatch).unwrap();
        let (_, more_ids) = (0, &ids);
        let _ = more_ids;
        let deleted = store.delete_links_by_method(LinkMethod::EntityMatch).unwrap();
        assert_eq!(deleted, 0);
        assert!(store.link_exists(ids[0], ids[1]).unwrap());
    }
}
