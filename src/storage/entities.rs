//! Persistence for extracted entities and LLM-path entity relationships,
//! shared by the entity extractor (C6), entity-match wikifier (C7), topic
//! clusterer (C10), and entity index (C11).

use rusqlite::{Row, params};
use std::collections::HashMap;

use crate::models::{DocumentEntity, EntityRelationship, EntityType};
use crate::Result;

use super::Store;

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<DocumentEntity> {
    Ok(DocumentEntity {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        entity: row.get("entity")?,
        entity_type: EntityType::parse(&row.get::<_, String>("entity_type")?),
        confidence: row.get("confidence")?,
    })
}

impl Store {
    /// Inserts `entities` for `document_id`. Duplicate `(document_id,
    /// entity)` pairs are ignored, per the idempotent-persistence
    /// invariant, so running extraction twice yields the same rows.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn save_entities(
        &self,
        document_id: i64,
        entities: &[(String, EntityType, f64)],
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO document_entities \
                     (document_id, entity, entity_type, confidence) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (entity, entity_type, confidence) in entities {
                    let changed = stmt.execute(params![
                        document_id,
                        entity,
                        entity_type.as_str(),
                        confidence.clamp(0.0, 1.0)
                    ])?;
                    inserted += changed;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Every entity extracted from `document_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn entities_for_document(&self, document_id: i64) -> Result<Vec<DocumentEntity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, document_id, entity, entity_type, confidence \
                 FROM document_entities WHERE document_id = ?1 ORDER BY entity",
            )?;
            let rows = stmt
                .query_map(params![document_id], row_to_entity)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Every non-deleted document id sharing `entity` with `document_id`,
    /// excluding `document_id` itself, optionally scoped to `project`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn documents_sharing_entity(
        &self,
        entity: &str,
        exclude_document_id: i64,
        project: Option<&str>,
    ) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT de.document_id FROM document_entities de \
                 JOIN documents d ON d.id = de.document_id \
                 WHERE de.entity = ?1 AND de.document_id <> ?2 AND d.is_deleted = 0 \
                   AND (?3 IS NULL OR d.project = ?3)",
            )?;
            let rows = stmt
                .query_map(params![entity, exclude_document_id, project], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// The full `{document_id -> {entity -> max_confidence}}` matrix over
    /// every non-deleted document, optionally restricted to `entity_types`.
    /// Feeds the topic clusterer (C10).
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn entity_matrix(
        &self,
        entity_types: Option<&[EntityType]>,
    ) -> Result<HashMap<i64, HashMap<String, f64>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT de.document_id, de.entity, de.confidence, de.entity_type \
                 FROM document_entities de \
                 JOIN documents d ON d.id = de.document_id WHERE d.is_deleted = 0",
            )?;
            let mut matrix: HashMap<i64, HashMap<String, f64>> = HashMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            for row in rows {
                let (doc_id, entity, confidence, entity_type) = row?;
                if let Some(allowed) = entity_types {
                    let parsed = EntityType::parse(&entity_type);
                    if !allowed.contains(&parsed) {
                        continue;
                    }
                }
                let slot = matrix.entry(doc_id).or_default().entry(entity).or_insert(0.0);
                if confidence > *slot {
                    *slot = confidence;
                }
            }
            Ok(matrix)
        })
    }

    /// Entity-type lookup for every distinct entity string, used by the
    /// clusterer's type-weighted label scoring and the entity index.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn entity_types(&self) -> Result<HashMap<String, EntityType>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT entity, entity_type FROM document_entities")?;
            let mut types = HashMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (entity, entity_type) = row?;
                types.entry(entity).or_insert_with(|| EntityType::parse(&entity_type));
            }
            Ok(types)
        })
    }

    /// Inserts LLM-path entity relationships for `document_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn save_entity_relationships(
        &self,
        document_id: i64,
        relationships: &[(String, String, String, f64)],
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO entity_relationships \
                     (document_id, source_entity, target_entity, relationship_type, confidence) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (source, target, kind, confidence) in relationships {
                    stmt.execute(params![
                        document_id,
                        source,
                        target,
                        kind,
                        confidence.clamp(0.0, 1.0)
                    ])?;
                    inserted += 1;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Relationships extracted from `document_id`.
    ///
    /// # Errors
    ///
    /// Propagates unexpected `SQLite` errors.
    pub fn relationships_for_document(&self, document_id: i64) -> Result<Vec<EntityRelationship>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, document_id, source_entity, target_entity, relationship_type, confidence \
                 FROM entity_relationships WHERE document_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![document_id], |row| {
                    Ok(EntityRelationship {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        source_entity: row.get(2)?,
                        target_entity: row.get(3)?,
                        relationship_type: row.get(4)?,
                        confidence: row.get(5)?,
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

    #[test]
    fn saving_entities_twice_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .save_document("T", "C", None, &[], None, DocType::User)
            .unwrap();
        let entities = vec![("rust".to_string(), EntityType::TechTerm, 0.9)];
        store.save_entities(id, &entities).unwrap();
        store.save_entities(id, &entities).unwrap();

        let saved = store.entities_for_document(id).unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn documents_sharing_entity_excludes_self_and_deleted() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_document("A", "a", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("B", "b", None, &[], None, DocType::User).unwrap();
        let c = store.save_document("C", "c", None, &[], None, DocType::User).unwrap();
        store.save_entities(a, &[("shared".into(), EntityType::Concept, 0.8)]).unwrap();
        store.save_entities(b, &[("shared".into(), EntityType::Concept, 0.8)]).unwrap();
        store.save_entities(c, &[("shared".into(), EntityType::Concept, 0.8)]).unwrap();
        store.delete_document(c, false).unwrap();

        let sharing = store.documents_sharing_entity("shared", a, None).unwrap();
        assert_eq!(sharing, vec![b]);
    }

    #[test]
    fn entity_matrix_takes_max_confidence_per_entity() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save_document("T", "C", None, &[], None, DocType::User).unwrap();
        store
            .save_entities(id, &[("term".into(), EntityType::Heading, 0.95)])
            .unwrap();
        let matrix = store.entity_matrix(None).unwrap();
        assert_eq!(matrix[&id]["term"], 0.95);
    }
}
