//! Ordered, idempotent schema migrations.
//!
//! Unlike the Postgres-backed migration runner this system's teacher
//! codebase carries, `SQLite` has no native migration ledger, so applied
//! migrations are tracked in a dedicated `schema_version` table — one row
//! per migration, carrying its description and the timestamp it was
//! applied, which is more diagnosable than a bare `PRAGMA user_version`
//! integer. Each migration runs inside its own transaction; migrations are
//! additive only (new tables, new nullable/defaulted columns) to preserve
//! forward compatibility.

use rusqlite::Connection;

use crate::Result;

/// One schema migration: a monotonically increasing version, a
/// human-readable description, and the SQL batch it applies.
pub struct Migration {
    /// Monotonically increasing migration id.
    pub version: i64,
    /// Human-readable description, recorded for diagnostics.
    pub description: &'static str,
    /// SQL statements applied inside a single transaction.
    pub sql: &'static str,
}

/// All migrations in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "documents table and FTS5 shadow index",
        sql: r"
            CREATE TABLE documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                project TEXT,
                parent_id INTEGER REFERENCES documents(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                accessed_at TEXT NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                doc_type TEXT NOT NULL DEFAULT 'user'
                    CHECK (doc_type IN ('user', 'wiki', 'synthesis'))
            );
            CREATE INDEX documents_project_idx ON documents(project);
            CREATE INDEX documents_is_deleted_idx ON documents(is_deleted);
            CREATE INDEX documents_parent_idx ON documents(parent_id);

            CREATE VIRTUAL TABLE documents_fts USING fts5(
                title, content, project,
                content='documents', content_rowid='id'
            );

            CREATE TRIGGER documents_ai AFTER INSERT ON documents
            WHEN new.is_deleted = 0
            BEGIN
                INSERT INTO documents_fts(rowid, title, content, project)
                VALUES (new.id, new.title, new.content, new.project);
            END;

            CREATE TRIGGER documents_ad AFTER DELETE ON documents
            BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, content, project)
                VALUES ('delete', old.id, old.title, old.content, old.project);
            END;

            CREATE TRIGGER documents_au AFTER UPDATE ON documents
            BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, content, project)
                VALUES ('delete', old.id, old.title, old.content, old.project);
                INSERT INTO documents_fts(rowid, title, content, project)
                SELECT new.id, new.title, new.content, new.project
                WHERE new.is_deleted = 0;
            END;
        ",
    },
    Migration {
        version: 2,
        description: "tags and document-tag join table",
        sql: r"
            CREATE TABLE tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                usage_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE document_tags (
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (document_id, tag_id)
            );
        ",
    },
    Migration {
        version: 3,
        description: "document links, undirected pair uniqueness, no self-links",
        sql: r"
            CREATE TABLE document_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                target_doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                similarity_score REAL NOT NULL DEFAULT 0.0,
                method TEXT NOT NULL DEFAULT 'auto',
                created_at TEXT NOT NULL,
                CHECK (source_doc_id <> target_doc_id)
            );
            CREATE UNIQUE INDEX document_links_pair_uq
                ON document_links(MIN(source_doc_id, target_doc_id), MAX(source_doc_id, target_doc_id));
            CREATE INDEX document_links_source_idx ON document_links(source_doc_id);
            CREATE INDEX document_links_target_idx ON document_links(target_doc_id);
        ",
    },
    Migration {
        version: 4,
        description: "document entities and LLM-path entity relationships",
        sql: r"
            CREATE TABLE document_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                entity TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                UNIQUE (document_id, entity)
            );
            CREATE INDEX document_entities_entity_idx ON document_entities(entity);

            CREATE TABLE entity_relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                source_entity TEXT NOT NULL,
                target_entity TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                confidence REAL NOT NULL
            );
        ",
    },
    Migration {
        version: 5,
        description: "wiki topics, members, articles, provenance, and runs",
        sql: r"
            CREATE TABLE wiki_topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                label TEXT NOT NULL,
                entity_fingerprint TEXT NOT NULL DEFAULT '',
                coherence_score REAL NOT NULL DEFAULT 0.0,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'skipped', 'pinned')),
                model_override TEXT,
                editorial_prompt TEXT
            );

            CREATE TABLE wiki_topic_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL REFERENCES wiki_topics(id) ON DELETE CASCADE,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                relevance_score REAL NOT NULL DEFAULT 1.0,
                is_primary INTEGER NOT NULL DEFAULT 1,
                UNIQUE (topic_id, document_id)
            );

            CREATE TABLE wiki_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL UNIQUE REFERENCES wiki_topics(id) ON DELETE CASCADE,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                source_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0.0,
                version INTEGER NOT NULL DEFAULT 1,
                is_stale INTEGER NOT NULL DEFAULT 0,
                stale_reason TEXT,
                previous_content TEXT,
                rating INTEGER CHECK (rating IS NULL OR (rating BETWEEN 1 AND 5)),
                timing_prepare_ms INTEGER NOT NULL DEFAULT 0,
                timing_route_ms INTEGER NOT NULL DEFAULT 0,
                timing_outline_ms INTEGER NOT NULL DEFAULT 0,
                timing_write_ms INTEGER NOT NULL DEFAULT 0,
                timing_validate_ms INTEGER NOT NULL DEFAULT 0,
                timing_save_ms INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE wiki_article_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES wiki_articles(id) ON DELETE CASCADE,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                content_hash TEXT NOT NULL
            );
            CREATE INDEX wiki_article_sources_article_idx ON wiki_article_sources(article_id);

            CREATE TABLE wiki_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL,
                dry_run INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                topics_attempted INTEGER NOT NULL DEFAULT 0,
                topics_generated INTEGER NOT NULL DEFAULT 0,
                topics_skipped INTEGER NOT NULL DEFAULT 0,
                total_input_tokens INTEGER NOT NULL DEFAULT 0,
                total_output_tokens INTEGER NOT NULL DEFAULT 0,
                total_cost_usd REAL NOT NULL DEFAULT 0.0
            );
        ",
    },
    Migration {
        version: 6,
        description: "external task tracker (read-only collaborator for drift/gap analytics)",
        sql: r"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                task_type TEXT NOT NULL DEFAULT 'task',
                parent_task_id INTEGER REFERENCES tasks(id),
                epic_key TEXT,
                project TEXT,
                source_doc_id INTEGER REFERENCES documents(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS tasks_parent_idx ON tasks(parent_task_id);
            CREATE INDEX IF NOT EXISTS tasks_source_doc_idx ON tasks(source_doc_id);
        ",
    },
];

/// Highest migration version defined.
#[must_use]
pub fn max_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Creates the `schema_version` ledger if absent and returns the highest
/// applied version (0 for a pristine database).
fn current_version(conn: &Connection) -> Result<i64> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Applies every migration with a version greater than the ledger's
/// current high-water mark, each inside its own transaction.
///
/// # Errors
///
/// Propagates any `SQLite` error from DDL execution or from recording the
/// applied version.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let applied = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.description,
                crate::now_rfc3339()
            ],
        )?;
        tx.commit()?;
        tracing::info!(version = migration.version, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_contiguous() {
        let mut prev = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > prev);
            prev = migration.version;
        }
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let applied = current_version(&conn).unwrap();
        assert_eq!(applied, max_version());
    }

    #[test]
    fn schema_version_records_every_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, i64::try_from(MIGRATIONS.len()).unwrap());
    }

    #[test]
    fn documents_table_and_fts_exist_after_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO documents (title, content, created_at, updated_at, accessed_at) \
             VALUES ('Hello', 'World', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH 'Hello'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_count, 1);
    }
}
