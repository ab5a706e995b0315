//! The FTS query layer (C2): escaping raw query strings for the `FTS5`
//! index and executing filtered, cached full-text search.

use rusqlite::{Row, params_from_iter};

use crate::models::{DocType, SearchHit, SearchOptions};
use crate::Result;

use super::Store;

/// Escapes a raw, user-typed query string for safe use against `FTS5`.
///
/// - An input that is already a single quoted literal (`"like this"`) is
///   passed through unchanged.
/// - Otherwise the input is split on whitespace, each token has internal
///   double quotes doubled, and the token is wrapped in double quotes. This
///   produces an implicit AND across tokens and neutralizes hyphen/operator
///   syntax, so `event-driven` becomes the literal phrase `"event-driven"`
///   rather than tripping `FTS5`'s column-filter syntax on the hyphen.
#[must_use]
pub fn escape_fts_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed.to_string();
    }

    trimmed
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_to_hit(row: &Row<'_>, rank: Option<f64>, snippet: Option<String>) -> rusqlite::Result<SearchHit> {
    Ok(SearchHit {
        id: row.get("id")?,
        title: row.get("title")?,
        project: row.get("project")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        snippet,
        rank,
    })
}

/// Builds a deterministic cache key from the raw query and every filter
/// field, so distinct filter combinations never collide.
fn cache_key(raw_query: &str, options: &SearchOptions) -> String {
    format!(
        "q={raw_query}|project={:?}|ca={:?}|cb={:?}|ua={:?}|ub={:?}|dt={:?}|limit={}",
        options.project,
        options.created_after,
        options.created_before,
        options.updated_after,
        options.updated_before,
        options.doc_type.map(DocType::as_str),
        options.limit,
    )
}

impl Store {
    /// Searches non-deleted documents matching `raw_query`, honoring every
    /// AND-combined filter in `options`. The sentinel `"*"` bypasses the
    /// `FTS5` match entirely (matches every non-deleted document, no
    /// snippet, ordered by id descending) while still applying the other
    /// filters.
    ///
    /// Consults the search cache first; callers that mutate documents must
    /// invalidate it themselves (every storage write already does this).
    ///
    /// # Errors
    ///
    /// Propagates `SQLite` errors from the underlying query.
    pub fn search_documents(
        &self,
        raw_query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let key = cache_key(raw_query, &options);
        if let Some(hit) = self.cache.search.get(&key) {
            return Ok(hit);
        }

        let results = if raw_query.trim() == "*" {
            self.search_wildcard(options)?
        } else {
            self.search_fts(raw_query, options)?
        };

        self.cache.search.put(key, results.clone());
        Ok(results)
    }

    fn search_wildcard(&self, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, title, project, created_at, updated_at FROM documents d \
                 WHERE is_deleted = 0",
            );
            // No MATCH placeholder on this path, so the filter clauses start at ?1.
            let limit_placeholder = push_filters(&mut sql, 1);
            sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{limit_placeholder}"));

            let mut stmt = conn.prepare(&sql)?;
            let params = filter_params(options);
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| row_to_hit(row, None, None))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn search_fts(&self, raw_query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let escaped = escape_fts_query(raw_query);
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT d.id, d.title, d.project, d.created_at, d.updated_at, \
                 snippet(documents_fts, 1, '<b>', '</b>', '...', 16) AS snip, \
                 bm25(documents_fts) AS rank \
                 FROM documents_fts \
                 JOIN documents d ON d.id = documents_fts.rowid \
                 WHERE documents_fts MATCH ?1 AND d.is_deleted = 0",
            );
            // ?1 is the MATCH term, so the filter clauses start at ?2.
            let limit_placeholder = push_filters(&mut sql, 2);
            sql.push_str(&format!(" ORDER BY rank LIMIT ?{limit_placeholder}"));

            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(escaped)];
            params.extend(filter_params(options));

            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    let snippet: String = row.get("snip")?;
                    let rank: f64 = row.get("rank")?;
                    row_to_hit(row, Some(rank), Some(snippet))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

/// Appends the AND-combined `project`/date/`doc_type` filter clauses,
/// numbered from `base` so the caller's own leading placeholders (the FTS
/// `MATCH` term, if any) are never shadowed. Returns the next free
/// placeholder number, for the caller's trailing `LIMIT ?N`.
///
/// `filter_params` must produce exactly the six values these clauses bind,
/// in this same order, immediately followed by the limit value.
fn push_filters(sql: &mut String, base: usize) -> usize {
    sql.push_str(&format!(" AND (?{base} IS NULL OR d.project = ?{base})"));
    sql.push_str(&format!(" AND (?{} IS NULL OR d.created_at >= ?{})", base + 1, base + 1));
    sql.push_str(&format!(" AND (?{} IS NULL OR d.created_at <= ?{})", base + 2, base + 2));
    sql.push_str(&format!(" AND (?{} IS NULL OR d.updated_at >= ?{})", base + 3, base + 3));
    sql.push_str(&format!(" AND (?{} IS NULL OR d.updated_at <= ?{})", base + 4, base + 4));
    sql.push_str(&format!(" AND (?{} IS NULL OR d.doc_type = ?{})", base + 5, base + 5));
    base + 6
}

fn filter_params(options: &SearchOptions) -> Vec<Box<dyn rusqlite::ToSql>> {
    let doc_type = options
        .doc_type
        .map(DocType::as_str)
        .unwrap_or_default();
    let doc_type: Option<String> = if doc_type.is_empty() {
        None
    } else {
        Some(doc_type.to_string())
    };
    vec![
        Box::new(options.project.clone()),
        Box::new(options.created_after.clone()),
        Box::new(options.created_before.clone()),
        Box::new(options.updated_after.clone()),
        Box::new(options.updated_before.clone()),
        Box::new(doc_type),
        Box::new(i64::try_from(options.limit).unwrap_or(i64::MAX)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    #[test]
    fn escapes_hyphenated_tokens_as_quoted_phrase() {
        assert_eq!(escape_fts_query("event-driven"), "\"event-driven\"");
    }

    #[test]
    fn passes_through_already_quoted_literal() {
        assert_eq!(escape_fts_query("\"exact phrase\""), "\"exact phrase\"");
    }

    #[test]
    fn doubles_internal_quotes() {
        assert_eq!(escape_fts_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
    }

    #[test]
    fn multi_token_query_ands_each_token() {
        assert_eq!(escape_fts_query("rust wiki"), "\"rust\" \"wiki\"");
    }

    #[test]
    fn escaping_is_idempotent_on_quoted_input() {
        let once = escape_fts_query("literal");
        let twice = escape_fts_query(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn hyphenated_search_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_document(
                "Event-Driven Architecture",
                "Learn about event-driven programming patterns",
                None,
                &[],
                None,
                DocType::User,
            )
            .unwrap();

        let hits = store
            .search_documents("event-driven", &SearchOptions::default_user_scoped())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Event-Driven Architecture");
    }

    #[test]
    fn wildcard_matches_all_non_deleted() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .save_document("A", "python here", None, &[], None, DocType::User)
            .unwrap();
        store
            .save_document("B", "python there", None, &[], None, DocType::User)
            .unwrap();
        store.delete_document(a, false).unwrap();

        let hits = store
            .search_documents("*", &SearchOptions::default_user_scoped())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].rank.is_none());
        assert!(hits[0].snippet.is_none());
    }

    #[test]
    fn soft_deleted_documents_are_excluded_from_search() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .save_document("Python Guide", "Python is great", None, &[], None, DocType::User)
            .unwrap();
        store
            .save_document("Python Notes", "more Python", None, &[], None, DocType::User)
            .unwrap();
        store.delete_document(a, false).unwrap();

        let hits = store
            .search_documents("Python", &SearchOptions::default_user_scoped())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_database_search_returns_empty() {
        let store = Store::open_in_memory().unwrap();
        let hits = store
            .search_documents("*", &SearchOptions::default_user_scoped())
            .unwrap();
        assert!(hits.is_empty());
    }
}
