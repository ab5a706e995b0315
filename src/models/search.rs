//! Full-text search result and query option types.

use serde::{Deserialize, Serialize};

use super::document::DocType;

/// One full-text search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: i64,
    /// Document title.
    pub title: String,
    /// Optional project grouping.
    pub project: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
    /// Snippet with match markup, absent for wildcard (`"*"`) queries.
    pub snippet: Option<String>,
    /// Engine-native relevance rank; lower is better. `None` for wildcard results.
    pub rank: Option<f64>,
}

/// Filter options for `search_documents`, all AND-combined with the FTS match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Restrict to an exact project match.
    pub project: Option<String>,
    /// Lower bound (inclusive) on `created_at`.
    pub created_after: Option<String>,
    /// Upper bound (inclusive) on `created_at`.
    pub created_before: Option<String>,
    /// Lower bound (inclusive) on `updated_at`.
    pub updated_after: Option<String>,
    /// Upper bound (inclusive) on `updated_at`.
    pub updated_before: Option<String>,
    /// Document-kind filter. `None` means "all kinds".
    pub doc_type: Option<DocType>,
    /// Result cap.
    pub limit: usize,
}

impl SearchOptions {
    /// Options matching only `user`-kind documents, the default for a plain search.
    #[must_use]
    pub fn default_user_scoped() -> Self {
        Self {
            doc_type: Some(DocType::User),
            limit: 50,
            ..Self::default()
        }
    }
}
