//! Document and tag types.

use serde::{Deserialize, Serialize};

/// Discriminates the three kinds of document the store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Authored by a human (or an external capture tool).
    User,
    /// Generated by the synthesis pipeline.
    Wiki,
    /// An intermediate chunk summary produced during hierarchical synthesis.
    Synthesis,
}

impl DocType {
    /// The SQLite `TEXT` representation used in the `documents.doc_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Wiki => "wiki",
            Self::Synthesis => "synthesis",
        }
    }

    /// Parses the column value back into a `DocType`, falling back to `User`
    /// for any unrecognized value rather than failing the row mapping.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "wiki" => Self::Wiki,
            "synthesis" => Self::Synthesis,
            _ => Self::User,
        }
    }
}

/// The primary unit of content: a markdown document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Row id.
    pub id: i64,
    /// Document title.
    pub title: String,
    /// Markdown content.
    pub content: String,
    /// Optional project grouping.
    pub project: Option<String>,
    /// Optional parent document, used to associate hierarchical-synthesis
    /// chunk-summary documents with the document they were derived from.
    pub parent_id: Option<i64>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
    /// RFC 3339 last-access timestamp.
    pub accessed_at: String,
    /// Number of times the document has been retrieved via `get_document`.
    pub access_count: i64,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// RFC 3339 soft-delete timestamp, set only when `is_deleted`.
    pub deleted_at: Option<String>,
    /// User / wiki / synthesis discriminator.
    pub doc_type: DocType,
}

/// Lightweight row shape for `list_documents` / `list_deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentListItem {
    /// Row id.
    pub id: i64,
    /// Document title.
    pub title: String,
    /// Optional project grouping.
    pub project: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// An interned tag with a usage counter, many-to-many with documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Row id.
    pub id: i64,
    /// Tag text.
    pub name: String,
    /// Number of documents currently carrying this tag.
    pub usage_count: i64,
}
