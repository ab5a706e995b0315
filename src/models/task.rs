//! Read-only view over the external task tracker consulted by the
//! drift/gap analyzers. The core never creates, updates, or migrates this
//! table beyond ensuring it exists; analytics queries are written
//! defensively so an absent or empty table yields empty reports.

use serde::{Deserialize, Serialize};

/// One row of the externally-owned `tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Row id.
    pub id: i64,
    /// Task title.
    pub title: String,
    /// Free-form status string (`open`, `active`, `blocked`, `done`, `wontdo`, `failed`, ...).
    pub status: String,
    /// Task type, including the distinguished value `"epic"`.
    pub task_type: String,
    /// Parent task id, for subtasks of an epic.
    pub parent_task_id: Option<i64>,
    /// Epic grouping key, independent of `parent_task_id`.
    pub epic_key: Option<String>,
    /// Optional project grouping, shared with documents.
    pub project: Option<String>,
    /// Document this task was created from, if any.
    pub source_doc_id: Option<i64>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}
