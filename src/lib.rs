//! # wikigraph
//!
//! Local knowledge-graph core for a personal/team document management
//! system: markdown documents land in a searchable store, get auto-linked
//! by title mention / shared entity / semantic similarity, clustered into
//! topics, and synthesized into LLM-authored wiki articles.
//!
//! This crate is the engine only — the interactive terminal UI, the
//! argument-parsing shell, and output coloring are presentation concerns
//! that consume the typed operations exposed here.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod embedding;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::AppConfig;
pub use embedding::Embedder;
pub use llm::LlmClient;
pub use storage::Store;

/// Error taxonomy for the knowledge graph core.
///
/// Mirrors the seven error kinds called out in the error-handling design:
/// not-found, conflict, bad input, external tool missing/failed, timeout,
/// and integrity violation. Storage-level duplicate-insert conditions are
/// deliberately *not* represented here — those return sentinel values
/// (`None`/`false`) rather than raising, per the propagation policy.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Unknown document/topic/article/tag id or title.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or slug-collision conflict that the caller must resolve.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Out-of-range input, mutually exclusive flags, or a missing file.
    #[error("bad input: {0}")]
    BadInput(String),

    /// The LLM CLI is not discoverable on `PATH`.
    #[error("external tool missing: {0}")]
    ExternalToolMissing(String),

    /// The LLM subprocess exited non-zero or its output failed to parse.
    #[error("external tool failed: {0}")]
    ExternalToolFailed(String),

    /// A subprocess call exceeded its configured budget.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A foreign-key or schema invariant would be violated.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Underlying SQLite error not otherwise classified above.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Underlying I/O error (config loading, export writing, subprocess).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for knowledge-graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current UTC timestamp, formatted as RFC 3339.
///
/// All timestamps persisted by this crate use this representation so that
/// freshness analytics can parse them back unambiguously as UTC.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            Error::NotFound("document 42".into()).to_string(),
            "not found: document 42"
        );
        assert_eq!(
            Error::Conflict("slug already in use".into()).to_string(),
            "conflict: slug already in use"
        );
        assert_eq!(
            Error::Timeout(std::time::Duration::from_secs(30)).to_string(),
            "timeout after 30s"
        );
    }

    #[test]
    fn now_rfc3339_parses_back() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
