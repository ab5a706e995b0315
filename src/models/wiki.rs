//! Wiki topic, article, and run types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a discovered topic cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// Eligible for (re)generation.
    Active,
    /// Excluded from batch generation until un-skipped.
    Skipped,
    /// Protected from the up-to-date skip check; always regenerates.
    Pinned,
}

impl TopicStatus {
    /// SQLite `TEXT` representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Skipped => "skipped",
            Self::Pinned => "pinned",
        }
    }

    /// Parses the column value, defaulting to `Active`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "skipped" => Self::Skipped,
            "pinned" => Self::Pinned,
            _ => Self::Active,
        }
    }
}

/// A discovered cluster of documents sharing entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiTopic {
    /// Row id.
    pub id: i64,
    /// Globally unique URL slug.
    pub slug: String,
    /// Human-readable display label.
    pub label: String,
    /// First 16 hex chars of the MD5 of the sorted union of member entities.
    pub entity_fingerprint: String,
    /// Average pairwise intra-cluster Jaccard similarity.
    pub coherence_score: f64,
    /// Active / skipped / pinned.
    pub status: TopicStatus,
    /// Per-topic model override, takes precedence over the default model.
    pub model_override: Option<String>,
    /// Extra editorial guidance appended to the synthesis system prompt.
    pub editorial_prompt: Option<String>,
}

/// A topic row joined with its member count, for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiTopicSummary {
    /// Underlying topic.
    #[serde(flatten)]
    pub topic: WikiTopic,
    /// Number of documents associated with the topic (primary + excluded).
    pub member_count: i64,
}

/// Association of a document with a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiTopicMember {
    /// Row id.
    pub id: i64,
    /// Owning topic id.
    pub topic_id: i64,
    /// Member document id.
    pub document_id: i64,
    /// Per-membership relevance in `[0, 1]`.
    pub relevance_score: f64,
    /// Whether this member is included in synthesis (vs. recorded-but-excluded).
    pub is_primary: bool,
}

/// Per-step timing, in milliseconds, for one synthesis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WikiArticleTiming {
    /// PREPARE step duration.
    pub prepare_ms: u64,
    /// ROUTE step duration.
    pub route_ms: u64,
    /// OUTLINE step duration.
    pub outline_ms: u64,
    /// WRITE step duration.
    pub write_ms: u64,
    /// VALIDATE step duration.
    pub validate_ms: u64,
    /// SAVE step duration.
    pub save_ms: u64,
}

/// Metadata for a generated article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiArticle {
    /// Row id.
    pub id: i64,
    /// Owning topic id.
    pub topic_id: i64,
    /// The document holding the rendered markdown content.
    pub document_id: i64,
    /// SHA-256 (32 hex char) digest over the sorted `doc_id:content_hash` set.
    pub source_hash: String,
    /// Model id actually used.
    pub model: String,
    /// Total input tokens across all LLM calls for this generation.
    pub input_tokens: u64,
    /// Total output tokens across all LLM calls for this generation.
    pub output_tokens: u64,
    /// Estimated or actual USD cost.
    pub cost_usd: f64,
    /// Monotonically increasing version, bumped on every regeneration.
    pub version: i64,
    /// Whether a source document has changed since this content was generated.
    pub is_stale: bool,
    /// Human-readable reason the article was marked stale.
    pub stale_reason: Option<String>,
    /// Snapshot of the content immediately before the last regeneration.
    pub previous_content: Option<String>,
    /// Optional 1-5 star rating.
    pub rating: Option<u8>,
    /// Per-step timings.
    pub timing: WikiArticleTiming,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Provenance row: one per (article, contributing document) at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiArticleSource {
    /// Row id.
    pub id: i64,
    /// Owning article id.
    pub article_id: i64,
    /// Contributing document id.
    pub document_id: i64,
    /// Content hash of that document at generation time.
    pub content_hash: String,
}

/// Batch-generation record bracketing a `generate_wiki` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiRun {
    /// Row id.
    pub id: i64,
    /// Model id used for the batch (absent per-topic overrides).
    pub model: String,
    /// Whether this run estimated cost without writing anything.
    pub dry_run: bool,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// RFC 3339 completion timestamp, absent while the run is in flight.
    pub completed_at: Option<String>,
    /// Topics considered.
    pub topics_attempted: i64,
    /// Topics that produced a new or updated article.
    pub topics_generated: i64,
    /// Topics skipped (up to date, or excluded).
    pub topics_skipped: i64,
    /// Summed input tokens.
    pub total_input_tokens: u64,
    /// Summed output tokens.
    pub total_output_tokens: u64,
    /// Summed USD cost.
    pub total_cost_usd: f64,
}
