//! Document link and entity types.

use serde::{Deserialize, Serialize};

/// How a link between two documents was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMethod {
    /// Literal title-mention match.
    TitleMatch,
    /// Shared-entity cross-reference.
    EntityMatch,
    /// Semantic/vector similarity.
    Auto,
    /// Created explicitly by a caller.
    Manual,
}

impl LinkMethod {
    /// SQLite `TEXT` representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TitleMatch => "title_match",
            Self::EntityMatch => "entity_match",
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    /// Parses the column value, defaulting unknown strings to `Manual`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "title_match" => Self::TitleMatch,
            "entity_match" => Self::EntityMatch,
            "auto" => Self::Auto,
            _ => Self::Manual,
        }
    }
}

/// A directed edge between two documents, queried bidirectionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLink {
    /// Row id.
    pub id: i64,
    /// Source document id.
    pub source_doc_id: i64,
    /// Target document id.
    pub target_doc_id: i64,
    /// Similarity score in `[0, 1]`.
    pub similarity_score: f64,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Discovery method.
    pub method: LinkMethod,
}

/// A link joined with the titles of both endpoints, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLinkDetail {
    /// Underlying link row.
    #[serde(flatten)]
    pub link: DocumentLink,
    /// Source document title.
    pub source_title: String,
    /// Target document title.
    pub target_title: String,
}

/// Kind of a normalized entity extracted from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// H1-H6 heading text.
    Heading,
    /// Backtick-wrapped technical term.
    TechTerm,
    /// Bold span.
    Concept,
    /// Capitalized multi-word phrase.
    ProperNoun,
    /// LLM-only: a named person.
    Person,
    /// LLM-only: a named organization.
    Organization,
    /// LLM-only: a technology or platform.
    Technology,
    /// LLM-only: a physical or virtual location.
    Location,
    /// LLM-only: a dated event.
    Event,
    /// LLM-only: a project name.
    Project,
    /// LLM-only: a tool.
    Tool,
    /// LLM-only: an API or interface.
    Api,
    /// LLM-only: a software library.
    Library,
}

impl EntityType {
    /// SQLite `TEXT` representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::TechTerm => "tech_term",
            Self::Concept => "concept",
            Self::ProperNoun => "proper_noun",
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Technology => "technology",
            Self::Location => "location",
            Self::Event => "event",
            Self::Project => "project",
            Self::Tool => "tool",
            Self::Api => "api",
            Self::Library => "library",
        }
    }

    /// Parses the column value, remapping anything unrecognized to `Concept`
    /// per the LLM-extraction fallback rule.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "heading" => Self::Heading,
            "tech_term" => Self::TechTerm,
            "proper_noun" => Self::ProperNoun,
            "person" => Self::Person,
            "organization" => Self::Organization,
            "technology" => Self::Technology,
            "location" => Self::Location,
            "event" => Self::Event,
            "project" => Self::Project,
            "tool" => Self::Tool,
            "api" => Self::Api,
            "library" => Self::Library,
            _ => Self::Concept,
        }
    }

    /// Class-TF-IDF / page-score weight used by the clusterer and entity
    /// index (§4.10, §4.11).
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::ProperNoun => 1.0,
            Self::TechTerm => 0.9,
            Self::Concept => 0.8,
            Self::Heading => 0.7,
            _ => 0.5,
        }
    }
}

/// A normalized entity string extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntity {
    /// Row id.
    pub id: i64,
    /// Owning document id.
    pub document_id: i64,
    /// Normalized (lowercase, whitespace-collapsed) entity string.
    pub entity: String,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A typed edge between two entities in the same document (LLM path only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    /// Row id.
    pub id: i64,
    /// Owning document id.
    pub document_id: i64,
    /// Source entity string.
    pub source_entity: String,
    /// Target entity string.
    pub target_entity: String,
    /// Relationship label as reported by the LLM.
    pub relationship_type: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}
