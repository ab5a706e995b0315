//! Typed record types mirroring the data model: plain structs and enums
//! rather than untyped dictionaries, serialized to JSON field-by-field.

mod document;
mod link;
mod search;
mod task;
mod wiki;

pub use document::{DocType, Document, DocumentListItem, Tag};
pub use link::{
    DocumentEntity, DocumentLink, DocumentLinkDetail, EntityRelationship, EntityType, LinkMethod,
};
pub use search::{SearchHit, SearchOptions};
pub use task::Task;
pub use wiki::{
    TopicStatus, WikiArticle, WikiArticleSource, WikiArticleTiming, WikiRun, WikiTopic,
    WikiTopicMember, WikiTopicSummary,
};
