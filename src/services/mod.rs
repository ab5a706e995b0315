//! Core operations beyond plain CRUD: auto-wikification, deduplication,
//! clustering, and wiki synthesis. Each lives in its own module as an
//! `impl Store` extension, matching how [`crate::storage`] is organized —
//! there is no separate service-struct layer.

mod analyzers;
mod duplicate_detector;
mod entity_extraction;
mod entity_index;
mod entity_wikifier;
mod privacy_filter;
mod semantic_wikifier;
mod synthesis_pipeline;
mod title_wikifier;
mod topic_clusterer;
mod wiki_export;

pub use analyzers::{
    BurstEpic, DriftReport, FreshnessEntry, FreshnessReport, FreshnessSignals, GapReport, LinkSink,
    OrphanDoc, OrphanedActiveTask, ProjectImbalance, Severity, StaleEpic, StaleLinkedDoc, StaleTopic,
    TagGap,
};
pub use duplicate_detector::{ExactDuplicateGroup, NearDuplicatePair};
pub use entity_extraction::{extract_heuristic, normalize_entity, LlmExtractionResult};
pub use entity_index::{EntityIndexEntry, EntityPage, EntityTier, RelatedEntity, Snippet};
pub use entity_wikifier::EntityWikifyResult;
pub use privacy_filter::{AudienceMode, RedactionReport, ValidationReport};
pub use semantic_wikifier::{SemanticWikifyBatchResult, SemanticWikifyResult};
pub use synthesis_pipeline::{GenerateOptions, RoutingStrategy, SynthesisOutcome, WikiArticleResult};
pub use title_wikifier::{normalize_title, TitleWikifyBatchResult, TitleWikifyResult};
pub use topic_clusterer::{ClusterResult, DiscoveredTopic};
pub(crate) use topic_clusterer::derive_slug;
pub use wiki_export::ExportSummary;
