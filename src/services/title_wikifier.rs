//! Title-match wikifier (C5): scans a document's content for literal
//! mentions of every other document's title and links the ones it finds.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DocType, LinkMethod};
use crate::storage::documents::DocRef;
use crate::{Result, Store};

/// Generic titles too common to be worth auto-linking on.
static STOPWORD_TITLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "notes", "todo", "readme", "docs", "index", "misc", "draft", "scratch", "untitled",
        "overview", "summary",
    ]
    .into_iter()
    .collect()
});

/// Shortest normalized title worth matching on; shorter titles are too
/// likely to false-positive against ordinary prose.
const MIN_NORMALIZED_TITLE_LEN: usize = 4;

/// Result of wikifying a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleWikifyResult {
    /// New links actually created (always 0 in dry-run mode).
    pub created: usize,
    /// Ids of every candidate document whose title matched, whether or not
    /// a link was created for it (covers both the normal-run and the
    /// dry-run "match list without any writes" case).
    pub matched_ids: Vec<i64>,
    /// Candidates that matched but already had a link with this document.
    pub existing_skipped: usize,
    /// Whether this result came from a dry run (no writes performed).
    pub dry_run: bool,
}

/// Sum of [`TitleWikifyResult`] across every document in a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleWikifyBatchResult {
    /// Documents scanned.
    pub documents_processed: usize,
    /// Links created across all documents.
    pub created: usize,
    /// Already-linked candidates skipped across all documents.
    pub existing_skipped: usize,
}

/// Lowercases, strips leading/trailing punctuation (keeping internal
/// punctuation and apostrophes), and collapses surrounding whitespace.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '\'')
        .to_lowercase()
}

fn is_eligible_candidate(normalized: &str) -> bool {
    normalized.chars().count() >= MIN_NORMALIZED_TITLE_LEN && !STOPWORD_TITLES.contains(normalized)
}

/// Builds a word-boundary, case-insensitive regex matching literal
/// occurrences of `title` in prose, with regex metacharacters escaped so
/// `auth` never matches inside `authorization` but `auth module` matches
/// anywhere it appears verbatim.
fn title_regex(title: &str) -> Option<Regex> {
    let escaped = regex::escape(title.trim());
    if escaped.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
}

impl Store {
    /// Wikifies a single document by scanning its content against every
    /// other document's title. Candidates are restricted to the same
    /// project unless `cross_project` is set; a document with no project
    /// never cross-matches unless `cross_project` is set. In `dry_run`
    /// mode nothing is written.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from document listing or link insertion.
    pub fn title_match_wikify(
        &self,
        document_id: i64,
        dry_run: bool,
        cross_project: bool,
    ) -> Result<TitleWikifyResult> {
        let Some(target_doc) = self.get_document(DocRef::Id(document_id))? else {
            return Ok(TitleWikifyResult::default());
        };

        let candidates = self.list_documents(None, 1_000_000)?;
        let mut matched_ids = Vec::new();
        let mut existing_skipped = 0usize;

        for candidate in &candidates {
            if candidate.id == document_id {
                continue;
            }
            if !cross_project && candidate.project != target_doc.project {
                continue;
            }

            let normalized = normalize_title(&candidate.title);
            if !is_eligible_candidate(&normalized) {
                continue;
            }
            let Some(re) = title_regex(&candidate.title) else {
                continue;
            };
            if !re.is_match(&target_doc.content) {
                continue;
            }

            if self.link_exists(document_id, candidate.id)? {
                existing_skipped += 1;
                continue;
            }
            matched_ids.push(candidate.id);
        }

        let created = if dry_run {
            0
        } else {
            let edges: Vec<(i64, i64, f64, LinkMethod)> = matched_ids
                .iter()
                .map(|&target_id| (document_id, target_id, 1.0, LinkMethod::TitleMatch))
                .collect();
            self.create_links_batch(&edges)?
        };

        Ok(TitleWikifyResult {
            created,
            matched_ids,
            existing_skipped,
            dry_run,
        })
    }

    /// Runs [`Store::title_match_wikify`] over every non-deleted document,
    /// summing the results.
    ///
    /// # Errors
    ///
    /// Propagates storage errors encountered for any document.
    pub fn wikify_all_titles(
        &self,
        dry_run: bool,
        cross_project: bool,
    ) -> Result<TitleWikifyBatchResult> {
        let documents = self.list_documents(None, 1_000_000)?;
        let mut batch = TitleWikifyBatchResult::default();
        for doc in &documents {
            let result = self.title_match_wikify(doc.id, dry_run, cross_project)?;
            batch.documents_processed += 1;
            batch.created += result.created;
            batch.existing_skipped += result.existing_skipped;
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(store: &Store, title: &str, content: &str, project: Option<&str>) -> i64 {
        store
            .save_document(title, content, project, &[], None, DocType::User)
            .unwrap()
    }

    #[test]
    fn normalize_strips_punctuation_keeps_apostrophes() {
        assert_eq!(normalize_title("  \"Auth Module!\"  "), "auth module");
        assert_eq!(normalize_title("Bob's Notes."), "bob's notes");
    }

    #[test]
    fn word_boundary_regex_does_not_match_substring() {
        let re = title_regex("auth").unwrap();
        assert!(!re.is_match("authorization flow"));
        assert!(re.is_match("the auth module"));
    }

    #[test]
    fn creates_link_on_literal_title_mention() {
        let store = Store::open_in_memory().unwrap();
        let target = save(&store, "Quantum Flux Refactor", "details", None);
        let source = save(
            &store,
            "Incident Report",
            "Root cause traced to the Quantum Flux Refactor change.",
            None,
        );

        let result = store.title_match_wikify(source, false, false).unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(result.matched_ids, vec![target]);
        assert!(store.link_exists(source, target).unwrap());
    }

    #[test]
    fn second_run_creates_zero_new_links() {
        let store = Store::open_in_memory().unwrap();
        save(&store, "Quantum Flux Refactor", "x", None);
        let source = save(&store, "Doc", "mentions Quantum Flux Refactor here", None);

        store.title_match_wikify(source, false, false).unwrap();
        let second = store.title_match_wikify(source, false, false).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.existing_skipped, 1);
    }

    #[test]
    fn project_scoping_blocks_cross_project_by_default() {
        let store = Store::open_in_memory().unwrap();
        save(&store, "Quantum Flux Refactor", "x", Some("alpha"));
        let beta_doc = save(
            &store,
            "Session Bug Report",
            "caused by Quantum Flux Refactor",
            Some("beta"),
        );

        let scoped = store.title_match_wikify(beta_doc, false, false).unwrap();
        assert_eq!(scoped.created, 0);

        let cross = store.title_match_wikify(beta_doc, false, true).unwrap();
        assert_eq!(cross.created, 1);
    }

    #[test]
    fn dry_run_reports_matches_without_writing() {
        let store = Store::open_in_memory().unwrap();
        let target = save(&store, "Quantum Flux Refactor", "x", None);
        let source = save(&store, "Doc", "mentions Quantum Flux Refactor here", None);

        let result = store.title_match_wikify(source, true, false).unwrap();
        assert_eq!(result.created, 0);
        assert_eq!(result.matched_ids, vec![target]);
        assert!(!store.link_exists(source, target).unwrap());
    }

    #[test]
    fn short_and_stopword_titles_are_never_candidates() {
        let store = Store::open_in_memory().unwrap();
        save(&store, "abc", "x", None);
        save(&store, "TODO", "y", None);
        let source = save(&store, "Doc", "abc TODO are both mentioned here", None);

        let result = store.title_match_wikify(source, false, false).unwrap();
        assert_eq!(result.created, 0);
    }
}
