//! Freshness / drift / gap analyzers (C9): pure read-only SQL reports over
//! documents, links, tags, and the external `tasks` table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::Result;

use super::Store;

/// Default staleness cutoff for [`Store::freshness_report`].
const DEFAULT_STALE_THRESHOLD: f64 = 0.3;
/// Treated age, in days, for a timestamp that fails to parse.
const MISSING_TIMESTAMP_DAYS: f64 = 365.0;

fn days_since(timestamp: &str, now: DateTime<Utc>) -> f64 {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| (now - ts.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0)
        .unwrap_or(MISSING_TIMESTAMP_DAYS)
        .max(0.0)
}

fn half_life_decay(days: f64, half_life: f64) -> f64 {
    (-std::f64::consts::LN_2 * days / half_life).exp()
}

fn tag_signal(tag_names: &[String]) -> f64 {
    let mut score = 0.5;
    for name in tag_names {
        match name.as_str() {
            "active" => score += 0.2,
            "security" | "gameplan" | "reference" => score += 0.1,
            "done" => score -= 0.3,
            "failed" => score -= 0.2,
            "archived" => score -= 0.4,
            _ => {}
        }
    }
    score.clamp(0.0, 1.0)
}

fn content_length_signal(content: &str) -> f64 {
    let trimmed_len = content.trim().chars().count();
    if trimmed_len == 0 {
        0.0
    } else if trimmed_len >= 100 {
        1.0
    } else {
        trimmed_len as f64 / 100.0
    }
}

/// The five weighted signals behind one document's freshness score.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FreshnessSignals {
    /// Exponential decay on days since creation, half-life 30.
    pub age_decay: f64,
    /// Exponential decay on days since last access, half-life 14.
    pub view_recency: f64,
    /// Fraction of linked neighbors that are not soft-deleted.
    pub link_health: f64,
    /// Content-length adequacy, saturating at 100 trimmed characters.
    pub content_length: f64,
    /// Tag-driven adjustment, clamped to `[0, 1]`.
    pub tag_signal: f64,
}

/// One document's freshness entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FreshnessEntry {
    /// Document id.
    pub document_id: i64,
    /// Document title, for display.
    pub title: String,
    /// Weighted-sum freshness score in `[0, 1]`.
    pub score: f64,
    /// The five component signals.
    pub signals: FreshnessSignals,
}

/// Result of [`Store::freshness_report`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FreshnessReport {
    /// Non-deleted documents considered.
    pub total_docs: usize,
    /// Documents actually scored (equal to `total_docs` barring errors).
    pub scored_docs: usize,
    /// Documents whose score fell below the threshold.
    pub stale_count: usize,
    /// The threshold used.
    pub threshold: f64,
    /// Entries sorted ascending by score.
    pub entries: Vec<FreshnessEntry>,
}

impl FreshnessReport {
    /// Renders a short per-bucket human summary.
    #[must_use]
    pub fn to_summary(&self) -> String {
        format!(
            "freshness: {}/{} documents scored, {} stale (< {:.2})",
            self.scored_docs, self.total_docs, self.stale_count, self.threshold
        )
    }
}

impl Store {
    /// Computes the five-signal freshness score for every non-deleted
    /// document, optionally keeping only entries below `threshold`
    /// (`stale_only`). Defaults `threshold` to 0.3.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from document, link, and tag lookups.
    pub fn freshness_report(
        &self,
        threshold: Option<f64>,
        stale_only: bool,
    ) -> Result<FreshnessReport> {
        let threshold = threshold.unwrap_or(DEFAULT_STALE_THRESHOLD);
        let now = Utc::now();
        let documents = self.list_documents(None, 1_000_000)?;

        let mut entries = Vec::with_capacity(documents.len());
        for item in &documents {
            let (created_at, accessed_at, content): (String, String, String) = self.with_conn(|conn| {
                conn.query_row(
                    "SELECT created_at, accessed_at, content FROM documents WHERE id = ?1",
                    params![item.id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(Into::into)
            })?;

            let neighbor_ids = self.get_linked_doc_ids(item.id)?;
            let link_health = if neighbor_ids.is_empty() {
                1.0
            } else {
                let alive = neighbor_ids
                    .iter()
                    .filter(|&&id| self.document_exists_and_alive(id).unwrap_or(false))
                    .count();
                alive as f64 / neighbor_ids.len() as f64
            };

            let tags = self.tags_for_document(item.id)?;
            let tag_names: Vec<String> = tags.into_iter().map(|t| t.name).collect();

            let signals = FreshnessSignals {
                age_decay: half_life_decay(days_since(&created_at, now), 30.0),
                view_recency: half_life_decay(days_since(&accessed_at, now), 14.0),
                link_health,
                content_length: content_length_signal(&content),
                tag_signal: tag_signal(&tag_names),
            };

            let score = 0.30 * signals.age_decay
                + 0.25 * signals.view_recency
                + 0.15 * signals.link_health
                + 0.10 * signals.content_length
                + 0.20 * signals.tag_signal;

            entries.push(FreshnessEntry {
                document_id: item.id,
                title: item.title.clone(),
                score,
                signals,
            });
        }

        entries.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        let stale_count = entries.iter().filter(|e| e.score < threshold).count();
        if stale_only {
            entries.retain(|e| e.score < threshold);
        }

        Ok(FreshnessReport {
            total_docs: documents.len(),
            scored_docs: documents.len(),
            stale_count,
            threshold,
            entries,
        })
    }

    fn document_exists_and_alive(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM documents WHERE id = ?1 AND is_deleted = 0",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }
}

// ---------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------

/// An epic whose children have gone silent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StaleEpic {
    /// Epic task id.
    pub epic_id: i64,
    /// Epic title.
    pub title: String,
    /// Days since the most recently updated child.
    pub idle_days: f64,
}

/// A task stuck in `active` status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrphanedActiveTask {
    /// Task id.
    pub task_id: i64,
    /// Task title.
    pub title: String,
    /// Days since last update.
    pub idle_days: f64,
}

/// A document whose originating task structure has gone stale.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StaleLinkedDoc {
    /// Document id.
    pub document_id: i64,
    /// Document title.
    pub title: String,
    /// The stale task referencing it.
    pub task_id: i64,
}

/// An epic that burst with children and then went silent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BurstEpic {
    /// Epic task id.
    pub epic_id: i64,
    /// Epic title.
    pub title: String,
    /// Number of children created within the burst window.
    pub child_count: usize,
    /// Days since the most recently updated child.
    pub idle_days: f64,
}

/// Result of [`Store::drift_report`].
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct DriftReport {
    /// Epics whose children have been silent longer than the threshold.
    pub stale_epics: Vec<StaleEpic>,
    /// Tasks stuck `active` longer than `max(n/2, 7)` days.
    pub orphaned_active_tasks: Vec<OrphanedActiveTask>,
    /// Documents sourcing a now-stale task.
    pub stale_linked_docs: Vec<StaleLinkedDoc>,
    /// Epics that burst with ≥3 children within 7 days, then went quiet.
    pub burst_epics: Vec<BurstEpic>,
}

impl DriftReport {
    /// Renders a short per-bucket human summary.
    #[must_use]
    pub fn to_summary(&self) -> String {
        format!(
            "drift: {} stale epics, {} orphaned active tasks, {} stale linked docs, {} burst epics",
            self.stale_epics.len(),
            self.orphaned_active_tasks.len(),
            self.stale_linked_docs.len(),
            self.burst_epics.len()
        )
    }
}

struct TaskRow {
    id: i64,
    title: String,
    status: String,
    task_type: String,
    parent_task_id: Option<i64>,
    source_doc_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl Store {
    fn all_tasks(&self) -> Result<Vec<TaskRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, status, task_type, parent_task_id, source_doc_id, created_at, updated_at FROM tasks",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TaskRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        status: row.get(2)?,
                        task_type: row.get(3)?,
                        parent_task_id: row.get(4)?,
                        source_doc_id: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Surfaces abandoned task structures over the external `tasks` table:
    /// stale epics, orphaned active tasks, stale linked docs, and burst
    /// epics, each judged against an `n`-day staleness window.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from task or document lookup.
    pub fn drift_report(&self, n_days: i64) -> Result<DriftReport> {
        let now = Utc::now();
        let tasks = self.all_tasks()?;

        let mut children_by_parent: HashMap<i64, Vec<&TaskRow>> = HashMap::new();
        for task in &tasks {
            if let Some(parent) = task.parent_task_id {
                children_by_parent.entry(parent).or_default().push(task);
            }
        }

        let mut report = DriftReport::default();
        let n = n_days as f64;
        let orphan_threshold = (n / 2.0).max(7.0);

        for epic in tasks.iter().filter(|t| t.task_type == "epic") {
            let children = children_by_parent.get(&epic.id).cloned().unwrap_or_default();
            if children.is_empty() {
                continue;
            }
            // "Most recent activity" is the *least* idle time among children.
            let most_recent_activity = children
                .iter()
                .map(|c| days_since(&c.updated_at, now))
                .fold(f64::MAX, f64::min);
            let gone_quiet = most_recent_activity > n;

            if gone_quiet {
                report.stale_epics.push(StaleEpic {
                    epic_id: epic.id,
                    title: epic.title.clone(),
                    idle_days: most_recent_activity,
                });
            }

            if children.len() >= 3 && gone_quiet {
                let creation_ages: Vec<f64> =
                    children.iter().map(|c| days_since(&c.created_at, now)).collect();
                let earliest = creation_ages.iter().cloned().fold(f64::MIN, f64::max);
                let latest = creation_ages.iter().cloned().fold(f64::MAX, f64::min);
                let created_within_window = (earliest - latest) <= 7.0;
                if created_within_window {
                    report.burst_epics.push(BurstEpic {
                        epic_id: epic.id,
                        title: epic.title.clone(),
                        child_count: children.len(),
                        idle_days: most_recent_activity,
                    });
                }
            }
        }

        for task in tasks.iter().filter(|t| t.status == "active") {
            let idle = days_since(&task.updated_at, now);
            if idle > orphan_threshold {
                report.orphaned_active_tasks.push(OrphanedActiveTask {
                    task_id: task.id,
                    title: task.title.clone(),
                    idle_days: idle,
                });
            }
        }

        let stale_task_ids: std::collections::HashSet<i64> = report
            .stale_epics
            .iter()
            .map(|e| e.epic_id)
            .chain(report.orphaned_active_tasks.iter().map(|t| t.task_id))
            .collect();
        for task in &tasks {
            if !stale_task_ids.contains(&task.id) {
                continue;
            }
            let Some(doc_id) = task.source_doc_id else { continue };
            if let Some(doc) = self.get_document(crate::storage::documents::DocRef::Id(doc_id))? {
                report.stale_linked_docs.push(StaleLinkedDoc {
                    document_id: doc.id,
                    title: doc.title,
                    task_id: task.id,
                });
            }
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------

/// Severity for a gap-report item.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth a closer look.
    Normal,
    /// Worth acting on soon.
    High,
}

/// A tag whose doc count is below half the corpus mean.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagGap {
    /// Tag name.
    pub tag: String,
    /// Documents carrying the tag.
    pub doc_count: i64,
    /// Severity.
    pub severity: Severity,
}

/// A document that only receives links and never originates any.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkSink {
    /// Document id.
    pub document_id: i64,
    /// Document title.
    pub title: String,
    /// Incoming link count.
    pub incoming: i64,
    /// Severity.
    pub severity: Severity,
}

/// A document with no links at all.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrphanDoc {
    /// Document id.
    pub document_id: i64,
    /// Document title.
    pub title: String,
}

/// A tag whose most recently tagged document has gone stale.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StaleTopic {
    /// Tag name.
    pub tag: String,
    /// Days since the newest tagged document.
    pub idle_days: f64,
    /// Severity.
    pub severity: Severity,
}

/// A project whose document-to-task ratio looks lopsided.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectImbalance {
    /// Project name.
    pub project: String,
    /// Document count.
    pub doc_count: i64,
    /// Task count.
    pub task_count: i64,
    /// `doc_count / task_count`.
    pub ratio: f64,
    /// Severity.
    pub severity: Severity,
}

/// Result of [`Store::gap_report`].
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct GapReport {
    /// Undercovered tags.
    pub tag_gaps: Vec<TagGap>,
    /// Documents that only absorb links.
    pub link_sinks: Vec<LinkSink>,
    /// Documents with no links at all.
    pub orphan_docs: Vec<OrphanDoc>,
    /// Tags that have gone stale.
    pub stale_topics: Vec<StaleTopic>,
    /// Projects whose doc/task ratio looks lopsided.
    pub project_imbalances: Vec<ProjectImbalance>,
}

impl GapReport {
    /// Renders a short per-bucket human summary.
    #[must_use]
    pub fn to_summary(&self) -> String {
        format!(
            "gaps: {} tag gaps, {} link sinks, {} orphan docs, {} stale topics, {} project imbalances",
            self.tag_gaps.len(),
            self.link_sinks.len(),
            self.orphan_docs.len(),
            self.stale_topics.len(),
            self.project_imbalances.len()
        )
    }
}

impl Store {
    /// Computes undercovered-area gaps: tag gaps, link sinks, orphan docs,
    /// stale topics (`stale_days` default 60), and project imbalances.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the underlying queries.
    pub fn gap_report(&self, stale_days: Option<i64>) -> Result<GapReport> {
        let stale_days = stale_days.unwrap_or(60);
        let now = Utc::now();
        let mut report = GapReport::default();

        let tag_counts: Vec<(String, i64)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name, COUNT(DISTINCT dt.document_id) FROM tags t \
                 JOIN document_tags dt ON dt.tag_id = t.id \
                 JOIN documents d ON d.id = dt.document_id AND d.is_deleted = 0 \
                 GROUP BY t.name",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        if !tag_counts.is_empty() {
            let mean = tag_counts.iter().map(|(_, c)| *c as f64).sum::<f64>() / tag_counts.len() as f64;
            if mean > 1.0 {
                for (tag, count) in &tag_counts {
                    if (*count as f64) < mean / 2.0 {
                        let severity = if *count <= 1 { Severity::High } else { Severity::Normal };
                        report.tag_gaps.push(TagGap {
                            tag: tag.clone(),
                            doc_count: *count,
                            severity,
                        });
                    }
                }
            }
        }

        let tag_newest: Vec<(String, String)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name, MAX(d.updated_at) FROM tags t \
                 JOIN document_tags dt ON dt.tag_id = t.id \
                 JOIN documents d ON d.id = dt.document_id AND d.is_deleted = 0 \
                 GROUP BY t.name",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        for (tag, newest) in tag_newest {
            let idle = days_since(&newest, now);
            if idle > stale_days as f64 {
                let severity = if idle > 120.0 { Severity::High } else { Severity::Normal };
                report.stale_topics.push(StaleTopic {
                    tag,
                    idle_days: idle,
                    severity,
                });
            }
        }

        let documents = self.list_documents(None, 1_000_000)?;
        for item in &documents {
            let incoming: i64 = self.with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM document_links WHERE target_doc_id = ?1",
                    params![item.id],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })?;
            let outgoing: i64 = self.with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM document_links WHERE source_doc_id = ?1",
                    params![item.id],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })?;

            if incoming == 0 && outgoing == 0 {
                report.orphan_docs.push(OrphanDoc {
                    document_id: item.id,
                    title: item.title.clone(),
                });
            } else if incoming >= 2 && outgoing == 0 {
                let severity = if incoming >= 5 { Severity::High } else { Severity::Normal };
                report.link_sinks.push(LinkSink {
                    document_id: item.id,
                    title: item.title.clone(),
                    incoming,
                    severity,
                });
            }
        }

        let project_docs: Vec<(Option<String>, i64)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT project, COUNT(*) FROM documents WHERE is_deleted = 0 GROUP BY project",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        let project_tasks: HashMap<String, i64> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT project, COUNT(*) FROM tasks WHERE project IS NOT NULL GROUP BY project")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;
            Ok(rows.into_iter().collect())
        })?;
        for (project, doc_count) in project_docs {
            let Some(project) = project else { continue };
            let task_count = *project_tasks.get(&project).unwrap_or(&0);
            if task_count == 0 {
                continue;
            }
            let ratio = doc_count as f64 / task_count as f64;
            if ratio < 0.5 {
                let severity = if ratio < 0.2 { Severity::High } else { Severity::Normal };
                report.project_imbalances.push(ProjectImbalance {
                    project,
                    doc_count,
                    task_count,
                    ratio,
                    severity,
                });
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    #[test]
    fn empty_corpus_has_no_stale_documents() {
        let store = Store::open_in_memory().unwrap();
        let report = store.freshness_report(None, false).unwrap();
        assert_eq!(report.total_docs, 0);
        assert_eq!(report.stale_count, 0);
    }

    #[test]
    fn fresh_document_scores_above_default_threshold() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_document(
                "Doc",
                &"x".repeat(200),
                None,
                &["active".to_string()],
                None,
                DocType::User,
            )
            .unwrap();
        let report = store.freshness_report(None, false).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert!(report.entries[0].score > DEFAULT_STALE_THRESHOLD);
    }

    #[test]
    fn stale_only_filters_entries() {
        let store = Store::open_in_memory().unwrap();
        store.save_document("Doc", "short", None, &[], None, DocType::User).unwrap();
        let all = store.freshness_report(Some(2.0), false).unwrap();
        let stale_only = store.freshness_report(Some(2.0), true).unwrap();
        assert_eq!(all.entries.len(), 1);
        assert_eq!(stale_only.entries.len(), 1);
    }

    #[test]
    fn orphan_doc_has_no_links_in_either_direction() {
        let store = Store::open_in_memory().unwrap();
        store.save_document("Solo", "content", None, &[], None, DocType::User).unwrap();
        let report = store.gap_report(None).unwrap();
        assert_eq!(report.orphan_docs.len(), 1);
    }

    #[test]
    fn link_sink_requires_incoming_only() {
        let store = Store::open_in_memory().unwrap();
        let hub = store.save_document("Hub", "content", None, &[], None, DocType::User).unwrap();
        let a = store.save_document("A", "content", None, &[], None, DocType::User).unwrap();
        let b = store.save_document("B", "content", None, &[], None, DocType::User).unwrap();
        store.create_link(a, hub, 1.0, crate::models::LinkMethod::Manual).unwrap();
        store.create_link(b, hub, 1.0, crate::models::LinkMethod::Manual).unwrap();

        let report = store.gap_report(None).unwrap();
        assert!(report.link_sinks.iter().any(|s| s.document_id == hub));
    }

    #[test]
    fn drift_report_on_empty_tasks_table_is_empty() {
        let store = Store::open_in_memory().unwrap();
        let report = store.drift_report(30).unwrap();
        assert_eq!(report, DriftReport::default());
    }
}
