//! Plain document CRUD and full-text search subcommands.

use clap::Args;

use crate::models::{DocType, SearchOptions};
use crate::storage::documents::DocRef;
use crate::{Error, Result, Store};

use super::Output;

/// `save`: create a new document.
#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Document title.
    pub title: String,
    /// Markdown content.
    pub content: String,
    /// Optional project grouping.
    #[arg(long)]
    pub project: Option<String>,
    /// Tags to attach, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Parent document id, for hierarchical-synthesis chunk documents.
    #[arg(long)]
    pub parent_id: Option<i64>,
}

pub fn save(store: &Store, args: &SaveArgs) -> Result<Output> {
    let id = store.save_document(
        &args.title,
        &args.content,
        args.project.as_deref(),
        &args.tags,
        args.parent_id,
        DocType::User,
    )?;
    Ok(Output::new(
        serde_json::json!({ "id": id, "title": args.title }),
        format!("saved document {id}: {}", args.title),
    ))
}

/// `search`: full-text search with project/date/type filters.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Raw query string (`"*"` matches every non-deleted document).
    pub query: String,
    /// Restrict to an exact project match.
    #[arg(long)]
    pub project: Option<String>,
    /// Lower bound (inclusive, RFC 3339) on `created_at`.
    #[arg(long)]
    pub created_after: Option<String>,
    /// Upper bound (inclusive, RFC 3339) on `created_at`.
    #[arg(long)]
    pub created_before: Option<String>,
    /// Include every document kind, not just `user`.
    #[arg(long)]
    pub all: bool,
    /// Result cap.
    #[arg(long, short = 'l', default_value_t = 50)]
    pub limit: usize,
}

pub fn search(store: &Store, args: &SearchArgs) -> Result<Output> {
    let options = SearchOptions {
        project: args.project.clone(),
        created_after: args.created_after.clone(),
        created_before: args.created_before.clone(),
        doc_type: if args.all { None } else { Some(DocType::User) },
        limit: args.limit,
        ..SearchOptions::default()
    };
    let hits = store.search_documents(&args.query, &options)?;
    let human = if hits.is_empty() {
        "no matches".to_string()
    } else {
        hits.iter()
            .map(|h| format!("[{}] {}{}", h.id, h.title, h.project.as_deref().map(|p| format!(" ({p})")).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(Output::new(serde_json::json!({ "hits": hits }), human))
}

/// `list`: non-deleted documents, newest-updated first.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict to one project.
    #[arg(long)]
    pub project: Option<String>,
    /// Result cap.
    #[arg(long, short = 'l', default_value_t = 50)]
    pub limit: usize,
}

pub fn list(store: &Store, args: &ListArgs) -> Result<Output> {
    let items = store.list_documents(args.project.as_deref(), args.limit)?;
    let human = if items.is_empty() {
        "no documents".to_string()
    } else {
        items
            .iter()
            .map(|d| format!("[{}] {}", d.id, d.title))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(Output::new(serde_json::json!({ "documents": items }), human))
}

/// `view`: fetch one document by id or title.
#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Document id or exact title.
    pub reference: String,
}

fn resolve_reference(reference: &str) -> DocRef<'_> {
    reference.parse::<i64>().map_or(DocRef::Title(reference), DocRef::Id)
}

pub fn view(store: &Store, args: &ViewArgs) -> Result<Output> {
    let document = store
        .get_document(resolve_reference(&args.reference))?
        .ok_or_else(|| Error::NotFound(format!("document {}", args.reference)))?;
    let human = format!(
        "[{}] {}\nproject: {}\nupdated: {}\n\n{}",
        document.id,
        document.title,
        document.project.as_deref().unwrap_or("-"),
        document.updated_at,
        document.content
    );
    Ok(Output::new(serde_json::to_value(&document).unwrap_or_default(), human))
}

/// `edit`: replace a document's title and content.
#[derive(Debug, Args)]
pub struct EditArgs {
    /// Document id.
    pub id: i64,
    /// New title.
    pub title: String,
    /// New markdown content.
    pub content: String,
}

pub fn edit(store: &Store, args: &EditArgs) -> Result<Output> {
    let updated = store.update_document(args.id, &args.title, &args.content)?;
    if !updated {
        return Err(Error::NotFound(format!("document {}", args.id)));
    }
    Ok(Output::new(serde_json::json!({ "id": args.id, "updated": true }), format!("updated document {}", args.id)))
}

/// `delete`: soft- (default) or hard-delete a document.
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Document id.
    pub id: i64,
    /// Permanently remove the row and cascade through its links/entities/tags.
    #[arg(long)]
    pub hard: bool,
}

pub fn delete(store: &Store, args: &DeleteArgs) -> Result<Output> {
    let deleted = store.delete_document(args.id, args.hard)?;
    let kind = if args.hard { "hard" } else { "soft" };
    Ok(Output::new(
        serde_json::json!({ "id": args.id, "deleted": deleted, "hard": args.hard }),
        if deleted {
            format!("{kind}-deleted document {}", args.id)
        } else {
            format!("document {} was already deleted", args.id)
        },
    ))
}

/// `restore`: undo a soft delete.
#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Document id.
    pub id: i64,
}

pub fn restore(store: &Store, args: &RestoreArgs) -> Result<Output> {
    let restored = store.restore(args.id)?;
    Ok(Output::new(
        serde_json::json!({ "id": args.id, "restored": restored }),
        if restored {
            format!("restored document {}", args.id)
        } else {
            format!("document {} was not deleted", args.id)
        },
    ))
}

/// `list-deleted`: soft-deleted documents, optionally within the last N days.
#[derive(Debug, Args)]
pub struct ListDeletedArgs {
    /// Only documents deleted within the last N days.
    #[arg(long)]
    pub days: Option<i64>,
    /// Result cap.
    #[arg(long, short = 'l', default_value_t = 50)]
    pub limit: usize,
}

pub fn list_deleted(store: &Store, args: &ListDeletedArgs) -> Result<Output> {
    let items = store.list_deleted(args.days, args.limit)?;
    let human = if items.is_empty() {
        "no deleted documents".to_string()
    } else {
        items
            .iter()
            .map(|d| format!("[{}] {}", d.id, d.title))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(Output::new(serde_json::json!({ "documents": items }), human))
}

/// `purge`: permanently remove soft-deleted documents.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Only purge documents soft-deleted more than N days ago; omit to purge all.
    #[arg(long)]
    pub older_than_days: Option<i64>,
    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,
}

pub fn purge(store: &Store, args: &PurgeArgs) -> Result<Output> {
    if !args.force {
        return Err(Error::BadInput("purge is irreversible; re-run with --force".to_string()));
    }
    let purged = store.purge_deleted(args.older_than_days)?;
    Ok(Output::new(serde_json::json!({ "purged": purged }), format!("purged {purged} documents")))
}
