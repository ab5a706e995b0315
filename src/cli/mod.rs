//! CLI adapter (C15): maps subcommands onto the core's typed operations.
//!
//! Every command supports `--json` for machine-readable output; absent
//! that flag, output is a short human summary. Exit codes: `0` success,
//! `1` an expected error (not-found, bad input, external-tool failure),
//! `2` reserved for argument-parsing errors (handled by `clap` itself).

mod cache;
mod document;
mod maintain;
mod wiki;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::llm::SubprocessLlmClient;
use crate::{Error, LlmClient, Store};

pub use cache::CacheCommand;
pub use maintain::MaintainCommand;
pub use wiki::WikiCommand;

/// Local knowledge-graph core: markdown ingestion, auto-wikification,
/// topic clustering, and LLM wiki synthesis.
#[derive(Debug, Parser)]
#[command(name = "wikigraph", version, about)]
pub struct Cli {
    /// Override the configured database path.
    #[arg(long, global = true, env = "WIKIGRAPH_DATABASE_PATH")]
    pub database: Option<PathBuf>,

    /// Emit a single well-formed JSON object instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommand groups.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save a new document.
    Save(document::SaveArgs),
    /// Full-text search.
    Search(document::SearchArgs),
    /// List non-deleted documents.
    List(document::ListArgs),
    /// View one document by id or title.
    View(document::ViewArgs),
    /// Replace a document's title/content.
    Edit(document::EditArgs),
    /// Soft- or hard-delete a document.
    Delete(document::DeleteArgs),
    /// Restore a soft-deleted document.
    Restore(document::RestoreArgs),
    /// List soft-deleted documents.
    ListDeleted(document::ListDeletedArgs),
    /// Permanently purge old soft-deleted documents.
    Purge(document::PurgeArgs),

    /// Link graph maintenance, entity extraction, and analytics.
    #[command(subcommand)]
    Maintain(MaintainCommand),

    /// Wiki topic clustering, synthesis, editorial controls, and export.
    #[command(subcommand)]
    Wiki(WikiCommand),

    /// Bounded-cache introspection and control.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// A JSON-or-human result produced by one command handler.
pub struct Output {
    /// Machine-readable payload, printed verbatim with `--json`.
    pub json: serde_json::Value,
    /// One or more human-readable lines, printed without `--json`.
    pub human: String,
}

impl Output {
    /// Builds an output whose JSON and human renderings are both derived
    /// from a single serializable value.
    pub fn of<T: serde::Serialize + std::fmt::Display>(value: &T) -> Self {
        Self {
            json: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            human: value.to_string(),
        }
    }

    /// Builds an output from separately-constructed JSON and human text.
    #[must_use]
    pub fn new(json: serde_json::Value, human: impl Into<String>) -> Self {
        Self {
            json,
            human: human.into(),
        }
    }
}

fn error_output(err: &Error, json: bool) -> (String, ExitCode) {
    let code = match err {
        Error::NotFound(_) | Error::BadInput(_) | Error::ExternalToolMissing(_) | Error::ExternalToolFailed(_) => {
            ExitCode::from(1)
        }
        _ => ExitCode::from(1),
    };
    let text = if json {
        serde_json::json!({ "error": err.to_string() }).to_string()
    } else {
        format!("error: {err}")
    };
    (text, code)
}

/// Resolves the effective database path: the `--database`/env override if
/// given, otherwise the layered config's default.
fn resolve_database_path(cli: &Cli, config: &AppConfig) -> PathBuf {
    cli.database.clone().unwrap_or_else(|| config.database_path.clone())
}

/// Parses argv, opens the store, dispatches the subcommand, and prints
/// its result. Returns the process exit code.
#[must_use]
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_default();
    let db_path = resolve_database_path(&cli, &config);

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }

    let store = match Store::open(&db_path) {
        Ok(store) => store,
        Err(err) => {
            let (text, code) = error_output(&err, cli.json);
            eprintln!("{text}");
            return code;
        }
    };

    let llm: Arc<dyn LlmClient> = Arc::new(SubprocessLlmClient::new(config.llm.cli_path.clone()));

    let result = dispatch(&cli, &store, &config, &llm);
    store.shutdown();

    match result {
        Ok(output) => {
            if cli.json {
                println!("{}", output.json);
            } else {
                println!("{}", output.human);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let (text, code) = error_output(&err, cli.json);
            eprintln!("{text}");
            code
        }
    }
}

fn dispatch(cli: &Cli, store: &Store, config: &AppConfig, llm: &Arc<dyn LlmClient>) -> crate::Result<Output> {
    match &cli.command {
        Command::Save(args) => document::save(store, args),
        Command::Search(args) => document::search(store, args),
        Command::List(args) => document::list(store, args),
        Command::View(args) => document::view(store, args),
        Command::Edit(args) => document::edit(store, args),
        Command::Delete(args) => document::delete(store, args),
        Command::Restore(args) => document::restore(store, args),
        Command::ListDeleted(args) => document::list_deleted(store, args),
        Command::Purge(args) => document::purge(store, args),
        Command::Maintain(cmd) => maintain::dispatch(cmd, store, config, llm),
        Command::Wiki(cmd) => wiki::dispatch(cmd, store, config, llm),
        Command::Cache(cmd) => cache::dispatch(cmd, store),
    }
}
