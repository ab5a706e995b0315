//! Bounded-cache introspection and control.

use clap::Subcommand;

use crate::{Result, Store};

use super::Output;

/// `cache <subcommand>`.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Print per-cache hit/miss/eviction stats.
    Stats,
    /// Drop every cached entry without disabling caching.
    Clear,
    /// Disable caching and clear all caches.
    Disable,
    /// Re-enable caching.
    Enable,
    /// Flush the buffered access-count increments to storage.
    FlushAccess,
}

pub fn dispatch(cmd: &CacheCommand, store: &Store) -> Result<Output> {
    match cmd {
        CacheCommand::Stats => stats(store),
        CacheCommand::Clear => clear(store),
        CacheCommand::Disable => disable(store),
        CacheCommand::Enable => enable(store),
        CacheCommand::FlushAccess => flush_access(store),
    }
}

fn stats(store: &Store) -> Result<Output> {
    let stats = store.cache().stats();
    let human = stats
        .iter()
        .map(|(name, s)| format!("{name}: {} hits, {} misses, {:.1}% hit rate, {} entries", s.hits, s.misses, s.hit_rate() * 100.0, s.size))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Output::new(serde_json::json!({ "enabled": store.cache().is_enabled(), "caches": stats }), human))
}

fn clear(store: &Store) -> Result<Output> {
    store.cache().clear_all();
    Ok(Output::new(serde_json::json!({ "cleared": true }), "cleared all caches"))
}

fn disable(store: &Store) -> Result<Output> {
    store.cache().disable();
    Ok(Output::new(serde_json::json!({ "enabled": false }), "caching disabled"))
}

fn enable(store: &Store) -> Result<Output> {
    store.cache().enable();
    Ok(Output::new(serde_json::json!({ "enabled": true }), "caching enabled"))
}

fn flush_access(store: &Store) -> Result<Output> {
    store.flush_access_buffer()?;
    Ok(Output::new(serde_json::json!({ "flushed": true }), "flushed buffered access counts"))
}
