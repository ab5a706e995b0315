//! The storage layer (C1): connection lifecycle, schema migrations, and
//! CRUD over documents, tags, links, entities, and wiki tables.
//!
//! A process-wide [`Store`] is lazily constructed behind a
//! [`std::sync::OnceLock`] for production use; tests construct their own
//! [`Store::open`] / [`Store::open_in_memory`] instances pointed at a
//! throwaway path so they never touch the default.

#![allow(clippy::cast_precision_loss)]

pub mod cache;
pub mod documents;
pub mod entities;
pub mod links;
pub mod migrations;
pub mod search;
pub mod sqlite;
pub mod wiki;

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use rusqlite::Connection;

use crate::{Error, Result};
use cache::CacheManager;

/// Classifies a raw `SQLite` error: constraint violations become
/// [`Error::Conflict`] (the "structured duplicate error" the storage
/// contract calls for), everything else passes through as [`Error::Storage`].
pub(crate) fn classify_sqlite_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ref sqlite_err, _) = err
        && sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation
    {
        return Error::Conflict(err.to_string());
    }
    Error::Storage(err)
}

/// The embedded relational store: a single mutex-guarded connection plus
/// the in-process cache manager that sits in front of read paths.
pub struct Store {
    conn: Mutex<Connection>,
    pub(crate) cache: CacheManager,
}

static DEFAULT_STORE: OnceLock<Store> = OnceLock::new();

impl Store {
    /// Opens (creating if absent) the database file at `path`, configures
    /// it for WAL concurrency, and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        sqlite::configure_connection(&conn)?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: CacheManager::new(),
        })
    }

    /// Opens an ephemeral in-memory database, for tests and scratch use.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        sqlite::configure_connection(&conn)?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: CacheManager::new(),
        })
    }

    /// Returns the process-wide default store, opening it at `path` on
    /// first call. Subsequent calls ignore `path` and return the instance
    /// already initialized — this mirrors the original system's
    /// global-singleton-plus-explicit-instance split: production code
    /// always goes through this path, tests never do.
    ///
    /// # Errors
    ///
    /// Returns the underlying open/migration error on first initialization;
    /// the caller decides whether a failed singleton open is startup-fatal.
    /// A second, concurrent caller that loses the race to initialize simply
    /// gets back the winner's instance.
    pub fn default_at(path: impl AsRef<Path>) -> Result<&'static Self> {
        if let Some(store) = DEFAULT_STORE.get() {
            return Ok(store);
        }
        let store = Self::open(path)?;
        // Ignore a lost initialization race: some other thread's instance
        // is already in place, and that's the one every caller must share.
        drop(DEFAULT_STORE.set(store));
        DEFAULT_STORE
            .get()
            .ok_or_else(|| Error::Integrity("default store failed to initialize".to_string()))
    }

    /// Runs `f` with exclusive access to the underlying connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = sqlite::acquire_lock(&self.conn);
        f(&guard)
    }

    /// Runs `f` with exclusive, mutable access to the underlying
    /// connection — used for transaction-scoped multi-statement writes.
    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut guard = sqlite::acquire_lock(&self.conn);
        f(&mut guard)
    }

    /// The cache manager fronting this store's read paths.
    #[must_use]
    pub const fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Flushes the access-count write-coalescing buffer and clears all
    /// caches. Intended to be called from a process-exit hook.
    pub fn shutdown(&self) {
        if let Err(err) = self.flush_access_buffer() {
            tracing::warn!(%err, "failed to flush access buffer on shutdown");
        }
        self.cache.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations() {
        let store = Store::open_in_memory().unwrap();
        let version: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(version, migrations::max_version());
    }
}
