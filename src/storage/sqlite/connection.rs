//! Shared `SQLite` connection handling: mutex locking with poison recovery
//! and pragma configuration for WAL concurrency.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default timeout for [`acquire_lock_with_timeout`].
pub const MUTEX_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Acquires the connection mutex, recovering from poison rather than
/// propagating a panic from an earlier critical section.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("sqlite connection mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Acquires the connection mutex, spin-waiting up to `timeout` rather than
/// blocking indefinitely.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the lock is not acquired within `timeout`.
pub fn acquire_lock_with_timeout<T>(
    mutex: &Mutex<T>,
    timeout: Duration,
) -> Result<MutexGuard<'_, T>> {
    let start = Instant::now();
    let sleep_duration = Duration::from_millis(10);

    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("sqlite connection mutex was poisoned, recovering");
                metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
                return Ok(poisoned.into_inner());
            },
            Err(std::sync::TryLockError::WouldBlock) => {
                if start.elapsed() > timeout {
                    metrics::counter!("sqlite_mutex_timeout_total").increment(1);
                    return Err(Error::Timeout(timeout));
                }
                std::thread::sleep(sleep_duration);
            },
        }
    }
}

/// Configures a connection for WAL concurrency: `journal_mode=WAL`,
/// `synchronous=NORMAL`, `busy_timeout=5000`.
///
/// # Errors
///
/// Never fails in practice (pragma results are deliberately discarded since
/// `journal_mode` returns a row rather than an empty result); kept fallible
/// for forward compatibility.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_lock_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock(&mutex);
        assert_eq!(*guard, 42);
    }

    #[test]
    fn acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let mutex_clone = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard = acquire_lock(&mutex_clone);
                *guard += 1;
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*acquire_lock(&mutex), 10);
    }

    #[test]
    fn acquire_lock_with_timeout_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock_with_timeout(&mutex, Duration::from_secs(1)).unwrap();
        assert_eq!(*guard, 42);
    }

    #[test]
    fn acquire_lock_with_timeout_times_out() {
        let mutex = Arc::new(Mutex::new(42));
        let mutex_clone = Arc::clone(&mutex);
        let _guard = mutex.lock().unwrap();

        let result = acquire_lock_with_timeout(&mutex_clone, Duration::from_millis(50));
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn configure_connection_sets_pragmas() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert!(
            journal_mode.eq_ignore_ascii_case("wal") || journal_mode.eq_ignore_ascii_case("memory")
        );

        let synchronous: i32 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 1);

        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }
}
