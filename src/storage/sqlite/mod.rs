//! Shared `SQLite` connection infrastructure.

mod connection;

pub use connection::{
    MUTEX_LOCK_TIMEOUT, acquire_lock, acquire_lock_with_timeout, configure_connection,
};
