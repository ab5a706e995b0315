//! Binary entry point for the wikigraph CLI.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::print_stderr)]

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use wikigraph::config::AppConfig;
use wikigraph::observability::{init_logging, install_recorder, LogFormat};
use wikigraph::storage::Store;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    let log_format = if std::env::var("WIKIGRAPH_LOG_FORMAT").as_deref() == Ok("json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(log_format);
    let _metrics_handle = install_recorder();

    install_shutdown_hook();

    wikigraph::cli::run()
}

/// Flushes the access-count buffer and clears caches on Ctrl-C, mirroring
/// the normal-exit path in `cli::run`. A second signal forces an immediate
/// exit rather than risking a hang on a stuck flush.
fn install_shutdown_hook() {
    let config = AppConfig::load().unwrap_or_default();
    let result = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        if let Ok(store) = Store::open(&config.database_path) {
            store.shutdown();
        }
        std::process::exit(130);
    });
    if let Err(err) = result {
        tracing::warn!(%err, "failed to install shutdown hook");
    }
}
