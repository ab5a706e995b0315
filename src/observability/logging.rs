//! Structured logging init: one `tracing-subscriber` installation shared
//! by the CLI adapter and the synthesis pipeline's per-step spans.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Output shape for the process-wide log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, colored when stderr is a terminal.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Installs the global `tracing` subscriber. Safe to call once per
/// process; a second call is a no-op (the underlying `set_global_default`
/// failure is swallowed, matching the "first caller wins" rule for CLI
/// invocations that may build more than one `Store` in the same process).
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_env("WIKIGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .try_init(),
    };

    if let Err(err) = result {
        tracing::trace!(%err, "tracing subscriber already initialized");
    }
}
