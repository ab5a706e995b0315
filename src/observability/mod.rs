//! Observability: structured logging and Prometheus metrics.

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{install_recorder, record_cache_lookup, record_synthesis_run};
