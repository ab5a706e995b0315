//! Process-wide metrics: a Prometheus recorder plus the counters/
//! histograms the synthesis pipeline (C13) and cache layer (C3) emit.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder and returns a handle whose
/// [`PrometheusHandle::render`] produces the scrape text. Returns `None`
/// if a recorder is already installed (e.g. a second `Store` built in the
/// same process during tests).
#[must_use]
pub fn install_recorder() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Records one `generate_article` outcome: tokens, cost, and whether it
/// was skipped.
pub fn record_synthesis_run(input_tokens: u64, output_tokens: u64, cost_usd: f64, skipped: bool) {
    metrics::counter!("wikigraph_synthesis_runs_total").increment(1);
    if skipped {
        metrics::counter!("wikigraph_synthesis_skipped_total").increment(1);
        return;
    }
    metrics::counter!("wikigraph_synthesis_input_tokens_total").increment(input_tokens);
    metrics::counter!("wikigraph_synthesis_output_tokens_total").increment(output_tokens);
    metrics::histogram!("wikigraph_synthesis_cost_usd").record(cost_usd);
}

/// Records a cache lookup outcome for the named cache.
pub fn record_cache_lookup(cache_name: &'static str, hit: bool) {
    let label = if hit { "hit" } else { "miss" };
    metrics::counter!("wikigraph_cache_lookups_total", "cache" => cache_name, "result" => label).increment(1);
}
