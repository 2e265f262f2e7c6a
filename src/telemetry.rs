use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const MUTATIONS_TOTAL: &str = "mindwhisper_mutations_total";
pub const PROFILE_REQUESTS_TOTAL: &str = "mindwhisper_profile_requests_total";
pub const HOME_LOADS_TOTAL: &str = "mindwhisper_home_loads_total";

/// Structured logging filtered by `RUST_LOG`; `info` when it is unset, blank or unparsable.
pub fn init_tracing() {
    let directives = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt().with_env_filter(env_filter(directives.as_deref())).init();
}

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global Prometheus recorder. Returns `None` if one is already installed.
pub fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("metrics recorder not installed: {e}");
            None
        }
    }
}

pub fn record_mutation(feature: &'static str) {
    metrics::increment_counter!(MUTATIONS_TOTAL, "feature" => feature);
}

pub fn record_profile_request(outcome: &'static str) {
    metrics::increment_counter!(PROFILE_REQUESTS_TOTAL, "outcome" => outcome);
}

pub fn record_home_load(outcome: &'static str) {
    metrics::increment_counter!(HOME_LOADS_TOTAL, "outcome" => outcome);
}
