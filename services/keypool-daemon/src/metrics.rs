//! Prometheus metrics exposition
//!
//! The core pool crate records probe, rotation and transition metrics through
//! the `metrics` facade. This module installs the recorder and adds pool-level
//! gauges refreshed on every scrape:
//!
//! - `keypool_credentials` (gauge): label `status` (available/unknown/exhausted/invalid)
//! - `keypool_endpoints` (gauge): total configured endpoints
//! - `keypool_healthy` (gauge): 1 when the pool can serve a credential, 0 otherwise

use keypool::metrics::{PROBE_DURATION_BUCKETS, PROBE_DURATION_SECONDS};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const CREDENTIAL_STATUSES: [&str; 4] = ["available", "unknown", "exhausted", "invalid"];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(PROBE_DURATION_SECONDS.to_string()),
            PROBE_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `keypool_probe_duration_seconds` gets explicit buckets so it renders as a
/// histogram rather than a summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Update the pool gauges from a `PoolCoordinator::status()` summary.
pub fn record_pool_status(status: &serde_json::Value) {
    for label in CREDENTIAL_STATUSES {
        let count = status[format!("credentials_{label}")].as_u64().unwrap_or(0);
        metrics::gauge!("keypool_credentials", "status" => label).set(count as f64);
    }

    let endpoints = status["endpoints"].as_array().map_or(0, Vec::len);
    metrics::gauge!("keypool_endpoints").set(endpoints as f64);

    let healthy = matches!(status["status"].as_str(), Some("healthy" | "degraded"));
    metrics::gauge!("keypool_healthy").set(if healthy { 1.0 } else { 0.0 });
}
