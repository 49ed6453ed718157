//! Metric names and recording helpers
//!
//! Recorded through the `metrics` facade; without an installed recorder these
//! calls are no-ops. The daemon installs a Prometheus recorder.
//!
//! - `keypool_probes_total` (counter): labels `kind` (quota/latency), `outcome`
//! - `keypool_probe_duration_seconds` (histogram): label `kind`
//! - `keypool_rotations_total` (counter): label `strategy`
//! - `keypool_state_transitions_total` (counter): label `to`

pub const PROBES_TOTAL: &str = "keypool_probes_total";
pub const PROBE_DURATION_SECONDS: &str = "keypool_probe_duration_seconds";
pub const ROTATIONS_TOTAL: &str = "keypool_rotations_total";
pub const STATE_TRANSITIONS_TOTAL: &str = "keypool_state_transitions_total";

/// Histogram buckets for probe durations, 10ms to 10s.
pub const PROBE_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Record one finished probe. `outcome` is `ok` or a probe error kind.
pub fn record_probe(kind: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!(PROBES_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
    metrics::histogram!(PROBE_DURATION_SECONDS, "kind" => kind).record(duration_secs);
}

pub fn record_rotation(strategy: &'static str) {
    metrics::counter!(ROTATIONS_TOTAL, "strategy" => strategy).increment(1);
}

pub fn record_transition(to: &'static str) {
    metrics::counter!(STATE_TRANSITIONS_TOTAL, "to" => to).increment(1);
}
