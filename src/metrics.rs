// Prometheus metrics definitions for the match engine.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Matches currently running, live or headless.
    pub static ref ACTIVE_MATCHES: IntGauge =
        IntGauge::new("armada_active_matches", "Currently running matches").unwrap();

    /// Headless match worker threads currently active.
    pub static ref MATCH_WORKERS_ACTIVE: IntGauge =
        IntGauge::new("armada_match_workers_active", "Headless match workers currently active").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total matches started, by mode.
    pub static ref MATCHES_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_matches_started_total", "Total matches started"),
        &["mode"],
    )
    .unwrap();

    /// Total matches completed, by mode.
    pub static ref MATCHES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_matches_completed_total", "Total matches completed"),
        &["mode"],
    )
    .unwrap();

    /// Total matches that died with a core panic, by mode.
    pub static ref MATCHES_ERRORED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_matches_errored_total", "Total matches aborted by a core panic"),
        &["mode"],
    )
    .unwrap();

    pub static ref ROUNDS_COMPLETED_TOTAL: IntCounter = IntCounter::new(
        "armada_rounds_completed_total",
        "Total rounds played to a decision",
    )
    .unwrap();

    /// Controller calls that overran their budget, by lifecycle method.
    pub static ref CONTROLLER_TIMEOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_controller_timeouts_total", "Controller calls that timed out"),
        &["method"],
    )
    .unwrap();

    /// Controller calls that panicked or were refused as busy, by lifecycle method.
    pub static ref CONTROLLER_FAULTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_controller_faults_total", "Controller calls that faulted"),
        &["method"],
    )
    .unwrap();

    /// Players removed from a round for anything but losing their fleet.
    pub static ref DISQUALIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("armada_disqualifications_total", "Players disqualified"),
        &["reason"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall-clock time of a controller call in milliseconds, by method.
    pub static ref CONTROLLER_CALL_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("armada_controller_call_duration_ms", "Controller call time in ms")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]),
        &["method"],
    )
    .unwrap();

    /// Match duration in seconds, by mode.
    pub static ref MATCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("armada_match_duration_seconds", "Match duration in seconds")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["mode"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ACTIVE_MATCHES.clone()),
            Box::new(MATCH_WORKERS_ACTIVE.clone()),
            Box::new(MATCHES_STARTED_TOTAL.clone()),
            Box::new(MATCHES_COMPLETED_TOTAL.clone()),
            Box::new(MATCHES_ERRORED_TOTAL.clone()),
            Box::new(ROUNDS_COMPLETED_TOTAL.clone()),
            Box::new(CONTROLLER_TIMEOUTS_TOTAL.clone()),
            Box::new(CONTROLLER_FAULTS_TOTAL.clone()),
            Box::new(DISQUALIFICATIONS_TOTAL.clone()),
            Box::new(CONTROLLER_CALL_DURATION_MS.clone()),
            Box::new(MATCH_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("Failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        register_metrics();
        ROUNDS_COMPLETED_TOTAL.inc();
        let output = gather_metrics();
        assert!(output.contains("armada_rounds_completed_total"));
    }

    #[test]
    fn test_metric_increments() {
        MATCH_WORKERS_ACTIVE.inc();
        MATCH_WORKERS_ACTIVE.dec();

        CONTROLLER_TIMEOUTS_TOTAL
            .with_label_values(&["make_shot"])
            .inc();
        assert!(
            CONTROLLER_TIMEOUTS_TOTAL
                .with_label_values(&["make_shot"])
                .get()
                >= 1
        );
        DISQUALIFICATIONS_TOTAL
            .with_label_values(&["invalid_shot"])
            .inc();
        CONTROLLER_CALL_DURATION_MS
            .with_label_values(&["place_ships"])
            .observe(0.3);
        MATCH_DURATION_SECONDS
            .with_label_values(&["duel"])
            .observe(1.5);
    }
}
