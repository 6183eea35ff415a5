// Prometheus metrics definitions for the ranked backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Ranked and challenge matches currently being played.
    pub static ref ACTIVE_MATCHES: IntGauge =
        IntGauge::new("ranked_active_matches", "Matches currently being played").unwrap();

    /// Players waiting in the ranked queue.
    pub static ref RANKED_QUEUE_DEPTH: IntGauge =
        IntGauge::new("ranked_queue_depth", "Players waiting in the ranked queue").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Queue exits, by reason (matched, canceled, timed_out, stale).
    pub static ref QUEUE_EXITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ranked_queue_exits_total", "Players leaving the ranked queue"),
        &["reason"],
    )
    .unwrap();

    /// Matches created, by source (queue, challenge).
    pub static ref MATCHES_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ranked_matches_created_total", "Matches created"),
        &["source"],
    )
    .unwrap();

    /// Settlement attempts, by result (settled, abandoned, failed).
    pub static ref SETTLEMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ranked_settlements_total", "Match settlements"),
        &["result"],
    )
    .unwrap();

    /// Anti-cheat flags raised, by activity type.
    pub static ref ANTICHEAT_FLAGS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ranked_anticheat_flags_total", "Suspicious activity flags raised"),
        &["kind"],
    )
    .unwrap();

    /// Challenges reaching a terminal status, plus issued ones.
    pub static ref CHALLENGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ranked_challenges_total", "Challenges by status"),
        &["status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Applied per-player rating change.
    pub static ref RATING_DELTA: Histogram = Histogram::with_opts(
        HistogramOpts::new("ranked_rating_delta", "Applied rating change per player")
            .buckets(vec![-40.0, -24.0, -16.0, -8.0, 0.0, 8.0, 16.0, 24.0, 40.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_MATCHES.clone()),
        Box::new(RANKED_QUEUE_DEPTH.clone()),
        Box::new(QUEUE_EXITS_TOTAL.clone()),
        Box::new(MATCHES_CREATED_TOTAL.clone()),
        Box::new(SETTLEMENTS_TOTAL.clone()),
        Box::new(ANTICHEAT_FLAGS_TOTAL.clone()),
        Box::new(CHALLENGES_TOTAL.clone()),
        Box::new(RATING_DELTA.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_after_register() {
        // Registering twice must not panic
        register_metrics();
        register_metrics();
        SETTLEMENTS_TOTAL.with_label_values(&["settled"]).inc();
        let output = gather_metrics();
        assert!(output.contains("ranked_settlements_total"));
    }

    #[test]
    fn test_metric_increments() {
        RANKED_QUEUE_DEPTH.set(3);
        assert_eq!(RANKED_QUEUE_DEPTH.get(), 3);

        QUEUE_EXITS_TOTAL.with_label_values(&["timed_out"]).inc();
        MATCHES_CREATED_TOTAL.with_label_values(&["challenge"]).inc();
        ANTICHEAT_FLAGS_TOTAL
            .with_label_values(&["win_trading"])
            .inc();
        CHALLENGES_TOTAL.with_label_values(&["declined"]).inc();
        RATING_DELTA.observe(-15.0);
    }
}
