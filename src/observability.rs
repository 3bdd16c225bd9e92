use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: conflict checks performed.
pub const CONFLICT_CHECKS_TOTAL: &str = "gridlock_conflict_checks_total";

/// Histogram: conflict check latency in seconds.
pub const CONFLICT_CHECK_DURATION_SECONDS: &str = "gridlock_conflict_check_duration_seconds";

/// Counter: index range queries executed.
pub const INDEX_QUERIES_TOTAL: &str = "gridlock_index_queries_total";

/// Counter: live buckets touched by range queries.
pub const INDEX_BUCKET_HITS_TOTAL: &str = "gridlock_index_bucket_hits_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: live buckets in the index.
pub const INDEX_LIVE_BUCKETS: &str = "gridlock_index_live_buckets";

/// Counter: buckets evicted by compression.
pub const INDEX_EVICTED_BUCKETS_TOTAL: &str = "gridlock_index_evicted_buckets_total";

/// Counter: full snapshot rebuilds.
pub const INDEX_REBUILDS_TOTAL: &str = "gridlock_index_rebuilds_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
