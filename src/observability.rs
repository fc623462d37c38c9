use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "termin_operations_total";

/// Counter: booking/window requests rejected for overlap or coverage.
/// Labels: op.
pub const CONFLICTS_TOTAL: &str = "termin_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: halls currently registered.
pub const HALLS_ACTIVE: &str = "termin_halls_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "termin_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "termin_wal_flush_batch_size";

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

/// Record one successfully completed operation.
pub(crate) fn record_op(op: &'static str) {
    metrics::counter!(OPERATIONS_TOTAL, "op" => op).increment(1);
}

/// Record a conflict rejection for `op`.
pub(crate) fn record_conflict(op: &'static str) {
    metrics::counter!(CONFLICTS_TOTAL, "op" => op).increment(1);
}
