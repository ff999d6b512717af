use std::net::SocketAddr;

use crate::engine::{EngineError, ErrorKind};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission decisions. Labels: kind, outcome.
pub const RESERVATIONS_TOTAL: &str = "venuebook_reservations_total";

/// Histogram: admission latency in seconds, lock wait included. Labels: kind.
pub const ADMISSION_DURATION_SECONDS: &str = "venuebook_admission_duration_seconds";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "venuebook_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: bookable units loaded.
pub const UNITS_ACTIVE: &str = "venuebook_units_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venuebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "venuebook_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: outcome.
pub const WAL_COMPACTIONS_TOTAL: &str = "venuebook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an operation result to a short label for metrics.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => match e.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        },
    }
}
