use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use ulid::Ulid;

use crate::engine::{EngineError, ErrorKind};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "roomlock_admissions_total";

/// Histogram: admission latency in seconds, lock wait included.
pub const ADMISSION_DURATION_SECONDS: &str = "roomlock_admission_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a room lock. Labels: mode.
pub const LOCK_WAIT_SECONDS: &str = "roomlock_lock_wait_seconds";

/// Counter: lock acquisitions abandoned after the configured timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "roomlock_lock_timeouts_total";

/// Gauge: registered rooms.
pub const ROOMS_REGISTERED: &str = "roomlock_rooms_registered";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomlock_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomlock_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an admission result to a short label for metrics.
pub fn admission_outcome(result: &Result<Ulid, EngineError>) -> &'static str {
    match result {
        Ok(_) => "admitted",
        Err(e) => match e.kind() {
            ErrorKind::Rejected => "rejected",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Infrastructure => "error",
        },
    }
}
