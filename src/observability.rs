use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;
use crate::engine::Operation;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bulk operations finished. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "stayline_operations_total";

/// Histogram: bulk operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "stayline_operation_duration_seconds";

/// Counter: ranges reconciled and committed. Labels: operation.
pub const RANGES_APPLIED_TOTAL: &str = "stayline_ranges_applied_total";

/// Counter: periods inserted by reconciliation.
pub const PERIODS_INSERTED_TOTAL: &str = "stayline_periods_inserted_total";

/// Counter: periods deleted by reconciliation.
pub const PERIODS_DELETED_TOTAL: &str = "stayline_periods_deleted_total";

/// Counter: edits rejected before touching the store. Labels: operation.
pub const VALIDATION_REJECTIONS_TOTAL: &str = "stayline_validation_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayline_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayline_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "stayline_wal_compactions_total";

/// Gauge: listings with state loaded.
pub const LISTINGS_ACTIVE: &str = "stayline_listings_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level` when
/// set. A second call is a no-op.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let installed = match format {
        LogFormat::Json => fmt().json().with_env_filter(filter).try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Map an Operation variant to a short label for metrics.
pub fn operation_label(op: &Operation) -> &'static str {
    match op {
        Operation::ApplyRate(_) => "apply_rate",
        Operation::ResetRate => "reset_rate",
        Operation::Open => "open",
        Operation::Close => "close",
    }
}
