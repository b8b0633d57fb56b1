//! Pull observability metrics
//!
//! Counters and histograms for record pulls, retries and chunk outcomes.
//! Recording is always cheap: without an installed exporter the `metrics`
//! macros are no-ops, so the Prometheus endpoint is opt-in via
//! `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Global metrics initialization flag
static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter on {addr}: {reason}")]
pub struct MetricsError {
    addr: SocketAddr,
    reason: String,
}

/// Install the Prometheus exporter on `addr` and describe every metric.
///
/// Idempotent. Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.lock().map_err(|e| MetricsError {
        addr,
        reason: e.to_string(),
    })?;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "records_pulled_total",
        Unit::Count,
        "Student records scraped and written to the database"
    );
    describe_counter!(
        "records_failed_total",
        Unit::Count,
        "Student records given up on after retries"
    );
    describe_counter!(
        "retries_total",
        Unit::Count,
        "Retry attempts across all records"
    );
    describe_counter!(
        "chunks_finished_total",
        Unit::Count,
        "Chunks that reached a terminal status"
    );
    describe_histogram!(
        "record_pull_duration_seconds",
        Unit::Seconds,
        "Time to pull one record including retries"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one retry backoff
pub fn record_retry(backoff: Duration) {
    counter!("retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(backoff.as_secs_f64());
}

/// Record a chunk reaching a terminal status
pub fn record_chunk_finished(status: &str) {
    counter!("chunks_finished_total", "status" => status.to_string()).increment(1);
}

/// Timing of a single record pull
pub struct RecordPullMetrics {
    start_time: Instant,
}

impl RecordPullMetrics {
    /// Start timing a pull
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Record a successful pull
    pub fn record_success(self) {
        counter!("records_pulled_total").increment(1);
        histogram!("record_pull_duration_seconds", "outcome" => "success")
            .record(self.start_time.elapsed().as_secs_f64());
    }

    /// Record a pull given up on, `reason` being a short failure kind
    pub fn record_failure(self, reason: &'static str) {
        counter!("records_failed_total", "reason" => reason).increment(1);
        histogram!("record_pull_duration_seconds", "outcome" => "failure")
            .record(self.start_time.elapsed().as_secs_f64());
    }
}
