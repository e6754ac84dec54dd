//! Prometheus Metrics Module
//!
//! # Metrics
//!
//! - `history_requests_total{route, status}`: HTTP requests served
//! - `history_records_returned_total{source}`: candle records written to responses
//! - `history_extraction_seconds{timeframe}`: time spent decoding one document
//! - `history_documents_scanned_total{source}`: documents probed during identifier scans
//!
//! Metrics are rendered at `/metrics` on the API port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::candle::Timeframe;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle for rendering metrics, `None` before [`init_metrics`].
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!("history_requests_total", "HTTP requests served");
    describe_counter!(
        "history_records_returned_total",
        "Candle records written to responses"
    );
    describe_histogram!(
        "history_extraction_seconds",
        "Time spent decoding one source document"
    );
    describe_counter!(
        "history_documents_scanned_total",
        "Documents probed while resolving identifier lookups"
    );
}

/// Record one served request.
pub fn record_request(route: &str, status: u16) {
    counter!(
        "history_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the time spent extracting one document.
pub fn record_extraction(timeframe: Timeframe, duration: Duration) {
    histogram!(
        "history_extraction_seconds",
        "timeframe" => timeframe.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record documents probed by an identifier scan.
pub fn record_documents_scanned(source: &'static str, count: u64) {
    counter!("history_documents_scanned_total", "source" => source).increment(count);
}
