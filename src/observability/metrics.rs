//! # Metrics
//!
//! Prometheus metrics for one `secretsctl` invocation.
//!
//! ## Metrics Exposed
//!
//! - `secrets_provisioner_backend_operations_total` - Backend operations by provider and operation
//! - `secrets_provisioner_backend_operation_errors_total` - Failed backend operations by provider
//! - `secrets_provisioner_backend_operation_duration_seconds` - Backend operation latency
//! - `secrets_provisioner_policy_grant_attempts_total` - IAM policy grant attempts
//!
//! The process is short-lived, so nothing is served over HTTP. `write_textfile` dumps the
//! registry in the text exposition format for the node-exporter textfile collector.

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::path::Path;
use std::sync::LazyLock;

static BACKEND_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secrets_provisioner_backend_operations_total",
            "Total number of secret backend operations",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create BACKEND_OPERATIONS_TOTAL metric - this should never happen")
});

static BACKEND_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secrets_provisioner_backend_operation_errors_total",
            "Total number of failed secret backend operations",
        ),
        &["provider"],
    )
    .expect("Failed to create BACKEND_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static BACKEND_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secrets_provisioner_backend_operation_duration_seconds",
            "Duration of secret backend operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["provider", "operation"],
    )
    .expect("Failed to create BACKEND_OPERATION_DURATION metric - this should never happen")
});

static POLICY_GRANT_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secrets_provisioner_policy_grant_attempts_total",
        "Total number of IAM policy grant attempts",
    )
    .expect("Failed to create POLICY_GRANT_ATTEMPTS_TOTAL metric - this should never happen")
});

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new();
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(BACKEND_OPERATIONS_TOTAL.clone()),
        Box::new(BACKEND_OPERATION_ERRORS_TOTAL.clone()),
        Box::new(BACKEND_OPERATION_DURATION.clone()),
        Box::new(POLICY_GRANT_ATTEMPTS_TOTAL.clone()),
    ];
    for collector in collectors {
        registry
            .register(collector)
            .expect("Failed to register metric - this should never happen");
    }
    registry
});

pub fn record_backend_operation(provider: &str, operation: &str, duration: f64) {
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
    BACKEND_OPERATION_DURATION
        .with_label_values(&[provider, operation])
        .observe(duration);
}

pub fn increment_backend_operation_errors(provider: &str) {
    BACKEND_OPERATION_ERRORS_TOTAL
        .with_label_values(&[provider])
        .inc();
}

pub fn increment_policy_grant_attempts() {
    POLICY_GRANT_ATTEMPTS_TOTAL.inc();
}

/// Render all metrics in the Prometheus text exposition format
///
/// # Errors
/// `Error::Config` if encoding fails.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::Config(format!("Failed to encode metrics: {e}")))?;
    String::from_utf8(buffer).map_err(|e| Error::Config(format!("Metrics are not UTF-8: {e}")))
}

/// Write all metrics to `path` for a textfile collector
///
/// # Errors
/// `Error::Io` if the file cannot be written.
pub fn write_textfile(path: &Path) -> Result<()> {
    let text = gather_text()?;
    std::fs::write(path, text).map_err(|e| Error::io(path, e))
}
