//! Span and metric bookkeeping shared by every backend call.

use crate::observability::metrics;
use std::time::{Duration, Instant};
use tracing::Span;

/// Records the outcome of one backend operation on its span and in metrics
///
/// The span must declare `operation.success`, `operation.duration_ms` and
/// `error.message` as empty fields.
#[derive(Debug)]
pub struct OperationTracker {
    provider: &'static str,
    operation: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTracker {
    #[must_use]
    pub fn new(provider: &'static str, operation: &'static str, span: Span) -> Self {
        Self {
            provider,
            operation,
            start: Instant::now(),
            span,
        }
    }

    pub fn record_success(&self) {
        let elapsed = self.start.elapsed();
        self.span.record("operation.success", true);
        self.span.record("operation.duration_ms", duration_ms(elapsed));
        metrics::record_backend_operation(self.provider, self.operation, elapsed.as_secs_f64());
    }

    pub fn record_error(&self, error_message: &str) {
        let elapsed = self.start.elapsed();
        self.span.record("operation.success", false);
        self.span.record("operation.duration_ms", duration_ms(elapsed));
        self.span.record("error.message", error_message);
        metrics::record_backend_operation(self.provider, self.operation, elapsed.as_secs_f64());
        metrics::increment_backend_operation_errors(self.provider);
    }

    /// Record the result and pass it through
    pub fn finish<T, E: std::fmt::Display>(&self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_error(&e.to_string()),
        }
        result
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
