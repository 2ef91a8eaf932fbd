//! # Observability
//!
//! - `logging`: `tracing-subscriber` setup (text or JSON)
//! - `metrics`: Prometheus counters for backend and bootstrap operations

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
