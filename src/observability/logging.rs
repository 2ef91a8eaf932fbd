//! # Logging
//!
//! Installs the global `tracing` subscriber for `secretsctl`.

use clap::ValueEnum;
use std::io::IsTerminal;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "secrets_provisioner=info,secretsctl=info";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default filter. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVES.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
            .try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };

    // Tests and embedding callers may already have installed a subscriber
    if let Err(e) = result {
        debug!("Tracing subscriber already initialized, keeping it: {e}");
    }
}
