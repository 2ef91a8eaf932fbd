//! # Errors
//!
//! Error taxonomy for the provisioning pipeline.
//!
//! Every variant carries enough context to identify the failing resource and the step
//! that failed. The `secretsctl` binary wraps these in `anyhow` at the command edge.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Declaration file does not match the schema. Fatal before any backend call.
    #[error("Invalid declaration {path}: {message}")]
    Schema { path: PathBuf, message: String },

    /// A file could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend credentials are invalid or the backend API is unreachable
    #[error("Authentication with {provider} failed: {message}")]
    Auth { provider: String, message: String },

    /// Unexpected backend response (anything other than a mapped "not found")
    #[error("{provider} backend error during {operation} of '{resource}': {message}")]
    Backend {
        provider: String,
        operation: String,
        resource: String,
        message: String,
    },

    /// Access policy grant still failing after the retry budget was spent
    #[error("Failed to grant {role} to {member} after {attempts} attempts: {message}")]
    PolicyGrant {
        role: String,
        member: String,
        attempts: u32,
        message: String,
    },

    /// Kubernetes API unreachable or returned an unexpected error
    #[error("Cluster read failed during {operation}: {message}")]
    ClusterRead { operation: String, message: String },

    /// Configuration could not be resolved from any layer
    #[error("Configuration error: {0}")]
    Config(String),

    /// A secret value could not be sourced (prompt cancelled, no terminal, ...)
    #[error("Could not obtain a value for '{remote_key}': {message}")]
    ValueSource { remote_key: String, message: String },

    /// The selected backend does not support the requested operation
    #[error("{operation} is not supported by the {provider} backend")]
    Unsupported { provider: String, operation: String },
}

impl Error {
    pub(crate) fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn backend(
        provider: &str,
        operation: &str,
        resource: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            provider: provider.to_string(),
            operation: operation.to_string(),
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn cluster_read(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::ClusterRead {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
