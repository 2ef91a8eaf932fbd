//! # Secret Declarations
//!
//! Typed shape of a `secrets.yaml` declaration file.
//!
//! ```yaml
//! secrets:
//!   - name: api-credentials
//!     targetNamespace: payments   # optional
//!     keys:
//!       - key: DATABASE_PASSWORD
//!         remoteKey: payments-database-password
//!         generate: true
//!       - key: STRIPE_API_KEY
//!         remoteKey: payments-stripe-api-key
//!         prompt: "Stripe live API key"
//! ```
//!
//! Declarations are immutable after parsing and only live for the duration of one command.

mod parser;
mod validation;

pub use parser::{
    discover, infer_deployment, parse, parse_all, parse_str, resolve_target_namespace,
};
pub use validation::{validate_file, validate_set};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One key inside a Kubernetes Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyDeclaration {
    /// Key name inside the Kubernetes Secret
    pub key: String,
    /// Secret identifier in the backend (unique per backend project/account)
    pub remote_key: String,
    /// Generate the value locally instead of asking for it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,
    /// Custom prompt text used when the value is entered manually
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// How the value for a missing key is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSourcing<'a> {
    Generate,
    Manual { prompt: Option<&'a str> },
}

impl SecretKeyDeclaration {
    #[must_use]
    pub fn sourcing(&self) -> ValueSourcing<'_> {
        if self.generate.unwrap_or(false) {
            ValueSourcing::Generate
        } else {
            ValueSourcing::Manual {
                prompt: self.prompt.as_deref(),
            }
        }
    }
}

/// One logical Kubernetes Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretDeclaration {
    /// Target Kubernetes Secret name
    pub name: String,
    /// Target namespace. Inferred from the declaring file's location when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    /// Keys to provision, in output order
    #[schemars(length(min = 1))]
    pub keys: Vec<SecretKeyDeclaration>,
}

/// Top-level content of a declaration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretsConfig {
    /// Secrets managed by this file
    pub secrets: Vec<SecretDeclaration>,
}

/// A parsed declaration file plus metadata inferred from its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationFile {
    pub path: PathBuf,
    pub deployment_name: String,
    /// `None` for cluster-wide (infrastructure) declarations
    pub default_namespace: Option<String>,
    pub config: SecretsConfig,
}

impl DeclarationFile {
    /// Namespace a secret from this file lands in
    #[must_use]
    pub fn namespace_for<'a>(&'a self, secret: &'a SecretDeclaration) -> &'a str {
        resolve_target_namespace(secret, self.default_namespace.as_deref())
    }

    /// Directory containing the declaration file
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.path
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_default()
    }
}
