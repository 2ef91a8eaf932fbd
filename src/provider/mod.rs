//! # Secret Backends
//!
//! Each backend implements [`SecretBackend`]: authenticate, check and create secrets,
//! and describe the ESO manifests that read them back into the cluster.
//!
//! The backend is chosen once from [`ProviderKind`] when the run starts.

use crate::config::Settings;
use crate::constants::{DEFAULT_AWS_STORE_NAME, DEFAULT_GCP_STORE_NAME};
use crate::declaration::SecretDeclaration;
use crate::error::Result;
use crate::manifest::{self, StoreBackend};
use crate::value_source::SecretValue;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub mod aws;
pub mod gcp;
pub(crate) mod tracker;

pub use aws::AwsSecretsManager;
pub use gcp::GcpSecretManager;

/// Supported secret backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    Gcp,
    Aws,
}

impl ProviderKind {
    pub const ALL: [Self; 2] = [Self::Gcp, Self::Aws];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gcp => "gcp",
            Self::Aws => "aws",
        }
    }

    #[must_use]
    pub fn default_store_name(self) -> &'static str {
        match self {
            Self::Gcp => DEFAULT_GCP_STORE_NAME,
            Self::Aws => DEFAULT_AWS_STORE_NAME,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" | "google" | "gcpsm" => Ok(Self::Gcp),
            "aws" | "awssm" => Ok(Self::Aws),
            other => Err(format!("unknown secret backend '{other}' (expected gcp or aws)")),
        }
    }
}

/// A secret backend bound to one project or account
#[async_trait]
pub trait SecretBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Name of the ClusterSecretStore that reads from this backend
    fn store_name(&self) -> &str;

    /// Project or region the store binds to
    fn store_backend(&self) -> StoreBackend;

    /// Authenticate and probe the backend without modifying it
    ///
    /// # Errors
    /// `Error::Auth` on invalid credentials or an unreachable API.
    async fn initialize(&self) -> Result<()>;

    /// Whether `remote_key` exists
    ///
    /// # Errors
    /// `Error::Backend` for anything other than "not found".
    async fn exists(&self, remote_key: &str) -> Result<bool>;

    /// Store `value` under `remote_key`, creating the secret if needed
    ///
    /// Existing secrets receive a new version; the latest value wins.
    ///
    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the backend rejects the write.
    async fn create(&self, remote_key: &str, value: &SecretValue) -> Result<()>;

    /// ClusterSecretStore manifest named `name`
    ///
    /// # Errors
    /// `Error::Config` if rendering fails.
    fn describe_store(&self, name: &str) -> Result<String> {
        manifest::render_cluster_secret_store(name, &self.store_backend())
    }

    /// ExternalSecret manifest for `declaration` in `namespace`
    ///
    /// # Errors
    /// `Error::Config` if rendering fails.
    fn describe_secret(&self, declaration: &SecretDeclaration, namespace: &str) -> Result<String> {
        manifest::render_external_secret(declaration, namespace, self.store_name())
    }
}

/// Build the backend selected in `settings`
///
/// # Errors
/// `Error::Config` if the backend's project ID or region is missing, `Error::Auth` if the
/// backend client cannot be constructed.
pub async fn build_backend(settings: &Settings) -> Result<Box<dyn SecretBackend>> {
    match settings.provider.value {
        ProviderKind::Gcp => {
            let mut builder = GcpSecretManager::builder(settings.gcp_project_id()?)
                .store_name(settings.store_name());
            if let Some(endpoint) = &settings.gcp_endpoint {
                builder = builder.endpoint(endpoint);
            }
            Ok(Box::new(builder.build()?))
        }
        ProviderKind::Aws => {
            let backend =
                AwsSecretsManager::new(settings.aws_region()?, settings.store_name()).await;
            Ok(Box::new(backend))
        }
    }
}
