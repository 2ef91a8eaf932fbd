//! # Configuration
//!
//! Run-wide settings resolved once per invocation and passed explicitly to every
//! component.
//!
//! Each field is resolved from the first layer that provides it:
//!
//! 1. explicit values (command-line flags)
//! 2. environment variables
//! 3. the previously generated `clustersecretstore.yaml` under the repository root
//! 4. an interactive prompt, only when a [`Prompter`] is supplied
//!
//! Fields that still have no value fall back to a default where one exists. The layer a
//! value came from is kept in [`ConfigSource`] so `secretsctl config` can explain it.

mod env;
mod resolver;

pub use env::Environment;
pub use resolver::{SettingsOverrides, SettingsResolver};

use crate::constants::{STORE_MANIFEST_DIR, STORE_MANIFEST_FILE};
use crate::error::{Error, Result};
use crate::manifest::StoreBackend;
use crate::provider::ProviderKind;
use crate::value_source::SecretValue;
use std::fmt;
use std::path::{Path, PathBuf};

/// Layer a setting was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit,
    Environment(&'static str),
    Inferred(PathBuf),
    Prompt,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("flag"),
            Self::Environment(var) => write!(f, "env {var}"),
            Self::Inferred(path) => write!(f, "inferred from {}", path.display()),
            Self::Prompt => f.write_str("prompt"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// A setting value together with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Interactive input, implemented by the CLI on top of a terminal
pub trait Prompter: Send + Sync {
    /// # Errors
    /// `Error::ValueSource` if input cannot be read.
    fn input(&self, prompt: &str) -> Result<String>;

    /// Read a value without echoing it
    ///
    /// # Errors
    /// `Error::ValueSource` if input cannot be read.
    fn secret(&self, prompt: &str) -> Result<SecretValue>;

    /// # Errors
    /// `Error::ValueSource` if input cannot be read.
    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize>;

    /// # Errors
    /// `Error::ValueSource` if input cannot be read.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Resolved<ProviderKind>,
    pub gcp_project_id: Option<Resolved<String>>,
    pub aws_region: Option<Resolved<String>>,
    pub store_name: Resolved<String>,
    /// Repository root containing `deployments/` and `infrastructure/`
    pub root: Resolved<PathBuf>,
    /// Directory holding service account key files
    pub key_dir: Resolved<PathBuf>,
    pub kubeconfig: Option<Resolved<PathBuf>>,
    pub kube_context: Option<String>,
    /// Secret Manager endpoint override (emulators, contract tests)
    pub gcp_endpoint: Option<String>,
}

/// One line of `secretsctl config` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingExplanation {
    pub name: &'static str,
    pub value: Option<String>,
    pub source: Option<ConfigSource>,
}

impl Settings {
    /// GCP project the backend and bootstrapper operate on
    ///
    /// # Errors
    /// `Error::Config` when no layer provided a project ID.
    pub fn gcp_project_id(&self) -> Result<&str> {
        self.gcp_project_id
            .as_ref()
            .map(|r| r.value.as_str())
            .ok_or_else(|| {
                Error::Config(
                    "GCP project ID is not set (use --project, GCP_PROJECT_ID or GOOGLE_CLOUD_PROJECT)"
                        .to_string(),
                )
            })
    }

    /// # Errors
    /// `Error::Config` when no layer provided a region.
    pub fn aws_region(&self) -> Result<&str> {
        self.aws_region
            .as_ref()
            .map(|r| r.value.as_str())
            .ok_or_else(|| {
                Error::Config("AWS region is not set (use --region or AWS_REGION)".to_string())
            })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root.value
    }

    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store_name.value
    }

    #[must_use]
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_ref().map(|r| r.value.as_path())
    }

    /// Where the generated ClusterSecretStore manifest lives
    #[must_use]
    pub fn store_manifest_path(&self) -> PathBuf {
        store_manifest_path(self.root())
    }

    /// Backend binding written into the ClusterSecretStore
    ///
    /// # Errors
    /// `Error::Config` when the provider's project ID or region is missing.
    pub fn store_backend(&self) -> Result<StoreBackend> {
        match self.provider.value {
            ProviderKind::Gcp => Ok(StoreBackend::Gcp {
                project_id: self.gcp_project_id()?.to_string(),
            }),
            ProviderKind::Aws => Ok(StoreBackend::Aws {
                region: self.aws_region()?.to_string(),
            }),
        }
    }

    /// Every setting with its value and source
    #[must_use]
    pub fn explain(&self) -> Vec<SettingExplanation> {
        fn entry<T: fmt::Display>(
            name: &'static str,
            resolved: Option<&Resolved<T>>,
        ) -> SettingExplanation {
            SettingExplanation {
                name,
                value: resolved.map(|r| r.value.to_string()),
                source: resolved.map(|r| r.source.clone()),
            }
        }

        let root = Resolved::new(
            self.root.value.display().to_string(),
            self.root.source.clone(),
        );
        let key_dir = Resolved::new(
            self.key_dir.value.display().to_string(),
            self.key_dir.source.clone(),
        );
        let kubeconfig = self
            .kubeconfig
            .as_ref()
            .map(|r| Resolved::new(r.value.display().to_string(), r.source.clone()));
        let context = self
            .kube_context
            .as_ref()
            .map(|c| Resolved::new(c.clone(), ConfigSource::Explicit));

        vec![
            entry("provider", Some(&self.provider)),
            entry("gcp project", self.gcp_project_id.as_ref()),
            entry("aws region", self.aws_region.as_ref()),
            entry("store name", Some(&self.store_name)),
            entry("root", Some(&root)),
            entry("key directory", Some(&key_dir)),
            entry("kubeconfig", kubeconfig.as_ref()),
            entry("kube context", context.as_ref()),
        ]
    }
}

/// Path of the generated ClusterSecretStore manifest under `root`
#[must_use]
pub fn store_manifest_path(root: &Path) -> PathBuf {
    root.join(STORE_MANIFEST_DIR).join(STORE_MANIFEST_FILE)
}
