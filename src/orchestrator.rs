//! # Provisioning Flow
//!
//! Declarations -> backend -> manifests:
//!
//! 1. validate the whole declaration set (no backend call on any schema error)
//! 2. authenticate against the backend
//! 3. check every declared key against the backend and plan the missing ones
//! 4. if a confirmer is set, ask before creating anything
//! 5. source a value for each missing key and create it
//! 6. write the ClusterSecretStore and one ExternalSecret per declared secret
//!
//! Provisioning stops at the first fatal error without rolling back. Every step is
//! idempotent, so the fix is to re-run.

use crate::config::Prompter;
use crate::declaration::{validate_set, DeclarationFile};
use crate::error::Result;
use crate::manifest::{generate_cluster_secret_store, generate_external_secrets, WriteOutcome};
use crate::provider::SecretBackend;
use crate::value_source::ValueSource;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyOutcome {
    /// Already present in the backend, left untouched
    Existing,
    Created,
    /// Missing, would be created (dry run)
    Planned,
}

impl fmt::Display for KeyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing => f.write_str("exists"),
            Self::Created => f.write_str("created"),
            Self::Planned => f.write_str("would create"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReport {
    pub namespace: String,
    pub secret: String,
    pub key: String,
    pub remote_key: String,
    pub outcome: KeyOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub keys: Vec<KeyReport>,
    pub manifests: Vec<WriteOutcome>,
    /// The confirmer declined; nothing was created or written
    pub cancelled: bool,
}

impl ProvisionReport {
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(KeyOutcome::Created)
    }

    #[must_use]
    pub fn planned(&self) -> usize {
        self.count(KeyOutcome::Planned)
    }

    fn count(&self, outcome: KeyOutcome) -> usize {
        self.keys.iter().filter(|k| k.outcome == outcome).count()
    }
}

#[derive(Clone, Copy, Default)]
pub struct ProvisionOptions<'a> {
    /// Check the backend but create nothing and write no files
    pub dry_run: bool,
    /// Asked once before the first backend write, when anything is missing
    pub confirm: Option<&'a dyn Prompter>,
}

impl fmt::Debug for ProvisionOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionOptions")
            .field("dry_run", &self.dry_run)
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

/// Provision every declared key, then write the manifests
///
/// # Errors
/// `Error::Schema` for an invalid declaration set (before any backend call),
/// `Error::Auth`/`Error::Backend` from the backend, `Error::ValueSource` if a value
/// cannot be obtained or the confirmation cannot be read, `Error::Io` if a manifest
/// cannot be written.
pub async fn provision(
    backend: &dyn SecretBackend,
    values: &dyn ValueSource,
    files: &[DeclarationFile],
    root: &Path,
    options: ProvisionOptions<'_>,
) -> Result<ProvisionReport> {
    validate_set(files)?;

    let span = info_span!("provision", provider = %backend.kind(), files = files.len(), dry_run = options.dry_run);
    async {
        backend.initialize().await?;

        let mut report = ProvisionReport::default();
        let mut missing = Vec::new();
        for file in files {
            for secret in &file.config.secrets {
                let namespace = file.namespace_for(secret);
                for key in &secret.keys {
                    let outcome = if backend.exists(&key.remote_key).await? {
                        KeyOutcome::Existing
                    } else {
                        missing.push((report.keys.len(), key));
                        KeyOutcome::Planned
                    };
                    report.keys.push(KeyReport {
                        namespace: namespace.to_string(),
                        secret: secret.name.clone(),
                        key: key.key.clone(),
                        remote_key: key.remote_key.clone(),
                        outcome,
                    });
                }
            }
        }
        info!(total = report.keys.len(), missing = missing.len(), "Planned provisioning");

        if options.dry_run {
            return Ok(report);
        }

        if let Some(prompter) = options.confirm.filter(|_| !missing.is_empty()) {
            let question = format!(
                "Create {} missing secret(s) in {} store '{}'?",
                missing.len(),
                backend.kind(),
                backend.store_name()
            );
            if !prompter.confirm(&question)? {
                warn!("Provisioning cancelled before any change");
                report.cancelled = true;
                return Ok(report);
            }
        }

        for (index, key) in missing {
            let value = values.value_for(key)?;
            backend.create(&key.remote_key, &value).await?;
            let entry = &mut report.keys[index];
            entry.outcome = KeyOutcome::Created;
            info!(
                namespace = %entry.namespace,
                secret = %entry.secret,
                remote_key = %entry.remote_key,
                "Created key"
            );
        }

        report.manifests = generate(backend, files, root)?;
        Ok(report)
    }
    .instrument(span)
    .await
}

/// Write the ClusterSecretStore and ExternalSecrets without touching the backend
///
/// # Errors
/// `Error::Schema` for an invalid declaration set, `Error::Io` if a file cannot be
/// written.
pub fn generate(
    backend: &dyn SecretBackend,
    files: &[DeclarationFile],
    root: &Path,
) -> Result<Vec<WriteOutcome>> {
    validate_set(files)?;
    let mut outcomes = vec![generate_cluster_secret_store(backend, root)?];
    outcomes.extend(generate_external_secrets(backend, files)?);
    Ok(outcomes)
}
