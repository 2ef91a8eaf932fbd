//! # Manifest Generation
//!
//! External Secrets Operator manifests built from typed structs.
//!
//! - `ClusterSecretStore`: binds the store to the backend project or region and the
//!   credential Secret installed by the bootstrapper
//! - `ExternalSecret`: one per declared secret, mapping each key to its `remoteKey`
//!
//! Rendering is pure. Field order follows struct order, so the same inputs always render
//! to the same bytes. Secret values never reach a manifest.

mod types;
mod writer;

pub use types::*;
use types::eso_api_version;
pub use writer::{
    external_secret_path, generate_cluster_secret_store, generate_external_secrets,
    read_store_manifest, write_cluster_secret_store, write_manifest, WriteOutcome, WriteStatus,
};

use crate::constants::{
    AWS_ACCESS_KEY_ID_KEY, AWS_CREDENTIAL_SECRET_NAME, AWS_SECRET_ACCESS_KEY_KEY,
    ESO_NAMESPACE, GCP_CREDENTIAL_SECRET_KEY, GCP_CREDENTIAL_SECRET_NAME,
};
use crate::declaration::SecretDeclaration;
use crate::error::{Error, Result};
use crate::provider::ProviderKind;
use serde::Serialize;

const HEADER: &str = "# Generated by secretsctl. Do not edit; re-run `secretsctl generate` instead.\n";

/// Backend binding of a ClusterSecretStore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Gcp { project_id: String },
    Aws { region: String },
}

impl StoreBackend {
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Gcp { .. } => ProviderKind::Gcp,
            Self::Aws { .. } => ProviderKind::Aws,
        }
    }
}

impl ClusterSecretStore {
    #[must_use]
    pub fn new(name: &str, backend: &StoreBackend) -> Self {
        let provider = match backend {
            StoreBackend::Gcp { project_id } => StoreProviderSpec {
                gcpsm: Some(GcpSmProvider {
                    project_id: project_id.clone(),
                    auth: GcpSmAuth {
                        secret_ref: GcpSmSecretRef {
                            secret_access_key_secret_ref: SecretKeySelector::credential(
                                GCP_CREDENTIAL_SECRET_NAME,
                                GCP_CREDENTIAL_SECRET_KEY,
                            ),
                        },
                    },
                }),
                aws: None,
            },
            StoreBackend::Aws { region } => StoreProviderSpec {
                gcpsm: None,
                aws: Some(AwsProvider {
                    service: AWS_SERVICE_SECRETS_MANAGER.to_string(),
                    region: region.clone(),
                    auth: AwsAuth {
                        secret_ref: AwsSecretRef {
                            access_key_id_secret_ref: SecretKeySelector::credential(
                                AWS_CREDENTIAL_SECRET_NAME,
                                AWS_ACCESS_KEY_ID_KEY,
                            ),
                            secret_access_key_secret_ref: SecretKeySelector::credential(
                                AWS_CREDENTIAL_SECRET_NAME,
                                AWS_SECRET_ACCESS_KEY_KEY,
                            ),
                        },
                    },
                }),
            },
        };

        Self {
            api_version: eso_api_version(),
            kind: CLUSTER_SECRET_STORE_KIND.to_string(),
            metadata: ManifestMetadata {
                name: name.to_string(),
                namespace: None,
            },
            spec: ClusterSecretStoreSpec { provider },
        }
    }

    /// Backend this store reads from, if it is one we generate
    #[must_use]
    pub fn backend(&self) -> Option<StoreBackend> {
        if let Some(gcp) = &self.spec.provider.gcpsm {
            return Some(StoreBackend::Gcp {
                project_id: gcp.project_id.clone(),
            });
        }
        self.spec.provider.aws.as_ref().map(|aws| StoreBackend::Aws {
            region: aws.region.clone(),
        })
    }
}

impl SecretKeySelector {
    fn credential(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            namespace: Some(ESO_NAMESPACE.to_string()),
        }
    }
}

impl ExternalSecret {
    #[must_use]
    pub fn new(declaration: &SecretDeclaration, namespace: &str, store_name: &str) -> Self {
        Self {
            api_version: eso_api_version(),
            kind: EXTERNAL_SECRET_KIND.to_string(),
            metadata: ManifestMetadata {
                name: declaration.name.clone(),
                namespace: Some(namespace.to_string()),
            },
            spec: ExternalSecretSpec {
                refresh_interval: crate::constants::EXTERNAL_SECRET_REFRESH_INTERVAL.to_string(),
                secret_store_ref: SecretStoreRef {
                    name: store_name.to_string(),
                    kind: CLUSTER_SECRET_STORE_KIND.to_string(),
                },
                target: ExternalSecretTarget {
                    name: declaration.name.clone(),
                    creation_policy: crate::constants::EXTERNAL_SECRET_CREATION_POLICY.to_string(),
                },
                data: declaration
                    .keys
                    .iter()
                    .map(|k| ExternalSecretData {
                        secret_key: k.key.clone(),
                        remote_ref: RemoteRef {
                            key: k.remote_key.clone(),
                        },
                    })
                    .collect(),
            },
        }
    }
}

fn render<T: Serialize>(manifest: &T, what: &str) -> Result<String> {
    let body = serde_yaml::to_string(manifest)
        .map_err(|e| Error::Config(format!("Failed to render {what} manifest: {e}")))?;
    Ok(format!("{HEADER}{body}"))
}

/// Render a ClusterSecretStore manifest
///
/// # Errors
/// `Error::Config` if serialization fails.
pub fn render_cluster_secret_store(name: &str, backend: &StoreBackend) -> Result<String> {
    render(&ClusterSecretStore::new(name, backend), CLUSTER_SECRET_STORE_KIND)
}

/// Render an ExternalSecret manifest, preserving declared key order
///
/// # Errors
/// `Error::Config` if serialization fails.
pub fn render_external_secret(
    declaration: &SecretDeclaration,
    namespace: &str,
    store_name: &str,
) -> Result<String> {
    render(
        &ExternalSecret::new(declaration, namespace, store_name),
        EXTERNAL_SECRET_KIND,
    )
}
