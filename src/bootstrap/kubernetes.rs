//! Installs the backend credential into the cluster.
//!
//! The ClusterSecretStore references `external-secrets-system/gcpsm-secret`; this
//! creates the namespace and Secret when they are missing. Existing objects are left
//! alone.

use crate::error::{Error, Result};
use crate::value_source::SecretValue;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::info;

/// Cluster writes the bootstrapper needs
#[async_trait]
pub trait CredentialInstaller: Send + Sync + std::fmt::Debug {
    /// Create `namespace` unless it exists; returns whether it was created
    ///
    /// # Errors
    /// `Error::ClusterRead` if the API server rejects the request.
    async fn ensure_namespace(&self, namespace: &str) -> Result<bool>;

    /// Create the credential Secret unless it exists; returns whether it was created
    ///
    /// # Errors
    /// `Error::ClusterRead` if the API server rejects the request.
    async fn ensure_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &SecretValue,
    ) -> Result<bool>;
}

#[derive(Clone)]
pub struct KubeCredentialInstaller {
    client: Client,
}

impl std::fmt::Debug for KubeCredentialInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCredentialInstaller").finish_non_exhaustive()
    }
}

impl KubeCredentialInstaller {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialInstaller for KubeCredentialInstaller {
    async fn ensure_namespace(&self, namespace: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api
            .get_opt(namespace)
            .await
            .map_err(|e| Error::cluster_read(format!("get namespace {namespace}"), e))?
            .is_some()
        {
            return Ok(false);
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace, "Created namespace");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(Error::cluster_read(format!("create namespace {namespace}"), e)),
        }
    }

    async fn ensure_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &SecretValue,
    ) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        if api
            .get_opt(name)
            .await
            .map_err(|e| Error::cluster_read(format!("get secret {namespace}/{name}"), e))?
            .is_some()
        {
            return Ok(false);
        }

        let object = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.as_bytes().to_vec()),
            )])),
            ..Secret::default()
        };
        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace, secret = name, "Created credential secret");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(Error::cluster_read(format!("create secret {namespace}/{name}"), e)),
        }
    }
}
