//! # GCP Secret Manager Backend
//!
//! Secret Manager REST API v1 over reqwest.
//!
//! - `exists`: `GET projects/{project}/secrets/{id}` (404 means absent)
//! - `create`: `POST projects/{project}/secrets?secretId={id}` when absent, then
//!   `POST projects/{project}/secrets/{id}:addVersion` with the base64 payload
//!
//! A create that loses a race with another creator (409) falls through to adding a
//! version, so the latest value always wins.

pub mod auth;
pub mod rest;

pub use auth::GcpAuth;
pub use rest::{CallContext, GoogleRestClient};

use crate::error::{Error, Result};
use crate::manifest::StoreBackend;
use crate::provider::tracker::OperationTracker;
use crate::provider::{ProviderKind, SecretBackend};
use crate::value_source::SecretValue;
use async_trait::async_trait;
use auth::PROVIDER;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Method, StatusCode};
use rest::requests::{AddVersionRequest, CreateSecretRequest, SecretPayload};
use rest::responses::{ListSecretsResponse, SecretResource, SecretVersionResource};
use rest::NO_BODY;
use std::sync::Arc;
use tracing::{debug, field::Empty, info, info_span, Instrument};

pub const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com";

/// Secret Manager backend bound to one project
pub struct GcpSecretManager {
    client: GoogleRestClient,
    auth: Arc<GcpAuth>,
    project_id: String,
    store_name: String,
}

impl std::fmt::Debug for GcpSecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSecretManager")
            .field("project_id", &self.project_id)
            .field("base_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

/// Builder for [`GcpSecretManager`]
#[derive(Debug)]
pub struct GcpSecretManagerBuilder {
    project_id: String,
    store_name: String,
    endpoint: String,
    access_token: Option<String>,
}

impl GcpSecretManagerBuilder {
    #[must_use]
    pub fn store_name(mut self, name: &str) -> Self {
        self.store_name = name.to_string();
        self
    }

    /// Override the API endpoint (emulators, contract tests)
    #[must_use]
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Use a fixed access token instead of the lookup chain
    #[must_use]
    pub fn access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// # Errors
    /// `Error::Config` if the HTTP client cannot be created.
    pub fn build(self) -> Result<GcpSecretManager> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        let auth = Arc::new(GcpAuth::new(http_client.clone(), self.access_token));
        let client = GoogleRestClient::new(http_client, &self.endpoint, Arc::clone(&auth));

        info!(project.id = %self.project_id, endpoint = %self.endpoint, "Initializing GCP Secret Manager client");

        Ok(GcpSecretManager {
            client,
            auth,
            project_id: self.project_id,
            store_name: self.store_name,
        })
    }
}

impl GcpSecretManager {
    #[must_use]
    pub fn builder(project_id: &str) -> GcpSecretManagerBuilder {
        GcpSecretManagerBuilder {
            project_id: project_id.to_string(),
            store_name: ProviderKind::Gcp.default_store_name().to_string(),
            endpoint: SECRET_MANAGER_ENDPOINT.to_string(),
            access_token: None,
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Token source shared with other Google API clients (bootstrapper)
    #[must_use]
    pub fn auth(&self) -> Arc<GcpAuth> {
        Arc::clone(&self.auth)
    }

    fn secret_path(&self, remote_key: &str) -> String {
        format!("projects/{}/secrets/{}", self.project_id, remote_key)
    }

    async fn create_secret(&self, remote_key: &str) -> Result<()> {
        let ctx = CallContext {
            operation: "create",
            resource: remote_key,
        };
        let (status, text) = self
            .client
            .send(
                Method::POST,
                &format!("projects/{}/secrets", self.project_id),
                &[("secretId", remote_key)],
                Some(&CreateSecretRequest::automatic()),
                ctx,
            )
            .await?;

        if status == StatusCode::CONFLICT {
            debug!(secret.name = remote_key, "Secret created concurrently, adding version");
            return Ok(());
        }
        rest::decode_response::<SecretResource>(status, &text, ctx)?
            .ok_or_else(|| Error::backend(PROVIDER, "create", remote_key, "project not found"))?;
        info!(secret.name = remote_key, "Created GCP secret");
        Ok(())
    }

    async fn add_version(&self, remote_key: &str, value: &SecretValue) -> Result<()> {
        let request = AddVersionRequest {
            payload: SecretPayload {
                data: general_purpose::STANDARD.encode(value.as_bytes()),
            },
        };
        let version: SecretVersionResource = self
            .client
            .call(
                Method::POST,
                &format!("{}:addVersion", self.secret_path(remote_key)),
                &[],
                Some(&request),
                CallContext {
                    operation: "add_version",
                    resource: remote_key,
                },
            )
            .await?
            .ok_or_else(|| {
                Error::backend(PROVIDER, "add_version", remote_key, "secret disappeared before a version could be added")
            })?;
        info!(secret.name = remote_key, version = %version.name, "Added secret version");
        Ok(())
    }
}

#[async_trait]
impl SecretBackend for GcpSecretManager {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn store_backend(&self) -> StoreBackend {
        StoreBackend::Gcp {
            project_id: self.project_id.clone(),
        }
    }

    async fn initialize(&self) -> Result<()> {
        let span = info_span!(
            "gcp.initialize",
            project.id = %self.project_id,
            operation.type = "initialize",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "initialize", span.clone());

        async {
            let result = self
                .client
                .call::<_, ListSecretsResponse>(
                    Method::GET,
                    &format!("projects/{}/secrets", self.project_id),
                    &[("pageSize", "1")],
                    NO_BODY,
                    CallContext {
                        operation: "initialize",
                        resource: &self.project_id,
                    },
                )
                .await;

            let result = match result {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(Error::Auth {
                    provider: PROVIDER.to_string(),
                    message: format!("project '{}' not found or Secret Manager API not reachable", self.project_id),
                }),
                Err(Error::Backend { message, .. }) => Err(Error::Auth {
                    provider: PROVIDER.to_string(),
                    message: format!("Secret Manager API unreachable: {message}"),
                }),
                Err(e) => Err(e),
            };
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn exists(&self, remote_key: &str) -> Result<bool> {
        let span = tracing::debug_span!(
            "gcp.secret.exists",
            secret.name = remote_key,
            project.id = %self.project_id,
            operation.type = "exists",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "exists", span.clone());

        async {
            let result = self
                .client
                .call::<_, SecretResource>(
                    Method::GET,
                    &self.secret_path(remote_key),
                    &[],
                    NO_BODY,
                    CallContext {
                        operation: "exists",
                        resource: remote_key,
                    },
                )
                .await
                .map(|secret| secret.is_some());
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn create(&self, remote_key: &str, value: &SecretValue) -> Result<()> {
        let span = info_span!(
            "gcp.secret.create",
            secret.name = remote_key,
            project.id = %self.project_id,
            operation.type = "create",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "create", span.clone());

        async {
            let result = async {
                if !self.exists(remote_key).await? {
                    self.create_secret(remote_key).await?;
                }
                self.add_version(remote_key, value).await
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_store_binds_project() {
        let backend = GcpSecretManager::builder("acme-prod")
            .access_token("test-token")
            .build()
            .unwrap();
        let manifest = backend.describe_store("gcp-secretstore").unwrap();
        assert!(manifest.contains("projectID: acme-prod"));
        assert!(manifest.contains("name: gcp-secretstore"));
    }

    #[test]
    fn test_debug_hides_token() {
        let backend = GcpSecretManager::builder("acme-prod")
            .access_token("super-secret-token")
            .build()
            .unwrap();
        assert!(!format!("{backend:?}").contains("super-secret-token"));
    }
}
