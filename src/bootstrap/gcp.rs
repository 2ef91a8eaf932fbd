//! GCP identity platform over REST.
//!
//! - Service Usage: `services.get`, `services.enable`, `operations.get`
//! - IAM: `serviceAccounts.get`, `serviceAccounts.create`, `serviceAccounts.keys.create`
//! - Cloud Resource Manager: `projects.getIamPolicy`, `projects.setIamPolicy`

use super::{IdentityPlatform, ServiceIdentity};
use crate::error::{Error, Result};
use crate::provider::gcp::rest::requests::{
    CreateServiceAccountKeyRequest, CreateServiceAccountRequest, EmptyRequest,
    GetIamPolicyRequest, ServiceAccountFields, SetIamPolicyRequest,
};
use crate::provider::gcp::rest::responses::{
    IamPolicy, Operation, ServiceAccount, ServiceAccountKey, ServiceState,
};
use crate::provider::gcp::rest::NO_BODY;
use crate::provider::gcp::{CallContext, GcpAuth, GoogleRestClient};
use crate::value_source::SecretValue;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Method};
use std::sync::Arc;
use tracing::debug;

pub const SERVICE_USAGE_ENDPOINT: &str = "https://serviceusage.googleapis.com";
pub const IAM_ENDPOINT: &str = "https://iam.googleapis.com";
pub const RESOURCE_MANAGER_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com";

#[derive(Debug, Clone)]
pub struct GcpIdentityPlatform {
    service_usage: GoogleRestClient,
    iam: GoogleRestClient,
    resource_manager: GoogleRestClient,
    project_id: String,
}

impl GcpIdentityPlatform {
    #[must_use]
    pub fn new(http_client: &Client, auth: &Arc<GcpAuth>, project_id: &str) -> Self {
        Self::with_endpoints(
            http_client,
            auth,
            project_id,
            [SERVICE_USAGE_ENDPOINT, IAM_ENDPOINT, RESOURCE_MANAGER_ENDPOINT],
        )
    }

    /// Point every API at custom base URLs (service usage, IAM, resource manager)
    #[must_use]
    pub fn with_endpoints(
        http_client: &Client,
        auth: &Arc<GcpAuth>,
        project_id: &str,
        [service_usage, iam, resource_manager]: [&str; 3],
    ) -> Self {
        Self {
            service_usage: GoogleRestClient::new(http_client.clone(), service_usage, Arc::clone(auth)),
            iam: GoogleRestClient::new(http_client.clone(), iam, Arc::clone(auth)),
            resource_manager: GoogleRestClient::new(
                http_client.clone(),
                resource_manager,
                Arc::clone(auth),
            ),
            project_id: project_id.to_string(),
        }
    }

    fn service_path(&self, service: &str) -> String {
        format!("projects/{}/services/{}", self.project_id, service)
    }

    fn account_email(&self, account_id: &str) -> String {
        format!("{account_id}@{}.iam.gserviceaccount.com", self.project_id)
    }

    async fn get_policy(&self) -> Result<IamPolicy> {
        self.resource_manager
            .call(
                Method::POST,
                &format!("projects/{}:getIamPolicy", self.project_id),
                &[],
                Some(&GetIamPolicyRequest::default()),
                CallContext {
                    operation: "get_iam_policy",
                    resource: &self.project_id,
                },
            )
            .await?
            .ok_or_else(|| not_found("get_iam_policy", &self.project_id))
    }
}

fn not_found(operation: &str, resource: &str) -> Error {
    Error::backend("gcp", operation, resource, "not found")
}

#[async_trait]
impl IdentityPlatform for GcpIdentityPlatform {
    async fn is_api_enabled(&self, service: &str) -> Result<bool> {
        let state: Option<ServiceState> = self
            .service_usage
            .call(
                Method::GET,
                &self.service_path(service),
                &[],
                NO_BODY,
                CallContext {
                    operation: "get_service",
                    resource: service,
                },
            )
            .await?;
        Ok(state.is_some_and(|s| s.is_enabled()))
    }

    async fn enable_api(&self, service: &str) -> Result<Option<String>> {
        let operation: Operation = self
            .service_usage
            .call(
                Method::POST,
                &format!("{}:enable", self.service_path(service)),
                &[],
                Some(&EmptyRequest::default()),
                CallContext {
                    operation: "enable_service",
                    resource: service,
                },
            )
            .await?
            .ok_or_else(|| not_found("enable_service", service))?;

        if let Some(error) = operation.error {
            return Err(Error::backend("gcp", "enable_service", service, error.message));
        }
        Ok((!operation.done && !operation.name.is_empty()).then_some(operation.name))
    }

    async fn operation_done(&self, operation: &str) -> Result<bool> {
        let op: Operation = self
            .service_usage
            .call(
                Method::GET,
                operation,
                &[],
                NO_BODY,
                CallContext {
                    operation: "get_operation",
                    resource: operation,
                },
            )
            .await?
            .ok_or_else(|| not_found("get_operation", operation))?;

        if let Some(error) = op.error {
            return Err(Error::backend("gcp", "get_operation", operation, error.message));
        }
        debug!(operation, done = op.done, "Polled operation");
        Ok(op.done)
    }

    async fn find_identity(&self, account_id: &str) -> Result<Option<ServiceIdentity>> {
        let email = self.account_email(account_id);
        let account: Option<ServiceAccount> = self
            .iam
            .call(
                Method::GET,
                &format!("projects/{}/serviceAccounts/{email}", self.project_id),
                &[],
                NO_BODY,
                CallContext {
                    operation: "get_service_account",
                    resource: &email,
                },
            )
            .await?;
        Ok(account.map(|a| ServiceIdentity { email: a.email }))
    }

    async fn create_identity(&self, account_id: &str, display_name: &str) -> Result<ServiceIdentity> {
        let request = CreateServiceAccountRequest {
            account_id: account_id.to_string(),
            service_account: ServiceAccountFields {
                display_name: display_name.to_string(),
            },
        };
        let account: ServiceAccount = self
            .iam
            .call(
                Method::POST,
                &format!("projects/{}/serviceAccounts", self.project_id),
                &[],
                Some(&request),
                CallContext {
                    operation: "create_service_account",
                    resource: account_id,
                },
            )
            .await?
            .ok_or_else(|| not_found("create_service_account", &self.project_id))?;
        Ok(ServiceIdentity { email: account.email })
    }

    async fn has_role(&self, role: &str, member: &str) -> Result<bool> {
        Ok(self.get_policy().await?.has_binding(role, member))
    }

    async fn grant_role(&self, role: &str, member: &str) -> Result<()> {
        let Some(policy) = self.get_policy().await?.with_member(role, member) else {
            return Ok(());
        };

        // The etag read above guards against concurrent edits
        let _: IamPolicy = self
            .resource_manager
            .call(
                Method::POST,
                &format!("projects/{}:setIamPolicy", self.project_id),
                &[],
                Some(&SetIamPolicyRequest { policy: &policy }),
                CallContext {
                    operation: "set_iam_policy",
                    resource: member,
                },
            )
            .await?
            .ok_or_else(|| not_found("set_iam_policy", &self.project_id))?;
        Ok(())
    }

    async fn create_key(&self, identity: &ServiceIdentity) -> Result<SecretValue> {
        let key: ServiceAccountKey = self
            .iam
            .call(
                Method::POST,
                &format!(
                    "projects/{}/serviceAccounts/{}/keys",
                    self.project_id, identity.email
                ),
                &[],
                Some(&CreateServiceAccountKeyRequest::default()),
                CallContext {
                    operation: "create_key",
                    resource: &identity.email,
                },
            )
            .await?
            .ok_or_else(|| not_found("create_key", &identity.email))?;

        let decoded = general_purpose::STANDARD
            .decode(key.private_key_data.as_bytes())
            .map_err(|e| Error::backend("gcp", "create_key", &identity.email, format!("invalid key data: {e}")))?;
        let json = String::from_utf8(decoded).map_err(|e| {
            Error::backend("gcp", "create_key", &identity.email, format!("key is not UTF-8: {e}"))
        })?;
        Ok(SecretValue::new(json))
    }
}
