//! Request bodies for the Google REST APIs.
//!
//! API references:
//! - [Secret Manager v1](https://cloud.google.com/secret-manager/docs/reference/rest)
//! - [IAM v1](https://cloud.google.com/iam/docs/reference/rest)
//! - [Cloud Resource Manager v1](https://cloud.google.com/resource-manager/reference/rest)

use super::responses::IamPolicy;
use serde::Serialize;

/// Body of `POST /v1/projects/{project}/secrets?secretId={id}`
///
/// Creates secret metadata only; the value is added with [`AddVersionRequest`].
#[derive(Debug, Serialize)]
pub struct CreateSecretRequest {
    pub replication: Replication,
}

impl CreateSecretRequest {
    #[must_use]
    pub fn automatic() -> Self {
        Self {
            replication: Replication {
                automatic: Some(AutomaticReplication {}),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Replication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automatic: Option<AutomaticReplication>,
}

#[derive(Debug, Serialize)]
pub struct AutomaticReplication {}

/// Body of `POST /v1/projects/{project}/secrets/{secret}:addVersion`
#[derive(Serialize)]
pub struct AddVersionRequest {
    pub payload: SecretPayload,
}

/// Base64-encoded secret bytes
#[derive(Serialize)]
pub struct SecretPayload {
    pub data: String,
}

// Payload data is secret material
impl std::fmt::Debug for AddVersionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddVersionRequest").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPayload").finish_non_exhaustive()
    }
}

/// Body of `POST /v1/projects/{project}/serviceAccounts`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceAccountRequest {
    pub account_id: String,
    pub service_account: ServiceAccountFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountFields {
    pub display_name: String,
}

/// Policy schema version that can express conditional bindings
pub const IAM_POLICY_VERSION: i32 = 3;

/// Body of `POST /v1/projects/{project}:getIamPolicy`
#[derive(Debug, Serialize)]
pub struct GetIamPolicyRequest {
    pub options: GetPolicyOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPolicyOptions {
    pub requested_policy_version: i32,
}

impl Default for GetIamPolicyRequest {
    fn default() -> Self {
        Self {
            options: GetPolicyOptions {
                requested_policy_version: IAM_POLICY_VERSION,
            },
        }
    }
}

/// Body of `POST /v1/projects/{project}:setIamPolicy`
#[derive(Debug, Serialize)]
pub struct SetIamPolicyRequest<'a> {
    pub policy: &'a IamPolicy,
}

/// Body of `POST /v1/projects/{project}/serviceAccounts/{email}/keys`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceAccountKeyRequest {
    pub private_key_type: &'static str,
}

impl Default for CreateServiceAccountKeyRequest {
    fn default() -> Self {
        Self {
            private_key_type: "TYPE_GOOGLE_CREDENTIALS_FILE",
        }
    }
}

/// `{}` for calls that take an empty request object (`services.enable`)
#[derive(Debug, Default, Serialize)]
pub struct EmptyRequest {}
