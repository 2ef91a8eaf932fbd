//! Response bodies from the Google REST APIs.

use super::requests::IAM_POLICY_VERSION;
use serde::{Deserialize, Serialize};

/// GCP error envelope
///
/// API Reference: https://cloud.google.com/apis/design/errors
#[derive(Debug, Deserialize)]
pub struct GcpErrorResponse {
    pub error: GcpError,
}

#[derive(Debug, Deserialize)]
pub struct GcpError {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// OAuth2 token from the metadata server
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Secret metadata (`projects.secrets.get`)
#[derive(Debug, Deserialize)]
pub struct SecretResource {
    pub name: String,
}

/// `projects.secrets.list`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSecretsResponse {
    #[serde(default)]
    pub secrets: Vec<SecretResource>,
}

/// `projects.secrets.addVersion`
#[derive(Debug, Deserialize)]
pub struct SecretVersionResource {
    pub name: String,
}

/// `services.get` from Service Usage
#[derive(Debug, Deserialize)]
pub struct ServiceState {
    pub name: String,
    #[serde(default)]
    pub state: String,
}

impl ServiceState {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state == "ENABLED"
    }
}

/// Long-running operation
#[derive(Debug, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub unique_id: String,
}

/// `serviceAccounts.keys.create`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountKey {
    pub name: String,
    /// Base64-encoded JSON key file
    pub private_key_data: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Project IAM policy
///
/// Fields we do not touch (audit configs, conditions) are carried through unchanged so
/// the read-modify-write in `setIamPolicy` does not drop them. Conditions only survive
/// when the policy is read and written as version 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub bindings: Vec<IamBinding>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamBinding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl IamPolicy {
    /// Whether `member` is bound to `role` without a condition
    #[must_use]
    pub fn has_binding(&self, role: &str, member: &str) -> bool {
        self.bindings.iter().any(|b| {
            b.role == role && !b.other.contains_key("condition") && b.members.iter().any(|m| m == member)
        })
    }

    /// Add `member` to `role` and mark the policy as version 3 for writing
    ///
    /// Returns the policy to send to `setIamPolicy`, or `None` if the member was
    /// already bound.
    #[must_use]
    pub fn with_member(mut self, role: &str, member: &str) -> Option<Self> {
        if !self.add_binding(role, member) {
            return None;
        }
        self.version = Some(IAM_POLICY_VERSION);
        Some(self)
    }

    /// Add `member` to the unconditional binding for `role`
    ///
    /// Returns `false` if the member was already bound.
    pub fn add_binding(&mut self, role: &str, member: &str) -> bool {
        if self.has_binding(role, member) {
            return false;
        }
        if let Some(binding) = self
            .bindings
            .iter_mut()
            .find(|b| b.role == role && !b.other.contains_key("condition"))
        {
            binding.members.push(member.to_string());
        } else {
            self.bindings.push(IamBinding {
                role: role.to_string(),
                members: vec![member.to_string()],
                other: serde_json::Map::new(),
            });
        }
        true
    }
}
