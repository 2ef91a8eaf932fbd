//! # Cluster Validator
//!
//! Checks that every ExternalSecret in the cluster has synced and that the Kubernetes
//! Secret it targets exists. Nothing in the cluster is modified.
//!
//! Each ExternalSecret produces two results: one for its `Ready` condition and one for
//! the Secret of the same name. A missing ExternalSecret and a missing Secret are
//! reported under distinct [`CheckKind`]s.

mod inspector;

pub use inspector::{kube_client, KubeInspector};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, info_span, warn, Instrument};

pub const EXTERNAL_SECRET_NOT_READY: &str = "ExternalSecret not ready";
pub const EXTERNAL_SECRET_NOT_FOUND: &str = "ExternalSecret not found";
pub const EXTERNAL_SECRET_SYNCED: &str = "ExternalSecret is synced";
pub const KUBERNETES_SECRET_EXISTS: &str = "Kubernetes Secret exists";
pub const KUBERNETES_SECRET_NOT_FOUND: &str = "Kubernetes Secret not found";

/// Namespaced object reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

/// One entry of `status.conditions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Read access to the cluster state the validator needs
#[async_trait]
pub trait ClusterInspector: Send + Sync + fmt::Debug {
    /// Every ExternalSecret in every namespace
    ///
    /// # Errors
    /// `Error::ClusterRead` if the list call fails.
    async fn list_external_secrets(&self) -> Result<Vec<ObjectRef>>;

    /// Conditions of one ExternalSecret, `None` if it no longer exists
    ///
    /// # Errors
    /// `Error::ClusterRead` for anything other than "not found".
    async fn external_secret_conditions(&self, object: &ObjectRef) -> Result<Option<Vec<Condition>>>;

    /// # Errors
    /// `Error::ClusterRead` for anything other than "not found".
    async fn secret_exists(&self, object: &ObjectRef) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckKind {
    ExternalSecret,
    KubernetesSecret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub name: String,
    pub namespace: String,
    pub check: CheckKind,
    pub status: ValidationStatus,
    pub message: String,
}

impl ValidationResult {
    fn new(object: &ObjectRef, check: CheckKind, status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            name: object.name.clone(),
            namespace: object.namespace.clone(),
            check,
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub success: bool,
    pub checked_at: DateTime<Utc>,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// Build a report; success iff no result is an error
    #[must_use]
    pub fn from_results(results: Vec<ValidationResult>) -> Self {
        Self {
            success: results.iter().all(|r| r.status != ValidationStatus::Error),
            checked_at: Utc::now(),
            results,
        }
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ValidationStatus::Error)
            .count()
    }

    /// Human-readable report, one line per result
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let mark = match result.status {
                ValidationStatus::Success => "✔",
                ValidationStatus::Error => "✗",
                ValidationStatus::Warning => "!",
            };
            out.push_str(&format!(
                "{mark} {}/{}: {}\n",
                result.namespace, result.name, result.message
            ));
        }
        if self.results.is_empty() {
            out.push_str("No ExternalSecrets found in cluster\n");
        }
        if self.success {
            out.push_str("Cluster secrets are in sync\n");
        } else {
            out.push_str(&format!("{} check(s) failed\n", self.errors()));
        }
        out
    }

    /// # Errors
    /// `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Check every ExternalSecret and its target Secret
///
/// # Errors
/// `Error::ClusterRead` only if ExternalSecrets cannot be listed at all. Failures reading
/// a single object become `error` results.
pub async fn validate_cluster(inspector: &dyn ClusterInspector) -> Result<ValidationReport> {
    let span = info_span!("cluster.validate");
    async {
        let mut objects = inspector.list_external_secrets().await?;
        if objects.is_empty() {
            warn!("No ExternalSecrets found in cluster");
            return Ok(ValidationReport::from_results(Vec::new()));
        }
        objects.sort();
        info!(count = objects.len(), "Found ExternalSecrets");

        let mut results = Vec::with_capacity(objects.len() * 2);
        for object in &objects {
            let external = check_external_secret(inspector, object).await;
            let secret = check_kubernetes_secret(inspector, object).await;
            for result in [&external, &secret] {
                if result.status == ValidationStatus::Error {
                    error!(namespace = %object.namespace, name = %object.name, message = %result.message, "Check failed");
                } else {
                    info!(namespace = %object.namespace, name = %object.name, message = %result.message, "Check passed");
                }
            }
            results.push(external);
            results.push(secret);
        }

        Ok(ValidationReport::from_results(results))
    }
    .instrument(span)
    .await
}

async fn check_external_secret(inspector: &dyn ClusterInspector, object: &ObjectRef) -> ValidationResult {
    let check = CheckKind::ExternalSecret;
    match inspector.external_secret_conditions(object).await {
        Ok(Some(conditions)) => {
            let ready = conditions.iter().find(|c| c.type_ == "Ready");
            match ready {
                Some(c) if c.status == "True" => {
                    ValidationResult::new(object, check, ValidationStatus::Success, EXTERNAL_SECRET_SYNCED)
                }
                _ => {
                    let message = ready
                        .and_then(|c| c.message.clone())
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| EXTERNAL_SECRET_NOT_READY.to_string());
                    ValidationResult::new(object, check, ValidationStatus::Error, message)
                }
            }
        }
        Ok(None) => ValidationResult::new(object, check, ValidationStatus::Error, EXTERNAL_SECRET_NOT_FOUND),
        Err(e) => ValidationResult::new(object, check, ValidationStatus::Error, format!("Failed to check: {e}")),
    }
}

async fn check_kubernetes_secret(inspector: &dyn ClusterInspector, object: &ObjectRef) -> ValidationResult {
    let check = CheckKind::KubernetesSecret;
    match inspector.secret_exists(object).await {
        Ok(true) => ValidationResult::new(object, check, ValidationStatus::Success, KUBERNETES_SECRET_EXISTS),
        Ok(false) => ValidationResult::new(object, check, ValidationStatus::Error, KUBERNETES_SECRET_NOT_FOUND),
        Err(e) => ValidationResult::new(object, check, ValidationStatus::Error, format!("Failed to check: {e}")),
    }
}
