//! # Infrastructure Bootstrapper
//!
//! One-time setup of the identity the sync controller uses to read secrets:
//!
//! ```text
//! CheckApiEnabled -> EnableApi -> EnsureIdentity -> GrantAccessPolicy -> EnsureCredentialKey
//!     -> EnsureClusterNamespace -> EnsureClusterCredential -> Done
//! ```
//!
//! Every step checks first and short-circuits, so running the bootstrapper again is
//! safe. The access policy grant retries with exponential backoff because a freshly
//! created identity takes a while to become visible to IAM.

pub mod credentials;
pub mod gcp;
pub mod kubernetes;

pub use credentials::KeyStore;
pub use gcp::GcpIdentityPlatform;
pub use kubernetes::{CredentialInstaller, KubeCredentialInstaller};

use crate::backoff::{retry_with_backoff, retry_with_backoff_if, RetryPolicy};
use crate::constants::{
    API_ENABLE_POLL_BASE_DELAY_MS, API_ENABLE_POLL_MAX_ATTEMPTS, ESO_NAMESPACE,
    GCP_CREDENTIAL_SECRET_KEY, GCP_CREDENTIAL_SECRET_NAME, GCP_SECRET_ACCESSOR_ROLE,
    GCP_SECRET_MANAGER_SERVICE, GCP_SERVICE_ACCOUNT_DISPLAY_NAME, GCP_SERVICE_ACCOUNT_ID,
};
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::value_source::SecretValue;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

/// Identity and policy operations on the cloud side
#[async_trait]
pub trait IdentityPlatform: Send + Sync + fmt::Debug {
    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the service state cannot be read.
    async fn is_api_enabled(&self, service: &str) -> Result<bool>;

    /// Start enabling `service`; returns the operation to poll, or `None` if it finished
    ///
    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the request is rejected.
    async fn enable_api(&self, service: &str) -> Result<Option<String>>;

    /// # Errors
    /// `Error::Backend` if the operation failed or cannot be read.
    async fn operation_done(&self, operation: &str) -> Result<bool>;

    /// # Errors
    /// `Error::Backend` or `Error::Auth` for anything other than "not found".
    async fn find_identity(&self, account_id: &str) -> Result<Option<ServiceIdentity>>;

    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the identity cannot be created.
    async fn create_identity(&self, account_id: &str, display_name: &str) -> Result<ServiceIdentity>;

    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the policy cannot be read.
    async fn has_role(&self, role: &str, member: &str) -> Result<bool>;

    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the policy cannot be updated.
    async fn grant_role(&self, role: &str, member: &str) -> Result<()>;

    /// Create a new key for `identity` and return the credential file contents
    ///
    /// # Errors
    /// `Error::Backend` or `Error::Auth` if the key cannot be created.
    async fn create_key(&self, identity: &ServiceIdentity) -> Result<SecretValue>;
}

/// A service identity (GCP service account)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub email: String,
}

impl ServiceIdentity {
    /// IAM member string for policy bindings
    #[must_use]
    pub fn member(&self) -> String {
        format!("serviceAccount:{}", self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootstrapStep {
    EnableApi,
    EnsureIdentity,
    GrantAccessPolicy,
    EnsureCredentialKey,
    EnsureClusterNamespace,
    EnsureClusterCredential,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EnableApi => "enable Secret Manager API",
            Self::EnsureIdentity => "ensure service account",
            Self::GrantAccessPolicy => "grant secret accessor role",
            Self::EnsureCredentialKey => "ensure service account key",
            Self::EnsureClusterNamespace => "ensure cluster namespace",
            Self::EnsureClusterCredential => "ensure cluster credential secret",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepOutcome {
    AlreadySatisfied,
    Performed,
    Skipped,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySatisfied => f.write_str("already satisfied"),
            Self::Performed => f.write_str("performed"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// What the bootstrapper found and did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub project_id: String,
    pub service_account: String,
    pub key_path: PathBuf,
    pub steps: Vec<(BootstrapStep, StepOutcome)>,
}

impl BootstrapReport {
    #[must_use]
    pub fn outcome(&self, step: BootstrapStep) -> Option<StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| *o)
    }

    /// Whether any step changed something
    #[must_use]
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|(_, o)| *o == StepOutcome::Performed)
    }
}

/// Runs the bootstrap steps against one project
pub struct Bootstrapper<'a> {
    platform: &'a dyn IdentityPlatform,
    key_store: KeyStore,
    installer: Option<&'a dyn CredentialInstaller>,
    project_id: String,
    grant_policy: RetryPolicy,
    poll_policy: RetryPolicy,
}

impl fmt::Debug for Bootstrapper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("project_id", &self.project_id)
            .field("key_store", &self.key_store)
            .field("install_in_cluster", &self.installer.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Bootstrapper<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn IdentityPlatform, key_store: KeyStore, project_id: &str) -> Self {
        Self {
            platform,
            key_store,
            installer: None,
            project_id: project_id.to_string(),
            grant_policy: RetryPolicy::default(),
            poll_policy: RetryPolicy::new(
                API_ENABLE_POLL_MAX_ATTEMPTS,
                Duration::from_millis(API_ENABLE_POLL_BASE_DELAY_MS),
            ),
        }
    }

    /// Also install the credential into the cluster
    #[must_use]
    pub fn with_installer(mut self, installer: &'a dyn CredentialInstaller) -> Self {
        self.installer = Some(installer);
        self
    }

    #[must_use]
    pub fn with_grant_policy(mut self, policy: RetryPolicy) -> Self {
        self.grant_policy = policy;
        self
    }

    #[must_use]
    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Run every step in order, stopping at the first failure
    ///
    /// # Errors
    /// `Error::PolicyGrant` once the grant retries are exhausted, otherwise the failing
    /// step's `Error::Backend`, `Error::Auth`, `Error::Io` or `Error::ClusterRead`.
    pub async fn run(&self) -> Result<BootstrapReport> {
        let span = info_span!("bootstrap", project.id = %self.project_id);
        async {
            let mut steps = Vec::new();

            steps.push((BootstrapStep::EnableApi, self.ensure_api_enabled().await?));

            let (identity, outcome) = self.ensure_identity().await?;
            steps.push((BootstrapStep::EnsureIdentity, outcome));

            steps.push((
                BootstrapStep::GrantAccessPolicy,
                self.grant_access_policy(&identity).await?,
            ));

            let (key, outcome) = self.ensure_key(&identity).await?;
            steps.push((BootstrapStep::EnsureCredentialKey, outcome));

            match self.installer {
                Some(installer) => {
                    let created = installer.ensure_namespace(ESO_NAMESPACE).await?;
                    steps.push((BootstrapStep::EnsureClusterNamespace, performed_if(created)));

                    let created = installer
                        .ensure_secret(
                            ESO_NAMESPACE,
                            GCP_CREDENTIAL_SECRET_NAME,
                            GCP_CREDENTIAL_SECRET_KEY,
                            &key,
                        )
                        .await?;
                    steps.push((BootstrapStep::EnsureClusterCredential, performed_if(created)));
                }
                None => {
                    steps.push((BootstrapStep::EnsureClusterNamespace, StepOutcome::Skipped));
                    steps.push((BootstrapStep::EnsureClusterCredential, StepOutcome::Skipped));
                }
            }

            for (step, outcome) in &steps {
                info!(step = %step, outcome = %outcome, "Bootstrap step complete");
            }

            Ok(BootstrapReport {
                project_id: self.project_id.clone(),
                service_account: identity.email,
                key_path: self.key_store.path_for(&self.project_id),
                steps,
            })
        }
        .instrument(span)
        .await
    }

    async fn ensure_api_enabled(&self) -> Result<StepOutcome> {
        if self.platform.is_api_enabled(GCP_SECRET_MANAGER_SERVICE).await? {
            return Ok(StepOutcome::AlreadySatisfied);
        }

        info!(service = GCP_SECRET_MANAGER_SERVICE, "Enabling API");
        let Some(operation) = self.platform.enable_api(GCP_SECRET_MANAGER_SERVICE).await? else {
            return Ok(StepOutcome::Performed);
        };

        retry_with_backoff_if(
            &self.poll_policy,
            "enable_api",
            |_| {
                let operation = operation.as_str();
                async move {
                    match self.platform.operation_done(operation).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(PollError::Pending),
                        Err(e) => Err(PollError::Failed(e)),
                    }
                }
            },
            |e| matches!(e, PollError::Pending),
        )
        .await
        .map_err(|e| match e.last_error {
            PollError::Failed(error) => error,
            PollError::Pending => Error::backend(
                "gcp",
                "enable_api",
                GCP_SECRET_MANAGER_SERVICE,
                format!("operation {operation} still running after {} checks", e.attempts),
            ),
        })?;

        Ok(StepOutcome::Performed)
    }

    async fn ensure_identity(&self) -> Result<(ServiceIdentity, StepOutcome)> {
        if let Some(identity) = self.platform.find_identity(GCP_SERVICE_ACCOUNT_ID).await? {
            return Ok((identity, StepOutcome::AlreadySatisfied));
        }

        let identity = self
            .platform
            .create_identity(GCP_SERVICE_ACCOUNT_ID, GCP_SERVICE_ACCOUNT_DISPLAY_NAME)
            .await?;
        info!(service_account = %identity.email, "Created service account");
        Ok((identity, StepOutcome::Performed))
    }

    async fn grant_access_policy(&self, identity: &ServiceIdentity) -> Result<StepOutcome> {
        let member = identity.member();
        if self.platform.has_role(GCP_SECRET_ACCESSOR_ROLE, &member).await? {
            return Ok(StepOutcome::AlreadySatisfied);
        }

        retry_with_backoff(&self.grant_policy, "grant_access_policy", |_| {
            let member = member.as_str();
            async move {
                metrics::increment_policy_grant_attempts();
                self.platform.grant_role(GCP_SECRET_ACCESSOR_ROLE, member).await
            }
        })
        .await
        .map_err(|e| Error::PolicyGrant {
            role: GCP_SECRET_ACCESSOR_ROLE.to_string(),
            member: member.clone(),
            attempts: e.attempts,
            message: e.last_error.to_string(),
        })?;

        info!(role = GCP_SECRET_ACCESSOR_ROLE, member = %member, "Granted role");
        Ok(StepOutcome::Performed)
    }

    async fn ensure_key(&self, identity: &ServiceIdentity) -> Result<(SecretValue, StepOutcome)> {
        if let Some(key) = self.key_store.load(&self.project_id)? {
            info!(path = %self.key_store.path_for(&self.project_id).display(), "Reusing existing service account key");
            return Ok((key, StepOutcome::AlreadySatisfied));
        }

        let key = self.platform.create_key(identity).await?;
        let path = self.key_store.save(&self.project_id, &key)?;
        info!(path = %path.display(), "Saved new service account key");
        Ok((key, StepOutcome::Performed))
    }
}

fn performed_if(changed: bool) -> StepOutcome {
    if changed {
        StepOutcome::Performed
    } else {
        StepOutcome::AlreadySatisfied
    }
}

#[derive(Debug)]
enum PollError {
    Pending,
    Failed(Error),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("operation still running"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakePlatform {
        enabled: Mutex<bool>,
        identity: Mutex<Option<ServiceIdentity>>,
        bound: Mutex<bool>,
        grant_failures: AtomicU32,
        grant_calls: AtomicU32,
        keys_created: AtomicU32,
    }

    #[async_trait]
    impl IdentityPlatform for FakePlatform {
        async fn is_api_enabled(&self, _service: &str) -> Result<bool> {
            Ok(*self.enabled.lock().unwrap())
        }

        async fn enable_api(&self, _service: &str) -> Result<Option<String>> {
            *self.enabled.lock().unwrap() = true;
            Ok(None)
        }

        async fn operation_done(&self, _operation: &str) -> Result<bool> {
            Ok(true)
        }

        async fn find_identity(&self, _account_id: &str) -> Result<Option<ServiceIdentity>> {
            Ok(self.identity.lock().unwrap().clone())
        }

        async fn create_identity(&self, account_id: &str, _display_name: &str) -> Result<ServiceIdentity> {
            let identity = ServiceIdentity {
                email: format!("{account_id}@acme.iam.gserviceaccount.com"),
            };
            *self.identity.lock().unwrap() = Some(identity.clone());
            Ok(identity)
        }

        async fn has_role(&self, _role: &str, _member: &str) -> Result<bool> {
            Ok(*self.bound.lock().unwrap())
        }

        async fn grant_role(&self, role: &str, member: &str) -> Result<()> {
            self.grant_calls.fetch_add(1, Ordering::SeqCst);
            if self.grant_failures.load(Ordering::SeqCst) > 0 {
                self.grant_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::backend("gcp", "set_iam_policy", role, format!("{member} does not exist")));
            }
            *self.bound.lock().unwrap() = true;
            Ok(())
        }

        async fn create_key(&self, _identity: &ServiceIdentity) -> Result<SecretValue> {
            self.keys_created.fetch_add(1, Ordering::SeqCst);
            Ok(SecretValue::new(r#"{"type":"service_account"}"#))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_project_performs_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let platform = FakePlatform {
            grant_failures: AtomicU32::new(2),
            ..FakePlatform::default()
        };

        let report = Bootstrapper::new(&platform, KeyStore::new(dir.path()), "acme")
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome(BootstrapStep::EnableApi), Some(StepOutcome::Performed));
        assert_eq!(report.outcome(BootstrapStep::EnsureIdentity), Some(StepOutcome::Performed));
        assert_eq!(report.outcome(BootstrapStep::GrantAccessPolicy), Some(StepOutcome::Performed));
        assert_eq!(report.outcome(BootstrapStep::EnsureCredentialKey), Some(StepOutcome::Performed));
        assert_eq!(report.outcome(BootstrapStep::EnsureClusterCredential), Some(StepOutcome::Skipped));
        assert_eq!(platform.grant_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.service_account, "external-secrets@acme.iam.gserviceaccount.com");
        assert!(report.key_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let platform = FakePlatform::default();

        Bootstrapper::new(&platform, KeyStore::new(dir.path()), "acme")
            .run()
            .await
            .unwrap();
        let report = Bootstrapper::new(&platform, KeyStore::new(dir.path()), "acme")
            .run()
            .await
            .unwrap();

        assert!(!report.changed());
        assert_eq!(platform.keys_created.load(Ordering::SeqCst), 1);
        assert_eq!(platform.grant_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_gives_up_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let platform = FakePlatform {
            grant_failures: AtomicU32::new(u32::MAX),
            ..FakePlatform::default()
        };

        let start = tokio::time::Instant::now();
        let err = Bootstrapper::new(&platform, KeyStore::new(dir.path()), "acme")
            .run()
            .await
            .unwrap_err();

        match err {
            Error::PolicyGrant { attempts, role, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(role, GCP_SECRET_ACCESSOR_ROLE);
            }
            other => panic!("expected PolicyGrant, got {other:?}"),
        }
        assert_eq!(platform.grant_calls.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() <= RetryPolicy::default().total_wait() + Duration::from_secs(1));
        assert_eq!(platform.keys_created.load(Ordering::SeqCst), 0);
    }
}
