//! # Constants
//!
//! Shared constants used throughout the pipeline.
//!
//! These values match the conventions the generated manifests and the in-cluster
//! External Secrets Operator rely on. Most can be overridden through `Settings`.

/// Namespace used when neither the declaration nor its location names one
pub const FALLBACK_NAMESPACE: &str = "default";

/// Directory whose children are per-deployment declaration directories
pub const DEPLOYMENTS_DIR: &str = "deployments";

/// Directory holding cluster-wide declarations (not scoped to one namespace)
pub const INFRASTRUCTURE_DIR: &str = "infrastructure";

/// File names recognised as declaration files during discovery
pub const DECLARATION_FILE_NAMES: &[&str] = &["secrets.yaml", "secrets.yml"];

/// External Secrets Operator API group and version
pub const ESO_API_GROUP: &str = "external-secrets.io";
pub const ESO_API_VERSION: &str = "v1beta1";

/// Refresh interval written into every ExternalSecret
pub const EXTERNAL_SECRET_REFRESH_INTERVAL: &str = "1h";

/// ExternalSecret target creation policy (the sync controller owns the Secret)
pub const EXTERNAL_SECRET_CREATION_POLICY: &str = "Owner";

/// Default ClusterSecretStore names per backend
pub const DEFAULT_GCP_STORE_NAME: &str = "gcp-secretstore";
pub const DEFAULT_AWS_STORE_NAME: &str = "aws-secretstore";

/// Namespace holding the sync controller's backend credential
pub const ESO_NAMESPACE: &str = "external-secrets-system";

/// Kubernetes Secret holding the GCP service account key
pub const GCP_CREDENTIAL_SECRET_NAME: &str = "gcpsm-secret";
pub const GCP_CREDENTIAL_SECRET_KEY: &str = "secret-access-credentials";

/// Kubernetes Secret holding AWS access keys
pub const AWS_CREDENTIAL_SECRET_NAME: &str = "awssm-secret";
pub const AWS_ACCESS_KEY_ID_KEY: &str = "access-key-id";
pub const AWS_SECRET_ACCESS_KEY_KEY: &str = "secret-access-key";

/// GCP identity used by the sync controller
pub const GCP_SERVICE_ACCOUNT_ID: &str = "external-secrets";
pub const GCP_SERVICE_ACCOUNT_DISPLAY_NAME: &str = "External Secrets Operator";
pub const GCP_SECRET_ACCESSOR_ROLE: &str = "roles/secretmanager.secretAccessor";
pub const GCP_SECRET_MANAGER_SERVICE: &str = "secretmanager.googleapis.com";

/// Policy grant retry schedule: 2s, 4s, 8s, 16s between five attempts
pub const POLICY_GRANT_MAX_ATTEMPTS: u32 = 5;
pub const POLICY_GRANT_BASE_DELAY_MS: u64 = 2000;

/// API enablement polling schedule
pub const API_ENABLE_POLL_MAX_ATTEMPTS: u32 = 6;
pub const API_ENABLE_POLL_BASE_DELAY_MS: u64 = 1000;

/// Length of locally generated secret values
pub const GENERATED_VALUE_LENGTH: usize = 32;

/// Local directory (under $HOME) for service account keys
pub const DEFAULT_KEY_DIR: &str = ".gcp";

/// Generated manifest locations, relative to the repository root or declaration directory
pub const STORE_MANIFEST_DIR: &str = "infrastructure/external-secrets";
pub const STORE_MANIFEST_FILE: &str = "clustersecretstore.yaml";
pub const EXTERNAL_SECRET_DIR: &str = "external-secrets";
