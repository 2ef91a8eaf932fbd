//! # AWS Secrets Manager Backend
//!
//! Uses the official AWS SDK with the default credential chain (environment, shared
//! profile, SSO, IRSA on EKS).
//!
//! - `exists`: `DescribeSecret` (`ResourceNotFoundException` means absent)
//! - `create`: `CreateSecret` when absent, otherwise `PutSecretValue`. A create that
//!   races another creator (`ResourceExistsException`) falls through to `PutSecretValue`.

use crate::error::{Error, Result};
use crate::manifest::StoreBackend;
use crate::provider::tracker::OperationTracker;
use crate::provider::{ProviderKind, SecretBackend};
use crate::value_source::SecretValue;
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use tracing::{debug, field::Empty, info, info_span, Instrument};

const PROVIDER: &str = "aws";

/// Error codes that mean the credentials, not the request, are the problem
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "InvalidClientTokenId",
];

/// AWS Secrets Manager backend bound to one region
pub struct AwsSecretsManager {
    client: SecretsManagerClient,
    region: String,
    store_name: String,
}

impl std::fmt::Debug for AwsSecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManager")
            .field("region", &self.region)
            .field("store_name", &self.store_name)
            .finish_non_exhaustive()
    }
}

impl AwsSecretsManager {
    /// Create a client for `region` from the default credential chain
    pub async fn new(region: &str, store_name: &str) -> Self {
        info!(region, "Initializing AWS Secrets Manager client");
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::with_client(SecretsManagerClient::new(&sdk_config), region, store_name)
    }

    /// Wrap an already configured SDK client
    #[must_use]
    pub fn with_client(client: SecretsManagerClient, region: &str, store_name: &str) -> Self {
        Self {
            client,
            region: region.to_string(),
            store_name: store_name.to_string(),
        }
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    async fn put_value(&self, remote_key: &str, value: &SecretValue) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(remote_key)
            .secret_string(value.expose())
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, "put_secret_value", remote_key))?;
        info!(secret.name = remote_key, "Added AWS secret version");
        Ok(())
    }
}

/// Map an SDK error, treating credential failures as `Error::Auth`
fn map_sdk_error<E, R>(error: &SdkError<E, R>, operation: &str, resource: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(error).to_string();
    match error.code() {
        Some(code) if AUTH_ERROR_CODES.contains(&code) => Error::Auth {
            provider: PROVIDER.to_string(),
            message: format!("{operation} of '{resource}' denied: {message}"),
        },
        _ => Error::backend(PROVIDER, operation, resource, message),
    }
}

#[async_trait]
impl SecretBackend for AwsSecretsManager {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn store_backend(&self) -> StoreBackend {
        StoreBackend::Aws {
            region: self.region.clone(),
        }
    }

    async fn initialize(&self) -> Result<()> {
        let span = info_span!(
            "aws.initialize",
            region = %self.region,
            operation.type = "initialize",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "initialize", span.clone());

        async {
            let result = self
                .client
                .list_secrets()
                .max_results(1)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| Error::Auth {
                    provider: PROVIDER.to_string(),
                    message: format!(
                        "Secrets Manager in {} not reachable: {}",
                        self.region,
                        DisplayErrorContext(&e)
                    ),
                });
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn exists(&self, remote_key: &str) -> Result<bool> {
        let span = tracing::debug_span!(
            "aws.secret.exists",
            secret.name = remote_key,
            region = %self.region,
            operation.type = "exists",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "exists", span.clone());

        async {
            let result = match self.client.describe_secret().secret_id(remote_key).send().await {
                Ok(_) => Ok(true),
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception()) =>
                {
                    debug!(secret.name = remote_key, "AWS secret not found");
                    Ok(false)
                }
                Err(e) => Err(map_sdk_error(&e, "exists", remote_key)),
            };
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn create(&self, remote_key: &str, value: &SecretValue) -> Result<()> {
        let span = info_span!(
            "aws.secret.create",
            secret.name = remote_key,
            region = %self.region,
            operation.type = "create",
            operation.success = Empty,
            operation.duration_ms = Empty,
            error.message = Empty,
        );
        let tracker = OperationTracker::new(PROVIDER, "create", span.clone());

        async {
            let result = async {
                if self.exists(remote_key).await? {
                    return self.put_value(remote_key, value).await;
                }

                match self
                    .client
                    .create_secret()
                    .name(remote_key)
                    .secret_string(value.expose())
                    .send()
                    .await
                {
                    Ok(_) => {
                        info!(secret.name = remote_key, "Created AWS secret");
                        Ok(())
                    }
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_resource_exists_exception()) =>
                    {
                        debug!(secret.name = remote_key, "Secret created concurrently, adding version");
                        self.put_value(remote_key, value).await
                    }
                    Err(e) => Err(map_sdk_error(&e, "create", remote_key)),
                }
            }
            .await;
            tracker.finish(result)
        }
        .instrument(span)
        .await
    }
}
