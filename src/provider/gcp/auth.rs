//! # GCP Access Tokens
//!
//! OAuth2 access token lookup, tried in order:
//!
//! 1. a token supplied explicitly (tests, CI)
//! 2. `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 3. the GCE/GKE metadata server (Workload Identity)
//! 4. `gcloud auth print-access-token` (developer workstation)
//!
//! The token is fetched once and reused for the rest of the run.

use super::rest::responses::TokenResponse;
use crate::error::{Error, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use zeroize::Zeroizing;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);
const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

pub(crate) const PROVIDER: &str = "gcp";

/// Shared access token for every Google API client in a run
pub struct GcpAuth {
    http_client: Client,
    explicit: Option<Zeroizing<String>>,
    token: OnceCell<Zeroizing<String>>,
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAuth")
            .field("explicit", &self.explicit.is_some())
            .field("cached", &self.token.initialized())
            .finish_non_exhaustive()
    }
}

impl GcpAuth {
    #[must_use]
    pub fn new(http_client: Client, explicit: Option<String>) -> Self {
        Self {
            http_client,
            explicit: explicit.map(Zeroizing::new),
            token: OnceCell::new(),
        }
    }

    /// `Authorization` header value
    ///
    /// # Errors
    /// `Error::Auth` if no source yields a token.
    pub async fn bearer(&self) -> Result<String> {
        let token = self
            .token
            .get_or_try_init(|| async { self.fetch().await.map(Zeroizing::new) })
            .await?;
        Ok(if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {}", token.as_str())
        })
    }

    async fn fetch(&self) -> Result<String> {
        if let Some(token) = &self.explicit {
            debug!("Using explicitly supplied access token");
            return Ok(token.to_string());
        }

        if let Some(token) = std::env::var(ENV_ACCESS_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            debug!("Using access token from {ENV_ACCESS_TOKEN}");
            return Ok(token.trim().to_string());
        }

        match self.from_metadata_server().await {
            Ok(token) => {
                info!("Retrieved access token from metadata server (Workload Identity)");
                return Ok(token);
            }
            Err(e) => debug!("Metadata server not available: {e}"),
        }

        match from_gcloud().await {
            Ok(token) => {
                info!("Retrieved access token from gcloud");
                Ok(token)
            }
            Err(e) => Err(Error::Auth {
                provider: PROVIDER.to_string(),
                message: format!(
                    "no access token available. Set {ENV_ACCESS_TOKEN}, run on GCE/GKE with \
                     Workload Identity, or log in with `gcloud auth login` ({e})"
                ),
            }),
        }
    }

    async fn from_metadata_server(&self) -> std::result::Result<String, String> {
        let response = self
            .http_client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("metadata server returned {}", response.status()));
        }

        let token: TokenResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(token.access_token)
    }
}

async fn from_gcloud() -> std::result::Result<String, String> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| format!("failed to run gcloud: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "gcloud auth print-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err("gcloud returned an empty token".to_string());
    }
    Ok(token)
}
