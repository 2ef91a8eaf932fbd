//! # Google REST Client
//!
//! Thin authenticated JSON client shared by the Secret Manager backend and the
//! bootstrapper's Service Usage, IAM and Cloud Resource Manager calls.
//!
//! Uses reqwest with rustls, which also lets contract tests point it at a Pact mock
//! server by overriding the base URL.

pub mod requests;
pub mod responses;

use super::auth::{GcpAuth, PROVIDER};
use crate::error::{Error, Result};
use reqwest::{Client, Method, StatusCode};
use responses::GcpErrorResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Which call failed and on what, for error messages
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub operation: &'a str,
    pub resource: &'a str,
}

/// Authenticated client for one Google API base URL
#[derive(Clone)]
pub struct GoogleRestClient {
    http_client: Client,
    base_url: String,
    auth: Arc<GcpAuth>,
}

impl std::fmt::Debug for GoogleRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleRestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GoogleRestClient {
    #[must_use]
    pub fn new(http_client: Client, base_url: &str, auth: Arc<GcpAuth>) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an authenticated request for `{base_url}/v1/{path}`
    async fn make_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}/v1/{}", self.base_url, path);
        let mut request = self
            .http_client
            .request(method, &url)
            .header("Authorization", self.auth.bearer().await?)
            .header("Content-Type", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        Ok(request)
    }

    /// Send a request and return the raw status and body
    ///
    /// # Errors
    /// `Error::Auth` if no token is available, `Error::Backend` on transport failure.
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        ctx: CallContext<'_>,
    ) -> Result<(StatusCode, String)>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.make_request(method, path, query).await?;
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            Error::backend(PROVIDER, ctx.operation, ctx.resource, format!("request failed: {e}"))
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            Error::backend(
                PROVIDER,
                ctx.operation,
                ctx.resource,
                format!("failed to read response: {e}"),
            )
        })?;
        Ok((status, text))
    }

    /// Send a request and decode the JSON response
    ///
    /// Returns `Ok(None)` on 404 so callers can treat "not found" as a normal outcome.
    ///
    /// # Errors
    /// `Error::Auth` on 401/403, `Error::Backend` on any other failure.
    pub async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        ctx: CallContext<'_>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (status, text) = self.send(method, path, query, body, ctx).await?;
        decode_response(status, &text, ctx)
    }
}

/// Decode a response body, mapping 404 to `None` and other failures to errors
///
/// # Errors
/// `Error::Auth` on 401/403, `Error::Backend` on any other failure.
pub fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    text: &str,
    ctx: CallContext<'_>,
) -> Result<Option<T>> {
    if status == StatusCode::NOT_FOUND {
        debug!(operation = ctx.operation, resource = ctx.resource, "Not found");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(handle_error_response(status, text, ctx));
    }

    // Some calls return an empty body on success
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(text).map(Some).map_err(|e| {
        Error::backend(
            PROVIDER,
            ctx.operation,
            ctx.resource,
            format!("unexpected response: {e}"),
        )
    })
}

/// Request without a body
pub const NO_BODY: Option<&()> = None;

/// Map a non-success GCP response to an error
pub(crate) fn handle_error_response(status: StatusCode, error_text: &str, ctx: CallContext<'_>) -> Error {
    let message = match serde_json::from_str::<GcpErrorResponse>(error_text) {
        Ok(error_response) => format!(
            "GCP API error: {} (code: {}, status: {})",
            error_response.error.message, error_response.error.code, error_response.error.status
        ),
        Err(_) => format!("HTTP {}: {}", status.as_u16(), error_text),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Auth {
            provider: PROVIDER.to_string(),
            message: format!("{} of '{}' denied: {message}", ctx.operation, ctx.resource),
        };
    }

    Error::backend(PROVIDER, ctx.operation, ctx.resource, message)
}
