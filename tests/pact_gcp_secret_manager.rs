//! Pact consumer tests for the GCP Secret Manager backend
//!
//! Each test starts a Pact mock server, points the real REST client at it and drives
//! the backend through `SecretBackend`. The mock server fails the test if an expected
//! interaction is not received.

mod common;

use common::init_rustls;
use pact_consumer::mock_server::ValidatingMockServer;
use pact_consumer::prelude::*;
use secrets_provisioner::provider::{GcpSecretManager, SecretBackend};
use secrets_provisioner::value_source::SecretValue;
use secrets_provisioner::Error;
use serde_json::json;

const CONSUMER: &str = "secretsctl";
const PROVIDER: &str = "GCP-Secret-Manager";

fn backend_for(mock_server: &dyn ValidatingMockServer) -> GcpSecretManager {
    let mut base_url = mock_server.url().to_string();
    if base_url.ends_with('/') {
        base_url.pop();
    }
    GcpSecretManager::builder("test-project")
        .endpoint(&base_url)
        .access_token("test-token")
        .build()
        .unwrap()
}

fn base64_encode(s: &str) -> String {
    use base64::{engine::general_purpose, Engine as _};
    general_purpose::STANDARD.encode(s.as_bytes())
}

fn not_found_body(secret: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": 404,
            "message": format!("Secret [projects/123/secrets/{secret}] not found or has no versions."),
            "status": "NOT_FOUND"
        }
    })
}

#[tokio::test]
async fn test_exists_returns_false_on_not_found() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret that does not exist", "", |mut i| {
        i.given("the secret db-password does not exist");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/db-password")
            .header("authorization", "Bearer test-token");
        i.response
            .status(404)
            .header("content-type", "application/json")
            .json_body(not_found_body("db-password"));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    assert!(!backend.exists("db-password").await.unwrap());
}

#[tokio::test]
async fn test_create_new_secret_then_add_version() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret before create", "", |mut i| {
        i.given("the secret db-password does not exist");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/db-password")
            .header("authorization", "Bearer test-token");
        i.response
            .status(404)
            .header("content-type", "application/json")
            .json_body(not_found_body("db-password"));
        i
    });

    pact_builder.interaction("create secret with automatic replication", "", |mut i| {
        i.given("the secret db-password does not exist");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets")
            .query_param("secretId", "db-password")
            .header("authorization", "Bearer test-token")
            .header("content-type", "application/json")
            .json_body(json!({
                "replication": {
                    "automatic": {}
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/db-password",
                "replication": {
                    "automatic": {}
                },
                "createTime": "2026-01-01T00:00:00Z"
            }));
        i
    });

    pact_builder.interaction("add first secret version", "", |mut i| {
        i.given("the secret db-password exists");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets/db-password:addVersion")
            .header("authorization", "Bearer test-token")
            .header("content-type", "application/json")
            .json_body(json!({
                "payload": {
                    "data": base64_encode("s3cr3t")
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/db-password/versions/1",
                "state": "ENABLED"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    backend
        .create("db-password", &SecretValue::new("s3cr3t"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_existing_secret_adds_version_only() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get existing secret", "", |mut i| {
        i.given("the secret api-token exists");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/api-token")
            .header("authorization", "Bearer test-token");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/api-token",
                "replication": {
                    "automatic": {}
                }
            }));
        i
    });

    pact_builder.interaction("add version to existing secret", "", |mut i| {
        i.given("the secret api-token exists");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets/api-token:addVersion")
            .header("authorization", "Bearer test-token")
            .json_body(json!({
                "payload": {
                    "data": base64_encode("rotated")
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/api-token/versions/2",
                "state": "ENABLED"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    backend
        .create("api-token", &SecretValue::new("rotated"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_conflict_falls_through_to_add_version() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret not yet visible", "", |mut i| {
        i.given("the secret race-key is being created concurrently");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/race-key")
            .header("authorization", "Bearer test-token");
        i.response
            .status(404)
            .header("content-type", "application/json")
            .json_body(not_found_body("race-key"));
        i
    });

    pact_builder.interaction("create secret that now exists", "", |mut i| {
        i.given("the secret race-key is being created concurrently");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets")
            .query_param("secretId", "race-key")
            .header("authorization", "Bearer test-token");
        i.response
            .status(409)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 409,
                    "message": "Secret [projects/123/secrets/race-key] already exists.",
                    "status": "ALREADY_EXISTS"
                }
            }));
        i
    });

    pact_builder.interaction("add version after conflict", "", |mut i| {
        i.given("the secret race-key exists");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets/race-key:addVersion")
            .header("authorization", "Bearer test-token")
            .json_body(json!({
                "payload": {
                    "data": base64_encode("value")
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/race-key/versions/1"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    backend
        .create("race-key", &SecretValue::new("value"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_initialize_with_invalid_token_is_auth_error() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("list secrets with invalid token", "", |mut i| {
        i.given("the access token is invalid");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets")
            .query_param("pageSize", "1")
            .header("authorization", "Bearer test-token");
        i.response
            .status(401)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 401,
                    "message": "Request had invalid authentication credentials.",
                    "status": "UNAUTHENTICATED"
                }
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    let err = backend.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Auth { .. }), "got {err:?}");
    assert!(err.to_string().contains("invalid authentication credentials"));
}

#[tokio::test]
async fn test_server_error_on_exists_is_backend_error() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret during outage", "", |mut i| {
        i.given("Secret Manager is unavailable");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/db-password")
            .header("authorization", "Bearer test-token");
        i.response
            .status(503)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 503,
                    "message": "The service is currently unavailable.",
                    "status": "UNAVAILABLE"
                }
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    let err = backend.exists("db-password").await.unwrap_err();
    match err {
        Error::Backend {
            operation,
            resource,
            ..
        } => {
            assert_eq!(operation, "exists");
            assert_eq!(resource, "db-password");
        }
        other => panic!("expected Backend error, got {other:?}"),
    }
}

fn add_version_interaction(pact_builder: &mut PactBuilder, secret: &str, value: &str, version: u32) {
    let description = format!("add version {version} to {secret}");
    let state = format!("the secret {secret} exists");
    let path = format!("/v1/projects/test-project/secrets/{secret}:addVersion");
    pact_builder.interaction(description.as_str(), "", |mut i| {
        i.given(state.as_str());
        i.request
            .method("POST")
            .path(path.as_str())
            .header("authorization", "Bearer test-token")
            .json_body(json!({
                "payload": {
                    "data": base64_encode(value)
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": format!("projects/test-project/secrets/{secret}/versions/{version}"),
                "state": "ENABLED"
            }));
        i
    });
}

#[tokio::test]
async fn test_repeated_create_adds_versions_and_key_exists() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret that is being rotated", "", |mut i| {
        i.given("the secret session-key exists");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/session-key")
            .header("authorization", "Bearer test-token");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/secrets/session-key",
                "replication": {
                    "automatic": {}
                }
            }));
        i
    });
    add_version_interaction(&mut pact_builder, "session-key", "first", 1);
    add_version_interaction(&mut pact_builder, "session-key", "second", 2);

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    backend
        .create("session-key", &SecretValue::new("first"))
        .await
        .unwrap();
    backend
        .create("session-key", &SecretValue::new("second"))
        .await
        .unwrap();
    assert!(backend.exists("session-key").await.unwrap());
}

#[tokio::test]
async fn test_repeated_create_through_conflict_never_fails() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);

    pact_builder.interaction("get secret hidden by replication lag", "", |mut i| {
        i.given("the secret lagging-key exists but is not yet readable");
        i.request
            .method("GET")
            .path("/v1/projects/test-project/secrets/lagging-key")
            .header("authorization", "Bearer test-token");
        i.response
            .status(404)
            .header("content-type", "application/json")
            .json_body(not_found_body("lagging-key"));
        i
    });

    pact_builder.interaction("create secret hidden by replication lag", "", |mut i| {
        i.given("the secret lagging-key exists but is not yet readable");
        i.request
            .method("POST")
            .path("/v1/projects/test-project/secrets")
            .query_param("secretId", "lagging-key")
            .header("authorization", "Bearer test-token");
        i.response
            .status(409)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 409,
                    "message": "Secret [projects/123/secrets/lagging-key] already exists.",
                    "status": "ALREADY_EXISTS"
                }
            }));
        i
    });
    add_version_interaction(&mut pact_builder, "lagging-key", "v1", 1);
    add_version_interaction(&mut pact_builder, "lagging-key", "v2", 2);

    let mock_server = pact_builder.start_mock_server(None, None);
    let backend = backend_for(mock_server.as_ref());

    backend
        .create("lagging-key", &SecretValue::new("v1"))
        .await
        .unwrap();
    backend
        .create("lagging-key", &SecretValue::new("v2"))
        .await
        .unwrap();
}
