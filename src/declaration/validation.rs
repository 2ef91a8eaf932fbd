//! # Declaration Validation
//!
//! Structural checks that serde cannot express: Kubernetes naming rules, backend
//! identifier rules, key uniqueness and mutually exclusive value options.

use super::{DeclarationFile, SecretDeclaration};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::LazyLock;

// RFC 1123 subdomain
static KUBERNETES_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("kubernetes name regex")
});

// RFC 1123 label
static KUBERNETES_NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("kubernetes namespace regex")
});

// Kubernetes Secret data key
static SECRET_DATA_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("secret data key regex"));

// Valid in both GCP Secret Manager and AWS Secrets Manager
static REMOTE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,255}$").expect("remote key regex"));

/// Validate a single parsed declaration file
///
/// # Errors
/// `Error::Schema` describing the first violation found.
pub fn validate_file(file: &DeclarationFile) -> Result<()> {
    let mut seen_names = HashSet::new();
    let mut seen_remote_keys = HashSet::new();

    for secret in &file.config.secrets {
        validate_secret(file, secret)?;

        // The ExternalSecret manifest is named after the secret, next to this file
        if !seen_names.insert(secret.name.as_str()) {
            return Err(Error::schema(
                &file.path,
                format!(
                    "secret '{}' is declared more than once in this file",
                    secret.name
                ),
            ));
        }

        for key in &secret.keys {
            if !seen_remote_keys.insert(key.remote_key.as_str()) {
                return Err(Error::schema(
                    &file.path,
                    format!("remoteKey '{}' is declared more than once", key.remote_key),
                ));
            }
        }
    }

    Ok(())
}

fn validate_secret(file: &DeclarationFile, secret: &SecretDeclaration) -> Result<()> {
    let name = secret.name.as_str();

    if name.is_empty() || name.len() > 253 || !KUBERNETES_NAME.is_match(name) {
        return Err(Error::schema(
            &file.path,
            format!(
                "secret name '{name}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)"
            ),
        ));
    }

    let namespace = file.namespace_for(secret);
    if namespace.len() > 63 || !KUBERNETES_NAMESPACE.is_match(namespace) {
        return Err(Error::schema(
            &file.path,
            format!(
                "namespace '{namespace}' for secret '{name}' must be a valid Kubernetes namespace (lowercase alphanumeric, hyphens; cannot start/end with hyphen)"
            ),
        ));
    }

    if secret.keys.is_empty() {
        return Err(Error::schema(
            &file.path,
            format!("secret '{name}' must declare at least one key"),
        ));
    }

    let mut keys = HashSet::new();
    for key in &secret.keys {
        if !SECRET_DATA_KEY.is_match(&key.key) {
            return Err(Error::schema(
                &file.path,
                format!(
                    "key '{}' in secret '{name}' must contain only alphanumeric characters, '-', '_' or '.'",
                    key.key
                ),
            ));
        }

        if !keys.insert(key.key.as_str()) {
            return Err(Error::schema(
                &file.path,
                format!("key '{}' appears more than once in secret '{name}'", key.key),
            ));
        }

        if !REMOTE_KEY.is_match(&key.remote_key) {
            return Err(Error::schema(
                &file.path,
                format!(
                    "remoteKey '{}' must be 1-255 alphanumeric characters, hyphens or underscores",
                    key.remote_key
                ),
            ));
        }

        if key.generate == Some(true) && key.prompt.is_some() {
            return Err(Error::schema(
                &file.path,
                format!(
                    "key '{}' in secret '{name}' sets both generate and prompt",
                    key.key
                ),
            ));
        }
    }

    Ok(())
}

/// Validate a set of files processed together
///
/// Remote keys must be unique across the whole set since they share one backend
/// namespace, and no two files may target the same `(namespace, name)`.
///
/// # Errors
/// `Error::Schema` naming the later of the two conflicting files.
pub fn validate_set(files: &[DeclarationFile]) -> Result<()> {
    let mut remote_keys: HashMap<&str, &PathBuf> = HashMap::new();
    let mut targets: HashMap<(&str, &str), &PathBuf> = HashMap::new();

    for file in files {
        for secret in &file.config.secrets {
            let target = (file.namespace_for(secret), secret.name.as_str());
            if let Some(previous) = targets.insert(target, &file.path) {
                if previous != &file.path {
                    return Err(Error::schema(
                        &file.path,
                        format!(
                            "secret '{}' in namespace '{}' is also declared in {}",
                            target.1,
                            target.0,
                            previous.display()
                        ),
                    ));
                }
            }

            for key in &secret.keys {
                if let Some(previous) = remote_keys.insert(&key.remote_key, &file.path) {
                    if previous != &file.path {
                        return Err(Error::schema(
                            &file.path,
                            format!(
                                "remoteKey '{}' is also declared in {}",
                                key.remote_key,
                                previous.display()
                            ),
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}
