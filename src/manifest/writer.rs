//! Writing manifests to disk.
//!
//! Files whose content is already identical are left untouched so a re-run produces no
//! diff and no modification time change.

use super::{render, ClusterSecretStore, CLUSTER_SECRET_STORE_KIND};
use crate::config::store_manifest_path;
use crate::constants::EXTERNAL_SECRET_DIR;
use crate::declaration::DeclarationFile;
use crate::error::{Error, Result};
use crate::provider::SecretBackend;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Unchanged,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written => f.write_str("written"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub status: WriteStatus,
}

/// Write `content` to `path` unless it already holds exactly those bytes
///
/// # Errors
/// `Error::Io` if the directory or file cannot be written.
pub fn write_manifest(path: &Path, content: &str) -> Result<WriteOutcome> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == content.as_bytes() {
            return Ok(WriteOutcome {
                path: path.to_path_buf(),
                status: WriteStatus::Unchanged,
            });
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), "Wrote manifest");

    Ok(WriteOutcome {
        path: path.to_path_buf(),
        status: WriteStatus::Written,
    })
}

/// `<declaration dir>/external-secrets/<name>-externalsecret.yaml`
#[must_use]
pub fn external_secret_path(declaration_dir: &Path, secret_name: &str) -> PathBuf {
    declaration_dir
        .join(EXTERNAL_SECRET_DIR)
        .join(format!("{secret_name}-externalsecret.yaml"))
}

/// Write an already built ClusterSecretStore under `root`
///
/// # Errors
/// `Error::Io` if the file cannot be written.
pub fn write_cluster_secret_store(root: &Path, store: &ClusterSecretStore) -> Result<WriteOutcome> {
    let content = render(store, CLUSTER_SECRET_STORE_KIND)?;
    write_manifest(&store_manifest_path(root), &content)
}

/// Write the backend's ClusterSecretStore manifest under `root`
///
/// # Errors
/// `Error::Io` if the file cannot be written.
pub fn generate_cluster_secret_store(
    backend: &dyn SecretBackend,
    root: &Path,
) -> Result<WriteOutcome> {
    let content = backend.describe_store(backend.store_name())?;
    write_manifest(&store_manifest_path(root), &content)
}

/// Write one ExternalSecret manifest per declared secret, next to its declaration file
///
/// All manifests are rendered before anything is written, so a collision leaves the
/// tree untouched.
///
/// # Errors
/// `Error::Schema` if two declarations would be written to the same manifest path,
/// `Error::Io` on the first file that cannot be written.
pub fn generate_external_secrets(
    backend: &dyn SecretBackend,
    files: &[DeclarationFile],
) -> Result<Vec<WriteOutcome>> {
    let mut rendered: Vec<(PathBuf, String)> = Vec::new();
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();

    for file in files {
        let dir = file.directory();
        for secret in &file.config.secrets {
            let path = external_secret_path(&dir, &secret.name);
            if let Some(previous) = owners.insert(path.clone(), &file.path) {
                return Err(Error::schema(
                    &file.path,
                    format!(
                        "secret '{}' would overwrite {} generated for {}",
                        secret.name,
                        path.display(),
                        previous.display()
                    ),
                ));
            }
            let namespace = file.namespace_for(secret);
            rendered.push((path, backend.describe_secret(secret, namespace)?));
        }
    }

    rendered
        .iter()
        .map(|(path, content)| write_manifest(path, content))
        .collect()
}

/// Read a previously generated ClusterSecretStore
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
/// `Error::Io` if the file exists but cannot be read, `Error::Schema` if it is not a
/// ClusterSecretStore.
pub fn read_store_manifest(path: &Path) -> Result<Option<ClusterSecretStore>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    let store: ClusterSecretStore =
        serde_yaml::from_str(&content).map_err(|e| Error::schema(path, e.to_string()))?;
    if store.kind != CLUSTER_SECRET_STORE_KIND {
        return Err(Error::schema(
            path,
            format!("expected kind {CLUSTER_SECRET_STORE_KIND}, found {}", store.kind),
        ));
    }
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::StoreBackend;

    #[test]
    fn test_write_manifest_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.yaml");

        let first = write_manifest(&path, "kind: Test\n").unwrap();
        assert_eq!(first.status, WriteStatus::Written);

        let second = write_manifest(&path, "kind: Test\n").unwrap();
        assert_eq!(second.status, WriteStatus::Unchanged);

        let third = write_manifest(&path, "kind: Changed\n").unwrap();
        assert_eq!(third.status, WriteStatus::Written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kind: Changed\n");
    }

    #[test]
    fn test_external_secret_path_layout() {
        let path = external_secret_path(Path::new("/repo/deployments/app"), "db");
        assert_eq!(
            path,
            PathBuf::from("/repo/deployments/app/external-secrets/db-externalsecret.yaml")
        );
    }

    #[test]
    fn test_read_store_manifest_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_store_manifest(&dir.path().join("missing.yaml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_read_store_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClusterSecretStore::new(
            "aws-secretstore",
            &StoreBackend::Aws {
                region: "us-east-2".to_string(),
            },
        );
        let outcome = write_cluster_secret_store(dir.path(), &store).unwrap();
        assert!(outcome
            .path
            .ends_with("infrastructure/external-secrets/clustersecretstore.yaml"));

        let read = read_store_manifest(&outcome.path).unwrap().unwrap();
        assert_eq!(read, store);
    }

    #[test]
    fn test_read_store_manifest_wrong_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");
        std::fs::write(
            &path,
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\nspec:\n  provider: {}\n",
        )
        .unwrap();
        assert!(matches!(
            read_store_manifest(&path),
            Err(Error::Schema { .. })
        ));
    }
}
