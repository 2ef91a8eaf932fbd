//! # Declaration Parser
//!
//! Loads `secrets.yaml` files, validates them and infers deployment metadata from the
//! file location.
//!
//! Location rules:
//! - `.../deployments/<name>/secrets.yaml` → deployment `<name>`, namespace `<name>`
//! - `.../infrastructure/secrets.yaml` → deployment `infrastructure`, no namespace
//! - anything else → deployment and namespace are the containing directory's name

use super::{validate_file, DeclarationFile, SecretDeclaration, SecretsConfig};
use crate::constants::{
    DECLARATION_FILE_NAMES, DEPLOYMENTS_DIR, FALLBACK_NAMESPACE, INFRASTRUCTURE_DIR,
};
use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Parse and validate a declaration file
///
/// # Errors
/// `Error::Io` if the file cannot be read, `Error::Schema` if its content does not match
/// the declaration schema.
pub fn parse(path: &Path) -> Result<DeclarationFile> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    // Inference needs the real directory names for `./secrets.yaml` or `sub/../secrets.yaml`
    let absolute = std::fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
    let file = parse_str(&content, &absolute)?;
    debug!(
        path = %absolute.display(),
        deployment = %file.deployment_name,
        secrets = file.config.secrets.len(),
        "Parsed declaration file"
    );
    Ok(file)
}

/// Parse declaration content that was read from `path`
///
/// Pure: the same bytes and path always produce an equal `DeclarationFile`.
///
/// # Errors
/// `Error::Schema` if the content does not match the declaration schema.
pub fn parse_str(content: &str, path: &Path) -> Result<DeclarationFile> {
    let config: SecretsConfig =
        serde_yaml::from_str(content).map_err(|e| Error::schema(path, e.to_string()))?;

    let (deployment_name, default_namespace) = infer_deployment(path);
    let file = DeclarationFile {
        path: path.to_path_buf(),
        deployment_name,
        default_namespace,
        config,
    };
    validate_file(&file)?;
    Ok(file)
}

/// Parse several files, failing on the first invalid one
///
/// # Errors
/// The first `Error::Io` or `Error::Schema` encountered.
pub fn parse_all(paths: &[PathBuf]) -> Result<Vec<DeclarationFile>> {
    paths.iter().map(|p| parse(p)).collect()
}

/// Infer `(deployment_name, default_namespace)` from a declaration file path
#[must_use]
pub fn infer_deployment(path: &Path) -> (String, Option<String>) {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let dir_name = dir.file_name().and_then(OsStr::to_str).unwrap_or_default();
    let parent_name = dir
        .parent()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str);

    if parent_name == Some(DEPLOYMENTS_DIR) {
        return (dir_name.to_string(), Some(dir_name.to_string()));
    }

    if dir_name == INFRASTRUCTURE_DIR {
        return (INFRASTRUCTURE_DIR.to_string(), None);
    }

    let namespace = (!dir_name.is_empty()).then(|| dir_name.to_string());
    (dir_name.to_string(), namespace)
}

/// Resolve the namespace a secret lands in
///
/// Priority: explicit `targetNamespace` > file default namespace > `default`.
#[must_use]
pub fn resolve_target_namespace<'a>(
    secret: &'a SecretDeclaration,
    file_default_namespace: Option<&'a str>,
) -> &'a str {
    secret
        .target_namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .or(file_default_namespace.filter(|ns| !ns.is_empty()))
        .unwrap_or(FALLBACK_NAMESPACE)
}

/// Find declaration files under `root`
///
/// Looks for `deployments/<name>/secrets.yaml` and `infrastructure/secrets.yaml`.
/// Results are sorted so repeated runs process files in the same order.
///
/// # Errors
/// `Error::Io` if `root` cannot be walked.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, std::io::Error::other(e.to_string()))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let is_declaration = entry
            .file_name()
            .to_str()
            .is_some_and(|name| DECLARATION_FILE_NAMES.contains(&name));
        if !is_declaration {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let components: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let wanted = matches!(
            components.as_slice(),
            [DEPLOYMENTS_DIR, _, _] | [INFRASTRUCTURE_DIR, _]
        );
        if wanted {
            found.push(entry.path().to_path_buf());
        }
    }

    info!(root = %root.display(), count = found.len(), "Discovered declaration files");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r"
secrets:
  - name: api-credentials
    keys:
      - key: DATABASE_PASSWORD
        remoteKey: example-staging-database-password
        generate: true
      - key: STRIPE_API_KEY
        remoteKey: example-staging-stripe-api-key
        prompt: Stripe API key
";

    #[test]
    fn test_parse_is_pure() {
        let path = Path::new("/repo/deployments/example-staging/secrets.yaml");
        let first = parse_str(VALID, path).unwrap();
        let second = parse_str(VALID, path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.config.secrets[0].keys.len(), 2);
    }

    #[test]
    fn test_infer_deployment_directory() {
        let (name, ns) = infer_deployment(Path::new("/repo/deployments/example-staging/secrets.yaml"));
        assert_eq!(name, "example-staging");
        assert_eq!(ns.as_deref(), Some("example-staging"));
    }

    #[test]
    fn test_infer_infrastructure_directory() {
        let (name, ns) = infer_deployment(Path::new("/repo/infrastructure/secrets.yaml"));
        assert_eq!(name, "infrastructure");
        assert_eq!(ns, None);
    }

    #[test]
    fn test_infer_other_directory_falls_back_to_directory_name() {
        let (name, ns) = infer_deployment(Path::new("/repo/tools/secrets.yaml"));
        assert_eq!(name, "tools");
        assert_eq!(ns.as_deref(), Some("tools"));
    }

    #[test]
    fn test_resolve_target_namespace_priority() {
        let mut secret = SecretDeclaration {
            name: "db".to_string(),
            target_namespace: Some("explicit".to_string()),
            keys: vec![],
        };
        assert_eq!(resolve_target_namespace(&secret, Some("inferred")), "explicit");

        secret.target_namespace = None;
        assert_eq!(resolve_target_namespace(&secret, Some("inferred")), "inferred");
        assert_eq!(resolve_target_namespace(&secret, None), FALLBACK_NAMESPACE);
    }

    #[test]
    fn test_empty_keys_is_schema_error() {
        let content = "secrets:\n  - name: empty\n    keys: []\n";
        let err = parse_str(content, Path::new("/repo/infrastructure/secrets.yaml")).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    }

    #[test]
    fn test_missing_remote_key_is_schema_error() {
        let content = "secrets:\n  - name: broken\n    keys:\n      - key: TOKEN\n";
        let err = parse_str(content, Path::new("/repo/infrastructure/secrets.yaml")).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    }

    #[test]
    fn test_wrong_type_is_schema_error() {
        let content = "secrets:\n  - name: broken\n    keys:\n      - key: TOKEN\n        remoteKey: token\n        generate: sometimes\n";
        let err = parse_str(content, Path::new("/repo/infrastructure/secrets.yaml")).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    }

    #[test]
    fn test_unreadable_file_is_io_error() {
        let err = parse(Path::new("/nonexistent/deployments/x/secrets.yaml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "got {err:?}");
    }

    #[test]
    fn test_parse_resolves_parent_components() {
        let root = tempfile::tempdir().unwrap();
        let deployment = root.path().join("deployments/api");
        std::fs::create_dir_all(deployment.join("sub")).unwrap();
        std::fs::write(deployment.join("secrets.yaml"), VALID).unwrap();

        let file = parse(&deployment.join("sub/../secrets.yaml")).unwrap();

        assert_eq!(file.deployment_name, "api");
        assert_eq!(file.default_namespace.as_deref(), Some("api"));
        assert_eq!(file.namespace_for(&file.config.secrets[0]), "api");
    }

    #[test]
    fn test_discover_finds_deployment_and_infrastructure_files() {
        let root = tempfile::tempdir().unwrap();
        let files = [
            "deployments/b-app/secrets.yaml",
            "deployments/a-app/secrets.yml",
            "infrastructure/secrets.yaml",
            "deployments/a-app/nested/secrets.yaml",
            "other/secrets.yaml",
        ];
        for file in files {
            let path = root.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, VALID).unwrap();
        }

        let found = discover(root.path()).unwrap();
        let relative: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("deployments/a-app/secrets.yml"),
                PathBuf::from("deployments/b-app/secrets.yaml"),
                PathBuf::from("infrastructure/secrets.yaml"),
            ]
        );
    }
}
