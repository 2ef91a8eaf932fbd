//! Local storage for service account key files.
//!
//! Keys live at `<key dir>/external-secrets-<project>.json` with mode 0600. An existing
//! file is reused so at most one key is created per identity.

use crate::error::{Error, Result};
use crate::value_source::SecretValue;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("external-secrets-{project_id}.json"))
    }

    /// Existing key for `project_id`, if any
    ///
    /// # Errors
    /// `Error::Io` if the file exists but cannot be read.
    pub fn load(&self, project_id: &str) -> Result<Option<SecretValue>> {
        let path = self.path_for(project_id);
        match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => Ok(Some(SecretValue::new(content))),
            Ok(_) => {
                debug!(path = %path.display(), "Ignoring empty key file");
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Write `key` for `project_id`, readable by the owner only
    ///
    /// # Errors
    /// `Error::Io` if the directory or file cannot be written.
    pub fn save(&self, project_id: &str, key: &SecretValue) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.path_for(project_id);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path).map_err(|e| Error::io(&path, e))?;
        file.write_all(key.as_bytes())
            .map_err(|e| Error::io(&path, e))?;

        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::io(&path, e))?;
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(store.load("acme").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("keys"));

        let path = store.save("acme", &SecretValue::new("{\"k\":1}")).unwrap();
        assert_eq!(path, dir.path().join("keys/external-secrets-acme.json"));
        assert_eq!(store.load("acme").unwrap().unwrap().expose(), "{\"k\":1}");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
