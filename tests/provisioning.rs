//! End-to-end provisioning against an in-memory backend
//!
//! Declaration files on disk -> provision -> manifests on disk.

use async_trait::async_trait;
use secrets_provisioner::config::Prompter;
use secrets_provisioner::declaration::{discover, parse_all, SecretKeyDeclaration};
use secrets_provisioner::manifest::{StoreBackend, WriteStatus};
use secrets_provisioner::orchestrator::{generate, provision, KeyOutcome, ProvisionOptions};
use secrets_provisioner::provider::{ProviderKind, SecretBackend};
use secrets_provisioner::value_source::{GeneratedValueSource, SecretValue, ValueSource};
use secrets_provisioner::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct InMemoryBackend {
    secrets: Mutex<BTreeMap<String, Vec<String>>>,
    creates: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    fn with_existing(keys: &[&str]) -> Self {
        let backend = Self::default();
        for key in keys {
            backend
                .secrets
                .lock()
                .unwrap()
                .insert((*key).to_string(), vec!["existing".to_string()]);
        }
        backend
    }

    fn stored(&self, key: &str) -> Option<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(key)
            .and_then(|versions| versions.last().cloned())
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn store_name(&self) -> &str {
        "gcp-secretstore"
    }

    fn store_backend(&self) -> StoreBackend {
        StoreBackend::Gcp {
            project_id: "acme-prod".to_string(),
        }
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, remote_key: &str) -> Result<bool> {
        Ok(self.secrets.lock().unwrap().contains_key(remote_key))
    }

    async fn create(&self, remote_key: &str, value: &SecretValue) -> Result<()> {
        self.creates.lock().unwrap().push(remote_key.to_string());
        self.secrets
            .lock()
            .unwrap()
            .entry(remote_key.to_string())
            .or_default()
            .push(value.expose().to_string());
        Ok(())
    }
}

/// Fails the test if asked for a value
#[derive(Debug)]
struct NoValues;

impl ValueSource for NoValues {
    fn value_for(&self, key: &SecretKeyDeclaration) -> Result<SecretValue> {
        Err(Error::ValueSource {
            remote_key: key.remote_key.clone(),
            message: "no value expected".to_string(),
        })
    }
}

/// Answers every confirmation with `answer` and records the questions
#[derive(Debug)]
struct ScriptedConfirm {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }
}

impl Prompter for ScriptedConfirm {
    fn input(&self, prompt: &str) -> Result<String> {
        panic!("unexpected input prompt: {prompt}")
    }

    fn secret(&self, prompt: &str) -> Result<SecretValue> {
        panic!("unexpected secret prompt: {prompt}")
    }

    fn select(&self, prompt: &str, _items: &[&str]) -> Result<usize> {
        panic!("unexpected select prompt: {prompt}")
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(prompt.to_string());
        Ok(self.answer)
    }
}

fn write_declaration(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

const API_SECRETS: &str = r"
secrets:
  - name: api-credentials
    keys:
      - key: SESSION_SECRET
        remoteKey: api-session-secret
        generate: true
      - key: DATABASE_PASSWORD
        remoteKey: api-database-password
        generate: true
";

const INFRA_SECRETS: &str = r"
secrets:
  - name: grafana-admin
    targetNamespace: monitoring
    keys:
      - key: password
        remoteKey: grafana-admin-password
        generate: true
";

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_declaration(dir.path(), "deployments/api/secrets.yaml", API_SECRETS);
    write_declaration(dir.path(), "infrastructure/secrets.yaml", INFRA_SECRETS);
    dir
}

#[tokio::test]
async fn test_generated_key_is_created_and_referenced_without_plaintext() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();

    let report = provision(
        &backend,
        &GeneratedValueSource::default(),
        &files,
        dir.path(),
        ProvisionOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.created(), 3);
    assert_eq!(backend.creates.lock().unwrap().len(), 3);

    let value = backend.stored("api-session-secret").unwrap();
    assert_eq!(value.len(), 32);

    let manifest = std::fs::read_to_string(
        dir.path()
            .join("deployments/api/external-secrets/api-credentials-externalsecret.yaml"),
    )
    .unwrap();
    assert!(manifest.contains("key: api-session-secret"));
    assert!(manifest.contains("namespace: api"));
    assert!(!manifest.contains(&value));

    let store = std::fs::read_to_string(
        dir.path()
            .join("infrastructure/external-secrets/clustersecretstore.yaml"),
    )
    .unwrap();
    assert!(store.contains("projectID: acme-prod"));

    let infra = std::fs::read_to_string(
        dir.path()
            .join("infrastructure/external-secrets/grafana-admin-externalsecret.yaml"),
    )
    .unwrap();
    assert!(infra.contains("namespace: monitoring"));
}

#[tokio::test]
async fn test_existing_keys_are_reused() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::with_existing(&[
        "api-session-secret",
        "api-database-password",
        "grafana-admin-password",
    ]);

    let report = provision(&backend, &NoValues, &files, dir.path(), ProvisionOptions::default())
        .await
        .unwrap();

    assert!(report.keys.iter().all(|k| k.outcome == KeyOutcome::Existing));
    assert!(backend.creates.lock().unwrap().is_empty());
    assert_eq!(backend.stored("api-session-secret").unwrap(), "existing");
}

#[tokio::test]
async fn test_dry_run_creates_nothing() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();

    let report = provision(
        &backend,
        &NoValues,
        &files,
        dir.path(),
        ProvisionOptions {
            dry_run: true,
            ..ProvisionOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(report.keys.iter().all(|k| k.outcome == KeyOutcome::Planned));
    assert!(report.manifests.is_empty());
    assert!(backend.creates.lock().unwrap().is_empty());
    assert!(!dir.path().join("infrastructure/external-secrets").exists());
}

#[tokio::test]
async fn test_regenerating_unchanged_inputs_is_byte_identical() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();

    let first = generate(&backend, &files, dir.path()).unwrap();
    assert!(first.iter().all(|o| o.status == WriteStatus::Written));
    let before: Vec<Vec<u8>> = first
        .iter()
        .map(|o| std::fs::read(&o.path).unwrap())
        .collect();

    let second = generate(&backend, &files, dir.path()).unwrap();
    assert!(second.iter().all(|o| o.status == WriteStatus::Unchanged));
    let after: Vec<Vec<u8>> = second
        .iter()
        .map(|o| std::fs::read(&o.path).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_conflicting_remote_keys_fail_before_backend_calls() {
    let dir = fixture();
    write_declaration(
        dir.path(),
        "deployments/worker/secrets.yaml",
        r"
secrets:
  - name: worker-credentials
    keys:
      - key: SESSION_SECRET
        remoteKey: api-session-secret
        generate: true
",
    );
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();

    let err = provision(
        &backend,
        &GeneratedValueSource::default(),
        &files,
        dir.path(),
        ProvisionOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    assert!(backend.creates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_manual_key_without_prompt_fails_non_interactive() {
    let dir = tempfile::tempdir().unwrap();
    write_declaration(
        dir.path(),
        "deployments/billing/secrets.yaml",
        r"
secrets:
  - name: stripe
    keys:
      - key: API_KEY
        remoteKey: billing-stripe-api-key
        prompt: Stripe secret key
",
    );
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();

    let err = provision(
        &backend,
        &GeneratedValueSource::default(),
        &files,
        dir.path(),
        ProvisionOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ValueSource { .. }), "got {err:?}");
    assert!(backend.stored("billing-stripe-api-key").is_none());
}

#[tokio::test]
async fn test_manifest_path_collision_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_declaration(
        dir.path(),
        "infrastructure/secrets.yaml",
        r"
secrets:
  - name: registry
    targetNamespace: team-a
    keys:
      - key: TOKEN
        remoteKey: team-a-registry
        generate: true
",
    );
    write_declaration(
        dir.path(),
        "infrastructure/secrets.yml",
        r"
secrets:
  - name: registry
    targetNamespace: team-b
    keys:
      - key: TOKEN
        remoteKey: team-b-registry
        generate: true
",
    );
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    assert_eq!(files.len(), 2);

    let err = generate(&InMemoryBackend::default(), &files, dir.path()).unwrap_err();

    assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    assert!(err.to_string().contains("would overwrite"), "got {err}");
    assert!(!dir
        .path()
        .join("infrastructure/external-secrets/registry-externalsecret.yaml")
        .exists());
}

#[tokio::test]
async fn test_declined_confirmation_changes_nothing() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::with_existing(&["grafana-admin-password"]);
    let confirm = ScriptedConfirm::answering(false);

    let report = provision(
        &backend,
        &GeneratedValueSource::default(),
        &files,
        dir.path(),
        ProvisionOptions {
            confirm: Some(&confirm),
            ..ProvisionOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.planned(), 2);
    assert_eq!(report.created(), 0);
    assert!(report.manifests.is_empty());
    assert!(backend.creates.lock().unwrap().is_empty());
    assert!(!dir.path().join("infrastructure/external-secrets").exists());

    let asked = confirm.asked.lock().unwrap();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].contains("Create 2 missing secret(s)"), "got {}", asked[0]);
}

#[tokio::test]
async fn test_accepted_confirmation_creates_missing_keys() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::default();
    let confirm = ScriptedConfirm::answering(true);

    let report = provision(
        &backend,
        &GeneratedValueSource::default(),
        &files,
        dir.path(),
        ProvisionOptions {
            confirm: Some(&confirm),
            ..ProvisionOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.created(), 3);
    assert_eq!(confirm.asked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_confirmation_when_nothing_is_missing() {
    let dir = fixture();
    let files = parse_all(&discover(dir.path()).unwrap()).unwrap();
    let backend = InMemoryBackend::with_existing(&[
        "api-session-secret",
        "api-database-password",
        "grafana-admin-password",
    ]);
    let confirm = ScriptedConfirm::answering(false);

    let report = provision(
        &backend,
        &NoValues,
        &files,
        dir.path(),
        ProvisionOptions {
            confirm: Some(&confirm),
            ..ProvisionOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(!report.cancelled);
    assert!(confirm.asked.lock().unwrap().is_empty());
    assert!(!report.manifests.is_empty());
}
