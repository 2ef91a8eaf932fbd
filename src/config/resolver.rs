//! Layered settings resolution.

use super::env::{
    ENV_AWS_REGION, ENV_GCP_ENDPOINT, ENV_GCP_PROJECT_ID, ENV_GOOGLE_CLOUD_PROJECT, ENV_HOME,
    ENV_KEY_DIR, ENV_KUBECONFIG, ENV_PROVIDER, ENV_ROOT, ENV_STORE_NAME,
};
use super::{store_manifest_path, ConfigSource, Environment, Prompter, Resolved, Settings};
use crate::constants::DEFAULT_KEY_DIR;
use crate::error::{Error, Result};
use crate::manifest::{read_store_manifest, ClusterSecretStore, StoreBackend};
use crate::provider::ProviderKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub provider: Option<ProviderKind>,
    pub gcp_project_id: Option<String>,
    pub aws_region: Option<String>,
    pub store_name: Option<String>,
    pub root: Option<PathBuf>,
    pub key_dir: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub kube_context: Option<String>,
    pub gcp_endpoint: Option<String>,
}

/// Builds [`Settings`] from overrides, environment, existing output and prompts
pub struct SettingsResolver<'a> {
    overrides: SettingsOverrides,
    env: Environment,
    prompter: Option<&'a dyn Prompter>,
}

impl std::fmt::Debug for SettingsResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsResolver")
            .field("overrides", &self.overrides)
            .field("interactive", &self.prompter.is_some())
            .finish_non_exhaustive()
    }
}

/// What an existing ClusterSecretStore manifest tells us
struct InferredStore {
    path: PathBuf,
    manifest: ClusterSecretStore,
}

impl<'a> SettingsResolver<'a> {
    #[must_use]
    pub fn new(overrides: SettingsOverrides) -> Self {
        Self {
            overrides,
            env: Environment::capture(),
            prompter: None,
        }
    }

    /// Replace the captured process environment
    #[must_use]
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Allow prompting for settings no other layer provides
    #[must_use]
    pub fn with_prompter(mut self, prompter: &'a dyn Prompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Resolve every setting
    ///
    /// Missing provider-specific values (project ID, region) are not an error here;
    /// the accessors on [`Settings`] report them when a command actually needs them.
    ///
    /// # Errors
    /// `Error::Config` for unparseable values, `Error::ValueSource` if a prompt fails.
    pub fn resolve(&self) -> Result<Settings> {
        let root = self.resolve_root();
        let inferred = self.infer_store(&root.value);
        let provider = self.resolve_provider(inferred.as_ref())?;

        let gcp_project_id = match provider.value {
            ProviderKind::Gcp => self.resolve_gcp_project(inferred.as_ref())?,
            ProviderKind::Aws => None,
        };
        let aws_region = match provider.value {
            ProviderKind::Aws => self.resolve_aws_region(inferred.as_ref())?,
            ProviderKind::Gcp => None,
        };

        let store_name = self.resolve_store_name(provider.value, inferred.as_ref());
        let key_dir = self.resolve_key_dir();
        let kubeconfig = self
            .overrides
            .kubeconfig
            .clone()
            .map(|p| Resolved::new(p, ConfigSource::Explicit))
            .or_else(|| {
                self.env.var(ENV_KUBECONFIG).map(|v| {
                    Resolved::new(PathBuf::from(v), ConfigSource::Environment(ENV_KUBECONFIG))
                })
            });
        let gcp_endpoint = self
            .overrides
            .gcp_endpoint
            .clone()
            .or_else(|| self.env.var(ENV_GCP_ENDPOINT).map(str::to_string));

        let settings = Settings {
            provider,
            gcp_project_id,
            aws_region,
            store_name,
            root,
            key_dir,
            kubeconfig,
            kube_context: self.overrides.kube_context.clone(),
            gcp_endpoint,
        };
        debug!(?settings, "Resolved settings");
        Ok(settings)
    }

    fn resolve_root(&self) -> Resolved<PathBuf> {
        if let Some(root) = &self.overrides.root {
            return Resolved::new(root.clone(), ConfigSource::Explicit);
        }
        if let Some(root) = self.env.var(ENV_ROOT) {
            return Resolved::new(PathBuf::from(root), ConfigSource::Environment(ENV_ROOT));
        }
        Resolved::new(PathBuf::from("."), ConfigSource::Default)
    }

    fn infer_store(&self, root: &Path) -> Option<InferredStore> {
        let path = store_manifest_path(root);
        match read_store_manifest(&path) {
            Ok(Some(manifest)) => Some(InferredStore { path, manifest }),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable ClusterSecretStore manifest");
                None
            }
        }
    }

    fn resolve_provider(&self, inferred: Option<&InferredStore>) -> Result<Resolved<ProviderKind>> {
        if let Some(kind) = self.overrides.provider {
            return Ok(Resolved::new(kind, ConfigSource::Explicit));
        }
        if let Some(value) = self.env.var(ENV_PROVIDER) {
            let kind = value
                .parse::<ProviderKind>()
                .map_err(|e| Error::Config(format!("{ENV_PROVIDER}: {e}")))?;
            return Ok(Resolved::new(kind, ConfigSource::Environment(ENV_PROVIDER)));
        }
        if let Some(store) = inferred {
            if let Some(backend) = store.manifest.backend() {
                return Ok(Resolved::new(
                    backend.kind(),
                    ConfigSource::Inferred(store.path.clone()),
                ));
            }
        }
        if let Some(prompter) = self.prompter {
            let items: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
            let index = prompter.select("Secret backend", &items)?;
            if let Some(kind) = ProviderKind::ALL.get(index) {
                return Ok(Resolved::new(*kind, ConfigSource::Prompt));
            }
        }
        Ok(Resolved::new(ProviderKind::default(), ConfigSource::Default))
    }

    fn resolve_gcp_project(&self, inferred: Option<&InferredStore>) -> Result<Option<Resolved<String>>> {
        if let Some(project) = &self.overrides.gcp_project_id {
            return Ok(Some(Resolved::new(project.clone(), ConfigSource::Explicit)));
        }
        if let Some((var, project)) = self
            .env
            .first_of(&[ENV_GCP_PROJECT_ID, ENV_GOOGLE_CLOUD_PROJECT])
        {
            return Ok(Some(Resolved::new(
                project.to_string(),
                ConfigSource::Environment(var),
            )));
        }
        if let Some(store) = inferred {
            if let Some(StoreBackend::Gcp { project_id }) = store.manifest.backend() {
                return Ok(Some(Resolved::new(
                    project_id,
                    ConfigSource::Inferred(store.path.clone()),
                )));
            }
        }
        self.prompt_for("GCP project ID")
    }

    fn resolve_aws_region(&self, inferred: Option<&InferredStore>) -> Result<Option<Resolved<String>>> {
        if let Some(region) = &self.overrides.aws_region {
            return Ok(Some(Resolved::new(region.clone(), ConfigSource::Explicit)));
        }
        if let Some(region) = self.env.var(ENV_AWS_REGION) {
            return Ok(Some(Resolved::new(
                region.to_string(),
                ConfigSource::Environment(ENV_AWS_REGION),
            )));
        }
        if let Some(store) = inferred {
            if let Some(StoreBackend::Aws { region }) = store.manifest.backend() {
                return Ok(Some(Resolved::new(
                    region,
                    ConfigSource::Inferred(store.path.clone()),
                )));
            }
        }
        self.prompt_for("AWS region")
    }

    fn prompt_for(&self, prompt: &str) -> Result<Option<Resolved<String>>> {
        let Some(prompter) = self.prompter else {
            return Ok(None);
        };
        let value = prompter.input(prompt)?;
        let value = value.trim();
        Ok((!value.is_empty()).then(|| Resolved::new(value.to_string(), ConfigSource::Prompt)))
    }

    fn resolve_store_name(
        &self,
        provider: ProviderKind,
        inferred: Option<&InferredStore>,
    ) -> Resolved<String> {
        if let Some(name) = &self.overrides.store_name {
            return Resolved::new(name.clone(), ConfigSource::Explicit);
        }
        if let Some(name) = self.env.var(ENV_STORE_NAME) {
            return Resolved::new(name.to_string(), ConfigSource::Environment(ENV_STORE_NAME));
        }
        if let Some(store) = inferred {
            let same_backend = store
                .manifest
                .backend()
                .is_some_and(|b| b.kind() == provider);
            if same_backend && !store.manifest.metadata.name.is_empty() {
                return Resolved::new(
                    store.manifest.metadata.name.clone(),
                    ConfigSource::Inferred(store.path.clone()),
                );
            }
        }
        Resolved::new(provider.default_store_name().to_string(), ConfigSource::Default)
    }

    fn resolve_key_dir(&self) -> Resolved<PathBuf> {
        if let Some(dir) = &self.overrides.key_dir {
            return Resolved::new(dir.clone(), ConfigSource::Explicit);
        }
        if let Some(dir) = self.env.var(ENV_KEY_DIR) {
            return Resolved::new(PathBuf::from(dir), ConfigSource::Environment(ENV_KEY_DIR));
        }
        let dir = self
            .env
            .var(ENV_HOME)
            .map_or_else(|| PathBuf::from(DEFAULT_KEY_DIR), |home| Path::new(home).join(DEFAULT_KEY_DIR));
        Resolved::new(dir, ConfigSource::Default)
    }
}
