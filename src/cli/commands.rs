//! Command implementations. Each returns the process exit code.

use crate::prompt::TerminalPrompter;
use crate::{GlobalArgs, OutputFormat};
use anyhow::{bail, Context, Result};
use secrets_provisioner::bootstrap::{
    Bootstrapper, GcpIdentityPlatform, KeyStore, KubeCredentialInstaller,
};
use secrets_provisioner::cluster::{kube_client, validate_cluster, KubeInspector};
use secrets_provisioner::config::{Prompter, Settings, SettingsResolver};
use secrets_provisioner::declaration::{discover, parse_all, validate_set, DeclarationFile, SecretsConfig};
use secrets_provisioner::manifest::{write_cluster_secret_store, ClusterSecretStore, WriteOutcome, WriteStatus};
use secrets_provisioner::orchestrator::{self, ProvisionOptions};
use secrets_provisioner::provider::gcp::GcpAuth;
use secrets_provisioner::provider::{build_backend, ProviderKind};
use secrets_provisioner::value_source::{GeneratedValueSource, PromptValueSource, ValueSource};
use secrets_provisioner::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

fn resolve(resolver: &SettingsResolver<'_>) -> Result<Settings> {
    resolver.resolve().context("Failed to resolve settings")
}

/// Parse the given files, or every declaration file under the root
fn load_declarations(root: &Path, paths: &[PathBuf]) -> Result<Vec<DeclarationFile>> {
    let paths = if paths.is_empty() {
        let found = discover(root)
            .with_context(|| format!("Failed to discover declarations under {}", root.display()))?;
        if found.is_empty() {
            bail!(
                "No secrets.yaml files found under {}/deployments or {}/infrastructure",
                root.display(),
                root.display()
            );
        }
        found
    } else {
        paths.to_vec()
    };

    let files = parse_all(&paths)?;
    validate_set(&files)?;
    Ok(files)
}

fn print_outcomes(outcomes: &[WriteOutcome]) {
    for outcome in outcomes {
        let mark = match outcome.status {
            WriteStatus::Written => "✔",
            WriteStatus::Unchanged => "=",
        };
        println!("{mark} {} ({})", outcome.path.display(), outcome.status);
    }
}

pub async fn provision(
    resolver: &SettingsResolver<'_>,
    global: &GlobalArgs,
    paths: &[PathBuf],
    dry_run: bool,
) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    let files = load_declarations(settings.root(), paths)?;
    let backend = build_backend(&settings).await?;

    let interactive = global.interactive();
    let values: Box<dyn ValueSource> = if interactive {
        Box::new(PromptValueSource::new(TerminalPrompter))
    } else {
        Box::new(GeneratedValueSource::default())
    };
    let confirmer = TerminalPrompter;

    let report = orchestrator::provision(
        backend.as_ref(),
        values.as_ref(),
        &files,
        settings.root(),
        ProvisionOptions {
            dry_run,
            confirm: interactive.then_some(&confirmer as &dyn Prompter),
        },
    )
    .await
    .context("Provisioning failed")?;

    if report.cancelled {
        println!("Cancelled: {} secret(s) not created", report.planned());
        return Ok(ExitCode::FAILURE);
    }

    for key in &report.keys {
        println!(
            "{}/{} {} -> {}: {}",
            key.namespace, key.secret, key.key, key.remote_key, key.outcome
        );
    }
    print_outcomes(&report.manifests);
    info!(created = report.created(), total = report.keys.len(), "Provisioning complete");
    Ok(ExitCode::SUCCESS)
}

pub async fn generate(resolver: &SettingsResolver<'_>, paths: &[PathBuf]) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    let files = load_declarations(settings.root(), paths)?;
    let backend = build_backend(&settings).await?;

    let outcomes = orchestrator::generate(backend.as_ref(), &files, settings.root())
        .context("Manifest generation failed")?;
    print_outcomes(&outcomes);
    Ok(ExitCode::SUCCESS)
}

pub fn validate(resolver: &SettingsResolver<'_>, paths: &[PathBuf]) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    let files = load_declarations(settings.root(), paths)?;

    for file in &files {
        let keys: usize = file.config.secrets.iter().map(|s| s.keys.len()).sum();
        println!(
            "✔ {} ({} secrets, {keys} keys, deployment {})",
            file.path.display(),
            file.config.secrets.len(),
            file.deployment_name
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn check(resolver: &SettingsResolver<'_>, output: OutputFormat) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    let client = kube_client(settings.kubeconfig(), settings.kube_context.as_deref()).await?;
    let report = validate_cluster(&KubeInspector::new(client)).await?;

    match output {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn bootstrap(resolver: &SettingsResolver<'_>, skip_cluster: bool) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    if settings.provider.value != ProviderKind::Gcp {
        return Err(Error::Unsupported {
            provider: settings.provider.value.to_string(),
            operation: "bootstrap".to_string(),
        }
        .into());
    }
    let project_id = settings.gcp_project_id()?;

    let http_client = reqwest::Client::new();
    let auth = Arc::new(GcpAuth::new(http_client.clone(), None));
    let platform = GcpIdentityPlatform::new(&http_client, &auth, project_id);
    let key_store = KeyStore::new(settings.key_dir.value.clone());

    let installer = if skip_cluster {
        None
    } else {
        let client = kube_client(settings.kubeconfig(), settings.kube_context.as_deref()).await?;
        Some(KubeCredentialInstaller::new(client))
    };

    let mut bootstrapper = Bootstrapper::new(&platform, key_store, project_id);
    if let Some(installer) = &installer {
        bootstrapper = bootstrapper.with_installer(installer);
    }
    let report = bootstrapper.run().await.context("Bootstrap failed")?;

    for (step, outcome) in &report.steps {
        println!("{step}: {outcome}");
    }
    println!("Service account: {}", report.service_account);
    println!("Key file: {}", report.key_path.display());

    let store = ClusterSecretStore::new(settings.store_name(), &settings.store_backend()?);
    print_outcomes(&[write_cluster_secret_store(settings.root(), &store)?]);
    Ok(ExitCode::SUCCESS)
}

pub fn schema() -> Result<ExitCode> {
    let schema = schemars::schema_for!(SecretsConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(ExitCode::SUCCESS)
}

pub fn config(resolver: &SettingsResolver<'_>) -> Result<ExitCode> {
    let settings = resolve(resolver)?;
    for entry in settings.explain() {
        match (entry.value, entry.source) {
            (Some(value), Some(source)) => println!("{:<14} {value} ({source})", entry.name),
            _ => println!("{:<14} (unset)", entry.name),
        }
    }
    Ok(ExitCode::SUCCESS)
}
