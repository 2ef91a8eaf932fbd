//! # secretsctl
//!
//! Command-line interface for declarative secrets provisioning.
//!
//! ## Usage
//!
//! ```bash
//! # Create missing backend secrets and write the ESO manifests
//! secretsctl provision --project my-project
//!
//! # Only regenerate manifests
//! secretsctl generate
//!
//! # Check declaration files without touching any backend
//! secretsctl validate deployments/api/secrets.yaml
//!
//! # Check the cluster's ExternalSecrets and Secrets
//! secretsctl check --output json
//!
//! # One-time GCP setup: API, service account, IAM grant, key, cluster credential
//! secretsctl bootstrap --project my-project
//! ```

mod commands;
mod prompt;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrets_provisioner::config::{SettingsOverrides, SettingsResolver};
use secrets_provisioner::observability::{init_logging, metrics, LogFormat};
use secrets_provisioner::provider::ProviderKind;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Declarative secrets provisioning for Kubernetes
#[derive(Debug, Parser)]
#[command(name = "secretsctl", version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Secret backend (gcp or aws)
    #[arg(long, global = true, value_parser = parse_provider)]
    provider: Option<ProviderKind>,

    /// GCP project ID
    #[arg(long, global = true)]
    project: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    /// ClusterSecretStore name
    #[arg(long, global = true)]
    store_name: Option<String>,

    /// Repository root holding deployments/ and infrastructure/
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory for service account key files
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// Path to the kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write Prometheus metrics in text format to this file on exit
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    /// Never prompt; fail instead of asking for missing input
    #[arg(long, global = true)]
    non_interactive: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create missing backend secrets, then write the ESO manifests
    Provision {
        /// Declaration files (default: discovered under the root)
        paths: Vec<PathBuf>,

        /// Report what would be created without creating anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Write the ClusterSecretStore and ExternalSecret manifests only
    Generate {
        /// Declaration files (default: discovered under the root)
        paths: Vec<PathBuf>,
    },
    /// Validate declaration files without contacting any backend
    Validate {
        /// Declaration files (default: discovered under the root)
        paths: Vec<PathBuf>,
    },
    /// Check that every ExternalSecret in the cluster is synced
    Check {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Set up the backend identity and install its credential in the cluster
    Bootstrap {
        /// Do not create the namespace and credential Secret in the cluster
        #[arg(long)]
        skip_cluster: bool,
    },
    /// Print the JSON Schema of the declaration file format
    Schema,
    /// Show resolved settings and where each value came from
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value.parse()
}

impl GlobalArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            provider: self.provider,
            gcp_project_id: self.project.clone(),
            aws_region: self.region.clone(),
            store_name: self.store_name.clone(),
            root: self.root.clone(),
            key_dir: self.key_dir.clone(),
            kubeconfig: self.kubeconfig.clone(),
            kube_context: self.context.clone(),
            gcp_endpoint: None,
        }
    }

    fn interactive(&self) -> bool {
        !self.non_interactive && std::io::stdin().is_terminal()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Must run before anything that opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cli = Cli::parse();
    init_logging(cli.global.log_format);

    // Only commands that talk to a backend ask for missing settings
    let needs_backend = matches!(
        cli.command,
        Commands::Provision { .. } | Commands::Generate { .. } | Commands::Bootstrap { .. }
    );
    let prompter = prompt::TerminalPrompter;
    let mut resolver = SettingsResolver::new(cli.global.overrides());
    if needs_backend && cli.global.interactive() {
        resolver = resolver.with_prompter(&prompter);
    }

    let result = match cli.command {
        Commands::Provision { paths, dry_run } => {
            commands::provision(&resolver, &cli.global, &paths, dry_run).await
        }
        Commands::Generate { paths } => commands::generate(&resolver, &paths).await,
        Commands::Validate { paths } => commands::validate(&resolver, &paths),
        Commands::Check { output } => commands::check(&resolver, output).await,
        Commands::Bootstrap { skip_cluster } => commands::bootstrap(&resolver, skip_cluster).await,
        Commands::Schema => commands::schema(),
        Commands::Config => commands::config(&resolver),
    };

    if let Some(path) = &cli.global.metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            warn!("Failed to write metrics file: {e}");
        }
    }

    result
}
