use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ProviderConfig;
use crate::diagnostics::Diagnostics;
use crate::keyfactor::{HttpKeyfactorClient, KeyfactorApi};
use crate::resources::{
    CertificateResource, DeploymentResource, IdentityResource, Resource, RoleResource,
    StoreResource,
};

#[derive(Parser)]
#[command(
    name = "keyfactor-provider",
    about = "Apply Keyfactor Command resource documents (create, read, update, delete)",
    version = "0.1.0"
)]
pub struct Cli {
    /// Keyfactor Command hostname.
    #[arg(long, global = true, env = "KEYFACTOR_HOSTNAME")]
    pub hostname: Option<String>,
    /// API user, optionally as DOMAIN\user.
    #[arg(long, global = true, env = "KEYFACTOR_USERNAME")]
    pub username: Option<String>,
    #[arg(long, global = true, env = "KEYFACTOR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Application key sent as x-keyfactor-appkey.
    #[arg(long, global = true, env = "KEYFACTOR_APPKEY", hide_env_values = true)]
    pub appkey: Option<String>,
    #[arg(long, global = true, env = "KEYFACTOR_DOMAIN")]
    pub domain: Option<String>,
    /// Accept invalid TLS certificates.
    #[arg(long, global = true, env = "KEYFACTOR_DEV_MODE")]
    pub dev_mode: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Certificate,
    CertificateDeployment,
    Store,
    SecurityIdentity,
    SecurityRole,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the resource described by a configuration document.
    Create {
        #[arg(long, value_enum)]
        resource: ResourceKind,
        /// Planned state (JSON).
        #[arg(long)]
        config: PathBuf,
    },
    /// Refresh a state document from Keyfactor.
    Read {
        #[arg(long, value_enum)]
        resource: ResourceKind,
        #[arg(long)]
        state: PathBuf,
    },
    /// Update a resource in place.
    Update {
        #[arg(long, value_enum)]
        resource: ResourceKind,
        /// Prior state (JSON).
        #[arg(long)]
        state: PathBuf,
        /// Planned state (JSON).
        #[arg(long)]
        config: PathBuf,
    },
    /// Delete the resource a state document describes.
    Delete {
        #[arg(long, value_enum)]
        resource: ResourceKind,
        #[arg(long)]
        state: PathBuf,
    },
}

impl Commands {
    pub fn resource(&self) -> ResourceKind {
        match self {
            Commands::Create { resource, .. }
            | Commands::Read { resource, .. }
            | Commands::Update { resource, .. }
            | Commands::Delete { resource, .. } => *resource,
        }
    }
}

impl Cli {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            appkey: self.appkey.clone(),
            domain: self.domain.clone(),
            dev_mode: self.dev_mode.then_some(true),
        }
    }
}

/// Result of one lifecycle call as printed to stdout.
#[derive(Debug, Serialize)]
pub struct Outcome {
    /// New state; `null` when the object is gone or the call failed.
    pub state: Option<Value>,
    pub diagnostics: Diagnostics,
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn apply<R: Resource>(
    resource: &R,
    api: &dyn KeyfactorApi,
    command: &Commands,
) -> Result<Outcome> {
    let mut diags = Diagnostics::new();
    let state = match command {
        Commands::Create { config, .. } => {
            let planned: R::State = load(config)?;
            resource.create(api, &planned, &mut diags).await
        }
        Commands::Read { state, .. } => {
            let current: R::State = load(state)?;
            resource.read(api, &current, &mut diags).await
        }
        Commands::Update { state, config, .. } => {
            let prior: R::State = load(state)?;
            let planned: R::State = load(config)?;
            resource.update(api, &prior, &planned, &mut diags).await
        }
        Commands::Delete { state, .. } => {
            let current: R::State = load(state)?;
            resource.delete(api, &current, &mut diags).await;
            None
        }
    };
    Ok(Outcome {
        state: state.map(serde_json::to_value).transpose()?,
        diagnostics: diags,
    })
}

/// Runs one lifecycle verb against `api`.
pub async fn dispatch(api: &dyn KeyfactorApi, command: &Commands) -> Result<Outcome> {
    match command.resource() {
        ResourceKind::Certificate => apply(&CertificateResource, api, command).await,
        ResourceKind::CertificateDeployment => apply(&DeploymentResource, api, command).await,
        ResourceKind::Store => apply(&StoreResource, api, command).await,
        ResourceKind::SecurityIdentity => apply(&IdentityResource, api, command).await,
        ResourceKind::SecurityRole => apply(&RoleResource, api, command).await,
    }
}

/// Parses arguments, runs the command and prints the outcome as JSON.
/// Returns false when the outcome carries error diagnostics.
pub async fn run_cli() -> Result<bool> {
    let cli = Cli::parse();
    let settings = cli
        .provider_config()
        .merge(ProviderConfig::from_env())
        .resolve()?;
    info!("Using Keyfactor Command at {}", settings.base_url);
    let client = HttpKeyfactorClient::new(&settings)?;

    let outcome = dispatch(&client, &cli.command).await?;
    for diagnostic in outcome.diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(!outcome.diagnostics.has_errors())
}
