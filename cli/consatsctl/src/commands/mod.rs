//! CLI commands.

mod deployments;
mod discovery;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use consats_director::DirectorClient;
use consats_testing::{director_client, Config};
use tracing::debug;

use crate::output::OutputFormat;

/// Deploy and probe Consul clusters the way the acceptance suites do.
#[derive(Debug, Parser)]
#[command(name = "consatsctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Suite configuration file; `CONSATS_*` variables override it.
    #[arg(long, global = true, env = "CONSATS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy a new cluster.
    Deploy(deployments::DeployArgs),

    /// List the VMs of a deployment.
    Vms(deployments::VmsArgs),

    /// Wait until every VM of a deployment is running.
    Wait(deployments::WaitArgs),

    /// Delete a deployment.
    Delete(deployments::DeleteArgs),

    /// Print a generated cluster manifest.
    Manifest(deployments::ManifestArgs),

    /// Resolve a service name.
    Resolve(discovery::ResolveArgs),

    /// Make the test consumer's health check pass or fail.
    HealthCheck(discovery::HealthCheckArgs),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            format: self.format,
            config_path: self.config,
        };

        match self.command {
            Commands::Deploy(args) => deployments::deploy(ctx, args).await,
            Commands::Vms(args) => deployments::vms(ctx, args).await,
            Commands::Wait(args) => deployments::wait(ctx, args).await,
            Commands::Delete(args) => deployments::delete(ctx, args).await,
            Commands::Manifest(args) => deployments::manifest(ctx, args).await,
            Commands::Resolve(args) => discovery::resolve(ctx, args).await,
            Commands::HealthCheck(args) => discovery::health_check(ctx, args).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    config_path: Option<PathBuf>,
}

impl CommandContext {
    /// Load the suite configuration.
    pub fn config(&self) -> Result<Config> {
        debug!(path = ?self.config_path, "Loading configuration");
        match &self.config_path {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("failed to load configuration")
    }

    /// Director client for the configured target.
    pub fn client(&self) -> Result<(Config, DirectorClient)> {
        let config = self.config()?;
        let client = director_client(&config)?;
        Ok((config, client))
    }
}
