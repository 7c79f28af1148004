//! Service resolution and health check commands.

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, ValueEnum};
use consats_agent::HealthCheckClient;
use consats_discovery::{check_service, CatalogResolver, DnsResolver, ServiceResolver};
use consats_poll::Eventually;
use consats_testing::{wait_for_service, wait_for_service_gone};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_success};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Name such as `some-service.service.cf.internal`.
    name: String,

    /// Wait until the name resolves to exactly these addresses.
    #[arg(long)]
    pub(super) expect: Vec<String>,

    /// Wait until the name has no healthy instance.
    #[arg(long, conflicts_with = "expect")]
    gone: bool,

    /// Query an agent's health API instead of the host resolver.
    #[arg(long, env = "CONSATS_AGENT_URL")]
    agent_url: Option<String>,

    /// Time budget for `--expect` and `--gone`.
    #[arg(long, default_value = "1m")]
    timeout: String,

    /// Delay between attempts.
    #[arg(long, default_value = "10s")]
    interval: String,
}

/// Desired health check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HealthState {
    Pass,
    Fail,
}

#[derive(Debug, Args)]
pub struct HealthCheckArgs {
    /// Health check URL, e.g. `http://10.244.4.5:6769/health_check`.
    url: String,

    /// Outcome subsequent checks report.
    #[arg(value_enum)]
    pub(super) state: HealthState,
}

#[derive(Debug, Serialize, Tabled)]
struct AddressRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Address")]
    address: String,
}

fn resolver(args: &ResolveArgs) -> Result<Arc<dyn ServiceResolver>> {
    let resolver: Arc<dyn ServiceResolver> = match &args.agent_url {
        Some(url) => Arc::new(CatalogResolver::new(url)?),
        None => Arc::new(DnsResolver::new()),
    };
    Ok(resolver)
}

pub async fn resolve(ctx: CommandContext, args: ResolveArgs) -> Result<()> {
    let resolver = resolver(&args)?;
    let eventually = Eventually::parse(&args.timeout, &args.interval)?;

    let addresses = if args.gone {
        wait_for_service_gone(resolver.as_ref(), &args.name, eventually).await?;
        Vec::new()
    } else if !args.expect.is_empty() {
        wait_for_service(resolver.as_ref(), &args.name, &args.expect, eventually).await?
    } else {
        check_service(resolver.as_ref(), &args.name).await?
    };

    let rows: Vec<AddressRow> = addresses
        .into_iter()
        .map(|address| AddressRow {
            name: args.name.clone(),
            address,
        })
        .collect();
    print_output(&rows, ctx.format);
    Ok(())
}

pub async fn health_check(ctx: CommandContext, args: HealthCheckArgs) -> Result<()> {
    let client = HealthCheckClient::new(args.url.clone())?;
    let healthy = args.state == HealthState::Pass;

    client.set_healthy(healthy).await?;

    let outcome = if healthy { "pass" } else { "fail" };
    print_success(
        &format!("Health check at {} set to {outcome}", args.url),
        ctx.format,
    );
    Ok(())
}
