//! Deployment commands.

use anyhow::Result;
use clap::Args;
use consats_director::{DeploymentClient, VmInfo};
use consats_manifest::{consul_manifest, ConsulManifestConfig, Vm};
use consats_poll::Eventually;
use consats_testing::{deploy_consul_with_instance_count, wait_for_vms};
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use crate::output::{print_info, print_output, print_success};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Number of server instances.
    #[arg(long, default_value_t = 1)]
    instances: u32,

    /// Return once the deploy task finishes instead of waiting for VMs.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Debug, Args)]
pub struct VmsArgs {
    /// Deployment name.
    deployment: String,
}

#[derive(Debug, Args)]
pub struct WaitArgs {
    /// Deployment name.
    deployment: String,

    /// Number of VMs expected to be running.
    #[arg(long)]
    vms: usize,

    /// Time budget, e.g. `5m`.
    #[arg(long, default_value = "1m")]
    timeout: String,

    /// Delay between attempts.
    #[arg(long, default_value = "10s")]
    interval: String,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Deployment name.
    deployment: String,
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Number of server instances.
    #[arg(long, default_value_t = 1)]
    instances: u32,

    /// Deployment name; generated when omitted.
    #[arg(long)]
    name: Option<String>,
}

/// One VM of a deployment.
#[derive(Debug, Serialize, Tabled)]
struct VmRow {
    #[tabled(rename = "Instance")]
    instance: String,

    #[tabled(rename = "State")]
    state: String,

    #[tabled(rename = "IPs")]
    ips: String,

    #[tabled(rename = "VM CID")]
    vm_cid: String,
}

impl From<&VmInfo> for VmRow {
    fn from(vm: &VmInfo) -> Self {
        Self {
            instance: vm.instance(),
            state: vm.job_state.clone(),
            ips: vm.ips.join(", "),
            vm_cid: vm.vm_cid.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Result of a deploy.
#[derive(Debug, Serialize, Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Deployment")]
    name: String,

    #[tabled(rename = "Servers")]
    servers: String,

    #[tabled(rename = "Consumer")]
    consumer: String,

    #[tabled(rename = "VMs")]
    vms: usize,
}

pub async fn deploy(ctx: CommandContext, args: DeployArgs) -> Result<()> {
    let (config, client) = ctx.client()?;

    print_info(&format!("Deploying {} server(s)", args.instances));
    let (manifest, vms) = deploy_consul_with_instance_count(args.instances, &client, &config).await?;

    if !args.no_wait {
        wait_for_vms(&client, &manifest.name, &vms, config.deploy_poll()).await?;
    }

    let servers = manifest.server_ips();
    let consumer = manifest
        .all_static_ips()
        .into_iter()
        .filter(|ip| !servers.contains(ip))
        .collect::<Vec<_>>();

    let row = DeploymentRow {
        name: manifest.name.clone(),
        servers: servers.join(", "),
        consumer: consumer.join(", "),
        vms: vms.len(),
    };
    print_output(&[row], ctx.format);
    Ok(())
}

pub async fn vms(ctx: CommandContext, args: VmsArgs) -> Result<()> {
    let (_, client) = ctx.client()?;

    let vms = client.deployment_vm_details(&args.deployment).await?;
    let rows: Vec<VmRow> = vms.iter().map(VmRow::from).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

pub async fn wait(ctx: CommandContext, args: WaitArgs) -> Result<()> {
    let (_, client) = ctx.client()?;
    let eventually = Eventually::parse(&args.timeout, &args.interval)?;

    let expected = vec![Vm::running(); args.vms];
    wait_for_vms(&client, &args.deployment, &expected, eventually).await?;

    print_success(
        &format!("{} VM(s) of {} running", args.vms, args.deployment),
        ctx.format,
    );
    Ok(())
}

pub async fn delete(ctx: CommandContext, args: DeleteArgs) -> Result<()> {
    let (_, client) = ctx.client()?;

    client.delete_deployment(&args.deployment).await?;
    print_success(&format!("Deleted {}", args.deployment), ctx.format);
    Ok(())
}

pub async fn manifest(ctx: CommandContext, args: ManifestArgs) -> Result<()> {
    let (config, client) = ctx.client()?;

    let info = client.info().await?;
    let (iaas, subnet) = config.target_for(&info)?;

    let manifest = consul_manifest(&ConsulManifestConfig {
        director_uuid: info.uuid,
        name: args
            .name
            .unwrap_or_else(|| format!("consul-{}", Uuid::new_v4())),
        iaas,
        subnet,
        instance_count: args.instances,
    })?;

    let yaml = client.resolve_manifest_versions(&manifest.to_yaml()?).await?;
    print!("{yaml}");
    Ok(())
}
