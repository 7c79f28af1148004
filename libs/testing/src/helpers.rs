//! Deployment and discovery helpers shared by the suites.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use consats_agent::{AgentStartStopper, ConsulAgentOptions, HealthCheckClient, LocalAgent};
use consats_director::{DeploymentClient, DirectorClient, Vm};
use consats_discovery::{check_service, CatalogResolver, DnsResolver, ServiceResolver};
use consats_manifest::{
    consul_manifest, ConsulManifestConfig, Manifest, CONSUL_DOMAIN, CONSUMER_JOB,
};
use consats_poll::{be_empty, consist_of, Eventually};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, ResolverKind};

/// Director client for the configured target.
pub fn director_client(config: &Config) -> Result<DirectorClient> {
    let director = config.director_config()?;
    DirectorClient::new(&director)
        .with_context(|| format!("failed to create director client for {}", director.target))
}

/// Generate, resolve and deploy a cluster with `count` servers.
///
/// Returns the manifest and the VMs a healthy deployment reports.
pub async fn deploy_consul_with_instance_count<C>(
    count: u32,
    client: &C,
    config: &Config,
) -> Result<(Manifest, Vec<Vm>)>
where
    C: DeploymentClient + ?Sized,
{
    let info = client
        .info()
        .await
        .context("failed to fetch director info")?;
    let (iaas, subnet) = config.target_for(&info)?;

    let manifest = consul_manifest(&ConsulManifestConfig {
        director_uuid: info.uuid,
        name: format!("consul-{}", Uuid::new_v4()),
        iaas,
        subnet,
        instance_count: count,
    })?;

    deploy_manifest(client, &manifest).await?;

    let vms = vms_from_manifest(&manifest);
    Ok((manifest, vms))
}

/// Render, resolve `latest` versions and deploy `manifest`.
pub async fn deploy_manifest<C>(client: &C, manifest: &Manifest) -> Result<u64>
where
    C: DeploymentClient + ?Sized,
{
    let yaml = manifest.to_yaml()?;
    let yaml = client
        .resolve_manifest_versions(&yaml)
        .await
        .context("failed to resolve manifest versions")?;

    let task = client
        .deploy(&yaml)
        .await
        .with_context(|| format!("failed to deploy {}", manifest.name))?;

    info!(deployment = %manifest.name, task, "Deployment finished");
    Ok(task)
}

/// Expected VMs for a manifest: one running VM per instance.
pub fn vms_from_manifest(manifest: &Manifest) -> Vec<Vm> {
    manifest.expected_vms()
}

/// A client agent joining the first `count` static IPs of the deployment.
pub fn new_consul_agent(manifest: &Manifest, count: usize, config: &Config) -> Result<LocalAgent> {
    let ips = manifest.all_static_ips();
    if ips.len() < count {
        bail!(
            "deployment {} has {} static IPs, {} requested",
            manifest.name,
            ips.len(),
            count
        );
    }

    let mut options = ConsulAgentOptions::new(
        config.consul_binary.clone(),
        config.agent_dir.join(&manifest.name),
        ips.into_iter().take(count).collect(),
    );
    options.domain = CONSUL_DOMAIN.to_string();
    options.node_name = format!("runner-{}", manifest.name);

    Ok(LocalAgent::new(options))
}

/// Resolver selected by the suite configuration.
pub fn service_resolver(config: &Config, agent: &LocalAgent) -> Result<Arc<dyn ServiceResolver>> {
    let resolver: Arc<dyn ServiceResolver> = match config.resolver {
        ResolverKind::Dns => Arc::new(DnsResolver::new()),
        ResolverKind::Catalog => Arc::new(CatalogResolver::new(&agent.options().http_url())?),
    };
    Ok(resolver)
}

/// Address of the test consumer VM.
pub fn consumer_ip(manifest: &Manifest) -> Result<IpAddr> {
    let job = manifest
        .job(CONSUMER_JOB)
        .ok_or_else(|| anyhow!("manifest {} has no {} job", manifest.name, CONSUMER_JOB))?;
    let ip = job
        .static_ips()
        .first()
        .ok_or_else(|| anyhow!("{} has no static IP", CONSUMER_JOB))?;
    ip.parse()
        .with_context(|| format!("invalid consumer address {ip}"))
}

/// Health check toggle for the deployment's test consumer.
pub fn consumer_health_check(manifest: &Manifest) -> Result<HealthCheckClient> {
    Ok(HealthCheckClient::for_ip(consumer_ip(manifest)?)?)
}

/// Wait until the deployment reports exactly `expected`.
pub async fn wait_for_vms<C>(
    client: &C,
    deployment: &str,
    expected: &[Vm],
    eventually: Eventually,
) -> Result<Vec<Vm>>
where
    C: DeploymentClient + ?Sized,
{
    let vms = eventually
        .should(
            &format!("VMs of {deployment}"),
            || client.deployment_vms(deployment),
            consist_of(expected.to_vec()),
        )
        .await?;
    Ok(vms)
}

/// Wait until `name` resolves to exactly `expected`.
pub async fn wait_for_service<R>(
    resolver: &R,
    name: &str,
    expected: &[String],
    eventually: Eventually,
) -> Result<Vec<String>>
where
    R: ServiceResolver + ?Sized,
{
    let addrs = eventually
        .should(
            &format!("addresses of {name}"),
            || check_service(resolver, name),
            consist_of(expected.to_vec()),
        )
        .await?;
    Ok(addrs)
}

/// Wait until `name` has no healthy instance.
pub async fn wait_for_service_gone<R>(resolver: &R, name: &str, eventually: Eventually) -> Result<()>
where
    R: ServiceResolver + ?Sized,
{
    eventually
        .should(
            &format!("addresses of {name}"),
            || check_service(resolver, name),
            be_empty(),
        )
        .await?;
    Ok(())
}

/// Delete the deployment unless the test failed, then stop the agent.
///
/// A failed test leaves its deployment in place for inspection.
pub async fn teardown<C, A>(client: &C, manifest: &Manifest, agent: &A, failed: bool) -> Result<()>
where
    C: DeploymentClient + ?Sized,
    A: AgentStartStopper + ?Sized,
{
    let deleted = if failed {
        warn!(deployment = %manifest.name, "Test failed, keeping deployment");
        Ok(())
    } else {
        client
            .delete_deployment(&manifest.name)
            .await
            .with_context(|| format!("failed to delete {}", manifest.name))
    };

    if let Err(e) = agent.stop().await {
        warn!(error = %e, "Failed to stop local agent");
    }

    deleted
}
