//! Shared scenario steps for the acceptance suites.
//!
//! Each scenario is written once against [`Context`] and run two ways: against
//! a real director and agent (`live`, ignored by default) and against
//! in-process fakes (`fake`).

#![allow(dead_code)]

pub mod fake;
pub mod live;

use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _, Result};
use consats_agent::HealthCheckClient;
use consats_director::DeploymentClient;
use consats_discovery::ServiceResolver;
use consats_manifest::{ConsulAgentService, Manifest, ServiceCheck, CONSUMER_JOB, SERVER_JOB};
use consats_poll::Eventually;
use consats_testing::{
    deploy_manifest, vms_from_manifest, wait_for_service, wait_for_service_gone, wait_for_vms,
};
use tracing::info;

/// Collaborators a scenario runs against.
pub struct Context<'a> {
    pub client: &'a dyn DeploymentClient,
    pub resolver: &'a dyn ServiceResolver,
    pub health: &'a HealthCheckClient,
    pub deploy_poll: Eventually,
    pub dns_poll: Eventually,
}

/// Fully qualified service name.
pub fn service_name(service: &str) -> String {
    format!("{service}.service.cf.internal")
}

/// Service name restricted to one tag.
pub fn tagged_service_name(tag: &str, service: &str) -> String {
    format!("{tag}.{service}.service.cf.internal")
}

/// Static IPs of the server job.
pub fn server_ips(manifest: &Manifest) -> Result<Vec<String>> {
    job_ips(manifest, SERVER_JOB)
}

/// Static IPs of the test consumer job.
pub fn consumer_ips(manifest: &Manifest) -> Result<Vec<String>> {
    job_ips(manifest, CONSUMER_JOB)
}

fn job_ips(manifest: &Manifest, job: &str) -> Result<Vec<String>> {
    manifest
        .job(job)
        .map(|j| j.static_ips().to_vec())
        .ok_or_else(|| anyhow!("manifest {} has no {job} job", manifest.name))
}

/// Register `some-service` on the servers with a check script curling the
/// consumer's health check.
pub fn register_operator_service(manifest: &mut Manifest, health_url: &str) -> Result<()> {
    let job = manifest
        .job_mut(SERVER_JOB)
        .ok_or_else(|| anyhow!("no {SERVER_JOB} job"))?;

    job.consul_agent_mut().services = BTreeMap::from([(
        "some-service".to_string(),
        ConsulAgentService {
            name: Some("some-service-name".to_string()),
            check: Some(ServiceCheck {
                name: "some-service-check".to_string(),
                script: format!("curl -f {health_url}"),
                interval: "10s".to_string(),
            }),
            tags: vec!["some-service-tag".to_string()],
        },
    )]);
    Ok(())
}

/// Register the consumer's own service with the release's default check.
pub fn register_default_consumer_service(manifest: &mut Manifest) -> Result<()> {
    let job = manifest
        .job_mut(CONSUMER_JOB)
        .ok_or_else(|| anyhow!("no {CONSUMER_JOB} job"))?;

    let agent = job.consul_agent_mut();
    agent.mode = Some("client".to_string());
    agent.services = BTreeMap::from([(
        "consul-test-consumer".to_string(),
        ConsulAgentService::default(),
    )]);
    Ok(())
}

/// Register two services on every server, both checked against the consumer.
pub fn register_multiple_services(manifest: &mut Manifest, health_url: &str) -> Result<()> {
    let job = manifest
        .job_mut(SERVER_JOB)
        .ok_or_else(|| anyhow!("no {SERVER_JOB} job"))?;

    let check = |name: &str| ServiceCheck {
        name: format!("{name}-check"),
        script: format!("curl -f {health_url}"),
        interval: "1m".to_string(),
    };

    job.consul_agent_mut().services = ["some-service", "some-other-service"]
        .into_iter()
        .map(|name| {
            let service = ConsulAgentService {
                check: Some(check(name)),
                ..Default::default()
            };
            (name.to_string(), service)
        })
        .collect();
    Ok(())
}

/// Submit the modified manifest and wait for every VM to be running again.
pub async fn redeploy(ctx: &Context<'_>, manifest: &Manifest) -> Result<()> {
    deploy_manifest(ctx.client, manifest).await?;
    wait_for_vms(
        ctx.client,
        &manifest.name,
        &vms_from_manifest(manifest),
        ctx.deploy_poll,
    )
    .await
    .context("waiting for VMs after redeploy")?;
    Ok(())
}

/// Resolve, fail the health check, see the service go, recover, resolve again.
pub async fn deregisters_and_recovers(
    ctx: &Context<'_>,
    name: &str,
    expected: &[String],
) -> Result<()> {
    wait_for_service(ctx.resolver, name, expected, ctx.dns_poll)
        .await
        .context("resolving the service address")?;

    info!(name, "Failing the health check");
    ctx.health
        .set_healthy(false)
        .await
        .context("causing the health check to fail")?;

    wait_for_service_gone(ctx.resolver, name, ctx.dns_poll)
        .await
        .context("waiting for the service to be deregistered")?;

    info!(name, "Restoring the health check");
    ctx.health
        .set_healthy(true)
        .await
        .context("causing the health check to succeed")?;

    wait_for_service(ctx.resolver, name, expected, ctx.dns_poll)
        .await
        .context("waiting for the service to be alive")?;
    Ok(())
}

/// Operator-defined check script on the servers.
pub async fn operator_defined_check(ctx: &Context<'_>, manifest: &mut Manifest) -> Result<()> {
    register_operator_service(manifest, ctx.health.url())?;
    redeploy(ctx, manifest).await?;

    let expected = server_ips(manifest)?;
    deregisters_and_recovers(ctx, &service_name("some-service-name"), &expected).await
}

/// Release default check script on the consumer.
pub async fn default_check(ctx: &Context<'_>, manifest: &mut Manifest) -> Result<()> {
    register_default_consumer_service(manifest)?;
    redeploy(ctx, manifest).await?;

    let expected = consumer_ips(manifest)?;
    deregisters_and_recovers(ctx, &service_name("consul-test-consumer"), &expected).await
}

/// Two services on every server, resolved as a whole and per node.
pub async fn multiple_hosts_multiple_services(
    ctx: &Context<'_>,
    manifest: &mut Manifest,
) -> Result<()> {
    register_multiple_services(manifest, ctx.health.url())?;
    redeploy(ctx, manifest).await?;

    let job = manifest
        .job(SERVER_JOB)
        .ok_or_else(|| anyhow!("no {SERVER_JOB} job"))?;
    let ips = job.static_ips().to_vec();

    for service in ["some-service", "some-other-service"] {
        wait_for_service(ctx.resolver, &service_name(service), &ips, ctx.dns_poll)
            .await
            .with_context(|| format!("resolving {service}"))?;

        for (index, ip) in ips.iter().enumerate() {
            let tag = job.node_name(index as u32);
            wait_for_service(
                ctx.resolver,
                &tagged_service_name(&tag, service),
                std::slice::from_ref(ip),
                ctx.dns_poll,
            )
            .await
            .with_context(|| format!("resolving {service} on {tag}"))?;
        }
    }
    Ok(())
}
