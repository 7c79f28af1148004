//! Setup against a real director and a local agent.
//!
//! Requires `CONSATS_CONFIG` or `CONSATS_*` variables naming a director, and
//! an agent binary on the test host.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use consats_agent::{AgentStartStopper, HealthCheckClient, LocalAgent};
use consats_director::DirectorClient;
use consats_discovery::ServiceResolver;
use consats_manifest::Manifest;
use consats_testing::{
    consumer_health_check, deploy_consul_with_instance_count, director_client, init_tracing,
    new_consul_agent, service_resolver, teardown, wait_for_vms, Config,
};

use super::Context;

pub struct LiveSuite {
    pub config: Config,
    pub client: DirectorClient,
    pub agent: LocalAgent,
    pub resolver: Arc<dyn ServiceResolver>,
    pub health: HealthCheckClient,
}

impl LiveSuite {
    /// Deploy `instances` servers, wait for every VM, and start a local agent
    /// joining the first `agent_joins` static IPs.
    pub async fn setup(instances: u32, agent_joins: usize) -> Result<(Self, Manifest)> {
        init_tracing();

        let config = Config::load()?;
        let client = director_client(&config)?;

        let (manifest, vms) = deploy_consul_with_instance_count(instances, &client, &config)
            .await
            .context("initial deploy")?;
        wait_for_vms(&client, &manifest.name, &vms, config.deploy_poll())
            .await
            .context("waiting for initial VMs")?;

        let agent = new_consul_agent(&manifest, agent_joins, &config)?;
        agent.start().await.context("starting local agent")?;

        let resolver = service_resolver(&config, &agent)?;
        let health = consumer_health_check(&manifest)?;

        let suite = Self {
            config,
            client,
            agent,
            resolver,
            health,
        };
        Ok((suite, manifest))
    }

    pub fn context(&self) -> Context<'_> {
        Context {
            client: &self.client,
            resolver: self.resolver.as_ref(),
            health: &self.health,
            deploy_poll: self.config.deploy_poll(),
            dns_poll: self.config.dns_poll(),
        }
    }

    /// Tear down and report the scenario outcome.
    pub async fn finish(self, manifest: &Manifest, outcome: Result<()>) -> Result<()> {
        let cleanup = teardown(&self.client, manifest, &self.agent, outcome.is_err()).await;
        outcome?;
        cleanup
    }
}
