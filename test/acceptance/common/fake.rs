//! In-process stand-ins for the director, the agent and the cluster catalog.
//!
//! The director is a wiremock server speaking the task-based API. The catalog
//! is a [`MemoryResolver`] kept in sync with the last deployed manifest: every
//! registered service resolves while the test consumer's health check passes
//! and disappears while it fails, which is what the deployed agents do.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use consats_agent::{AgentStartStopper, HealthCheckClient, MockAgent};
use consats_director::DirectorClient;
use consats_discovery::MemoryResolver;
use consats_manifest::Manifest;
use consats_test_consumer::{serve, HealthState, HEALTH_CHECK_PATH};
use consats_testing::{
    deploy_consul_with_instance_count, director_client, init_tracing, teardown, wait_for_vms,
    Config,
};
use serde_json::json;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{service_name, tagged_service_name, Context};

const DEPLOY_TASK: u64 = 1;
const DELETE_TASK: u64 = 2;
const VMS_STARTING_TASK: u64 = 3;
const VMS_RUNNING_TASK: u64 = 4;

const SYNC_INTERVAL: Duration = Duration::from_millis(50);

fn task_redirect(server: &MockServer, id: u64) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", format!("{}/tasks/{}", server.uri(), id))
}

fn vm_lines(count: usize, state: &str) -> String {
    (0..count)
        .map(|index| json!({"job_name": "consul_z1", "index": index, "job_state": state}).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mount a director serving a deployment of `vm_count` VMs.
///
/// The first VM listing reports the VMs as starting; later ones as running.
async fn start_director(vm_count: usize) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "bosh-lite",
            "uuid": "fake-director-uuid",
            "version": "1.3262.0",
            "cpi": "warden_cpi",
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "consul", "release_versions": [{"version": "98"}, {"version": "99"}]},
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/stemcells"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "bosh-warden-boshlite-ubuntu-trusty-go_agent", "version": "3147"},
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/deployments"))
        .respond_with(task_redirect(&server, DEPLOY_TASK))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/deployments/[^/]+$"))
        .respond_with(task_redirect(&server, DELETE_TASK))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/deployments/[^/]+/vms$"))
        .respond_with(task_redirect(&server, VMS_STARTING_TASK))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/deployments/[^/]+/vms$"))
        .respond_with(task_redirect(&server, VMS_RUNNING_TASK))
        .mount(&server)
        .await;

    for id in [DEPLOY_TASK, DELETE_TASK, VMS_STARTING_TASK, VMS_RUNNING_TASK] {
        Mock::given(method("GET"))
            .and(path(format!("/tasks/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "state": "done",
                "description": "fake task",
            })))
            .mount(&server)
            .await;
    }

    for (id, state) in [(VMS_STARTING_TASK, "starting"), (VMS_RUNNING_TASK, "running")] {
        Mock::given(method("GET"))
            .and(path(format!("/tasks/{id}/output")))
            .and(query_param("type", "result"))
            .respond_with(ResponseTemplate::new(200).set_body_string(vm_lines(vm_count, state)))
            .mount(&server)
            .await;
    }

    server
}

/// The manifest of the most recent deploy request.
async fn latest_manifest(director: &MockServer) -> Option<Manifest> {
    let requests = director.received_requests().await?;
    let request = requests
        .iter()
        .rev()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/deployments")?;
    Manifest::from_yaml(&String::from_utf8_lossy(&request.body)).ok()
}

/// Names and addresses the agents would serve for `manifest`.
fn registrations(manifest: &Manifest) -> HashMap<String, Vec<IpAddr>> {
    let mut names: HashMap<String, Vec<IpAddr>> = HashMap::new();

    for job in &manifest.jobs {
        let Some(properties) = &job.properties else {
            continue;
        };
        let ips: Vec<IpAddr> = job
            .static_ips()
            .iter()
            .filter_map(|ip| ip.parse().ok())
            .collect();

        for (id, service) in &properties.consul.agent.services {
            let name = service.name.as_deref().unwrap_or(id);
            names
                .entry(service_name(name))
                .or_default()
                .extend(ips.iter().copied());

            for (index, ip) in ips.iter().enumerate() {
                let node = job.node_name(index as u32);
                for tag in std::iter::once(&node).chain(service.tags.iter()) {
                    names
                        .entry(tagged_service_name(tag, name))
                        .or_default()
                        .push(*ip);
                }
            }
        }
    }

    names
}

/// Keep `resolver` in line with the deployed services and consumer health.
async fn sync_catalog(director: Arc<MockServer>, consumer: HealthState, resolver: MemoryResolver) {
    let mut registered: HashSet<String> = HashSet::new();

    loop {
        if let Some(manifest) = latest_manifest(&director).await {
            let desired = if consumer.is_healthy() {
                registrations(&manifest)
            } else {
                HashMap::new()
            };

            for stale in registered.iter().filter(|name| !desired.contains_key(*name)) {
                resolver.deregister(stale).await;
            }
            for (name, ips) in &desired {
                resolver.register(name, ips.iter().copied()).await;
            }
            registered = desired.into_keys().collect();
        }

        tokio::time::sleep(SYNC_INTERVAL).await;
    }
}

/// Offline stand-in for [`super::live::LiveSuite`].
pub struct FakeSuite {
    pub director: Arc<MockServer>,
    pub client: DirectorClient,
    pub agent: MockAgent,
    pub resolver: MemoryResolver,
    pub consumer: HealthState,
    pub health: HealthCheckClient,
    pub config: Config,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeSuite {
    /// Deploy `instances` servers against the fake director and start the
    /// mock agent.
    pub async fn setup(instances: u32) -> Result<(Self, Manifest)> {
        init_tracing();

        let director = Arc::new(start_director(instances as usize + 1).await);
        let config = Config::load_with_env(
            None,
            HashMap::from([
                ("CONSATS_BOSH__TARGET".to_string(), director.uri()),
                ("CONSATS_TIMEOUTS__DEPLOY".to_string(), "10s".to_string()),
                ("CONSATS_TIMEOUTS__DNS".to_string(), "10s".to_string()),
                ("CONSATS_TIMEOUTS__POLL_INTERVAL".to_string(), "100ms".to_string()),
            ]),
        )?;
        let client = director_client(&config)?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let consumer_addr = listener.local_addr()?;
        let consumer = HealthState::new();
        let server = tokio::spawn({
            let consumer = consumer.clone();
            async move {
                let _ = serve(listener, consumer, std::future::pending()).await;
            }
        });

        let resolver = MemoryResolver::new();
        let sync = tokio::spawn(sync_catalog(
            Arc::clone(&director),
            consumer.clone(),
            resolver.clone(),
        ));

        let (manifest, vms) = deploy_consul_with_instance_count(instances, &client, &config).await?;
        wait_for_vms(&client, &manifest.name, &vms, config.deploy_poll()).await?;

        let agent = MockAgent::new();
        agent.start().await?;

        let health = HealthCheckClient::new(format!("http://{consumer_addr}{HEALTH_CHECK_PATH}"))?;

        let suite = Self {
            director,
            client,
            agent,
            resolver,
            consumer,
            health,
            config,
            tasks: vec![server, sync],
        };
        Ok((suite, manifest))
    }

    pub fn context(&self) -> Context<'_> {
        Context {
            client: &self.client,
            resolver: &self.resolver,
            health: &self.health,
            deploy_poll: self.config.deploy_poll(),
            dns_poll: self.config.dns_poll(),
        }
    }

    /// Tear down and report the scenario outcome.
    pub async fn finish(&self, manifest: &Manifest, outcome: Result<()>) -> Result<()> {
        let cleanup = teardown(&self.client, manifest, &self.agent, outcome.is_err()).await;
        outcome?;
        cleanup
    }

    /// Number of delete requests the director received for `deployment`.
    pub async fn delete_requests(&self, deployment: &str) -> usize {
        let target = format!("/deployments/{deployment}");
        self.director
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "DELETE" && r.url.path() == target)
            .count()
    }

    /// Number of deploy requests the director received.
    pub async fn deploy_requests(&self) -> usize {
        self.director
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/deployments")
            .count()
    }
}

impl Drop for FakeSuite {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
