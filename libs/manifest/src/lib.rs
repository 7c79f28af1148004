//! Deployment manifest model.
//!
//! A manifest is the configuration document submitted to the director. It
//! names the releases and stemcells to use, the networks and resource pools
//! VMs are placed on, and the jobs (groups of identical instances) with
//! their per-job properties.
//!
//! The Consul agent properties are typed so the suites can register services
//! and health checks on a job before redeploying.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod consul;

pub use consul::{
    consul_manifest, ConsulManifestConfig, Iaas, CONSUL_DOMAIN, CONSUL_RELEASE, CONSUMER_JOB,
    SERVER_JOB,
};

/// Manifest errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// YAML encoding or decoding failed.
    #[error("manifest yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Static IP allocation failed.
    #[error("manifest networking: {0}")]
    Network(#[from] consats_networking::NetworkError),

    /// Invalid generation input.
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Free-form cloud properties block.
pub type CloudProperties = BTreeMap<String, serde_yaml::Value>;

/// A deployment manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub director_uuid: String,
    pub name: String,
    pub releases: Vec<Release>,
    pub compilation: Compilation,
    pub update: Update,
    pub networks: Vec<Network>,
    pub resource_pools: Vec<ResourcePool>,
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub properties: Properties,
}

impl Manifest {
    /// Render the manifest as YAML.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a manifest from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The VMs a healthy deployment of this manifest should report.
    ///
    /// One running VM per job instance.
    pub fn expected_vms(&self) -> Vec<Vm> {
        self.jobs
            .iter()
            .flat_map(|job| (0..job.instances).map(|_| Vm::running()))
            .collect()
    }

    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Look up a job by name for mutation.
    pub fn job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    /// Static IPs of the first network of every job, in job order.
    pub fn all_static_ips(&self) -> Vec<String> {
        self.jobs
            .iter()
            .flat_map(|job| job.static_ips().iter().cloned())
            .collect()
    }

    /// Static IPs of the Consul server agents.
    pub fn server_ips(&self) -> Vec<String> {
        self.properties
            .consul
            .as_ref()
            .map(|c| c.agent.servers.lan.clone())
            .unwrap_or_default()
    }
}

/// A release reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub version: String,
}

/// Compilation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compilation {
    pub network: String,
    pub reuse_compilation_vms: bool,
    pub workers: u32,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// Rolling update settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub canaries: u32,
    pub canary_watch_time: String,
    pub max_in_flight: u32,
    pub update_watch_time: String,
    #[serde(default)]
    pub serial: bool,
}

/// A network definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(rename = "type")]
    pub network_type: String,
    pub subnets: Vec<NetworkSubnet>,
}

/// A subnet of a manual network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSubnet {
    pub range: String,
    pub gateway: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<String>,
    #[serde(rename = "static", default, skip_serializing_if = "Vec::is_empty")]
    pub static_ranges: Vec<String>,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A resource pool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub name: String,
    pub network: String,
    pub stemcell: Stemcell,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A stemcell reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stemcell {
    pub name: String,
    pub version: String,
}

/// A job: a group of identical instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub instances: u32,
    pub networks: Vec<JobNetwork>,
    pub templates: Vec<JobTemplate>,
    pub resource_pool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_disk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<JobProperties>,
}

impl Job {
    /// Static IPs on the job's first network.
    pub fn static_ips(&self) -> &[String] {
        self.networks
            .first()
            .map(|n| n.static_ips.as_slice())
            .unwrap_or_default()
    }

    /// Node name of instance `index` (`consul_z1` → `consul-z1-0`).
    pub fn node_name(&self, index: u32) -> String {
        format!("{}-{}", self.name.replace('_', "-"), index)
    }

    /// Agent properties for this job, created empty when absent.
    pub fn consul_agent_mut(&mut self) -> &mut ConsulAgent {
        &mut self
            .properties
            .get_or_insert_with(JobProperties::default)
            .consul
            .agent
    }
}

/// A job's placement on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNetwork {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_ips: Vec<String>,
}

/// A release job colocated on a job's instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,
    pub release: String,
}

/// Per-job properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProperties {
    #[serde(default)]
    pub consul: JobPropertiesConsul,
}

/// Per-job Consul properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPropertiesConsul {
    #[serde(default)]
    pub agent: ConsulAgent,
}

/// Consul agent settings for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulAgent {
    /// `server` or `client`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Services registered by every instance of the job, keyed by service id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, ConsulAgentService>,
}

/// A service registered by the agent.
///
/// An empty service uses the release's default name and check script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulAgentService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<ServiceCheck>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A script health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    pub script: String,
    pub interval: String,
}

/// Global properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consul: Option<PropertiesConsul>,
}

/// Global Consul properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesConsul {
    #[serde(default)]
    pub agent: PropertiesConsulAgent,
}

/// Global Consul agent properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesConsulAgent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub servers: ConsulServers,
}

/// Server addresses agents join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulServers {
    #[serde(default)]
    pub lan: Vec<String>,
}

/// VM state reported for a deployment.
pub const VM_STATE_RUNNING: &str = "running";

/// A deployment VM as far as the suites care: its job state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vm {
    #[serde(rename = "job_state")]
    pub state: String,
}

impl Vm {
    /// A VM in the given state.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// A running VM.
    pub fn running() -> Self {
        Self::new(VM_STATE_RUNNING)
    }

    /// Returns true if the VM is running.
    pub fn is_running(&self) -> bool {
        self.state == VM_STATE_RUNNING
    }
}
