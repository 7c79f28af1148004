//! Consul cluster manifest generation.
//!
//! Produces a two-job deployment:
//!
//! - `consul_z1`: N server agents with static IPs
//! - `consul_test_consumer`: one client agent colocated with the test
//!   consumer, which serves the toggleable health check on port 6769

use consats_networking::{Ipv4Cidr, StaticIpAllocator, STATIC_RANGE_START};
use serde_yaml::Value;

use crate::{
    CloudProperties, Compilation, ConsulAgent, ConsulServers, Job, JobNetwork, JobProperties,
    JobPropertiesConsul, JobTemplate, Manifest, ManifestError, Network, NetworkSubnet, Properties,
    PropertiesConsul, PropertiesConsulAgent, Release, ResourcePool, Stemcell, Update,
};

/// Release providing the agent and test consumer jobs.
pub const CONSUL_RELEASE: &str = "consul";

/// DNS domain served by the agents.
pub const CONSUL_DOMAIN: &str = "cf.internal";

/// Server job name.
pub const SERVER_JOB: &str = "consul_z1";

/// Test consumer job name.
pub const CONSUMER_JOB: &str = "consul_test_consumer";

const NETWORK: &str = "consul1";
const LATEST: &str = "latest";

/// Infrastructure the deployment targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iaas {
    /// Local container-backed director.
    Warden,

    /// AWS with a pre-created subnet.
    Aws {
        subnet_id: String,
        availability_zone: String,
    },
}

impl Iaas {
    fn stemcell_name(&self) -> &'static str {
        match self {
            Self::Warden => "bosh-warden-boshlite-ubuntu-trusty-go_agent",
            Self::Aws { .. } => "bosh-aws-xen-hvm-ubuntu-trusty-go_agent",
        }
    }

    fn vm_cloud_properties(&self) -> CloudProperties {
        let mut props = CloudProperties::new();
        if let Self::Aws {
            availability_zone, ..
        } = self
        {
            props.insert("instance_type".to_string(), Value::from("m3.medium"));
            props.insert(
                "availability_zone".to_string(),
                Value::from(availability_zone.as_str()),
            );
        }
        props
    }

    fn subnet_cloud_properties(&self) -> CloudProperties {
        let mut props = CloudProperties::new();
        match self {
            Self::Warden => {
                props.insert("name".to_string(), Value::from("random"));
            }
            Self::Aws { subnet_id, .. } => {
                props.insert("subnet".to_string(), Value::from(subnet_id.as_str()));
            }
        }
        props
    }
}

/// Inputs for a generated Consul manifest.
#[derive(Debug, Clone)]
pub struct ConsulManifestConfig {
    /// Director the manifest is bound to.
    pub director_uuid: String,

    /// Deployment name.
    pub name: String,

    /// Target infrastructure.
    pub iaas: Iaas,

    /// Subnet static IPs are allocated from.
    pub subnet: Ipv4Cidr,

    /// Number of server agents.
    pub instance_count: u32,
}

/// Generate a Consul cluster manifest.
pub fn consul_manifest(config: &ConsulManifestConfig) -> Result<Manifest, ManifestError> {
    if config.instance_count == 0 {
        return Err(ManifestError::Invalid(
            "at least one server instance is required".to_string(),
        ));
    }

    let subnet = config.subnet;
    let mut ips = StaticIpAllocator::new(subnet);
    let server_ips: Vec<String> = ips
        .allocate(config.instance_count as usize)?
        .into_iter()
        .map(|ip| ip.to_string())
        .collect();
    let consumer_ip = ips.next_ip()?.to_string();

    // Room for growth past the allocated IPs, within the subnet.
    let static_range_end = STATIC_RANGE_START
        .saturating_add(config.instance_count)
        .saturating_add(10)
        .min(ips.last_offset());

    let vm_cloud_properties = config.iaas.vm_cloud_properties();

    let network = Network {
        name: NETWORK.to_string(),
        network_type: "manual".to_string(),
        subnets: vec![NetworkSubnet {
            range: subnet.to_string(),
            gateway: subnet.gateway()?.to_string(),
            reserved: vec![subnet.range(2, 3)?, subnet.broadcast().to_string()],
            static_ranges: vec![subnet.range(STATIC_RANGE_START, static_range_end)?],
            cloud_properties: config.iaas.subnet_cloud_properties(),
        }],
    };

    let stemcell = Stemcell {
        name: config.iaas.stemcell_name().to_string(),
        version: LATEST.to_string(),
    };

    let resource_pools = [SERVER_JOB, CONSUMER_JOB]
        .iter()
        .map(|name| ResourcePool {
            name: name.to_string(),
            network: NETWORK.to_string(),
            stemcell: stemcell.clone(),
            cloud_properties: vm_cloud_properties.clone(),
        })
        .collect();

    let agent_template = JobTemplate {
        name: "consul_agent".to_string(),
        release: CONSUL_RELEASE.to_string(),
    };

    let server = Job {
        name: SERVER_JOB.to_string(),
        instances: config.instance_count,
        networks: vec![JobNetwork {
            name: NETWORK.to_string(),
            static_ips: server_ips.clone(),
        }],
        templates: vec![agent_template.clone()],
        resource_pool: SERVER_JOB.to_string(),
        persistent_disk: Some(1024),
        properties: Some(JobProperties {
            consul: JobPropertiesConsul {
                agent: ConsulAgent {
                    mode: Some("server".to_string()),
                    ..Default::default()
                },
            },
        }),
    };

    let consumer = Job {
        name: CONSUMER_JOB.to_string(),
        instances: 1,
        networks: vec![JobNetwork {
            name: NETWORK.to_string(),
            static_ips: vec![consumer_ip],
        }],
        templates: vec![
            agent_template,
            JobTemplate {
                name: "consul-test-consumer".to_string(),
                release: CONSUL_RELEASE.to_string(),
            },
        ],
        resource_pool: CONSUMER_JOB.to_string(),
        persistent_disk: None,
        properties: None,
    };

    Ok(Manifest {
        director_uuid: config.director_uuid.clone(),
        name: config.name.clone(),
        releases: vec![Release {
            name: CONSUL_RELEASE.to_string(),
            version: LATEST.to_string(),
        }],
        compilation: Compilation {
            network: NETWORK.to_string(),
            reuse_compilation_vms: true,
            workers: 3,
            cloud_properties: vm_cloud_properties,
        },
        update: Update {
            canaries: 1,
            canary_watch_time: "1000-180000".to_string(),
            max_in_flight: 1,
            update_watch_time: "1000-180000".to_string(),
            serial: true,
        },
        networks: vec![network],
        resource_pools,
        jobs: vec![server, consumer],
        properties: Properties {
            consul: Some(PropertiesConsul {
                agent: PropertiesConsulAgent {
                    domain: Some(CONSUL_DOMAIN.to_string()),
                    servers: ConsulServers { lan: server_ips },
                },
            }),
        },
    })
}
