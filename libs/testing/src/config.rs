//! Suite configuration.
//!
//! Loaded from the file named by `CONSATS_CONFIG` (JSON, TOML or YAML by
//! extension) with `CONSATS_*` environment overrides on top. Nested keys use
//! `__`, e.g. `CONSATS_BOSH__TARGET` or `CONSATS_TIMEOUTS__DEPLOY=2m`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use consats_director::{DirectorConfig, DirectorInfo, TaskPolling};
use consats_manifest::Iaas;
use consats_networking::Ipv4Cidr;
use consats_poll::{parse_duration, Eventually};
use serde::{Deserialize, Deserializer};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CONSATS_CONFIG";

const ENV_PREFIX: &str = "CONSATS";

/// CPI reported by a local container-backed director.
const WARDEN_CPI: &str = "warden_cpi";

const WARDEN_CIDR: &str = "10.244.4.0/24";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bosh: BoshConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    /// Agent executable used for the local client agent.
    #[serde(default = "default_consul_binary")]
    pub consul_binary: PathBuf,

    /// Scratch directory for local agent state.
    #[serde(default = "default_agent_dir")]
    pub agent_dir: PathBuf,

    #[serde(default)]
    pub resolver: ResolverKind,

    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoshConfig {
    #[serde(default)]
    pub target: String,

    #[serde(default = "default_bosh_user")]
    pub username: String,

    #[serde(default = "default_bosh_user")]
    pub password: String,

    /// Path to a PEM bundle for the director certificate.
    #[serde(default)]
    pub director_ca_cert: Option<PathBuf>,
}

impl Default for BoshConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            username: default_bosh_user(),
            password: default_bosh_user(),
            director_ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// Subnet id the deployment is placed in.
    #[serde(default)]
    pub subnet: Option<String>,

    #[serde(default = "default_availability_zone")]
    pub availability_zone: String,

    /// Address range of `subnet`.
    #[serde(default = "default_aws_cidr")]
    pub cidr: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            subnet: None,
            availability_zone: default_availability_zone(),
            cidr: default_aws_cidr(),
        }
    }
}

/// How the suite looks up service names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Host resolver, forwarded to the local agent.
    #[default]
    Dns,

    /// Local agent health API.
    Catalog,
}

/// Poll budgets, written as duration strings (`"1m"`, `"10s"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Waiting for deployment VMs to be running.
    #[serde(deserialize_with = "duration")]
    pub deploy: Duration,

    /// Waiting for service names to resolve or disappear.
    #[serde(deserialize_with = "duration")]
    pub dns: Duration,

    /// Delay between attempts of both loops.
    #[serde(deserialize_with = "duration")]
    pub poll_interval: Duration,

    /// Upper bound for a single director task.
    #[serde(deserialize_with = "duration")]
    pub task: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            deploy: consats_poll::DEFAULT_TIMEOUT,
            dns: consats_poll::DEFAULT_TIMEOUT,
            poll_interval: consats_poll::DEFAULT_INTERVAL,
            task: TaskPolling::default().timeout,
        }
    }
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn default_consul_binary() -> PathBuf {
    PathBuf::from("consul")
}

fn default_agent_dir() -> PathBuf {
    std::env::temp_dir().join("consats-agent")
}

fn default_bosh_user() -> String {
    "admin".to_string()
}

fn default_availability_zone() -> String {
    "us-east-1a".to_string()
}

fn default_aws_cidr() -> String {
    "10.0.4.0/24".to_string()
}

impl Config {
    /// Load from `CONSATS_CONFIG` and the process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::build(path.as_deref().map(Path::new), None)
    }

    /// Load from an explicit file plus the process environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path), None)
    }

    /// Load with `env` standing in for the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        env: std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        Self::build(path, Some(env))
    }

    fn build(
        path: Option<&Path>,
        env: Option<std::collections::HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(env.map(|vars| vars.into_iter().collect()));

        let settings = builder
            .add_source(environment)
            .build()
            .context("failed to read suite configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("invalid suite configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check required settings.
    pub fn validate(&self) -> Result<()> {
        if self.bosh.target.trim().is_empty() {
            bail!("bosh.target is required (set CONSATS_BOSH__TARGET)");
        }
        self.aws
            .cidr
            .parse::<Ipv4Cidr>()
            .with_context(|| format!("invalid aws.cidr {}", self.aws.cidr))?;
        Ok(())
    }

    /// Director client settings, reading the CA bundle if one is configured.
    pub fn director_config(&self) -> Result<DirectorConfig> {
        let ca_cert = match &self.bosh.director_ca_cert {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
            ),
            None => None,
        };

        Ok(DirectorConfig {
            target: self.bosh.target.clone(),
            username: self.bosh.username.clone(),
            password: self.bosh.password.clone(),
            ca_cert,
            task_polling: TaskPolling {
                timeout: self.timeouts.task,
                ..TaskPolling::default()
            },
        })
    }

    /// Budget for the VM-state loop.
    pub fn deploy_poll(&self) -> Eventually {
        Eventually::new(self.timeouts.deploy, self.timeouts.poll_interval)
    }

    /// Budget for the service resolution loop.
    pub fn dns_poll(&self) -> Eventually {
        Eventually::new(self.timeouts.dns, self.timeouts.poll_interval)
    }

    /// Infrastructure and subnet for the director's CPI.
    pub fn target_for(&self, info: &DirectorInfo) -> Result<(Iaas, Ipv4Cidr)> {
        if info.cpi.as_deref() == Some(WARDEN_CPI) {
            return Ok((Iaas::Warden, WARDEN_CIDR.parse()?));
        }

        let Some(subnet_id) = self.aws.subnet.clone() else {
            bail!(
                "director {} uses cpi {:?}; aws.subnet is required",
                info.name,
                info.cpi.as_deref().unwrap_or("unknown")
            );
        };

        let iaas = Iaas::Aws {
            subnet_id,
            availability_zone: self.aws.availability_zone.clone(),
        };
        Ok((iaas, self.aws.cidr.parse()?))
    }
}
