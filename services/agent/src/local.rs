//! A real agent process on the test host.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use consats_poll::Eventually;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{AgentError, AgentStartStopper};

/// Config file written into the agent's config directory.
const CONFIG_FILE: &str = "config.json";

/// How long a stopping agent gets to leave the cluster before it is killed.
const LEAVE_GRACE: Duration = Duration::from_secs(10);

/// Options for a local client agent.
#[derive(Debug, Clone)]
pub struct ConsulAgentOptions {
    /// Agent executable.
    pub binary: PathBuf,

    /// Agent state directory.
    pub data_dir: PathBuf,

    /// Directory the generated config is written to.
    pub config_dir: PathBuf,

    /// Node name the agent registers as.
    pub node_name: String,

    /// DNS domain served by the cluster.
    pub domain: String,

    /// Server addresses to join.
    pub retry_join: Vec<String>,

    /// Local DNS port.
    pub dns_port: u16,

    /// Local HTTP API port.
    pub http_port: u16,

    /// Readiness wait after spawn; `None` skips the check.
    pub readiness: Option<Eventually>,
}

impl ConsulAgentOptions {
    /// Options with default ports under `root`.
    pub fn new(binary: impl Into<PathBuf>, root: impl Into<PathBuf>, retry_join: Vec<String>) -> Self {
        let root = root.into();
        Self {
            binary: binary.into(),
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            node_name: "localnode".to_string(),
            domain: "cf.internal".to_string(),
            retry_join,
            dns_port: 8600,
            http_port: 8500,
            readiness: Some(Eventually::new(Duration::from_secs(30), Duration::from_millis(500))),
        }
    }

    /// Base URL of the agent HTTP API.
    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    fn agent_config(&self) -> AgentConfig<'_> {
        AgentConfig {
            node_name: &self.node_name,
            domain: &self.domain,
            data_dir: self.data_dir.to_string_lossy().into_owned(),
            server: false,
            retry_join: &self.retry_join,
            client_addr: "127.0.0.1",
            ports: AgentPorts {
                dns: self.dns_port,
                http: self.http_port,
            },
            log_level: "INFO",
        }
    }
}

#[derive(Debug, Serialize)]
struct AgentConfig<'a> {
    node_name: &'a str,
    domain: &'a str,
    data_dir: String,
    server: bool,
    retry_join: &'a [String],
    client_addr: &'a str,
    ports: AgentPorts,
    log_level: &'a str,
}

#[derive(Debug, Serialize)]
struct AgentPorts {
    dns: u16,
    http: u16,
}

/// Agent process managed by the suite.
pub struct LocalAgent {
    options: ConsulAgentOptions,
    client: reqwest::Client,
    child: Mutex<Option<Child>>,
    // Set while a start is spawning or waiting for readiness.
    starting: AtomicBool,
}

impl LocalAgent {
    /// Create a stopped agent.
    pub fn new(options: ConsulAgentOptions) -> Self {
        Self {
            options,
            client: reqwest::Client::new(),
            child: Mutex::new(None),
            starting: AtomicBool::new(false),
        }
    }

    /// Agent options.
    pub fn options(&self) -> &ConsulAgentOptions {
        &self.options
    }

    async fn write_config(&self) -> Result<PathBuf, AgentError> {
        let opts = &self.options;

        for dir in [&opts.data_dir, &opts.config_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AgentError::io(format!("creating {}", dir.display()), e))?;
        }

        let path = opts.config_dir.join(CONFIG_FILE);
        let contents = serde_json::to_vec_pretty(&opts.agent_config())
            .map_err(|e| AgentError::io("encoding agent config", e.into()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| AgentError::io(format!("writing {}", path.display()), e))?;

        Ok(path)
    }

    async fn spawn_ready(&self) -> Result<Child, AgentError> {
        let config_path = self.write_config().await?;
        debug!(path = %config_path.display(), "Wrote agent config");

        let mut child = Command::new(&self.options.binary)
            .arg("agent")
            .arg(format!("-config-dir={}", self.options.config_dir.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::io(format!("spawning {}", self.options.binary.display()), e)
            })?;

        info!(
            pid = child.id(),
            node_name = %self.options.node_name,
            retry_join = ?self.options.retry_join,
            "Started local agent"
        );

        if let Some(eventually) = self.options.readiness {
            if let Err(e) = self.wait_ready(&mut child, eventually).await {
                let _ = child.kill().await;
                return Err(e);
            }
        } else if let Ok(Some(status)) = child.try_wait() {
            return Err(AgentError::ExitedEarly(status));
        }

        Ok(child)
    }

    async fn wait_ready(&self, child: &mut Child, eventually: Eventually) -> Result<(), AgentError> {
        let url = format!("{}/v1/agent/self", self.options.http_url());
        let url = url.as_str();
        let client = &self.client;

        let probe = move || async move {
            let response = client.get(url).send().await?;
            Ok::<_, reqwest::Error>(response.status().is_success())
        };

        match eventually.should("local agent API", probe, |ready: &bool| *ready).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(AgentError::ExitedEarly(status));
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl AgentStartStopper for LocalAgent {
    async fn start(&self) -> Result<(), AgentError> {
        {
            let guard = self.child.lock().await;
            if guard.is_some() || self.starting.swap(true, Ordering::SeqCst) {
                return Err(AgentError::AlreadyRunning);
            }
        }

        // Readiness is awaited without holding the child lock.
        let spawned = self.spawn_ready().await;
        let result = match spawned {
            Ok(child) => {
                *self.child.lock().await = Some(child);
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn stop(&self) -> Result<(), AgentError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            // SIGINT makes the agent leave the cluster before exiting.
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
                warn!(pid, error = %e, "Failed to signal agent");
            }

            match tokio::time::timeout(LEAVE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    info!(pid, status = %status, "Local agent stopped");
                    return Ok(());
                }
                Ok(Err(e)) => warn!(pid, error = %e, "Failed waiting for agent"),
                Err(_) => warn!(pid, "Agent did not leave in time, killing"),
            }
        }

        child
            .kill()
            .await
            .map_err(|e| AgentError::io("killing agent", e))?;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}
