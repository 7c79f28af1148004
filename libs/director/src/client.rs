//! HTTP client for the director API.

use std::time::Duration;

use async_trait::async_trait;
use consats_poll::Eventually;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::types::{DirectorInfo, ReleaseSummary, StemcellSummary, Task, VmInfo};
use crate::versions::resolve_versions;
use crate::{DeploymentClient, DirectorError, Vm};

/// How long to wait for director tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolling {
    /// Upper bound for a single task.
    pub timeout: Duration,

    /// Delay between task status requests.
    pub interval: Duration,
}

impl Default for TaskPolling {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            interval: Duration::from_secs(2),
        }
    }
}

/// Director connection settings.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Director URL, e.g. `https://192.168.50.4:25555`.
    pub target: String,

    /// Basic auth user.
    pub username: String,

    /// Basic auth password.
    pub password: String,

    /// PEM bundle trusted in addition to the system roots.
    pub ca_cert: Option<String>,

    /// Task wait settings.
    pub task_polling: TaskPolling,
}

/// Director API client.
#[derive(Debug, Clone)]
pub struct DirectorClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    task_polling: TaskPolling,
}

impl DirectorClient {
    /// Create a new director client.
    pub fn new(config: &DirectorConfig) -> Result<Self, DirectorError> {
        // Task redirects are followed by hand so the task id can be read.
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30));

        if let Some(pem) = &config.ca_cert {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.target.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            task_polling: config.task_polling,
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    /// Make a GET request and decode JSON.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectorError> {
        let response = self
            .authed(self.client.get(self.url(path)))
            .send()
            .await?;

        if response.status().is_success() {
            response.json().await.map_err(|e| {
                DirectorError::Decode(format!("failed to parse {}: {}", path, e))
            })
        } else {
            handle_error(response).await
        }
    }

    /// Send a request that the director answers with a task, returning its id.
    async fn submit(&self, request: RequestBuilder) -> Result<u64, DirectorError> {
        let response = self.authed(request).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| DirectorError::MissingTask(format!("{} without location", status)))?
                .to_string();
            return task_id_from_location(&location);
        }

        if status.is_success() {
            let task: Task = response
                .json()
                .await
                .map_err(|e| DirectorError::MissingTask(e.to_string()))?;
            return Ok(task.id);
        }

        handle_error(response).await
    }

    /// Fetch a task.
    pub async fn task(&self, id: u64) -> Result<Task, DirectorError> {
        self.get_json(&format!("/tasks/{}", id)).await
    }

    /// Wait for a task to finish; non-success states are errors.
    pub async fn wait_for_task(&self, id: u64) -> Result<Task, DirectorError> {
        debug!(task_id = id, "Waiting for director task");

        let eventually = Eventually::new(self.task_polling.timeout, self.task_polling.interval);
        let task = eventually
            .should(
                &format!("director task {}", id),
                || self.task(id),
                |t: &Task| t.state.is_finished(),
            )
            .await
            .map_err(|source| DirectorError::TaskTimeout { id, source })?;

        if task.state.is_success() {
            debug!(task_id = id, description = %task.description, "Director task done");
            Ok(task)
        } else {
            error!(task_id = id, state = %task.state, result = ?task.result, "Director task failed");
            Err(DirectorError::TaskFailed {
                id,
                state: task.state,
                result: task.result.unwrap_or_default(),
            })
        }
    }

    /// Fetch the result output of a finished task.
    pub async fn task_result(&self, id: u64) -> Result<String, DirectorError> {
        let response = self
            .authed(self.client.get(self.url(&format!("/tasks/{}/output", id))))
            .query(&[("type", "result")])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            handle_error(response).await
        }
    }

    /// Uploaded releases.
    pub async fn releases(&self) -> Result<Vec<ReleaseSummary>, DirectorError> {
        self.get_json("/releases").await
    }

    /// Uploaded stemcells.
    pub async fn stemcells(&self) -> Result<Vec<StemcellSummary>, DirectorError> {
        self.get_json("/stemcells").await
    }

    /// Full VM details of a deployment.
    pub async fn deployment_vm_details(&self, name: &str) -> Result<Vec<VmInfo>, DirectorError> {
        let request = self
            .client
            .get(self.url(&format!("/deployments/{}/vms", name)))
            .query(&[("format", "full")]);

        let id = self.submit(request).await?;
        self.wait_for_task(id).await?;
        let output = self.task_result(id).await?;

        parse_vm_lines(&output)
    }
}

#[async_trait]
impl DeploymentClient for DirectorClient {
    async fn info(&self) -> Result<DirectorInfo, DirectorError> {
        self.get_json("/info").await
    }

    async fn resolve_manifest_versions(&self, yaml: &str) -> Result<String, DirectorError> {
        let releases = self.releases().await?;
        let stemcells = self.stemcells().await?;
        resolve_versions(yaml, &releases, &stemcells)
    }

    async fn deploy(&self, yaml: &str) -> Result<u64, DirectorError> {
        let request = self
            .client
            .post(self.url("/deployments"))
            .header(CONTENT_TYPE, "text/yaml")
            .body(yaml.to_string());

        let id = self.submit(request).await?;
        info!(task_id = id, "Deploy submitted");

        self.wait_for_task(id).await?;
        info!(task_id = id, "Deploy finished");
        Ok(id)
    }

    async fn deployment_vms(&self, name: &str) -> Result<Vec<Vm>, DirectorError> {
        let vms = self.deployment_vm_details(name).await?;
        debug!(deployment = name, vm_count = vms.len(), "Fetched deployment VMs");
        Ok(vms.iter().map(Vm::from).collect())
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), DirectorError> {
        let request = self
            .client
            .delete(self.url(&format!("/deployments/{}", name)))
            .query(&[("force", "true")]);

        let id = self.submit(request).await?;
        info!(deployment = name, task_id = id, "Delete submitted");

        self.wait_for_task(id).await?;
        info!(deployment = name, "Deployment deleted");
        Ok(())
    }
}

/// Handle an error response.
async fn handle_error<T>(response: reqwest::Response) -> Result<T, DirectorError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(DirectorError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(DirectorError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Extract the task id from a `.../tasks/<id>` redirect.
fn task_id_from_location(location: &str) -> Result<u64, DirectorError> {
    let path = location.split('?').next().unwrap_or(location);
    let mut segments = path.trim_end_matches('/').rsplit('/');

    match (segments.next(), segments.next()) {
        (Some(id), Some("tasks")) => id
            .parse()
            .map_err(|_| DirectorError::MissingTask(location.to_string())),
        _ => Err(DirectorError::MissingTask(location.to_string())),
    }
}

/// Parse newline-delimited VM JSON.
fn parse_vm_lines(output: &str) -> Result<Vec<VmInfo>, DirectorError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| DirectorError::Decode(format!("vm line {:?}: {}", line, e)))
        })
        .collect()
}
