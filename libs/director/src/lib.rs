//! Deployment director client.
//!
//! The director owns deployments: it accepts a rendered manifest, converges
//! VMs toward it, and reports their state. Every mutating call returns a
//! task the director works on asynchronously; this client waits for those
//! tasks, but VM state itself is only eventually consistent and callers are
//! expected to poll it.
//!
//! ## Modules
//!
//! - `client`: HTTP implementation against the director API
//! - `types`: wire types (info, tasks, VM details)
//! - `versions`: `latest` release/stemcell resolution

use async_trait::async_trait;
use thiserror::Error;

mod client;
mod types;
mod versions;

pub use client::{DirectorClient, DirectorConfig, TaskPolling};
pub use consats_manifest::Vm;
pub use types::{
    DirectorInfo, ReleaseSummary, ReleaseVersion, StemcellSummary, Task, TaskState, VmInfo,
};
pub use versions::{compare_versions, resolve_versions};

/// Director errors.
#[derive(Debug, Error)]
pub enum DirectorError {
    /// Credentials were rejected.
    #[error("director rejected credentials")]
    Unauthorized,

    /// The director answered with an unexpected status.
    #[error("director returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A mutating request did not redirect to a task.
    #[error("no task in director response: {0}")]
    MissingTask(String),

    /// A task finished in a non-success state.
    #[error("task {id} finished in state {state}: {result}")]
    TaskFailed {
        id: u64,
        state: TaskState,
        result: String,
    },

    /// A task did not finish in time.
    #[error("task {id} did not finish: {source}")]
    TaskTimeout {
        id: u64,
        #[source]
        source: consats_poll::PollError,
    },

    /// A `latest` reference has no uploaded counterpart.
    #[error("no uploaded {kind} named {name:?}")]
    UnknownArtifact { kind: &'static str, name: String },

    /// Manifest YAML could not be processed.
    #[error("manifest yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Response body could not be decoded.
    #[error("invalid director response: {0}")]
    Decode(String),
}

/// Deployment operations the suites depend on.
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Director identity.
    async fn info(&self) -> Result<DirectorInfo, DirectorError>;

    /// Replace `latest` release and stemcell versions with uploaded ones.
    async fn resolve_manifest_versions(&self, yaml: &str) -> Result<String, DirectorError>;

    /// Submit a manifest and wait for the deploy task. Returns the task id.
    async fn deploy(&self, yaml: &str) -> Result<u64, DirectorError>;

    /// Current VMs of a deployment.
    async fn deployment_vms(&self, name: &str) -> Result<Vec<Vm>, DirectorError>;

    /// Delete a deployment and wait for the delete task.
    async fn delete_deployment(&self, name: &str) -> Result<(), DirectorError>;
}
