//! Discovery agent control for the acceptance suites.
//!
//! The suites run a client agent on the test host so that service names
//! resolve the same way they do on deployed VMs. This crate provides:
//!
//! - [`AgentStartStopper`]: the start/stop seam the suites depend on
//! - [`LocalAgent`]: a real agent process joined to the deployed servers
//! - [`MockAgent`]: a recording stand-in for offline runs
//! - [`HealthCheckClient`]: flips the test consumer's health check

use async_trait::async_trait;
use thiserror::Error;

pub mod health;
pub mod local;
pub mod mock;

pub use health::{health_check_url, HealthCheckClient, HEALTH_CHECK_PATH, HEALTH_CHECK_PORT};
pub use local::{ConsulAgentOptions, LocalAgent};
pub use mock::MockAgent;

/// Agent control errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// `start` was called on a running agent.
    #[error("agent is already running")]
    AlreadyRunning,

    /// Filesystem preparation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The agent process exited during startup.
    #[error("agent exited during startup with {0}")]
    ExitedEarly(std::process::ExitStatus),

    /// The agent never answered its HTTP API.
    #[error("agent did not become ready: {0}")]
    NotReady(#[from] consats_poll::PollError),

    /// Transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An HTTP endpoint answered with an unexpected status.
    #[error("{url} returned {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
}

impl AgentError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Starts and stops a discovery agent.
#[async_trait]
pub trait AgentStartStopper: Send + Sync {
    /// Start the agent. Fails if it is already running.
    async fn start(&self) -> Result<(), AgentError>;

    /// Stop the agent. A no-op when it is not running.
    async fn stop(&self) -> Result<(), AgentError>;

    /// Returns true while the agent is running.
    async fn is_running(&self) -> bool;
}
