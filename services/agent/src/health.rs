use std::net::IpAddr;
use std::time::Duration;

use tracing::info;

use crate::AgentError;

/// Port the test consumer serves its health check on.
pub const HEALTH_CHECK_PORT: u16 = 6769;

/// Health check path on the test consumer.
pub const HEALTH_CHECK_PATH: &str = "/health_check";

/// Health check URL for a consumer VM.
pub fn health_check_url(ip: IpAddr) -> String {
    format!("http://{}:{}{}", ip, HEALTH_CHECK_PORT, HEALTH_CHECK_PATH)
}

/// Flips the test consumer's health state.
#[derive(Debug, Clone)]
pub struct HealthCheckClient {
    client: reqwest::Client,
    url: String,
}

impl HealthCheckClient {
    /// Client for a full health check URL.
    pub fn new(url: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Client for the consumer at `ip` on the default port.
    pub fn for_ip(ip: IpAddr) -> Result<Self, AgentError> {
        Self::new(health_check_url(ip))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Report `healthy` on subsequent health checks.
    pub async fn set_healthy(&self, healthy: bool) -> Result<(), AgentError> {
        let response = self
            .client
            .post(&self.url)
            .body(healthy.to_string())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::UnexpectedStatus {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        info!(url = %self.url, healthy, "Set consumer health");
        Ok(())
    }

    /// Current health as reported by the consumer.
    pub async fn is_healthy(&self) -> Result<bool, AgentError> {
        let response = self.client.get(&self.url).send().await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }
}
