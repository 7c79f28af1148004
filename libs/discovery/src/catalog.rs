use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{normalize, DiscoveryError, ServiceName, ServiceResolver};

/// Resolver backed by the agent's health API.
///
/// Answers the same question as the agent's DNS interface (passing instances
/// of a service, optionally filtered by tag) without depending on the host's
/// resolver configuration.
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogResolver {
    /// Create a resolver for an agent HTTP address, e.g. `http://127.0.0.1:8500`.
    pub fn new(agent_url: &str) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: agent_url.trim_end_matches('/').to_string(),
        })
    }

    /// Passing entries for a parsed service name.
    async fn passing(&self, name: &ServiceName) -> Result<Vec<HealthEntry>, DiscoveryError> {
        let url = format!("{}/v1/health/service/{}", self.base_url, name.service);

        let mut request = self.client.get(&url).query(&[("passing", "true")]);
        if let Some(tag) = &name.tag {
            request = request.query(&[("tag", tag.as_str())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, message = %message, "Health query failed");
            return Err(DiscoveryError::Api { status, message });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ServiceResolver for CatalogResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, DiscoveryError> {
        let parsed = ServiceName::parse(name)?;
        let entries = self.passing(&parsed).await?;

        let addrs = entries
            .iter()
            .filter_map(|entry| {
                let raw = entry.address();
                match raw.parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        warn!(address = raw, node = %entry.node.node, "Skipping non-IP address");
                        None
                    }
                }
            })
            .collect();

        let addrs = normalize(addrs);
        debug!(name, count = addrs.len(), "Resolved service from catalog");
        Ok(addrs)
    }
}

/// One element of `GET /v1/health/service/<service>`.
#[derive(Debug, Clone, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Node")]
    node: HealthNode,
    #[serde(rename = "Service")]
    service: HealthService,
}

impl HealthEntry {
    /// Service address, falling back to the node address.
    fn address(&self) -> &str {
        if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HealthNode {
    #[serde(rename = "Node")]
    node: String,
    #[serde(rename = "Address")]
    address: String,
}

#[derive(Debug, Clone, Deserialize)]
struct HealthService {
    #[serde(rename = "Address", default)]
    address: String,
}
