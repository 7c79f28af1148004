//! Service discovery lookups.
//!
//! Resolves logical service names (`some-service.service.cf.internal`) to
//! the addresses of currently healthy instances. An empty result is a valid
//! answer meaning "no healthy instance", distinct from a lookup failure.
//!
//! Resolvers:
//! - [`DnsResolver`]: the host's resolver, which forwards the agent's domain
//! - [`CatalogResolver`]: the agent's HTTP health API
//! - [`MemoryResolver`]: an in-process table for tests and dry runs

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

mod catalog;
mod dns;
mod memory;
mod name;

pub use catalog::CatalogResolver;
pub use dns::DnsResolver;
pub use memory::MemoryResolver;
pub use name::ServiceName;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The name is not a service name.
    #[error("invalid service name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Resolver failure other than "no such host".
    #[error("lookup of {name} failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure talking to the agent.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The agent answered with an unexpected status.
    #[error("agent returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Resolves a service name to healthy instance addresses.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Addresses currently registered and healthy for `name`, sorted and
    /// deduplicated. Empty when no instance is healthy.
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, DiscoveryError>;
}

/// Resolve `name` and render the addresses as strings.
///
/// This is the probe used by the DNS assertion loops.
pub async fn check_service<R>(resolver: &R, name: &str) -> Result<Vec<String>, DiscoveryError>
where
    R: ServiceResolver + ?Sized,
{
    let addrs = resolver.resolve(name).await?;
    Ok(addrs.iter().map(IpAddr::to_string).collect())
}

/// Sort and deduplicate addresses.
pub(crate) fn normalize(mut addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    addrs.sort();
    addrs.dedup();
    addrs
}
