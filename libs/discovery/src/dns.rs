use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

use crate::{normalize, DiscoveryError, ServiceResolver};

/// Resolver backed by the host's DNS configuration.
///
/// The test host is expected to forward the agent domain to the local agent,
/// as the deployed VMs do.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl DnsResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceResolver for DnsResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, DiscoveryError> {
        match tokio::net::lookup_host((name, 0)).await {
            Ok(addrs) => {
                let addrs = normalize(addrs.map(|a| a.ip()).collect());
                debug!(name, count = addrs.len(), "Resolved service");
                Ok(addrs)
            }
            Err(e) if is_no_such_host(&e) => {
                debug!(name, error = %e, "No healthy instances");
                Ok(Vec::new())
            }
            Err(e) => Err(DiscoveryError::Lookup {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}

/// Whether a lookup error means the name has no records.
///
/// The system resolver reports NXDOMAIN and empty answers as generic I/O
/// errors, so the message is the only signal.
fn is_no_such_host(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }

    let message = err.to_string().to_lowercase();
    [
        "not known",
        "no such host",
        "no address associated",
        "nodename nor servname",
        "no data",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}
