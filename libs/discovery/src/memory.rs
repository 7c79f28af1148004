use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{normalize, DiscoveryError, ServiceResolver};

/// In-process resolver for tests and dry runs.
///
/// Clones share the same table, so a test can hold one handle to mutate
/// registrations while the harness resolves through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    entries: Arc<RwLock<HashMap<String, Vec<IpAddr>>>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the addresses registered for `name`.
    pub async fn register<I>(&self, name: &str, addrs: I)
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let addrs = normalize(addrs.into_iter().collect());
        self.entries.write().await.insert(key(name), addrs);
    }

    /// Remove every address registered for `name`.
    pub async fn deregister(&self, name: &str) {
        self.entries.write().await.remove(&key(name));
    }

    /// Number of names with at least one address.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|v| !v.is_empty())
            .count()
    }

    /// Returns true if no name has an address.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[async_trait]
impl ServiceResolver for MemoryResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, DiscoveryError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&key(name))
            .cloned()
            .unwrap_or_default())
    }
}
