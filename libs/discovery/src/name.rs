use std::fmt;
use std::str::FromStr;

use crate::DiscoveryError;

const SERVICE_LABEL: &str = "service";

/// A parsed `[tag.]<service>.service.<domain>` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName {
    /// Optional tag filter (the instance node name in generated manifests).
    pub tag: Option<String>,

    /// Service name.
    pub service: String,

    /// Agent DNS domain, e.g. `cf.internal`.
    pub domain: String,
}

impl ServiceName {
    /// Parse a service DNS name.
    pub fn parse(name: &str) -> Result<Self, DiscoveryError> {
        let invalid = |reason: &str| DiscoveryError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = name.trim_end_matches('.');
        let labels: Vec<&str> = trimmed.split('.').collect();
        if labels.iter().any(|l| l.is_empty()) {
            return Err(invalid("empty label"));
        }

        let Some(marker) = labels.iter().position(|l| *l == SERVICE_LABEL) else {
            return Err(invalid("missing \"service\" label"));
        };

        let (tag, service) = match marker {
            1 => (None, labels[0]),
            2 => (Some(labels[0].to_string()), labels[1]),
            0 => return Err(invalid("missing service before \"service\" label")),
            _ => return Err(invalid("too many labels before \"service\" label")),
        };

        let domain = labels[marker + 1..].join(".");
        if domain.is_empty() {
            return Err(invalid("missing domain"));
        }

        Ok(Self {
            tag,
            service: service.to_string(),
            domain,
        })
    }
}

impl FromStr for ServiceName {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{}.", tag)?;
        }
        write!(f, "{}.{}.{}", self.service, SERVICE_LABEL, self.domain)
    }
}
