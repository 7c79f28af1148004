//! Networking utilities for deployment manifests.
//!
//! This library provides helpers for:
//! - Parsing IPv4 subnets in CIDR notation
//! - Deriving gateway, reserved, and static ranges for a manual network
//! - Allocating consecutive static IPs to job instances

use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Address pool exhausted.
    #[error("address pool exhausted: {0}")]
    PoolExhausted(String),
}

// ============================================================================
// Subnets
// ============================================================================

/// IPv4 subnet in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    /// Network address (host bits cleared).
    pub address: Ipv4Addr,

    /// Prefix length (e.g., 24 for /24).
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a new subnet, masking host bits.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        Ok(Self {
            address: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.0.16.0/24").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.address
    }

    /// Number of addresses in this subnet, including network and broadcast.
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix_len)
    }

    /// Address at offset `n` from the network address.
    pub fn nth(&self, n: u32) -> Result<Ipv4Addr, NetworkError> {
        if u64::from(n) >= self.size() {
            return Err(NetworkError::PoolExhausted(format!(
                "offset {} outside {}",
                n, self
            )));
        }
        Ok(Ipv4Addr::from(u32::from(self.address) + n))
    }

    /// Gateway address (first host).
    pub fn gateway(&self) -> Result<Ipv4Addr, NetworkError> {
        self.nth(1)
    }

    /// Last address of the subnet.
    pub fn broadcast(&self) -> Ipv4Addr {
        let last = (self.size() - 1) as u32;
        Ipv4Addr::from(u32::from(self.address) + last)
    }

    /// Render an inclusive range `first - last` at the given offsets.
    pub fn range(&self, first: u32, last: u32) -> Result<String, NetworkError> {
        Ok(format!("{} - {}", self.nth(first)?, self.nth(last)?))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

/// Mask an IPv4 address to a prefix length.
fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    Ipv4Addr::from(bits & mask)
}

// ============================================================================
// Static IP allocation
// ============================================================================

/// Offset of the first static IP in a manual network.
///
/// Offsets 0-3 hold the network address, gateway, and provider-reserved hosts.
pub const STATIC_RANGE_START: u32 = 4;

/// Offset of the last static IP in a manual network.
pub const STATIC_RANGE_END: u32 = 100;

/// Sequential static IP allocator over a subnet.
#[derive(Debug)]
pub struct StaticIpAllocator {
    /// Subnet to allocate from.
    subnet: Ipv4Cidr,

    /// Next address offset to allocate.
    next_offset: u32,

    /// Maximum offset (inclusive).
    last_offset: u32,
}

impl StaticIpAllocator {
    /// Allocate over the default static range of a subnet.
    pub fn new(subnet: Ipv4Cidr) -> Self {
        let last_in_subnet = (subnet.size().saturating_sub(2)) as u32;
        Self::with_range(subnet, STATIC_RANGE_START, STATIC_RANGE_END.min(last_in_subnet))
    }

    /// Allocate over an explicit inclusive offset range.
    pub fn with_range(subnet: Ipv4Cidr, first_offset: u32, last_offset: u32) -> Self {
        Self {
            subnet,
            next_offset: first_offset,
            last_offset,
        }
    }

    /// Allocate the next available address.
    pub fn next_ip(&mut self) -> Result<Ipv4Addr, NetworkError> {
        if self.next_offset > self.last_offset {
            return Err(NetworkError::PoolExhausted(self.subnet.to_string()));
        }

        let addr = self.subnet.nth(self.next_offset)?;
        self.next_offset += 1;
        Ok(addr)
    }

    /// Allocate `count` consecutive addresses.
    ///
    /// Either all addresses are handed out or none are.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<Ipv4Addr>, NetworkError> {
        if (count as u64) > u64::from(self.remaining()) {
            return Err(NetworkError::PoolExhausted(format!(
                "{} addresses requested from {}, {} remaining",
                count,
                self.subnet,
                self.remaining()
            )));
        }

        (0..count).map(|_| self.next_ip()).collect()
    }

    /// Get the subnet being allocated from.
    pub fn subnet(&self) -> &Ipv4Cidr {
        &self.subnet
    }

    /// Last offset the allocator may hand out.
    pub fn last_offset(&self) -> u32 {
        self.last_offset
    }

    /// Get remaining addresses.
    pub fn remaining(&self) -> u32 {
        (self.last_offset + 1).saturating_sub(self.next_offset)
    }
}
