//! Common types for the router core
//!
//! Centralizes type definitions shared by the strategies and the main loop.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Shortest wait between two loop iterations
pub const MIN_WAIT: Duration = Duration::from_millis(500);

/// `relative_time` answer when nothing is pending
pub const NOTHING_PENDING: Duration = Duration::from_secs(10_000);

/// Priority given to candidates with no explicit priority
pub const DEFAULT_PRIORITY: u32 = 0;

/// A server or relay the transport may try, ranked per pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    /// Host name or address literal as configured
    pub hostname: String,

    pub port: u16,

    /// Lower number = preferred tier
    pub priority: u32,

    /// Relay id from policy, if any
    pub id: Option<String>,

    /// Resolved addresses (empty when resolution failed)
    pub ips: Vec<IpAddr>,

    /// Distance to the nearest local address, set by ranking
    pub distance: Option<u32>,
}

impl CandidateEndpoint {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            priority: DEFAULT_PRIORITY,
            id: None,
            ips: Vec::new(),
            distance: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_ips(mut self, ips: Vec<IpAddr>) -> Self {
        self.ips = ips;
        self
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// Addresses of the local host, by family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAddresses {
    pub v4: Vec<Ipv4Addr>,
    pub v6: Vec<Ipv6Addr>,
}

impl LocalAddresses {
    pub fn new(v4: Vec<Ipv4Addr>, v6: Vec<Ipv6Addr>) -> Self {
        Self { v4, v6 }
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}
