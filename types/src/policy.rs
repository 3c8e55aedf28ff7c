//! MCS policy document model
//!
//! The XML form is parsed in `mcs-router-core`; this module only holds the
//! extracted values. Every field other than `compliance` is optional: `None`
//! means the element was absent from the policy.

use serde::{Deserialize, Serialize};

/// Compliance node carried by every policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compliance {
    pub policy_type: String,
    pub rev_id: String,
}

/// A message relay entry, in policy order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRelay {
    /// Lower number = preferred tier
    pub priority: String,
    pub port: String,
    pub address: String,
    pub id: String,
}

impl MessageRelay {
    pub fn new(
        priority: impl Into<String>,
        port: impl Into<String>,
        address: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            priority: priority.into(),
            port: port.into(),
            address: address.into(),
            id: id.into(),
        }
    }

    /// Numeric priority; unparsable values sort after every valid tier.
    pub fn priority_rank(&self) -> u32 {
        self.priority.trim().parse().unwrap_or(u32::MAX)
    }
}

/// `commandPollingDelay@default`, if present and numeric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingDelay(pub u64);

/// Values extracted from one MCS policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub compliance: Compliance,

    /// `registrationToken`; `None` means the element was missing
    pub registration_token: Option<String>,

    pub servers: Vec<String>,
    pub message_relays: Vec<MessageRelay>,
    pub push_servers: Vec<String>,

    pub use_system_proxy: Option<String>,
    pub use_automatic_proxy: Option<String>,
    pub use_direct: Option<String>,
    pub random_skew_factor: Option<String>,

    pub polling_delay: Option<PollingDelay>,
    pub push_ping_timeout: Option<String>,
    pub push_fallback_poll_interval: Option<String>,

    /// First non-empty `proxies/proxy`
    pub proxy: Option<String>,
    /// Only read when a proxy was found
    pub proxy_credentials: Option<String>,
}

impl PolicyDocument {
    pub fn new(compliance: Compliance) -> Self {
        Self {
            compliance,
            registration_token: None,
            servers: Vec::new(),
            message_relays: Vec::new(),
            push_servers: Vec::new(),
            use_system_proxy: None,
            use_automatic_proxy: None,
            use_direct: None,
            random_skew_factor: None,
            polling_delay: None,
            push_ping_timeout: None,
            push_fallback_poll_interval: None,
            proxy: None,
            proxy_credentials: None,
        }
    }
}
