//! Endpoint Ranking Strategies
//!
//! This module decides which server or message relay the transport should
//! try first:
//!
//! - `DistanceStrategy`: Orders candidates by network distance to this host
//! - `RelayPriorityStrategy`: Orders relays by policy tier, then by distance
//!
//! # Strategy Hierarchy
//!
//! ```text
//! Policy relays / servers
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │   Tier Selection        │  (RelayPriorityStrategy)
//! │   (Which priority?)     │
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │   Locality Ordering     │  (DistanceStrategy)
//! │   (Which is closest?)   │
//! └─────────────────────────┘
//! ```

mod distance;
mod relay_priority;

pub use distance::{ip_distance, ipv4_distance, ipv6_distance, order_by_distance, DistanceStrategy};
pub use relay_priority::{candidates_from_relays, order_message_relays, RelayPriorityStrategy};

use crate::types::{CandidateEndpoint, LocalAddresses};

/// Trait for endpoint ranking strategies
pub trait EndpointStrategy: Send + Sync {
    /// Return the candidates in the order they should be attempted
    fn rank(&self, candidates: Vec<CandidateEndpoint>, local: &LocalAddresses) -> Vec<CandidateEndpoint>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}
