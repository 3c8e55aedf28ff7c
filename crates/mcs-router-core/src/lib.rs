//! MCS Router Core - Decision Logic
//!
//! Everything the router loop decides without touching the network.
//!
//! # Architecture
//!
//! ```text
//!                  Router main loop
//!                        │
//!      ┌─────────────────┼──────────────────┬───────────────────┐
//!      ▼                 ▼                  ▼                   ▼
//! ┌──────────────┐ ┌──────────────┐ ┌───────────────┐ ┌──────────────────┐
//! │ CommandCheck │ │ StatusTimer  │ │  StatusCache  │ │  PolicyHandler   │
//! │  Interval    │ │ EventsTimer  │ │ (unchanged?)  │ │ (apply/comply)   │
//! │ (when poll?) │ │ (when send?) │ └───────────────┘ └────────┬─────────┘
//! └──────────────┘ └──────────────┘                            │
//!                                                              ▼
//!                                                  ┌──────────────────────┐
//!                                                  │  Endpoint strategies │
//!                                                  │ (which relay first?) │
//!                                                  └──────────────────────┘
//! ```
//!
//! # Error classes
//!
//! - **Transient**: connection failures and generic HTTP errors, base backoff
//! - **SemiPermanent**: HTTP 400 and 401 without a register challenge, larger backoff
//! - **ReregistrationRequired**: 401 with a register challenge
//!
//! # Example
//!
//! ```rust,ignore
//! use mcs_router_core::{ip_distance, CommandCheckInterval};
//!
//! assert_eq!(ip_distance("10.0.2.15", "10.0.2.14")?, 1);
//!
//! let mut interval = CommandCheckInterval::new(config);
//! let next_poll = interval.set_on_error(error_count, true);
//! ```

// Core modules
mod error;
mod types;

pub mod backoff;
pub mod regulation;
pub mod status_cache;

// Policy parsing, key codec and compliance
pub mod policy;

// Strategy module (endpoint ranking)
mod strategy;

// Re-exports: Error types
pub use error::{CommsError, ErrorClass, PolicyError, RouterError};

// Re-exports: Core types
pub use types::{CandidateEndpoint, LocalAddresses, DEFAULT_PRIORITY, MIN_WAIT, NOTHING_PENDING};

pub use backoff::CommandCheckInterval;
pub use regulation::{EventsTimer, StatusTimer};
pub use status_cache::{status_hash, strip_timestamps, StatusCache, StatusCacheEntry};
pub use policy::{parse_policy, LoadMode, PolicyHandler, PolicyState};

// Re-exports: Strategy traits and implementations
pub use strategy::{
    // Trait
    EndpointStrategy,
    // Locality
    ip_distance, ipv4_distance, ipv6_distance, order_by_distance, DistanceStrategy,
    // Relay tiers
    candidates_from_relays, order_message_relays, RelayPriorityStrategy,
};
