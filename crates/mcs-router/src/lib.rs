//! MCS Router - Main Loop and Local Collaborators
//!
//! Keeps the endpoint connected to the management service: polls commands,
//! applies MCS policy, and uploads application statuses and events.
//!
//! # Architecture
//!
//! ```text
//!   status/  event/  registry/            policy/  actions/
//!       │       │        │                    ▲        ▲
//!       ▼       ▼        ▼                    │        │
//! ┌──────────────────────────┐      ┌─────────┴────────┴──┐
//! │  DirectoryWatcher        │─wake►│       Router        │◄─ shutdown
//! │  (fingerprint polling)   │      │  (single task loop) │
//! └──────────────────────────┘      └──────────┬──────────┘
//!                                              │ ConnectionPlan
//!                                              ▼
//!                                     ┌─────────────────┐
//!                                     │  CommsFactory   │
//!                                     │  → dyn Comms    │
//!                                     └─────────────────┘
//! ```

mod app_registry;
mod comms;
mod event_queue;
mod local_dirs;
mod locality;
mod mcs_status;
mod router;
mod watch;

pub use app_registry::{AppRegistry, RegistryEntry};
pub use comms::{Comms, CommsFactory, ConnectionPlan};
pub use event_queue::{EventQueue, EventQueueError};
pub use local_dirs::LocalDirs;
pub use locality::{discover_local_addresses, resolve_candidates};
pub use mcs_status::McsStatus;
pub use router::{Router, RouterState};
pub use watch::{notify, wake_channel, DirectoryWatcher};
