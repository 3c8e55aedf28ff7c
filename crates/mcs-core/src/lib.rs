//! MCS Core - Shared configuration for the router and agent
//!
//! This crate provides the layered key/value store every other
//! component reads its settings from, plus the filesystem layout
//! derived from the install directory.

pub mod config;
pub mod keys;
pub mod store;

pub use config::AgentSettings;
pub use store::{ConfigError, ConfigStore, SharedConfig};
