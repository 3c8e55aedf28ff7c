// ========== Core Modules ==========
pub mod command;
pub mod status;
pub mod event;
pub mod policy;

// Export commonly used types
pub use command::{Command, CommandKind, Credentials};
pub use status::{AppStatus, ComplianceResult, StatusEvent};
pub use event::{EventRecord, Events, DEFAULT_EVENT_TTL_MS};
pub use policy::{Compliance, MessageRelay, PolicyDocument, PollingDelay};

/// Application identifier (e.g. "MCS", "ALC", "SAV")
pub type AppId = String;

/// App id owned by the router itself
pub const MCS_APP_ID: &str = "MCS";

/// Policy type number carried by MCS policies
pub const MCS_POLICY_TYPE: &str = "25";

/// Seconds since the Unix epoch as a float, the unit used by persisted caches
pub fn epoch_seconds() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// Error types
pub type McsResult<T> = Result<T, McsError>;

#[derive(Debug, thiserror::Error)]
pub enum McsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
