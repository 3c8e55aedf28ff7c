//! Events raised by local applications

use serde::{Deserialize, Serialize};

use crate::AppId;

/// Default event time-to-live (1 hour)
pub const DEFAULT_EVENT_TTL_MS: u64 = 60 * 60 * 1000;

/// A single queued event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event id
    pub id: String,

    /// Application that raised the event
    pub app_id: AppId,

    /// Raw XML body
    pub body: String,

    /// Creation time (milliseconds since epoch)
    pub timestamp: u64,

    /// How long the event stays worth sending
    pub ttl_millis: u64,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, app_id: impl Into<AppId>, body: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            app_id: app_id.into(),
            body: body.into(),
            timestamp,
            ttl_millis: DEFAULT_EVENT_TTL_MS,
        }
    }

    pub fn with_ttl(mut self, ttl_millis: u64) -> Self {
        self.ttl_millis = ttl_millis;
        self
    }

    /// An event is expired once its TTL has fully elapsed.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.timestamp) > self.ttl_millis
    }
}

/// A batch of events for one upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub records: Vec<EventRecord>,
}

impl Events {
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
