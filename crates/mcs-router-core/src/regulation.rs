//! Status and event send regulation
//!
//! Both timers batch updates: a change only becomes sendable after it has
//! been pending for `min_delay`, while `max_delay` bounds how long the
//! server can go without hearing from us. The events timer also fires as
//! soon as enough events have queued up.
//!
//! All methods come in an `_at(now)` form so the main loop and tests can
//! supply their own clock.

use std::time::{Duration, Instant};

use mcs_core::keys;
use mcs_core::ConfigStore;

use crate::types::NOTHING_PENDING;

fn secs(value: i64) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}

/// Time left until `start + delay`, zero if already passed. A deadline
/// beyond the clock's range is reported as nothing pending.
fn until(start: Instant, delay: Duration, now: Instant) -> Duration {
    match start.checked_add(delay) {
        Some(deadline) => deadline.saturating_duration_since(now),
        None => NOTHING_PENDING,
    }
}

/// Regulates status uploads
#[derive(Debug, Clone)]
pub struct StatusTimer {
    min_delay: Duration,
    max_delay: Duration,
    created_at: Instant,
    last_sent_at: Option<Instant>,
    pending_since: Option<Instant>,
    forced: bool,
}

impl StatusTimer {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self::new_at(min_delay, max_delay, Instant::now())
    }

    pub fn new_at(min_delay: Duration, max_delay: Duration, now: Instant) -> Self {
        Self {
            min_delay,
            max_delay,
            created_at: now,
            last_sent_at: None,
            pending_since: None,
            forced: false,
        }
    }

    /// Build from `STATUS_REGULATION_DELAY` / `STATUS_MAX_DELAY`
    pub fn from_config(config: &ConfigStore, now: Instant) -> Self {
        Self::new_at(
            secs(config.get_int(keys::STATUS_REGULATION_DELAY, keys::DEFAULT_STATUS_REGULATION_DELAY)),
            secs(config.get_int(keys::STATUS_MAX_DELAY, keys::DEFAULT_STATUS_MAX_DELAY)),
            now,
        )
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some() || self.forced
    }

    pub fn status_updated(&mut self) {
        self.status_updated_at(Instant::now())
    }

    /// Mark a status change; the first change starts the pending window
    pub fn status_updated_at(&mut self, now: Instant) {
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    /// Make the next `send_status` return true regardless of delays
    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn send_status(&self) -> bool {
        self.send_status_at(Instant::now())
    }

    pub fn send_status_at(&self, now: Instant) -> bool {
        if self.forced {
            return true;
        }
        if let Some(pending_since) = self.pending_since {
            if now.saturating_duration_since(pending_since) >= self.min_delay {
                return true;
            }
        }
        let reference = self.last_sent_at.unwrap_or(self.created_at);
        now.saturating_duration_since(reference) >= self.max_delay
    }

    pub fn status_sent(&mut self) {
        self.status_sent_at(Instant::now())
    }

    pub fn status_sent_at(&mut self, now: Instant) {
        self.last_sent_at = Some(now);
        self.pending_since = None;
        self.forced = false;
    }

    /// A failed send leaves the status pending
    pub fn error_sending_status(&mut self) {
        self.error_sending_status_at(Instant::now())
    }

    pub fn error_sending_status_at(&mut self, now: Instant) {
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    pub fn relative_time(&self) -> Duration {
        self.relative_time_at(Instant::now())
    }

    /// Time until the next mandatory send
    pub fn relative_time_at(&self, now: Instant) -> Duration {
        if self.forced {
            return Duration::ZERO;
        }
        let reference = self.last_sent_at.unwrap_or(self.created_at);
        let periodic = until(reference, self.max_delay, now);
        match self.pending_since {
            Some(pending_since) => periodic.min(until(pending_since, self.min_delay, now)),
            None => periodic,
        }
    }
}

/// Regulates event uploads
#[derive(Debug, Clone)]
pub struct EventsTimer {
    min_delay: Duration,
    max_delay: Duration,
    max_event_count: usize,
    event_count: usize,
    pending_since: Option<Instant>,
    last_sent_at: Option<Instant>,
}

impl EventsTimer {
    pub fn new(min_delay: Duration, max_delay: Duration, max_event_count: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_event_count: max_event_count.max(1),
            event_count: 0,
            pending_since: None,
            last_sent_at: None,
        }
    }

    /// Build from `EVENTS_REGULATION_DELAY` / `EVENTS_MAX_DELAY` / `EVENTS_MAX_EVENTS`
    pub fn from_config(config: &ConfigStore) -> Self {
        Self::new(
            secs(config.get_int(keys::EVENTS_REGULATION_DELAY, keys::DEFAULT_EVENTS_REGULATION_DELAY)),
            secs(config.get_int(keys::EVENTS_MAX_DELAY, keys::DEFAULT_EVENTS_MAX_DELAY)),
            config.get_int(keys::EVENTS_MAX_EVENTS, keys::DEFAULT_EVENTS_MAX_EVENTS).max(1) as usize,
        )
    }

    pub fn event_count(&self) -> usize {
        self.event_count
    }

    pub fn event_added(&mut self) {
        self.event_added_at(Instant::now())
    }

    pub fn event_added_at(&mut self, now: Instant) {
        self.event_count += 1;
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    pub fn send_events(&self) -> bool {
        self.send_events_at(Instant::now())
    }

    pub fn send_events_at(&self, now: Instant) -> bool {
        let Some(pending_since) = self.pending_since else {
            return false;
        };
        if self.event_count == 0 {
            return false;
        }
        if self.event_count >= self.max_event_count {
            return true;
        }
        if now.saturating_duration_since(pending_since) >= self.min_delay {
            return true;
        }
        let reference = self.last_sent_at.unwrap_or(pending_since);
        now.saturating_duration_since(reference) >= self.max_delay
    }

    pub fn events_sent(&mut self) {
        self.events_sent_at(Instant::now())
    }

    pub fn events_sent_at(&mut self, now: Instant) {
        self.event_count = 0;
        self.pending_since = None;
        self.last_sent_at = Some(now);
    }

    /// Forget events that were discarded without being sent
    pub fn events_dropped(&mut self, count: usize) {
        self.event_count = self.event_count.saturating_sub(count);
        if self.event_count == 0 {
            self.pending_since = None;
        }
    }

    /// A failed send keeps the events pending
    pub fn error_sending_events(&mut self) {}

    pub fn relative_time(&self) -> Duration {
        self.relative_time_at(Instant::now())
    }

    pub fn relative_time_at(&self, now: Instant) -> Duration {
        let Some(pending_since) = self.pending_since else {
            return NOTHING_PENDING;
        };
        if self.event_count == 0 {
            return NOTHING_PENDING;
        }
        if self.event_count >= self.max_event_count {
            return Duration::ZERO;
        }
        let reference = self.last_sent_at.unwrap_or(pending_since);
        until(pending_since, self.min_delay, now).min(until(reference, self.max_delay, now))
    }
}
