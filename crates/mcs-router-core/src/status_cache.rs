//! Status de-duplication cache
//!
//! Remembers an MD5 of the last status sent for each app so unchanged
//! statuses are not re-uploaded. Volatile `timestamp` attributes are
//! stripped before hashing. Records older than the max status delay are
//! ignored, which forces a periodic resend of unchanged content.
//!
//! The cache is persisted as JSON:
//! `{"<appId>": {"timestamp": <epoch secs>, "status_hash": "<md5 hex>"}}`.
//! A missing or corrupt file is treated as an empty cache.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use mcs_core::store::atomic_write;
use mcs_types::epoch_seconds;

/// Persisted record for one app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCacheEntry {
    pub timestamp: f64,
    pub status_hash: String,
}

/// Per-app status de-duplication
#[derive(Debug)]
pub struct StatusCache {
    /// Backing file (None = in-memory only)
    path: Option<PathBuf>,
    /// Seconds after which a record no longer suppresses a send
    max_status_delay: f64,
    entries: BTreeMap<String, StatusCacheEntry>,
}

impl StatusCache {
    /// In-memory cache
    pub fn new(max_status_delay_secs: u64) -> Self {
        Self {
            path: None,
            max_status_delay: max_status_delay_secs as f64,
            entries: BTreeMap::new(),
        }
    }

    /// Load from `path`, dropping records that have already expired
    pub fn load(path: impl Into<PathBuf>, max_status_delay_secs: u64) -> Self {
        let path = path.into();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::new(max_status_delay_secs)
        };
        cache.entries = read_entries(&path);

        let now = epoch_seconds();
        let max = cache.max_status_delay;
        cache.entries.retain(|_, entry| now - entry.timestamp <= max);
        debug!(path = %path.display(), entries = cache.entries.len(), "Loaded status cache");
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, app_id: &str) -> Option<&StatusCacheEntry> {
        self.entries.get(app_id)
    }

    pub fn has_status_changed_and_record(&mut self, app_id: &str, status_xml: &str) -> bool {
        self.has_status_changed_and_record_at(app_id, status_xml, epoch_seconds())
    }

    /// True (and the record is updated) if the content differs from the
    /// stored hash or the stored record is older than the max status delay.
    pub fn has_status_changed_and_record_at(&mut self, app_id: &str, status_xml: &str, now: f64) -> bool {
        if !self.has_status_changed_at(app_id, status_xml, now) {
            return false;
        }
        self.record_at(app_id, status_xml, now);
        true
    }

    pub fn has_status_changed(&self, app_id: &str, status_xml: &str) -> bool {
        self.has_status_changed_at(app_id, status_xml, epoch_seconds())
    }

    /// Like `has_status_changed_and_record_at` but leaves the cache alone,
    /// for statuses that have not been sent yet.
    pub fn has_status_changed_at(&self, app_id: &str, status_xml: &str, now: f64) -> bool {
        match self.entries.get(app_id) {
            Some(previous) => {
                previous.status_hash != status_hash(status_xml)
                    || now - previous.timestamp > self.max_status_delay
            }
            None => true,
        }
    }

    pub fn record(&mut self, app_id: &str, status_xml: &str) {
        self.record_at(app_id, status_xml, epoch_seconds())
    }

    /// Store the hash of a status the server has accepted
    pub fn record_at(&mut self, app_id: &str, status_xml: &str, now: f64) {
        self.entries.insert(
            app_id.to_string(),
            StatusCacheEntry {
                timestamp: now,
                status_hash: status_hash(status_xml),
            },
        );
        self.save();
    }

    /// Drop the record for one app so its next status counts as changed
    pub fn forget(&mut self, app_id: &str) {
        if self.entries.remove(app_id).is_some() {
            self.save();
        }
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.entries.clear();
        self.save();
    }

    /// Write the cache; failures are logged, never fatal
    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let json = match serde_json::to_vec(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize status cache");
                return;
            }
        };
        if let Err(e) = atomic_write(path, &json) {
            warn!(path = %path.display(), error = %e, "Failed to write status cache");
        }
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, StatusCacheEntry> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read status cache, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid status cache, starting empty");
            BTreeMap::new()
        }
    }
}

/// MD5 hex digest of the status with volatile timestamps removed
pub fn status_hash(status_xml: &str) -> String {
    let stripped = strip_timestamps(status_xml);
    hex::encode(Md5::digest(stripped.as_bytes()))
}

/// Remove `timestamp="..."` and `timestamp=&quot;...&quot;` values.
pub fn strip_timestamps(xml: &str) -> String {
    const ATTR: &str = "timestamp=";
    const QUOT: &str = "&quot;";

    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(pos) = rest.find(ATTR) {
        let after = &rest[pos + ATTR.len()..];
        let value_len = if let Some(value) = after.strip_prefix('"') {
            value.find('"').map(|end| 1 + end + 1)
        } else if let Some(value) = after.strip_prefix(QUOT) {
            value.find(QUOT).map(|end| QUOT.len() + end + QUOT.len())
        } else {
            None
        };

        match value_len {
            Some(len) => {
                out.push_str(&rest[..pos]);
                rest = &after[len..];
            }
            None => {
                out.push_str(&rest[..pos + ATTR.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
