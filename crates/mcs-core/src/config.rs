//! Agent settings and filesystem layout

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Root of the install; every other path is derived from it
    pub install_dir: PathBuf,

    /// Name reported in the router's own status
    pub computer_name: String,

    /// Platform reported in the router's own status
    pub platform: String,

    /// Version reported in the router's own status
    pub software_version: String,

    /// Directory watcher polling period
    pub watch_interval_ms: u64,

    /// Maximum number of queued events
    pub event_queue_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/opt/mcs"),
            computer_name: default_computer_name(),
            platform: std::env::consts::OS.to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            watch_interval_ms: 1000,
            event_queue_capacity: 1000,
        }
    }
}

impl AgentSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        let mut settings = AgentSettings::default();

        if let Ok(dir) = std::env::var("MCS_INSTALL_DIR") {
            if !dir.trim().is_empty() {
                settings.install_dir = PathBuf::from(dir);
            }
        }

        if let Ok(name) = std::env::var("MCS_COMPUTER_NAME") {
            if !name.trim().is_empty() {
                settings.computer_name = name.trim().to_string();
            }
        }

        if let Ok(interval) = std::env::var("MCS_WATCH_INTERVAL_MS") {
            if let Ok(interval) = interval.parse() {
                settings.watch_interval_ms = interval;
            }
        }

        if let Ok(capacity) = std::env::var("MCS_EVENT_QUEUE_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                settings.event_queue_capacity = capacity;
            }
        }

        settings
    }

    /// Settings rooted at an explicit directory (used by tests and tools)
    pub fn with_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            ..Self::default()
        }
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.install_dir.join("etc")
    }

    pub fn var_dir(&self) -> PathBuf {
        self.install_dir.join("var")
    }

    /// Install-time values and the registered identity
    pub fn root_config_path(&self) -> PathBuf {
        self.etc_dir().join("mcs.config")
    }

    /// Values written by the policy handler
    pub fn policy_config_path(&self) -> PathBuf {
        self.etc_dir().join("mcs_policy.config")
    }

    pub fn status_cache_path(&self) -> PathBuf {
        self.var_dir().join("status_cache.json")
    }

    pub fn policy_dir(&self) -> PathBuf {
        self.install_dir.join("policy")
    }

    /// Last successfully applied MCS policy
    pub fn mcs_policy_path(&self) -> PathBuf {
        self.policy_dir().join("MCS-25_policy.xml")
    }

    pub fn status_dir(&self) -> PathBuf {
        self.install_dir.join("status")
    }

    pub fn event_dir(&self) -> PathBuf {
        self.install_dir.join("event")
    }

    pub fn action_dir(&self) -> PathBuf {
        self.install_dir.join("actions")
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.install_dir.join("registry")
    }

    /// Directories the watcher reports changes for
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        vec![self.status_dir(), self.event_dir(), self.registry_dir()]
    }
}

fn default_computer_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AgentSettings::default();
        assert!(!settings.computer_name.is_empty());
        assert_eq!(settings.watch_interval_ms, 1000);
        assert_eq!(settings.root_config_path(), PathBuf::from("/opt/mcs/etc/mcs.config"));
    }

    #[test]
    fn test_derived_paths() {
        let settings = AgentSettings::with_install_dir("/tmp/mcs");
        assert_eq!(settings.mcs_policy_path(), PathBuf::from("/tmp/mcs/policy/MCS-25_policy.xml"));
        assert_eq!(settings.status_cache_path(), PathBuf::from("/tmp/mcs/var/status_cache.json"));
        assert_eq!(settings.watched_dirs().len(), 3);
    }
}
