//! App registry - which local applications the router serves
//!
//! Each installed application drops a JSON file into the registry
//! directory:
//!
//! ```json
//! {"policyAppIds": ["ALC", "SAV"], "statusAppIds": ["ALC"]}
//! ```
//!
//! Policy app ids are polled for commands; `MCS` is always included.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use mcs_types::{AppId, McsResult, MCS_APP_ID};

/// Contents of one registry file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    #[serde(default)]
    pub policy_app_ids: Vec<AppId>,

    #[serde(default)]
    pub status_app_ids: Vec<AppId>,
}

impl RegistryEntry {
    pub fn load(path: &Path) -> McsResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// App ids gathered from the registry directory
#[derive(Debug)]
pub struct AppRegistry {
    dir: PathBuf,
    policy_app_ids: BTreeSet<AppId>,
    status_app_ids: BTreeSet<AppId>,
}

impl AppRegistry {
    /// Create an empty registry reading from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut policy_app_ids = BTreeSet::new();
        policy_app_ids.insert(MCS_APP_ID.to_string());
        Self {
            dir: dir.into(),
            policy_app_ids,
            status_app_ids: BTreeSet::new(),
        }
    }

    /// Re-read the registry directory.
    ///
    /// Returns the policy app ids that were not known before. Ids that
    /// disappear are dropped silently.
    pub fn refresh(&mut self) -> Vec<AppId> {
        let mut policy_app_ids = BTreeSet::new();
        policy_app_ids.insert(MCS_APP_ID.to_string());
        let mut status_app_ids = BTreeSet::new();

        for entry in read_entries(&self.dir) {
            policy_app_ids.extend(entry.policy_app_ids);
            status_app_ids.extend(entry.status_app_ids);
        }

        let added: Vec<AppId> = policy_app_ids
            .difference(&self.policy_app_ids)
            .cloned()
            .collect();
        if !added.is_empty() {
            info!(app_ids = ?added, "New applications registered");
        }

        self.policy_app_ids = policy_app_ids;
        self.status_app_ids = status_app_ids;
        added
    }

    /// App ids to poll commands for, sorted
    pub fn policy_app_ids(&self) -> Vec<AppId> {
        self.policy_app_ids.iter().cloned().collect()
    }

    pub fn status_app_ids(&self) -> Vec<AppId> {
        self.status_app_ids.iter().cloned().collect()
    }

    pub fn is_registered(&self, app_id: &str) -> bool {
        self.policy_app_ids.contains(app_id) || self.status_app_ids.contains(app_id)
    }

    pub fn count(&self) -> usize {
        self.policy_app_ids.union(&self.status_app_ids).count()
    }
}

fn read_entries(dir: &Path) -> Vec<RegistryEntry> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Registry directory not readable");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = listing
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| {
            RegistryEntry::load(path)
                .map_err(|e| warn!(path = %path.display(), error = %e, "Skipping registry file"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcs_always_registered() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AppRegistry::new(dir.path().join("missing"));
        assert!(registry.refresh().is_empty());
        assert_eq!(registry.policy_app_ids(), vec!["MCS"]);
    }

    #[test]
    fn test_refresh_reports_new_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AppRegistry::new(dir.path());

        fs::write(
            dir.path().join("ALC.json"),
            r#"{"policyAppIds": ["ALC"], "statusAppIds": ["ALC"]}"#,
        )
        .unwrap();
        assert_eq!(registry.refresh(), vec!["ALC"]);
        assert!(registry.refresh().is_empty());

        fs::write(dir.path().join("SAV.json"), r#"{"policyAppIds": ["SAV"]}"#).unwrap();
        assert_eq!(registry.refresh(), vec!["SAV"]);
        assert_eq!(registry.policy_app_ids(), vec!["ALC", "MCS", "SAV"]);
        assert_eq!(registry.status_app_ids(), vec!["ALC"]);
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn test_invalid_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), r#"{"policyAppIds": ["TXT"]}"#).unwrap();
        fs::write(dir.path().join("ok.json"), r#"{"statusAppIds": ["HBT"]}"#).unwrap();

        let mut registry = AppRegistry::new(dir.path());
        registry.refresh();
        assert!(registry.is_registered("HBT"));
        assert!(!registry.is_registered("TXT"));
    }
}
