//! Files exchanged with local applications
//!
//! | Direction | Path                               |
//! |-----------|------------------------------------|
//! | in        | `status/<APP>_status.xml`          |
//! | in        | `event/<APP>_event-<id>.xml`       |
//! | out       | `policy/<APP>_policy.xml`          |
//! | out       | `actions/<APP>_action_<id>.xml`    |
//!
//! Event files are consumed: they are deleted once queued.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use mcs_core::store::atomic_write;
use mcs_core::{AgentSettings, ConfigError};
use mcs_types::{AppStatus, EventRecord};

const STATUS_SUFFIX: &str = "_status.xml";
const EVENT_MARKER: &str = "_event";

#[derive(Debug, Clone)]
pub struct LocalDirs {
    status_dir: PathBuf,
    event_dir: PathBuf,
    policy_dir: PathBuf,
    action_dir: PathBuf,
}

impl LocalDirs {
    pub fn new(settings: &AgentSettings) -> Self {
        Self {
            status_dir: settings.status_dir(),
            event_dir: settings.event_dir(),
            policy_dir: settings.policy_dir(),
            action_dir: settings.action_dir(),
        }
    }

    /// Current status of every app that has written one, sorted by app id
    pub fn read_statuses(&self) -> Vec<AppStatus> {
        let mut statuses: Vec<AppStatus> = xml_files(&self.status_dir)
            .into_iter()
            .filter_map(|(path, name)| {
                let app_id = name.strip_suffix(STATUS_SUFFIX)?;
                if app_id.is_empty() {
                    return None;
                }
                match fs::read_to_string(&path) {
                    Ok(xml) => Some(AppStatus::new(app_id, xml)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read status file");
                        None
                    }
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        statuses
    }

    /// Offer pending event files to `accept`, oldest name first, stopping
    /// after `limit` are taken. A file is deleted only once `accept` takes
    /// its record; refused files stay for a later pass. Returns how many
    /// were taken.
    pub fn take_events(&self, now_millis: u64, limit: usize, mut accept: impl FnMut(EventRecord) -> bool) -> usize {
        let mut taken = 0;
        for (path, name) in xml_files(&self.event_dir) {
            if taken >= limit {
                break;
            }
            let Some((app_id, id)) = parse_event_name(&name) else {
                debug!(file = %name, "Ignoring non-event file");
                continue;
            };
            let body = match fs::read_to_string(&path) {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read event file");
                    continue;
                }
            };
            let timestamp = modified_millis(&path).unwrap_or(now_millis);
            if !accept(EventRecord::new(id, app_id, body, timestamp)) {
                continue;
            }
            taken += 1;
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove event file");
            }
        }
        taken
    }

    /// Hand a policy to a local application
    pub fn write_policy(&self, app_id: &str, xml: &str) -> Result<PathBuf, ConfigError> {
        let path = self.policy_dir.join(format!("{}_policy.xml", sanitize(app_id)));
        atomic_write(&path, xml.as_bytes())?;
        debug!(app_id = %app_id, path = %path.display(), "Policy written");
        Ok(path)
    }

    /// Hand an action to a local application
    pub fn write_action(&self, app_id: &str, command_id: &str, xml: &str) -> Result<PathBuf, ConfigError> {
        let name = format!("{}_action_{}.xml", sanitize(app_id), sanitize(command_id));
        let path = self.action_dir.join(name);
        atomic_write(&path, xml.as_bytes())?;
        debug!(app_id = %app_id, command_id = %command_id, path = %path.display(), "Action written");
        Ok(path)
    }
}

/// `(path, file name)` of every `.xml` file in `dir`, sorted by name
fn xml_files(dir: &Path) -> Vec<(PathBuf, String)> {
    let Ok(listing) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(PathBuf, String)> = listing
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_file()))
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.ends_with(".xml").then(|| (entry.path(), name))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

/// `ALC_event-42.xml` → `("ALC", "42")`; a missing id gets a fresh uuid
fn parse_event_name(name: &str) -> Option<(String, String)> {
    let stem = name.strip_suffix(".xml")?;
    let (app_id, rest) = stem.split_once(EVENT_MARKER)?;
    if app_id.is_empty() {
        return None;
    }
    let id = match rest.strip_prefix('-') {
        Some(id) if !id.is_empty() => id.to_string(),
        Some(_) => uuid::Uuid::new_v4().to_string(),
        None if rest.is_empty() => uuid::Uuid::new_v4().to_string(),
        None => return None,
    };
    Some((app_id.to_string(), id))
}

fn modified_millis(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_millis()).ok()
}

/// Keep file names inside their directory
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> (tempfile::TempDir, AgentSettings, LocalDirs) {
        let dir = tempfile::tempdir().unwrap();
        let settings = AgentSettings::with_install_dir(dir.path());
        let local = LocalDirs::new(&settings);
        (dir, settings, local)
    }

    #[test]
    fn test_read_statuses() {
        let (_dir, settings, local) = dirs();
        fs::create_dir_all(settings.status_dir()).unwrap();
        fs::write(settings.status_dir().join("SAV_status.xml"), "<status>sav</status>").unwrap();
        fs::write(settings.status_dir().join("ALC_status.xml"), "<status>alc</status>").unwrap();
        fs::write(settings.status_dir().join("_status.xml"), "<status/>").unwrap();
        fs::write(settings.status_dir().join("readme.txt"), "ignored").unwrap();

        let statuses = local.read_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], AppStatus::new("ALC", "<status>alc</status>"));
        assert_eq!(statuses[1].app_id, "SAV");
    }

    /// Take every event file the callback accepts
    fn take_all(local: &LocalDirs) -> Vec<EventRecord> {
        let mut events = Vec::new();
        local.take_events(1234, usize::MAX, |record| {
            events.push(record);
            true
        });
        events
    }

    #[test]
    fn test_missing_dirs_are_empty() {
        let (_dir, _settings, local) = dirs();
        assert!(local.read_statuses().is_empty());
        assert!(take_all(&local).is_empty());
    }

    #[test]
    fn test_take_events_consumes_files() {
        let (_dir, settings, local) = dirs();
        fs::create_dir_all(settings.event_dir()).unwrap();
        fs::write(settings.event_dir().join("ALC_event-1.xml"), "<event>1</event>").unwrap();
        fs::write(settings.event_dir().join("SAV_event.xml"), "<event>2</event>").unwrap();

        let events = take_all(&local);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].app_id, "ALC");
        assert_eq!(events[0].id, "1");
        assert_eq!(events[1].app_id, "SAV");
        assert!(!events[1].id.is_empty());

        assert!(take_all(&local).is_empty());
    }

    #[test]
    fn test_take_events_keeps_untaken_files() {
        let (_dir, settings, local) = dirs();
        fs::create_dir_all(settings.event_dir()).unwrap();
        for id in 1..=3 {
            fs::write(settings.event_dir().join(format!("ALC_event-{}.xml", id)), "<event/>").unwrap();
        }

        // Refused records and anything past the limit stay on disk
        let mut seen = Vec::new();
        let taken = local.take_events(0, 1, |record| {
            seen.push(record.id.clone());
            record.id != "1"
        });
        assert_eq!(taken, 1);
        assert_eq!(seen, vec!["1", "2"]);
        assert!(settings.event_dir().join("ALC_event-1.xml").exists());
        assert!(!settings.event_dir().join("ALC_event-2.xml").exists());
        assert!(settings.event_dir().join("ALC_event-3.xml").exists());

        let ids: Vec<String> = take_all(&local).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_parse_event_name() {
        assert_eq!(parse_event_name("ALC_event-abc.xml"), Some(("ALC".into(), "abc".into())));
        assert!(parse_event_name("ALC_eventual.xml").is_none());
        assert!(parse_event_name("_event-1.xml").is_none());
        assert!(parse_event_name("ALC_status.xml").is_none());
    }

    #[test]
    fn test_write_policy_and_action() {
        let (_dir, settings, local) = dirs();
        let policy = local.write_policy("ALC", "<policy/>").unwrap();
        assert_eq!(policy, settings.policy_dir().join("ALC_policy.xml"));
        assert_eq!(fs::read_to_string(policy).unwrap(), "<policy/>");

        let action = local.write_action("SAV", "../../etc/passwd", "<action/>").unwrap();
        assert_eq!(action.parent(), Some(settings.action_dir().as_path()));
    }
}
