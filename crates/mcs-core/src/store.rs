//! Layered key/value configuration store
//!
//! Values live in a flat `key=value` file. A store may have a parent that is
//! consulted whenever a key is missing locally, so the policy store can
//! override install-time values without copying them.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Store shared between the components of the router
pub type SharedConfig = Arc<RwLock<ConfigStore>>;

/// Configuration store errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config path missing parent directory: {0}")]
    NoParentDirectory(PathBuf),
}

/// Flat key/value store with optional parent fallback
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    /// Backing file (None = in-memory only)
    path: Option<PathBuf>,

    /// Values set in this layer
    values: BTreeMap<String, String>,

    /// Layer consulted on a local miss
    parent: Option<SharedConfig>,
}

impl ConfigStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty in-memory store layered over `parent`
    pub fn with_parent(parent: SharedConfig) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Load a store from disk.
    ///
    /// A missing or unreadable file yields an empty store; the path is kept
    /// so a later `save` creates it.
    pub fn load(path: impl Into<PathBuf>, parent: Option<SharedConfig>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            values,
            parent,
        }
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Parse `key=value` lines. Lines without `=` and `#` comments are skipped.
    pub fn parse(contents: &str) -> BTreeMap<String, String> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Render this layer in file form
    pub fn render(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a key in this layer, then in the parent chain
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.read().get(key))
    }

    /// Look up a key in this layer only
    pub fn get_local(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Integer lookup; a non-numeric value falls back to `default`
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(value) => match value.trim().parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(key = %key, value = %value, "Non-numeric config value, using default");
                    default
                }
            },
            None => default,
        }
    }

    /// Boolean lookup accepting `true`/`false`/`1`/`0`
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref().map(str::trim) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    /// Set a value in this layer. Keys containing `=` and keys or values
    /// containing line breaks cannot be stored in the file format and are
    /// rejected, leaving any previous value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let (key, value) = (key.into(), value.into());
        let breaks_line = |s: &str| s.contains(['\n', '\r']);
        if key.trim().is_empty() || key.contains('=') || breaks_line(&key) || breaks_line(&value) {
            warn!(key = %key.escape_debug(), "Rejected config value that cannot be stored");
            return false;
        }
        self.values.insert(key, value);
        true
    }

    /// Remove a key from this layer. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Keys set in this layer
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Persist this layer. In-memory stores succeed without writing.
    pub fn save(&self) -> Result<(), ConfigError> {
        match &self.path {
            Some(path) => atomic_write(path, self.render().as_bytes()),
            None => Ok(()),
        }
    }
}

/// Write through a temp file in the same directory, then rename over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = path
        .parent()
        .ok_or_else(|| ConfigError::NoParentDirectory(path.to_path_buf()))?;
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(data).map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        let values = ConfigStore::parse("# header\nMCSID=abc\n\nnot a pair\n=novalue\n key = spaced \n");
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("MCSID").map(String::as_str), Some("abc"));
        assert_eq!(values.get("key").map(String::as_str), Some("spaced"));
    }

    #[test]
    fn test_parent_fallback() {
        let mut root = ConfigStore::new();
        root.set("MCSURL", "https://root");
        root.set("MCSToken", "install-token");
        let root = root.into_shared();

        let mut policy = ConfigStore::with_parent(root.clone());
        policy.set("MCSToken", "policy-token");

        assert_eq!(policy.get("MCSToken").as_deref(), Some("policy-token"));
        assert_eq!(policy.get("MCSURL").as_deref(), Some("https://root"));
        assert_eq!(policy.get_local("MCSURL"), None);

        // Parent changes are visible through the child
        root.write().set("MCSURL", "https://changed");
        assert_eq!(policy.get("MCSURL").as_deref(), Some("https://changed"));
    }

    #[test]
    fn test_set_rejects_line_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcs.config");
        let mut store = ConfigStore::load(&path, None);
        assert!(store.set("MCSURL", "https://a"));
        assert!(!store.set("MCSURL", "https://b\nMCSID=injected"));
        assert!(!store.set("MCSToken", "abc\r"));
        assert!(!store.set("bad=key", "x"));
        assert_eq!(store.get("MCSURL").as_deref(), Some("https://a"));
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path, None);
        assert_eq!(reloaded.keys().collect::<Vec<_>>(), vec!["MCSURL"]);
        assert_eq!(reloaded.get("MCSURL").as_deref(), Some("https://a"));
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut store = ConfigStore::new();
        store.set("a", "1");
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
    }

    #[test]
    fn test_get_int_and_bool() {
        let mut store = ConfigStore::new();
        store.set("n", "42");
        store.set("bad", "forty");
        store.set("flag", "true");
        assert_eq!(store.get_int("n", 1), 42);
        assert_eq!(store.get_int("bad", 7), 7);
        assert_eq!(store.get_int("missing", 9), 9);
        assert!(store.get_bool("flag", false));
        assert!(!store.get_bool("missing", false));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("etc").join("mcs.config");

        let mut store = ConfigStore::load(&path, None);
        store.set("MCSID", "endpoint-1");
        store.set("MCSPassword", "secret");
        store.save().expect("save");

        let reloaded = ConfigStore::load(&path, None);
        assert_eq!(reloaded.get("MCSID").as_deref(), Some("endpoint-1"));
        assert_eq!(reloaded.get("MCSPassword").as_deref(), Some("secret"));
    }

    #[test]
    fn test_unreadable_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory cannot be read as a file
        let store = ConfigStore::load(dir.path(), None);
        assert_eq!(store.keys().count(), 0);
    }
}
