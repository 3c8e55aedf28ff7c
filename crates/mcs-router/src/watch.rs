//! Directory watcher
//!
//! Polls the watched directories and wakes the router loop when their
//! contents change. A change is detected by hashing every entry's name,
//! size and modification time. Wake-ups are coalesced: the channel holds at
//! most one pending notification.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Create the wake-up channel shared by the watcher and the router
pub fn wake_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(1)
}

/// Wake the router unless a wake-up is already pending
pub fn notify(wake: &mpsc::Sender<()>) {
    if wake.try_send(()).is_err() {
        trace!("Wake-up already pending");
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    dirs: Vec<PathBuf>,
    interval: Duration,
}

impl DirectoryWatcher {
    pub fn new(dirs: Vec<PathBuf>, interval: Duration) -> Self {
        Self { dirs, interval }
    }

    /// Hash of the current directory listings
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for dir in &self.dirs {
            hasher.update(dir.to_string_lossy().as_bytes());
            let Ok(listing) = fs::read_dir(dir) else {
                hasher.update(b"\0missing");
                continue;
            };

            let mut entries: Vec<(String, u64, u128)> = listing
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let metadata = entry.metadata().ok()?;
                    let modified = metadata
                        .modified()
                        .ok()
                        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                        .map_or(0, |d| d.as_nanos());
                    Some((entry.file_name().to_string_lossy().into_owned(), metadata.len(), modified))
                })
                .collect();
            entries.sort();

            for (name, len, modified) in entries {
                hasher.update(b"\0");
                hasher.update(name.as_bytes());
                hasher.update(&len.to_le_bytes());
                hasher.update(&modified.to_le_bytes());
            }
        }
        hasher.finalize()
    }

    /// Poll until `shutdown` flips to true or the router goes away
    pub fn spawn(self, wake: mpsc::Sender<()>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(dirs = ?self.dirs, interval_ms = self.interval.as_millis() as u64, "Directory watcher started");
            let mut last = self.fingerprint();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if wake.is_closed() {
                            break;
                        }
                        let current = self.fingerprint();
                        if current != last {
                            trace!("Watched directories changed");
                            last = current;
                            notify(&wake);
                        }
                    }
                }
            }
            debug!("Directory watcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_changes() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(vec![dir.path().to_path_buf()], Duration::from_millis(10));

        let empty = watcher.fingerprint();
        assert_eq!(empty, watcher.fingerprint());

        fs::write(dir.path().join("ALC_status.xml"), "<status/>").unwrap();
        let one = watcher.fingerprint();
        assert_ne!(empty, one);

        fs::write(dir.path().join("ALC_status.xml"), "<status>longer</status>").unwrap();
        assert_ne!(one, watcher.fingerprint());
    }

    #[test]
    fn test_notify_coalesces() {
        let (tx, mut rx) = wake_channel();
        notify(&tx);
        notify(&tx);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watcher_wakes_on_change_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::new(vec![dir.path().to_path_buf()], Duration::from_millis(10));
        let (tx, mut rx) = wake_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = watcher.spawn(tx, shutdown_rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        fs::write(dir.path().join("ALC_event-1.xml"), "<event/>").unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(woke, Ok(Some(()))));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher stops")
            .unwrap();
    }
}
