//! MCS Agent - endpoint management agent
//!
//! The agent is responsible for:
//! - Loading the root, policy and applied configuration stores
//! - Choosing how the policy handler starts (fresh registration or existing policy)
//! - Running the router loop next to the directory watcher
//! - Turning SIGINT/SIGTERM into a cooperative shutdown

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mcs_core::{keys, AgentSettings, ConfigStore, SharedConfig};
use mcs_router::{wake_channel, Comms, CommsFactory, ConnectionPlan, DirectoryWatcher, Router};
use mcs_router_core::{CommsError, LoadMode, PolicyHandler};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Factory used when no transport is linked in: every connection attempt
/// fails as a transient error, so the router keeps backing off.
#[derive(Debug, Default)]
pub struct OfflineCommsFactory;

impl CommsFactory for OfflineCommsFactory {
    fn connect(&self, plan: &ConnectionPlan) -> Result<Box<dyn Comms>, CommsError> {
        Err(CommsError::ConnectionFailed(format!(
            "no transport configured for {} server(s)",
            plan.servers.len()
        )))
    }
}

/// Endpoint agent
pub struct Agent {
    settings: AgentSettings,
    root_config: SharedConfig,
    mode: LoadMode,
    router: Router,
}

impl Agent {
    /// Create the directory layout and wire up the router
    pub fn new(settings: AgentSettings, factory: Box<dyn CommsFactory>) -> Result<Self, AgentError> {
        for dir in [
            settings.etc_dir(),
            settings.var_dir(),
            settings.policy_dir(),
            settings.action_dir(),
            settings.status_dir(),
            settings.event_dir(),
            settings.registry_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| AgentError::CreateDir { path: dir.clone(), source })?;
        }

        let root_config = ConfigStore::load(settings.root_config_path(), None).into_shared();
        let policy_config =
            ConfigStore::load(settings.policy_config_path(), Some(root_config.clone())).into_shared();
        let applied_config = ConfigStore::with_parent(root_config.clone()).into_shared();

        let mode = load_mode(&root_config.read());
        info!(
            install_dir = %settings.install_dir.display(),
            mode = ?mode,
            "Creating MCS agent"
        );

        let policy_handler = PolicyHandler::new(
            settings.mcs_policy_path(),
            policy_config.clone(),
            applied_config,
            mode,
        );
        let router = Router::new(
            settings.clone(),
            root_config.clone(),
            policy_config,
            policy_handler,
            factory,
        );

        Ok(Self {
            settings,
            root_config,
            mode,
            router,
        })
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn root_config(&self) -> &SharedConfig {
        &self.root_config
    }

    /// Replace the router, e.g. to pin local addresses
    pub fn map_router(mut self, f: impl FnOnce(Router) -> Router) -> Self {
        self.router = f(self.router);
        self
    }

    /// Run until `shutdown` becomes true
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let (wake_tx, wake_rx) = wake_channel();
        let watcher = DirectoryWatcher::new(
            self.settings.watched_dirs(),
            Duration::from_millis(self.settings.watch_interval_ms.max(1)),
        );
        let watcher_handle = watcher.spawn(wake_tx, shutdown.clone());

        self.router.run(shutdown, wake_rx).await;

        if let Err(e) = watcher_handle.await {
            warn!(error = %e, "Directory watcher task failed");
        }
        info!("MCS agent stopped");
    }
}

/// A registered endpoint re-applies its saved policy; anything else starts
/// from registration.
pub fn load_mode(root: &ConfigStore) -> LoadMode {
    match root.get(keys::MCS_ID) {
        Some(id) if !id.trim().is_empty() && id != keys::REREGISTER_SENTINEL => LoadMode::LoadExisting,
        _ => LoadMode::Registration,
    }
}

/// Flip `shutdown` on SIGINT or SIGTERM
pub fn spawn_signal_handler(shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Shutdown signal received");
        request_shutdown(&shutdown);
    })
}

/// Tell every shutdown receiver to stop. Returns false when none are left.
fn request_shutdown(shutdown: &watch::Sender<bool>) -> bool {
    if shutdown.send(true).is_err() {
        debug!("Shutdown requested after every receiver was dropped");
        return false;
    }
    true
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for SIGINT");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for SIGINT");
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT");
    }
}
