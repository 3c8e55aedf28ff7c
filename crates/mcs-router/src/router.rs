//! Router main loop
//!
//! One task owns every piece of router state. Each iteration:
//!
//! ```text
//!  registry ─► command poll (if due) ─► statuses ─► send status ─► events ─► send events ─► wait
//!                  │                                  (no errors)              (no errors)
//!                  ├─ connect + capabilities (commit policy)
//!                  └─ register (if needed)
//! ```
//!
//! The wait ends on shutdown, a directory wake-up or the computed timeout,
//! checked in that order.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use mcs_core::{keys, AgentSettings, SharedConfig};
use mcs_router_core::{
    CommandCheckInterval, CommsError, EndpointStrategy, ErrorClass, EventsTimer, LocalAddresses,
    PolicyHandler, RelayPriorityStrategy, StatusCache, StatusTimer, MIN_WAIT,
};
use mcs_types::{
    epoch_millis, AppId, AppStatus, Command, CommandKind, Events, StatusEvent, MCS_APP_ID,
};

use crate::app_registry::AppRegistry;
use crate::comms::{Comms, CommsFactory, ConnectionPlan};
use crate::event_queue::EventQueue;
use crate::local_dirs::LocalDirs;
use crate::locality::discover_local_addresses;
use crate::mcs_status::McsStatus;

/// Connection state of the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Disconnected,
    Connecting,
    Registering,
    Active,
}

/// Clock shared with tokio so paused test time applies to the timers
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct Router {
    settings: AgentSettings,
    root_config: SharedConfig,
    policy_config: SharedConfig,
    policy_handler: PolicyHandler,
    factory: Box<dyn CommsFactory>,
    strategy: Box<dyn EndpointStrategy>,
    local_addresses: Option<LocalAddresses>,

    comms: Option<Box<dyn Comms>>,
    state: RouterState,

    interval: CommandCheckInterval,
    error_count: u32,
    last_poll: Option<Instant>,

    status_timer: StatusTimer,
    events_timer: EventsTimer,
    status_cache: StatusCache,
    /// Changed statuses not yet accepted by the server
    pending_statuses: BTreeMap<AppId, String>,
    event_queue: EventQueue,

    registry: AppRegistry,
    local: LocalDirs,
}

impl Router {
    pub fn new(
        settings: AgentSettings,
        root_config: SharedConfig,
        policy_config: SharedConfig,
        policy_handler: PolicyHandler,
        factory: Box<dyn CommsFactory>,
    ) -> Self {
        let (status_timer, events_timer, max_status_delay) = {
            let config = policy_config.read();
            (
                StatusTimer::from_config(&config, now()),
                EventsTimer::from_config(&config),
                config.get_int(keys::MAX_STATUS_DELAY, keys::DEFAULT_MAX_STATUS_DELAY).max(0) as u64,
            )
        };

        Self {
            interval: CommandCheckInterval::new(policy_config.clone()),
            status_cache: StatusCache::load(settings.status_cache_path(), max_status_delay),
            event_queue: EventQueue::new(settings.event_queue_capacity),
            registry: AppRegistry::new(settings.registry_dir()),
            local: LocalDirs::new(&settings),
            settings,
            root_config,
            policy_config,
            policy_handler,
            factory,
            strategy: Box::new(RelayPriorityStrategy),
            local_addresses: None,
            comms: None,
            state: RouterState::Disconnected,
            error_count: 0,
            last_poll: None,
            status_timer,
            events_timer,
            pending_statuses: BTreeMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn EndpointStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Skip address discovery and rank relays against `local`
    pub fn with_local_addresses(mut self, local: LocalAddresses) -> Self {
        self.local_addresses = Some(local);
        self
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn command_interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn policy_handler(&self) -> &PolicyHandler {
        &self.policy_handler
    }

    pub fn queued_events(&self) -> usize {
        self.event_queue.size()
    }

    pub fn pending_statuses(&self) -> usize {
        self.pending_statuses.len()
    }

    /// Run until `shutdown` becomes true, then close the connection
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, mut wake: mpsc::Receiver<()>) {
        info!(install_dir = %self.settings.install_dir.display(), "MCS router started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let timeout = self.run_once().await;
            trace!(timeout_ms = timeout.as_millis() as u64, "Waiting");

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(()) = wake.recv() => {
                    trace!("Woken by local change");
                }
                _ = tokio::time::sleep(timeout) => {}
            }
        }

        self.disconnect().await;
        info!("MCS router stopped");
    }

    /// One pass over every due action. Returns how long to wait before the
    /// next pass.
    pub async fn run_once(&mut self) -> Duration {
        self.check_app_registry();

        if self.poll_due(now()) {
            if let Err(e) = self.poll_cycle().await {
                self.handle_error(e).await;
            }
        }

        self.check_statuses(now());
        if let Err(e) = self.send_status_if_due(now()).await {
            self.handle_error(e).await;
        }

        self.collect_events(now());
        if let Err(e) = self.send_events_if_due(now()).await {
            self.handle_error(e).await;
        }

        self.next_timeout(now())
    }

    fn check_app_registry(&mut self) {
        let added = self.registry.refresh();
        if added.is_empty() {
            return;
        }
        for app_id in &added {
            self.status_cache.forget(app_id);
        }
        self.last_poll = None;
        self.status_timer.force();
    }

    fn poll_due(&self, now: Instant) -> bool {
        match self.last_poll {
            Some(last) => now.saturating_duration_since(last) >= self.interval.get(),
            None => true,
        }
    }

    /// Connect and register when needed, then poll for commands
    async fn poll_cycle(&mut self) -> Result<(), CommsError> {
        self.last_poll = Some(now());

        if self.comms.is_none() {
            self.connect().await?;
        }
        if self.needs_registration() {
            self.register().await?;
        }
        self.state = RouterState::Active;

        let app_ids = self.registry.policy_app_ids();
        let commands = self.active_comms()?.query_commands(&app_ids).await?;
        self.error_count = 0;

        if commands.is_empty() {
            let interval = self.interval.increment(None);
            debug!(interval_secs = interval.as_secs_f64(), "No commands");
        } else {
            let minimum = self.interval.minimum();
            self.interval.set(Some(minimum));
            info!(count = commands.len(), "Received commands");
            self.process_commands(commands).await;
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), CommsError> {
        self.state = RouterState::Connecting;

        let local = match &self.local_addresses {
            Some(local) => local.clone(),
            None => {
                let local = discover_local_addresses().await;
                self.local_addresses = Some(local.clone());
                local
            }
        };

        let mut plan = ConnectionPlan::from_config(&self.policy_config.read());
        plan.rank_relays(&local, self.strategy.as_ref()).await;
        if !plan.has_route() {
            return Err(CommsError::ConnectionFailed("no management server configured".into()));
        }

        let mut comms = self.factory.connect(&plan)?;
        let capabilities = comms.capabilities().await?;
        debug!(capabilities = %capabilities, servers = plan.servers.len(), relays = plan.relays.len(), "Connected");
        self.comms = Some(comms);

        // The live connection now reflects the policy store
        self.policy_handler.commit();
        Ok(())
    }

    fn needs_registration(&self) -> bool {
        match self.root_config.read().get(keys::MCS_ID) {
            Some(id) => id.trim().is_empty() || id == keys::REREGISTER_SENTINEL,
            None => true,
        }
    }

    async fn register(&mut self) -> Result<(), CommsError> {
        self.state = RouterState::Registering;
        info!("Registering with management service");

        // Start from a clean slate: every status counts as changed
        self.status_cache.clear();
        self.pending_statuses.clear();

        let token = self.policy_config.read().get(keys::MCS_TOKEN).unwrap_or_default();
        let status_xml = self.mcs_status().to_xml();
        let credentials = self.active_comms()?.register(&token, &status_xml).await?;
        self.active_comms()?.set_credentials(&credentials);

        {
            let mut root = self.root_config.write();
            root.set(keys::MCS_ID, credentials.endpoint_id.clone());
            root.set(keys::MCS_PASSWORD, credentials.password.clone());
            if let Err(e) = root.save() {
                error!(error = %e, "Failed to save registration");
            }
        }

        info!(endpoint_id = %credentials.endpoint_id, "Registered");
        self.status_timer.force();
        Ok(())
    }

    async fn process_commands(&mut self, commands: Vec<Command>) {
        let mut policy_applied = false;

        for command in commands {
            debug!(command_id = %command.id, app_id = %command.app_id, "Processing command");
            match (command.app_id.as_str(), command.kind()) {
                (MCS_APP_ID, CommandKind::Policy) => {
                    policy_applied |= self.policy_handler.process(&command.body);
                }
                (app_id, CommandKind::Policy) => {
                    if let Err(e) = self.local.write_policy(app_id, &command.body) {
                        warn!(app_id = %app_id, error = %e, "Failed to write policy");
                    }
                }
                (app_id, CommandKind::Action) => {
                    if let Err(e) = self.local.write_action(app_id, &command.id, &command.body) {
                        warn!(app_id = %app_id, command_id = %command.id, error = %e, "Failed to write action");
                    }
                }
            }
        }

        if policy_applied && !self.policy_handler.is_compliant() {
            info!("MCS policy changed the connection settings, reconnecting");
            self.disconnect().await;
            self.last_poll = None;
        }
    }

    fn mcs_status(&self) -> McsStatus {
        let rev_id = self
            .policy_handler
            .current()
            .map(|policy| policy.compliance.rev_id.clone());
        McsStatus::new(&self.settings, self.policy_handler.compliance_result(), rev_id)
    }

    /// Current status of the router and every registered app
    fn current_statuses(&self) -> Vec<AppStatus> {
        let mut statuses = vec![AppStatus::new(MCS_APP_ID, self.mcs_status().to_xml())];
        statuses.extend(
            self.local
                .read_statuses()
                .into_iter()
                .filter(|status| status.app_id != MCS_APP_ID && self.registry.is_registered(&status.app_id)),
        );
        statuses
    }

    fn check_statuses(&mut self, now: Instant) {
        for status in self.current_statuses() {
            if self.status_cache.has_status_changed(&status.app_id, &status.xml) {
                if self.pending_statuses.get(&status.app_id) != Some(&status.xml) {
                    debug!(app_id = %status.app_id, "Status changed");
                }
                self.pending_statuses.insert(status.app_id, status.xml);
                self.status_timer.status_updated_at(now);
            } else {
                // Back to what the service already has
                self.pending_statuses.remove(&status.app_id);
            }
        }
    }

    async fn send_status_if_due(&mut self, now: Instant) -> Result<(), CommsError> {
        if self.error_count > 0 || self.state != RouterState::Active || !self.status_timer.send_status_at(now) {
            return Ok(());
        }

        if self.pending_statuses.is_empty() {
            // Periodic resend of unchanged statuses
            for status in self.current_statuses() {
                self.pending_statuses.insert(status.app_id, status.xml);
            }
        }

        let mut event = StatusEvent::new();
        for (app_id, xml) in &self.pending_statuses {
            event.add(AppStatus::new(app_id.clone(), xml.clone()));
        }

        match self.active_comms()?.send_status_event(&event).await {
            Ok(()) => {
                info!(app_ids = ?event.app_ids(), "Status sent");
                // Only statuses the service accepted count as known
                for (app_id, xml) in std::mem::take(&mut self.pending_statuses) {
                    self.status_cache.record(&app_id, &xml);
                }
                self.status_timer.status_sent_at(now);
                Ok(())
            }
            Err(e) => {
                self.status_timer.error_sending_status_at(now);
                Err(e)
            }
        }
    }

    fn collect_events(&mut self, now: Instant) {
        let expired = self.event_queue.purge_expired(epoch_millis());
        if expired > 0 {
            warn!(count = expired, "Discarded expired events");
            self.events_timer.events_dropped(expired);
        }

        // Files stay on disk until the queue has room for them
        let room = self.event_queue.free_slots();
        let queue = &mut self.event_queue;
        let timer = &mut self.events_timer;
        self.local.take_events(epoch_millis(), room, |record| match queue.enqueue(record) {
            Ok(()) => {
                timer.event_added_at(now);
                true
            }
            Err(e) => {
                debug!(error = %e, "Leaving event file for a later pass");
                false
            }
        });
    }

    async fn send_events_if_due(&mut self, now: Instant) -> Result<(), CommsError> {
        if self.error_count > 0
            || self.state != RouterState::Active
            || self.event_queue.is_empty()
            || !self.events_timer.send_events_at(now)
        {
            return Ok(());
        }

        let batch: Events = self.event_queue.batch();
        match self.active_comms()?.send_events(&batch).await {
            Ok(()) => {
                info!(count = batch.len(), "Events sent");
                self.event_queue.acknowledge(&batch);
                self.events_timer.events_sent_at(now);
                Ok(())
            }
            Err(e) => {
                self.events_timer.error_sending_events();
                Err(e)
            }
        }
    }

    /// Back off, drop the connection, and arrange re-registration if asked
    async fn handle_error(&mut self, error: CommsError) {
        let class = error.class();
        if class == ErrorClass::ReregistrationRequired {
            warn!("Server requested re-registration");
            self.mark_for_reregistration();
        }

        let transient = class != ErrorClass::SemiPermanent;
        let interval = self.interval.set_on_error(self.error_count, transient);
        self.error_count = self.error_count.saturating_add(1);
        warn!(
            error = %error,
            class = ?class,
            error_count = self.error_count,
            retry_in_secs = interval.as_secs_f64(),
            "MCS communication failed"
        );

        self.disconnect().await;
    }

    fn mark_for_reregistration(&mut self) {
        {
            let mut root = self.root_config.write();
            root.set(keys::MCS_ID, keys::REREGISTER_SENTINEL);
            if let Err(e) = root.save() {
                error!(error = %e, "Failed to save re-registration marker");
            }
        }
        self.status_cache.clear();
        self.pending_statuses.clear();
    }

    async fn disconnect(&mut self) {
        if let Some(mut comms) = self.comms.take() {
            comms.close().await;
            debug!("Connection closed");
        }
        self.state = RouterState::Disconnected;
    }

    fn active_comms(&mut self) -> Result<&mut Box<dyn Comms>, CommsError> {
        self.comms
            .as_mut()
            .ok_or_else(|| CommsError::ConnectionFailed("not connected".into()))
    }

    /// Next wake-up: the command poll, plus the send timers while healthy
    fn next_timeout(&self, now: Instant) -> Duration {
        let mut timeout = match self.last_poll {
            Some(last) => self.interval.get().saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        if self.error_count == 0 {
            timeout = timeout
                .min(self.status_timer.relative_time_at(now))
                .min(self.events_timer.relative_time_at(now));
        }
        timeout.max(MIN_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcs_core::ConfigStore;
    use mcs_router_core::LoadMode;
    use mcs_types::Credentials;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Script {
        connects: usize,
        registrations: usize,
        polls: usize,
        status_sends: Vec<StatusEvent>,
        poll_results: VecDeque<Result<Vec<Command>, CommsError>>,
    }

    struct FakeComms(Arc<Mutex<Script>>);

    #[async_trait]
    impl Comms for FakeComms {
        async fn capabilities(&mut self) -> Result<String, CommsError> {
            Ok("<capabilities/>".into())
        }

        async fn register(&mut self, _token: &str, _status_xml: &str) -> Result<Credentials, CommsError> {
            self.0.lock().registrations += 1;
            Ok(Credentials {
                endpoint_id: "endpoint-1".into(),
                password: "secret".into(),
            })
        }

        async fn query_commands(&mut self, _app_ids: &[String]) -> Result<Vec<Command>, CommsError> {
            let mut script = self.0.lock();
            script.polls += 1;
            script.poll_results.pop_front().unwrap_or_else(|| Ok(vec![]))
        }

        async fn send_status_event(&mut self, status: &StatusEvent) -> Result<(), CommsError> {
            self.0.lock().status_sends.push(status.clone());
            Ok(())
        }

        async fn send_events(&mut self, _events: &Events) -> Result<(), CommsError> {
            Ok(())
        }

        fn set_credentials(&mut self, _credentials: &Credentials) {}

        async fn close(&mut self) {}
    }

    struct FakeFactory(Arc<Mutex<Script>>);

    impl CommsFactory for FakeFactory {
        fn connect(&self, _plan: &ConnectionPlan) -> Result<Box<dyn Comms>, CommsError> {
            self.0.lock().connects += 1;
            Ok(Box::new(FakeComms(self.0.clone())))
        }
    }

    fn router(dir: &tempfile::TempDir, script: Arc<Mutex<Script>>) -> Router {
        let settings = AgentSettings::with_install_dir(dir.path());
        let mut root = ConfigStore::load(settings.root_config_path(), None);
        root.set(keys::MCS_URL, "https://mcs.example.com/mcs");
        let root = root.into_shared();
        let policy = ConfigStore::load(settings.policy_config_path(), Some(root.clone())).into_shared();
        let applied = ConfigStore::with_parent(root.clone()).into_shared();
        let handler = PolicyHandler::new(settings.mcs_policy_path(), policy.clone(), applied, LoadMode::Registration);
        Router::new(settings, root, policy, handler, Box::new(FakeFactory(script)))
            .with_local_addresses(LocalAddresses::default())
    }

    #[tokio::test]
    async fn test_first_pass_registers_and_sends_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let mut router = router(&dir, script.clone());

        router.run_once().await;

        assert_eq!(router.state(), RouterState::Active);
        let script = script.lock();
        assert_eq!(script.connects, 1);
        assert_eq!(script.registrations, 1);
        assert_eq!(script.polls, 1);
        // Registration forces an immediate status
        assert_eq!(script.status_sends.len(), 1);
        assert_eq!(script.status_sends[0].app_ids(), vec!["MCS"]);
    }

    #[tokio::test]
    async fn test_error_backs_off_and_suppresses_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        script
            .lock()
            .poll_results
            .push_back(Err(CommsError::ConnectionFailed("reset".into())));
        let mut router = router(&dir, script.clone());

        let timeout = router.run_once().await;

        assert_eq!(router.error_count(), 1);
        assert_eq!(router.state(), RouterState::Disconnected);
        assert!(script.lock().status_sends.is_empty());
        assert!(router.command_interval() >= Duration::from_secs(5));
        assert!(router.command_interval() <= Duration::from_secs(20));
        assert!(timeout >= MIN_WAIT);
    }

    #[tokio::test]
    async fn test_commands_reset_interval_to_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        script
            .lock()
            .poll_results
            .push_back(Ok(vec![Command::new("1", "ALC", "<action/>")]));
        let mut router = router(&dir, script);

        router.run_once().await;
        assert_eq!(router.command_interval(), Duration::from_secs(5));
        assert!(dir.path().join("actions/ALC_action_1.xml").exists());
    }

    #[tokio::test]
    async fn test_empty_poll_increments_interval() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let mut router = router(&dir, script);

        router.run_once().await;
        assert_eq!(router.command_interval(), Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_full_queue_leaves_event_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let mut router = router(&dir, script);
        router.event_queue = EventQueue::new(2);

        let event_dir = dir.path().join("event");
        std::fs::create_dir_all(&event_dir).unwrap();
        for id in 1..=3 {
            std::fs::write(event_dir.join(format!("ALC_event-{}.xml", id)), "<event/>").unwrap();
        }

        router.collect_events(now());
        assert_eq!(router.queued_events(), 2);
        assert!(!event_dir.join("ALC_event-1.xml").exists());
        assert!(event_dir.join("ALC_event-3.xml").exists());

        // Same id as a queued record waits until that one is sent
        std::fs::write(event_dir.join("ALC_event-1.xml"), "<event>again</event>").unwrap();
        let batch = router.event_queue.batch();
        router.event_queue.acknowledge(&Events::new(batch.records[1..].to_vec()));
        router.collect_events(now());
        assert_eq!(router.queued_events(), 2);
        assert!(event_dir.join("ALC_event-1.xml").exists());
        assert!(!event_dir.join("ALC_event-3.xml").exists());

        let batch = router.event_queue.batch();
        router.event_queue.acknowledge(&batch);
        router.collect_events(now());
        let batch = router.event_queue.batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].body, "<event>again</event>");
        assert!(!event_dir.join("ALC_event-1.xml").exists());
    }
}
