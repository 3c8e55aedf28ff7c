//! Scripted transport shared by the agent tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use mcs_core::{keys, AgentSettings, ConfigStore, SharedConfig};
use mcs_router::{Comms, CommsFactory, ConnectionPlan, Router};
use mcs_router_core::{CommsError, LoadMode, LocalAddresses, PolicyHandler};
use mcs_types::{Command, Credentials, Events, StatusEvent};

/// Everything the fake service saw, plus its queued answers
#[derive(Default)]
pub struct Script {
    pub plans: Vec<ConnectionPlan>,
    pub registrations: usize,
    pub registration_tokens: Vec<String>,
    pub polled_app_ids: Vec<Vec<String>>,
    pub poll_results: VecDeque<Result<Vec<Command>, CommsError>>,
    pub status_sends: Vec<StatusEvent>,
    pub event_sends: Vec<Events>,
    pub closes: usize,
    pub credentials: Option<Credentials>,
}

pub type SharedScript = Arc<Mutex<Script>>;

pub fn script() -> SharedScript {
    Arc::new(Mutex::new(Script::default()))
}

pub struct ScriptedComms(SharedScript);

#[async_trait]
impl Comms for ScriptedComms {
    async fn capabilities(&mut self) -> Result<String, CommsError> {
        Ok("<capabilities/>".to_string())
    }

    async fn register(&mut self, token: &str, _status_xml: &str) -> Result<Credentials, CommsError> {
        let mut script = self.0.lock();
        script.registrations += 1;
        script.registration_tokens.push(token.to_string());
        Ok(Credentials {
            endpoint_id: format!("endpoint-{}", script.registrations),
            password: "secret".to_string(),
        })
    }

    async fn query_commands(&mut self, app_ids: &[String]) -> Result<Vec<Command>, CommsError> {
        let mut script = self.0.lock();
        script.polled_app_ids.push(app_ids.to_vec());
        script.poll_results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_status_event(&mut self, status: &StatusEvent) -> Result<(), CommsError> {
        self.0.lock().status_sends.push(status.clone());
        Ok(())
    }

    async fn send_events(&mut self, events: &Events) -> Result<(), CommsError> {
        self.0.lock().event_sends.push(events.clone());
        Ok(())
    }

    fn set_credentials(&mut self, credentials: &Credentials) {
        self.0.lock().credentials = Some(credentials.clone());
    }

    async fn close(&mut self) {
        self.0.lock().closes += 1;
    }
}

pub struct ScriptedFactory(pub SharedScript);

impl CommsFactory for ScriptedFactory {
    fn connect(&self, plan: &ConnectionPlan) -> Result<Box<dyn Comms>, CommsError> {
        self.0.lock().plans.push(plan.clone());
        Ok(Box::new(ScriptedComms(self.0.clone())))
    }
}

/// Initialize tracing for tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Root config file every test starts from
pub fn write_root_config(settings: &AgentSettings, extra: &[(&str, &str)]) {
    let mut root = ConfigStore::load(settings.root_config_path(), None);
    root.set(keys::MCS_URL, "https://mcs.example.com/mcs");
    root.set(keys::MCS_TOKEN, "install-token");
    for (key, value) in extra {
        root.set(*key, *value);
    }
    root.save().expect("save root config");
}

pub struct Harness {
    pub settings: AgentSettings,
    pub root: SharedConfig,
    pub policy: SharedConfig,
    pub router: Router,
}

/// Router over `dir` talking to the scripted service
pub fn harness(dir: &tempfile::TempDir, script: &SharedScript) -> Harness {
    let settings = AgentSettings::with_install_dir(dir.path());
    if !settings.root_config_path().exists() {
        write_root_config(&settings, &[]);
    }

    let root = ConfigStore::load(settings.root_config_path(), None).into_shared();
    let policy = ConfigStore::load(settings.policy_config_path(), Some(root.clone())).into_shared();
    let applied = ConfigStore::with_parent(root.clone()).into_shared();
    let handler = PolicyHandler::new(
        settings.mcs_policy_path(),
        policy.clone(),
        applied,
        LoadMode::Registration,
    );
    let router = Router::new(
        settings.clone(),
        root.clone(),
        policy.clone(),
        handler,
        Box::new(ScriptedFactory(script.clone())),
    )
    .with_local_addresses(LocalAddresses::new(vec!["10.0.2.15".parse().unwrap()], vec![]));

    Harness {
        settings,
        root,
        policy,
        router,
    }
}

/// An MCS policy with the given servers and `(priority, address)` relays
pub fn mcs_policy(rev: &str, servers: &[&str], relays: &[(&str, &str)]) -> String {
    let servers: String = servers.iter().map(|s| format!("<server>{}</server>", s)).collect();
    let relays: String = relays
        .iter()
        .map(|(priority, address)| {
            format!(
                r#"<messageRelay priority="{}" port="8190" address="{}" id="{}"/>"#,
                priority, address, address
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<policy xmlns:csc="com.sophos\msys\csc" type="mcs">
  <csc:Comp RevID="{}" policyType="25"/>
  <configuration>
    <registrationToken>policy-token</registrationToken>
    <servers>{}</servers>
    <messageRelays>{}</messageRelays>
    <commandPollingDelay default="20"/>
  </configuration>
</policy>"#,
        rev, servers, relays
    )
}

/// Latest `MCS` status body sent to the service
pub fn last_mcs_status(script: &SharedScript) -> Option<String> {
    script
        .lock()
        .status_sends
        .iter()
        .rev()
        .flat_map(|event| event.statuses.iter())
        .find(|status| status.app_id == "MCS")
        .map(|status| status.xml.clone())
}
