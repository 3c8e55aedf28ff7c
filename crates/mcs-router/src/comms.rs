//! Transport contract and connection planning
//!
//! The router never talks HTTP itself. It builds a `ConnectionPlan` from the
//! policy store, asks a `CommsFactory` for a connection and drives the
//! returned `Comms`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mcs_core::{keys, ConfigStore};
use mcs_router_core::policy::{read_numbered_list, read_relays};
use mcs_router_core::{candidates_from_relays, CandidateEndpoint, CommsError, EndpointStrategy, LocalAddresses};
use mcs_types::{Command, Credentials, Events, StatusEvent};

/// A live connection to the management service
#[async_trait]
pub trait Comms: Send {
    /// First request of every connection; proves the plan works
    async fn capabilities(&mut self) -> Result<String, CommsError>;

    /// Register this endpoint, returning its new identity
    async fn register(&mut self, token: &str, status_xml: &str) -> Result<Credentials, CommsError>;

    async fn query_commands(&mut self, app_ids: &[String]) -> Result<Vec<Command>, CommsError>;

    async fn send_status_event(&mut self, status: &StatusEvent) -> Result<(), CommsError>;

    async fn send_events(&mut self, events: &Events) -> Result<(), CommsError>;

    /// Use new credentials for every following request
    fn set_credentials(&mut self, credentials: &Credentials);

    async fn close(&mut self);
}

/// Opens connections according to a plan
pub trait CommsFactory: Send + Sync {
    fn connect(&self, plan: &ConnectionPlan) -> Result<Box<dyn Comms>, CommsError>;
}

/// Everything the transport needs to reach the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPlan {
    /// Management server URLs, in policy order
    pub servers: Vec<String>,

    /// Message relays, best first
    pub relays: Vec<CandidateEndpoint>,

    pub push_servers: Vec<String>,

    pub proxy: Option<String>,
    pub proxy_credentials: Option<String>,

    pub use_system_proxy: bool,
    pub use_automatic_proxy: bool,
    pub use_direct: bool,

    /// Registered identity, if any
    pub credentials: Option<Credentials>,
}

impl ConnectionPlan {
    /// Read the plan from the policy store. Relays are left unresolved and
    /// unranked.
    pub fn from_config(config: &ConfigStore) -> Self {
        let mut servers = read_numbered_list(config, keys::POLICY_URL_PREFIX);
        if servers.is_empty() {
            servers.extend(config.get(keys::MCS_URL).filter(|url| !url.trim().is_empty()));
        }

        let credentials = match (config.get(keys::MCS_ID), config.get(keys::MCS_PASSWORD)) {
            (Some(endpoint_id), Some(password))
                if !endpoint_id.is_empty() && endpoint_id != keys::REREGISTER_SENTINEL =>
            {
                Some(Credentials { endpoint_id, password })
            }
            _ => None,
        };

        let proxy = config.get(keys::POLICY_PROXY).filter(|p| !p.trim().is_empty());
        let proxy_credentials = proxy
            .as_ref()
            .and_then(|_| config.get(keys::POLICY_PROXY_CREDENTIALS));

        Self {
            servers,
            relays: candidates_from_relays(&read_relays(config)),
            push_servers: read_numbered_list(config, keys::PUSH_SERVER_PREFIX),
            proxy,
            proxy_credentials,
            use_system_proxy: config.get_bool(keys::USE_SYSTEM_PROXY, true),
            use_automatic_proxy: config.get_bool(keys::USE_AUTOMATIC_PROXY, false),
            use_direct: config.get_bool(keys::USE_DIRECT, true),
            credentials,
        }
    }

    /// Resolve and order the relays
    pub async fn rank_relays(&mut self, local: &LocalAddresses, strategy: &dyn EndpointStrategy) {
        let mut relays = std::mem::take(&mut self.relays);
        crate::locality::resolve_candidates(&mut relays).await;
        self.relays = strategy.rank(relays, local);
        debug!(
            strategy = strategy.name(),
            relays = ?self.relays.iter().map(CandidateEndpoint::authority).collect::<Vec<_>>(),
            "Ranked message relays"
        );
    }

    pub fn has_route(&self) -> bool {
        !self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_router_core::policy::{write_numbered_list, write_relays};
    use mcs_router_core::RelayPriorityStrategy;
    use mcs_types::MessageRelay;
    use std::net::Ipv4Addr;

    #[test]
    fn test_plan_falls_back_to_root_url() {
        let mut root = ConfigStore::new();
        root.set(keys::MCS_URL, "https://root.example.com/mcs");
        let policy = ConfigStore::with_parent(root.into_shared());

        let plan = ConnectionPlan::from_config(&policy);
        assert_eq!(plan.servers, vec!["https://root.example.com/mcs"]);
        assert!(plan.has_route());
        assert!(plan.use_direct);
        assert!(plan.credentials.is_none());
    }

    #[test]
    fn test_plan_prefers_policy_urls_and_reads_identity() {
        let mut root = ConfigStore::new();
        root.set(keys::MCS_URL, "https://root.example.com/mcs");
        root.set(keys::MCS_ID, "endpoint-1");
        root.set(keys::MCS_PASSWORD, "secret");
        let mut policy = ConfigStore::with_parent(root.into_shared());
        write_numbered_list(&mut policy, keys::POLICY_URL_PREFIX, &["https://policy/mcs".to_string()]);
        policy.set(keys::USE_DIRECT, "false");

        let plan = ConnectionPlan::from_config(&policy);
        assert_eq!(plan.servers, vec!["https://policy/mcs"]);
        assert!(!plan.use_direct);
        assert_eq!(plan.credentials.map(|c| c.endpoint_id).as_deref(), Some("endpoint-1"));
    }

    #[test]
    fn test_reregister_sentinel_means_no_credentials() {
        let mut root = ConfigStore::new();
        root.set(keys::MCS_ID, keys::REREGISTER_SENTINEL);
        root.set(keys::MCS_PASSWORD, "secret");
        assert!(ConnectionPlan::from_config(&root).credentials.is_none());
    }

    #[test]
    fn test_proxy_credentials_need_proxy() {
        let mut store = ConfigStore::new();
        store.set(keys::POLICY_PROXY_CREDENTIALS, "abc");
        assert!(ConnectionPlan::from_config(&store).proxy_credentials.is_none());

        store.set(keys::POLICY_PROXY, "proxy:3128");
        let plan = ConnectionPlan::from_config(&store);
        assert_eq!(plan.proxy.as_deref(), Some("proxy:3128"));
        assert_eq!(plan.proxy_credentials.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_rank_relays_by_tier_then_distance() {
        let mut store = ConfigStore::new();
        write_relays(
            &mut store,
            &[
                MessageRelay::new("1", "8190", "10.0.2.14", "near-but-tier-1"),
                MessageRelay::new("0", "8190", "11.0.2.15", "far"),
                MessageRelay::new("0", "8190", "10.0.3.15", "closer"),
            ],
        );
        let mut plan = ConnectionPlan::from_config(&store);
        let local = LocalAddresses::new(vec![Ipv4Addr::new(10, 0, 2, 15)], vec![]);
        plan.rank_relays(&local, &RelayPriorityStrategy).await;

        let ids: Vec<_> = plan.relays.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec!["closer", "far", "near-but-tier-1"]);
        assert_eq!(plan.relays[0].distance, Some(9));
    }
}
