//! Relay Priority Strategy
//!
//! Message relays come with an explicit priority tier from policy. Tiers are
//! tried in ascending order; inside a tier the closest relay goes first.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

use mcs_types::MessageRelay;

use super::distance::order_by_distance;
use super::EndpointStrategy;
use crate::types::{CandidateEndpoint, LocalAddresses};

/// Build unresolved candidates from policy relays.
///
/// Relays with an unparsable port are dropped.
pub fn candidates_from_relays(relays: &[MessageRelay]) -> Vec<CandidateEndpoint> {
    relays
        .iter()
        .filter_map(|relay| match relay.port.trim().parse::<u16>() {
            Ok(port) => Some(
                CandidateEndpoint::new(relay.address.trim(), port)
                    .with_priority(relay.priority_rank())
                    .with_id(relay.id.clone()),
            ),
            Err(_) => {
                warn!(address = %relay.address, port = %relay.port, "Ignoring relay with invalid port");
                None
            }
        })
        .collect()
}

/// Group by priority (ascending), then order each tier by distance.
pub fn order_message_relays(
    relays: Vec<CandidateEndpoint>,
    local_v4: &[Ipv4Addr],
    local_v6: &[Ipv6Addr],
) -> Vec<CandidateEndpoint> {
    let mut tiers: BTreeMap<u32, Vec<CandidateEndpoint>> = BTreeMap::new();
    for relay in relays {
        tiers.entry(relay.priority).or_default().push(relay);
    }

    let ordered: Vec<CandidateEndpoint> = tiers
        .into_values()
        .flat_map(|tier| order_by_distance(local_v4, local_v6, tier))
        .collect();

    debug!(
        relays = ?ordered.iter().map(|r| r.authority()).collect::<Vec<_>>(),
        "Ordered message relays"
    );
    ordered
}

/// Priority-then-locality ranking strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayPriorityStrategy;

impl EndpointStrategy for RelayPriorityStrategy {
    fn rank(&self, candidates: Vec<CandidateEndpoint>, local: &LocalAddresses) -> Vec<CandidateEndpoint> {
        order_message_relays(candidates, &local.v4, &local.v6)
    }

    fn name(&self) -> &'static str {
        "RelayPriority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(host: &str, priority: u32, ip: Option<&str>) -> CandidateEndpoint {
        let candidate = CandidateEndpoint::new(host, 8190).with_priority(priority);
        match ip {
            Some(ip) => candidate.with_ips(vec![ip.parse().unwrap()]),
            None => candidate,
        }
    }

    #[test]
    fn test_priority_before_distance() {
        let local = LocalAddresses::new(vec![Ipv4Addr::new(10, 0, 2, 15)], vec![]);
        let relays = vec![
            relay("close-low-tier", 1, Some("10.0.2.14")),
            relay("far-top-tier", 0, Some("31.222.175.174")),
            relay("near-top-tier", 0, Some("10.0.3.15")),
        ];

        let ranked = RelayPriorityStrategy.rank(relays, &local);
        let hosts: Vec<_> = ranked.iter().map(|c| c.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["near-top-tier", "far-top-tier", "close-low-tier"]);
    }

    #[test]
    fn test_unresolved_last_within_tier() {
        let local = LocalAddresses::new(vec![Ipv4Addr::new(10, 0, 2, 15)], vec![]);
        let relays = vec![
            relay("unresolved", 0, None),
            relay("resolved", 0, Some("31.222.175.174")),
            relay("next-tier", 1, Some("10.0.2.14")),
        ];

        let ranked = RelayPriorityStrategy.rank(relays, &local);
        let hosts: Vec<_> = ranked.iter().map(|c| c.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["resolved", "unresolved", "next-tier"]);
    }

    #[test]
    fn test_candidates_from_relays() {
        let relays = vec![
            MessageRelay::new("1", "8190", "relay1", "ID1"),
            MessageRelay::new("0", "not-a-port", "relay2", "ID2"),
        ];
        let candidates = candidates_from_relays(&relays);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].priority, 1);
        assert_eq!(candidates[0].id.as_deref(), Some("ID1"));
    }

    #[test]
    fn test_empty_relays() {
        assert!(RelayPriorityStrategy.rank(vec![], &LocalAddresses::default()).is_empty());
    }
}
