//! Local address discovery and candidate resolution

use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use mcs_router_core::{CandidateEndpoint, LocalAddresses};

/// Well-known public addresses used only to pick a route; nothing is sent.
const ROUTE_TARGET_V4: &str = "8.8.8.8:53";
const ROUTE_TARGET_V6: &str = "[2001:4860:4860::8888]:53";

/// Preferred source addresses of this host, by family.
///
/// Connecting an unbound UDP socket asks the kernel for a route without
/// sending a packet. Hosts with no route for a family get an empty list.
pub async fn discover_local_addresses() -> LocalAddresses {
    let mut local = LocalAddresses::default();
    if let Some(IpAddr::V4(addr)) = route_source("0.0.0.0:0", ROUTE_TARGET_V4).await {
        local.v4.push(addr);
    }
    if let Some(IpAddr::V6(addr)) = route_source("[::]:0", ROUTE_TARGET_V6).await {
        local.v6.push(addr);
    }
    debug!(v4 = ?local.v4, v6 = ?local.v6, "Discovered local addresses");
    local
}

async fn route_source(bind: &str, target: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind(bind).await.ok()?;
    if let Err(e) = socket.connect(target).await {
        trace!(target = %target, error = %e, "No route for address family");
        return None;
    }
    let addr = socket.local_addr().ok()?.ip();
    (!addr.is_unspecified()).then_some(addr)
}

/// Fill in `ips` for every candidate; failures leave it empty.
pub async fn resolve_candidates(candidates: &mut [CandidateEndpoint]) {
    for candidate in candidates.iter_mut() {
        if let Ok(ip) = candidate.hostname.parse::<IpAddr>() {
            candidate.ips = vec![ip];
            continue;
        }
        match tokio::net::lookup_host((candidate.hostname.as_str(), candidate.port)).await {
            Ok(addrs) => {
                let mut ips: Vec<IpAddr> = addrs.map(|addr: SocketAddr| addr.ip()).collect();
                ips.dedup();
                candidate.ips = ips;
            }
            Err(e) => {
                debug!(host = %candidate.hostname, error = %e, "Failed to resolve candidate");
                candidate.ips.clear();
            }
        }
    }
}
