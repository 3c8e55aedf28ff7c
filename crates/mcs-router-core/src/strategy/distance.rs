//! Network-Locality Strategy
//!
//! Ranks candidates by how many low-order address bits differ from the
//! closest local address. Two addresses sharing a long common prefix are
//! likely on the same network segment.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::trace;

use super::EndpointStrategy;
use crate::error::RouterError;
use crate::types::{CandidateEndpoint, LocalAddresses};

/// Bit length of `a XOR b` over 32-bit addresses; 0 when equal.
pub fn ipv4_distance(a: Ipv4Addr, b: Ipv4Addr) -> u32 {
    let diff = u32::from(a) ^ u32::from(b);
    u32::BITS - diff.leading_zeros()
}

/// Bit length of `a XOR b` over 128-bit addresses; 0 when equal.
pub fn ipv6_distance(a: Ipv6Addr, b: Ipv6Addr) -> u32 {
    let diff = u128::from(a) ^ u128::from(b);
    u128::BITS - diff.leading_zeros()
}

/// Distance between two address literals of the same family
pub fn ip_distance(a: &str, b: &str) -> Result<u32, RouterError> {
    let parse = |s: &str| {
        s.trim()
            .parse::<IpAddr>()
            .map_err(|_| RouterError::InvalidAddress(s.to_string()))
    };
    match (parse(a)?, parse(b)?) {
        (IpAddr::V4(a), IpAddr::V4(b)) => Ok(ipv4_distance(a, b)),
        (IpAddr::V6(a), IpAddr::V6(b)) => Ok(ipv6_distance(a, b)),
        _ => Err(RouterError::InvalidAddress(format!("{} and {} differ in family", a, b))),
    }
}

/// Smallest distance from `ip` to any local address of the same family
fn nearest(ip: &IpAddr, local_v4: &[Ipv4Addr], local_v6: &[Ipv6Addr]) -> Option<u32> {
    match ip {
        IpAddr::V4(ip) => local_v4.iter().map(|local| ipv4_distance(*ip, *local)).min(),
        IpAddr::V6(ip) => local_v6.iter().map(|local| ipv6_distance(*ip, *local)).min(),
    }
}

/// Attach `distance` to every candidate and sort ascending.
///
/// The sort is stable. Candidates with no comparable address keep
/// `distance = None` and go last, in their original order.
pub fn order_by_distance(
    local_v4: &[Ipv4Addr],
    local_v6: &[Ipv6Addr],
    candidates: Vec<CandidateEndpoint>,
) -> Vec<CandidateEndpoint> {
    let mut ranked: Vec<CandidateEndpoint> = candidates
        .into_iter()
        .map(|mut candidate| {
            candidate.distance = candidate
                .ips
                .iter()
                .filter_map(|ip| nearest(ip, local_v4, local_v6))
                .min();
            trace!(host = %candidate.hostname, distance = ?candidate.distance, "Computed distance");
            candidate
        })
        .collect();

    ranked.sort_by_key(|c| c.distance.unwrap_or(u32::MAX));
    ranked
}

/// Locality-only ranking strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceStrategy;

impl EndpointStrategy for DistanceStrategy {
    fn rank(&self, candidates: Vec<CandidateEndpoint>, local: &LocalAddresses) -> Vec<CandidateEndpoint> {
        order_by_distance(&local.v4, &local.v6, candidates)
    }

    fn name(&self) -> &'static str {
        "Distance"
    }
}
