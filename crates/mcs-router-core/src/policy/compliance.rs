//! Policy vs applied configuration comparison

use tracing::debug;

use mcs_core::keys::{self, numbered};
use mcs_core::ConfigStore;

/// Scalar keys derived from the MCS policy
pub const TRACKED_SCALARS: &[&str] = &[
    keys::USE_SYSTEM_PROXY,
    keys::USE_AUTOMATIC_PROXY,
    keys::USE_DIRECT,
    keys::RANDOM_SKEW_FACTOR,
    keys::COMMAND_CHECK_INTERVAL_MINIMUM,
    keys::COMMAND_CHECK_INTERVAL_MAXIMUM,
    keys::PUSH_PING_TIMEOUT,
    keys::PUSH_FALLBACK_POLL_INTERVAL,
    keys::MCS_TOKEN,
    keys::POLICY_PROXY,
    keys::POLICY_PROXY_CREDENTIALS,
    keys::POLICY_TYPE,
    keys::POLICY_REV_ID,
];

/// Numbered list prefixes derived from the MCS policy
pub const TRACKED_LISTS: &[&str] = &[
    keys::POLICY_URL_PREFIX,
    keys::PUSH_SERVER_PREFIX,
    keys::RELAY_PRIORITY_PREFIX,
    keys::RELAY_PORT_PREFIX,
    keys::RELAY_ADDRESS_PREFIX,
    keys::RELAY_ID_PREFIX,
];

/// True iff every tracked field matches, including list lengths.
pub fn is_compliant(policy: &ConfigStore, applied: &ConfigStore) -> bool {
    for key in TRACKED_SCALARS {
        if policy.get(key) != applied.get(key) {
            debug!(key = %key, "Applied configuration differs from policy");
            return false;
        }
    }

    for prefix in TRACKED_LISTS {
        let mut index = 1;
        loop {
            let key = numbered(prefix, index);
            let (expected, actual) = (policy.get(&key), applied.get(&key));
            if expected != actual {
                debug!(key = %key, "Applied configuration differs from policy");
                return false;
            }
            if expected.is_none() {
                break;
            }
            index += 1;
        }
    }
    true
}

/// Copy every tracked field from `policy` into `applied`.
///
/// Fields missing from the policy side are removed from the applied layer so
/// the parent value shows through on both sides.
pub fn commit(policy: &ConfigStore, applied: &mut ConfigStore) {
    for key in TRACKED_SCALARS {
        match policy.get_local(key) {
            Some(value) => {
                applied.set(*key, value);
            }
            None => {
                applied.remove(key);
            }
        }
    }

    for prefix in TRACKED_LISTS {
        let values = super::codec::read_numbered_list(policy, prefix);
        super::codec::write_numbered_list(applied, prefix, &values);
    }
}
