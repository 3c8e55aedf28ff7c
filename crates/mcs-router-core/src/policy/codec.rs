//! Numbered-key codec between policy values and the flat config store
//!
//! Lists are stored as 1-based numbered keys (`mcs_policy_url1..N`,
//! `message_relay_priorityN` ...). Writing a shorter list removes the
//! trailing keys left by a longer one: removal walks forward until a
//! `remove` reports the key was not present.

use tracing::debug;

use mcs_core::keys::{self, numbered};
use mcs_core::ConfigStore;
use mcs_types::{MessageRelay, PolicyDocument};

const RELAY_PREFIXES: [&str; 4] = [
    keys::RELAY_PRIORITY_PREFIX,
    keys::RELAY_PORT_PREFIX,
    keys::RELAY_ADDRESS_PREFIX,
    keys::RELAY_ID_PREFIX,
];

/// Write `values` as `prefix1..prefixN`, removing stale trailing entries
pub fn write_numbered_list(store: &mut ConfigStore, prefix: &str, values: &[String]) {
    for (i, value) in values.iter().enumerate() {
        store.set(numbered(prefix, i + 1), value.clone());
    }
    remove_trailing(store, &[prefix], values.len() + 1);
}

/// Read `prefix1, prefix2, ...` up to the first missing index
pub fn read_numbered_list(store: &ConfigStore, prefix: &str) -> Vec<String> {
    (1..)
        .map(|i| store.get(&numbered(prefix, i)))
        .take_while(Option::is_some)
        .flatten()
        .collect()
}

pub fn write_relays(store: &mut ConfigStore, relays: &[MessageRelay]) {
    for (i, relay) in relays.iter().enumerate() {
        let index = i + 1;
        store.set(numbered(keys::RELAY_PRIORITY_PREFIX, index), relay.priority.clone());
        store.set(numbered(keys::RELAY_PORT_PREFIX, index), relay.port.clone());
        store.set(numbered(keys::RELAY_ADDRESS_PREFIX, index), relay.address.clone());
        store.set(numbered(keys::RELAY_ID_PREFIX, index), relay.id.clone());
    }
    remove_trailing(store, &RELAY_PREFIXES, relays.len() + 1);
}

/// Read relays up to the first index without a priority key
pub fn read_relays(store: &ConfigStore) -> Vec<MessageRelay> {
    let mut relays = Vec::new();
    for index in 1.. {
        let Some(priority) = store.get(&numbered(keys::RELAY_PRIORITY_PREFIX, index)) else {
            break;
        };
        let field = |prefix| store.get(&numbered(prefix, index)).unwrap_or_default();
        relays.push(MessageRelay::new(
            priority,
            field(keys::RELAY_PORT_PREFIX),
            field(keys::RELAY_ADDRESS_PREFIX),
            field(keys::RELAY_ID_PREFIX),
        ));
    }
    relays
}

/// Remove `prefixN` for every prefix from `start` until the first prefix
/// reports its key absent.
fn remove_trailing(store: &mut ConfigStore, prefixes: &[&str], start: usize) {
    let Some((first, rest)) = prefixes.split_first() else {
        return;
    };
    let mut index = start;
    loop {
        let present = store.remove(&numbered(first, index));
        for prefix in rest {
            store.remove(&numbered(prefix, index));
        }
        if !present {
            break;
        }
        debug!(prefix = %first, index, "Removed stale numbered key");
        index += 1;
    }
}

fn set_optional(store: &mut ConfigStore, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        store.set(key, value.clone());
    }
}

/// Write every policy-derived value into the policy store.
///
/// Absent scalars leave the stored value unchanged, with two exceptions:
/// a missing registration token stores an empty token, and a missing proxy
/// removes any stored proxy and credentials.
pub fn write_policy(store: &mut ConfigStore, policy: &PolicyDocument) {
    store.set(keys::POLICY_TYPE, policy.compliance.policy_type.clone());
    store.set(keys::POLICY_REV_ID, policy.compliance.rev_id.clone());

    set_optional(store, keys::USE_SYSTEM_PROXY, &policy.use_system_proxy);
    set_optional(store, keys::USE_AUTOMATIC_PROXY, &policy.use_automatic_proxy);
    set_optional(store, keys::USE_DIRECT, &policy.use_direct);
    set_optional(store, keys::RANDOM_SKEW_FACTOR, &policy.random_skew_factor);
    set_optional(store, keys::PUSH_PING_TIMEOUT, &policy.push_ping_timeout);
    set_optional(store, keys::PUSH_FALLBACK_POLL_INTERVAL, &policy.push_fallback_poll_interval);

    let polling_delay = match &policy.polling_delay {
        Some(delay) => delay.0.to_string(),
        None => store
            .get_local(keys::COMMAND_CHECK_INTERVAL_MAXIMUM)
            .map(str::to_string)
            .unwrap_or_else(|| keys::DEFAULT_POLLING_INTERVAL.to_string()),
    };
    store.set(keys::COMMAND_CHECK_INTERVAL_MINIMUM, polling_delay.clone());
    store.set(keys::COMMAND_CHECK_INTERVAL_MAXIMUM, polling_delay);

    store.set(
        keys::MCS_TOKEN,
        policy.registration_token.clone().unwrap_or_default(),
    );

    write_numbered_list(store, keys::POLICY_URL_PREFIX, &policy.servers);
    write_numbered_list(store, keys::PUSH_SERVER_PREFIX, &policy.push_servers);
    write_relays(store, &policy.message_relays);

    match &policy.proxy {
        Some(proxy) => {
            store.set(keys::POLICY_PROXY, proxy.clone());
            match &policy.proxy_credentials {
                Some(credentials) => {
                    store.set(keys::POLICY_PROXY_CREDENTIALS, credentials.clone());
                }
                None => {
                    store.remove(keys::POLICY_PROXY_CREDENTIALS);
                }
            }
        }
        None => {
            store.remove(keys::POLICY_PROXY);
            store.remove(keys::POLICY_PROXY_CREDENTIALS);
        }
    }
}
