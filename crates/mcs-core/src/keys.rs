//! Well-known configuration keys and their defaults

// ========== Identity ==========
pub const MCS_ID: &str = "MCSID";
pub const MCS_PASSWORD: &str = "MCSPassword";
pub const MCS_TOKEN: &str = "MCSToken";
pub const MCS_URL: &str = "MCSURL";

/// `MCSID` value that forces a fresh registration
pub const REREGISTER_SENTINEL: &str = "reregister";

// ========== Command polling ==========
pub const COMMAND_CHECK_INTERVAL_MINIMUM: &str = "COMMAND_CHECK_INTERVAL_MINIMUM";
pub const COMMAND_CHECK_INTERVAL_MAXIMUM: &str = "COMMAND_CHECK_INTERVAL_MAXIMUM";
pub const COMMAND_CHECK_BASE_RETRY_DELAY: &str = "COMMAND_CHECK_BASE_RETRY_DELAY";
pub const COMMAND_CHECK_SEMI_PERMANENT_ERROR_RETRY_DELAY: &str =
    "COMMAND_CHECK_SEMI_PERMANENT_ERROR_RETRY_DELAY";
pub const COMMAND_CHECK_MAXIMUM_RETRY_NUMBER: &str = "COMMAND_CHECK_MAXIMUM_RETRY_NUMBER";

pub const DEFAULT_MIN_POLLING_INTERVAL: i64 = 5;
pub const DEFAULT_MAX_POLLING_INTERVAL: i64 = 3600;
pub const DEFAULT_POLLING_INTERVAL: i64 = 20;
pub const DEFAULT_MAX_RETRY_NUMBER: i64 = 10;

// ========== Send regulation ==========
pub const STATUS_REGULATION_DELAY: &str = "STATUS_REGULATION_DELAY";
pub const STATUS_MAX_DELAY: &str = "STATUS_MAX_DELAY";
pub const EVENTS_REGULATION_DELAY: &str = "EVENTS_REGULATION_DELAY";
pub const EVENTS_MAX_DELAY: &str = "EVENTS_MAX_DELAY";
pub const EVENTS_MAX_EVENTS: &str = "EVENTS_MAX_EVENTS";
pub const MAX_STATUS_DELAY: &str = "MAX_STATUS_DELAY";

pub const DEFAULT_STATUS_REGULATION_DELAY: i64 = 30;
pub const DEFAULT_STATUS_MAX_DELAY: i64 = 24 * 60 * 60;
pub const DEFAULT_EVENTS_REGULATION_DELAY: i64 = 5;
pub const DEFAULT_EVENTS_MAX_DELAY: i64 = 60;
pub const DEFAULT_EVENTS_MAX_EVENTS: i64 = 20;
pub const DEFAULT_MAX_STATUS_DELAY: i64 = 7 * 24 * 60 * 60;

// ========== Policy scalars ==========
pub const USE_SYSTEM_PROXY: &str = "useSystemProxy";
pub const USE_AUTOMATIC_PROXY: &str = "useAutomaticProxy";
pub const USE_DIRECT: &str = "useDirect";
pub const RANDOM_SKEW_FACTOR: &str = "randomSkewFactor";
pub const PUSH_PING_TIMEOUT: &str = "pushPingTimeout";
pub const PUSH_FALLBACK_POLL_INTERVAL: &str = "pushFallbackPollInterval";
pub const POLICY_PROXY: &str = "mcs_policy_proxy";
pub const POLICY_PROXY_CREDENTIALS: &str = "mcs_policy_proxy_credentials";
pub const POLICY_TYPE: &str = "policyType";
pub const POLICY_REV_ID: &str = "policyRevID";

// ========== Numbered policy lists ==========
pub const POLICY_URL_PREFIX: &str = "mcs_policy_url";
pub const PUSH_SERVER_PREFIX: &str = "pushServer";
pub const RELAY_PRIORITY_PREFIX: &str = "message_relay_priority";
pub const RELAY_PORT_PREFIX: &str = "message_relay_port";
pub const RELAY_ADDRESS_PREFIX: &str = "message_relay_address";
pub const RELAY_ID_PREFIX: &str = "message_relay_id";

/// Build a 1-based numbered key, e.g. `mcs_policy_url2`
pub fn numbered(prefix: &str, index: usize) -> String {
    format!("{}{}", prefix, index)
}
