//! Command-poll interval with exponential backoff and jitter
//!
//! On error the next poll is drawn uniformly from
//! `[0, base * 2^(retry - 1)]`, then clamped into the configured bounds.
//! Semi-permanent failures use a larger base than transient ones.
//!
//! Bounds are re-read from configuration on every call because a policy
//! may change them at any time.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use mcs_core::keys;
use mcs_core::SharedConfig;

/// Largest exponent used for the retry window
const MAX_RETRY_EXPONENT: i32 = 62;

/// Adaptive command-poll interval
#[derive(Debug)]
pub struct CommandCheckInterval {
    config: SharedConfig,
    /// Last value passed to `set`, in seconds (clamped when stored)
    interval_secs: f64,
}

impl CommandCheckInterval {
    /// Create an interval starting at the base retry delay
    pub fn new(config: SharedConfig) -> Self {
        let mut interval = Self {
            config,
            interval_secs: 0.0,
        };
        interval.set(None);
        interval
    }

    pub fn minimum(&self) -> Duration {
        secs(self.config.read().get_int(
            keys::COMMAND_CHECK_INTERVAL_MINIMUM,
            keys::DEFAULT_MIN_POLLING_INTERVAL,
        ))
    }

    pub fn maximum(&self) -> Duration {
        secs(self.config.read().get_int(
            keys::COMMAND_CHECK_INTERVAL_MAXIMUM,
            keys::DEFAULT_MAX_POLLING_INTERVAL,
        ))
    }

    pub fn base_retry_delay(&self) -> Duration {
        secs(self.config.read().get_int(
            keys::COMMAND_CHECK_BASE_RETRY_DELAY,
            keys::DEFAULT_POLLING_INTERVAL,
        ))
    }

    /// Defaults to twice the base retry delay
    pub fn semi_permanent_retry_delay(&self) -> Duration {
        let base = self.base_retry_delay().as_secs() as i64;
        secs(self.config.read().get_int(
            keys::COMMAND_CHECK_SEMI_PERMANENT_ERROR_RETRY_DELAY,
            base.saturating_mul(2),
        ))
    }

    pub fn max_retry_number(&self) -> u32 {
        let n = self.config.read().get_int(
            keys::COMMAND_CHECK_MAXIMUM_RETRY_NUMBER,
            keys::DEFAULT_MAX_RETRY_NUMBER,
        );
        n.clamp(1, i64::from(u32::MAX)) as u32
    }

    /// Current interval, clamped into the current bounds
    pub fn get(&self) -> Duration {
        Duration::from_secs_f64(self.clamp_secs(self.interval_secs))
    }

    /// Set the interval (default: base retry delay), clamped into bounds
    pub fn set(&mut self, value: Option<Duration>) -> Duration {
        let value = value.unwrap_or_else(|| self.base_retry_delay());
        self.set_secs(value.as_secs_f64())
    }

    /// Grow the interval by `value` (default: base retry delay)
    pub fn increment(&mut self, value: Option<Duration>) -> Duration {
        let step = value.unwrap_or_else(|| self.base_retry_delay());
        let current = self.get().as_secs_f64();
        self.set_secs(current + step.as_secs_f64())
    }

    /// Back off after `error_count` consecutive failures
    pub fn set_on_error(&mut self, error_count: u32, transient: bool) -> Duration {
        self.set_on_error_with(error_count, transient, &mut rand::thread_rng())
    }

    /// `set_on_error` with an explicit random source
    pub fn set_on_error_with<R: Rng + ?Sized>(
        &mut self,
        error_count: u32,
        transient: bool,
        rng: &mut R,
    ) -> Duration {
        let retry_number = error_count.saturating_add(1).min(self.max_retry_number());
        let base = if transient {
            self.base_retry_delay()
        } else {
            self.semi_permanent_retry_delay()
        };

        let exponent = (retry_number as i32 - 1).clamp(0, MAX_RETRY_EXPONENT);
        let window = base.as_secs_f64() * 2f64.powi(exponent);
        let retry_delay = if window > 0.0 {
            rng.gen_range(0.0..=window)
        } else {
            0.0
        };

        let interval = self.set_secs(retry_delay);
        debug!(
            error_count,
            retry_number,
            transient,
            window_secs = window,
            interval_secs = interval.as_secs_f64(),
            "Command check interval backed off"
        );
        interval
    }

    fn set_secs(&mut self, value: f64) -> Duration {
        self.interval_secs = self.clamp_secs(value);
        Duration::from_secs_f64(self.interval_secs)
    }

    /// `max(min, min(value, max))`; the maximum wins if bounds are inverted
    fn clamp_secs(&self, value: f64) -> f64 {
        let min = self.minimum().as_secs_f64();
        let max = self.maximum().as_secs_f64();
        let value = if value.is_finite() { value } else { max };
        value.max(min).min(max)
    }
}

fn secs(value: i64) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}
