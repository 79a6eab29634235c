use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::errors::CrmError;

/// Bounded exponential backoff for idempotent upstream reads.
///
/// `max_retries` counts extra attempts, so a call is tried at most
/// `max_retries + 1` times. Writes never go through this policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (zero-based), or `None` once the
    /// budget is spent or the failure is not worth repeating.
    pub fn next_delay(&self, retry: u32, error: &CrmError) -> Option<Duration> {
        if retry >= self.max_retries || !error.is_transient() {
            return None;
        }

        let mut delay = self.base_delay;
        for _ in 0..retry {
            delay = delay.saturating_mul(2);
            if delay >= self.max_delay {
                break;
            }
        }
        Some(delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}
