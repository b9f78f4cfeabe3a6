//! Per-step retry policy with exponential backoff

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Step config key holding a retry override
pub const RETRY_CONFIG_KEY: &str = "retry";

/// Retry configuration for a step
///
/// `max_retries` counts retries only, so a step gets `max_retries + 1`
/// attempts in total. The delay before retry `n` (0-based) is
/// `initial_delay * 2^n` milliseconds.
///
/// ```
/// use chainway::runtime::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Milliseconds before the first retry
    pub initial_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: u64) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, 0)
    }

    /// Effective policy for a step: the `retry` key of its config overrides
    /// the given default field by field
    pub fn for_step(config: &Value, default: &RetryPolicy) -> Self {
        let Some(overrides) = config.get(RETRY_CONFIG_KEY) else {
            return *default;
        };

        let mut policy = *default;
        match overrides.get("maxRetries").map(Value::as_u64) {
            Some(Some(n)) => policy.max_retries = u32::try_from(n).unwrap_or(u32::MAX),
            Some(None) => tracing::warn!("⚠️ Ignoring non-integer retry.maxRetries: {}", overrides),
            None => {}
        }
        match overrides.get("initialDelay").map(Value::as_u64) {
            Some(Some(ms)) => policy.initial_delay = ms,
            Some(None) => tracing::warn!("⚠️ Ignoring non-integer retry.initialDelay: {}", overrides),
            None => {}
        }
        policy
    }

    /// Whether retry number `attempt_index` (0-based) may be made
    pub fn should_retry(&self, attempt_index: u32) -> bool {
        should_retry(attempt_index, self.max_retries)
    }

    /// Delay before retry number `attempt_index` (0-based)
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        delay_for(attempt_index, self.initial_delay)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

pub fn should_retry(attempt_index: u32, max_retries: u32) -> bool {
    attempt_index < max_retries
}

pub fn delay_for(attempt_index: u32, initial_delay: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
    Duration::from_millis(initial_delay.saturating_mul(factor))
}
