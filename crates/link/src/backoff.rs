//! Reconnect backoff policy

use std::time::Duration;

use contracts::LinkConfig;

/// Exponential backoff: `base × 2^attempt`, capped, with a bounded attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            base: config.backoff_base(),
            cap: config.backoff_cap(),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before the zero-based `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}
