use std::time::Duration;

pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1200);
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_millis(15000);

/// Exponential reconnect delay: `min(base * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_RECONNECT_BASE,
            max: DEFAULT_RECONNECT_MAX,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the given attempt. Attempts are 1-based; 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.max)
    }
}
