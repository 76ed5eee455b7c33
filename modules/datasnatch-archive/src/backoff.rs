use std::time::Duration;

use rand::Rng;

/// Exponential backoff with proportional jitter.
///
/// `delay(n)` is `base * 2^n`, capped at `max`, plus up to `jitter_percent`
/// of that value.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent.min(100);
        self
    }

    pub fn delay(&self, retry: u32) -> Duration {
        let capped = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(retry.min(20)))
            .min(self.max_ms);
        let spread = capped * self.jitter_percent / 100;
        let jitter = if spread > 0 {
            rand::rng().random_range(0..=spread)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}
