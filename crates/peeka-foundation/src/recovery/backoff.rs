//! Backoff schedule for recovery attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a capped multiplier.
///
/// The delay before attempt `n` (0-indexed) is
/// `base * min(2^n, cap_multiplier)`. Optional jitter spreads retries out;
/// it defaults to off so the schedule is strictly monotonic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryBackoff {
    /// Upper bound on the exponential factor.
    pub cap_multiplier: u32,
    /// Half-spread of uniform jitter in milliseconds (0 = none).
    pub jitter_ms: u64,
}

impl Default for RecoveryBackoff {
    fn default() -> Self {
        Self {
            cap_multiplier: 8,
            jitter_ms: 0,
        }
    }
}

impl RecoveryBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap_multiplier(mut self, cap: u32) -> Self {
        self.cap_multiplier = cap.max(1);
        self
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    /// Calculate the delay before the given attempt (0-indexed).
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        let factor = 2u64.pow(attempt.min(10)).min(self.cap_multiplier.max(1) as u64);
        let base_ms = (base.as_millis() as u64).saturating_mul(factor);

        let jitter = if self.jitter_ms > 0 {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            rng.gen_range(0..self.jitter_ms) as i64 - (self.jitter_ms as i64 / 2)
        } else {
            0
        };

        let final_ms = (base_ms as i64 + jitter).max(0) as u64;
        Duration::from_millis(final_ms)
    }
}
