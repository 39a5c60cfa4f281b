//! Clock abstraction (injectable for testing).
//!
//! Every timestamp in the resilience core flows through [`Clock`] rather
//! than `SystemTime::now()` directly, so timing-sensitive code (cache
//! access ordering, retry bookkeeping, thermal sampling) is deterministic
//! in tests. Scheduling itself (sampler intervals, backoff sleeps) goes
//! through tokio time, which tests pause with `test-util`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Provides the current wall-clock time as Unix-epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The default [`Clock`] implementation backed by the system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// A hand-advanced [`Clock`] for tests.
///
/// Starts at an arbitrary fixed origin; tests call [`ManualClock::advance`]
/// to move time forward between operations and assert on the resulting
/// ordering (LRU eviction order, retry timestamps).
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock pinned at `origin_ms`.
    pub fn new(origin_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(origin_ms),
        })
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute value.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_plausible_timestamp() {
        let clock = SystemClock;
        // Anything after 2020-01-01 is plausible.
        assert!(clock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);

        clock.set(10_000);
        assert_eq!(clock.now_millis(), 10_000);
    }
}
