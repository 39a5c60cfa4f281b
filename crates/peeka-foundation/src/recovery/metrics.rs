//! Recovery metrics.
//!
//! Atomic counters tracking orchestrator activity, snapshottable for
//! diagnostics overlays and tests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters for recovery activity.
#[derive(Debug, Default)]
pub struct RecoveryMetrics {
    /// Total recovery attempts executed.
    total_attempts: AtomicU64,
    /// Attempts that returned success.
    total_successes: AtomicU64,
    /// Attempts that failed (including panics).
    total_failures: AtomicU64,
    /// Recoveries that spent their whole budget.
    total_exhaustions: AtomicU64,
    /// Events ignored because a recovery was already in flight.
    total_ignored: AtomicU64,
}

impl RecoveryMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed attempt.
    pub fn record_attempt(&self) {
        self.total_attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a successful attempt.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failed attempt.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a recovery that exhausted its budget.
    pub fn record_exhaustion(&self) {
        self.total_exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    /// Record an event dropped because a recovery was in flight.
    pub fn record_ignored(&self) {
        self.total_ignored.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(Ordering::SeqCst)
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::SeqCst)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::SeqCst)
    }

    pub fn total_exhaustions(&self) -> u64 {
        self.total_exhaustions.load(Ordering::SeqCst)
    }

    pub fn total_ignored(&self) -> u64 {
        self.total_ignored.load(Ordering::SeqCst)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> RecoveryMetricsSnapshot {
        RecoveryMetricsSnapshot {
            total_attempts: self.total_attempts(),
            total_successes: self.total_successes(),
            total_failures: self.total_failures(),
            total_exhaustions: self.total_exhaustions(),
            total_ignored: self.total_ignored(),
        }
    }
}

/// Serializable snapshot of [`RecoveryMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryMetricsSnapshot {
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_exhaustions: u64,
    pub total_ignored: u64,
}
