//! Policy decisions over retry state.
//!
//! [`FallbackPolicyEngine`] answers "what should we do about this
//! failure?" as a pure function of the configured policy and the per-kind
//! retry counter. Counters move only two ways: the orchestrator records an
//! attempt, or an explicit success signal resets one kind. An unrelated
//! success never touches another kind's counter.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::failure::{FailureEvent, FailureKind};

use super::policy::{FallbackPolicy, PolicyTable, RecoveryStrategy};

/// Live retry bookkeeping for one failure kind.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// The kind being tracked.
    pub kind: FailureKind,
    /// Attempts made since the last reset.
    pub attempts: u32,
    /// Timestamp of the most recent attempt, Unix-epoch ms.
    pub last_attempt_ms: Option<u64>,
}

impl RetryState {
    fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            attempts: 0,
            last_attempt_ms: None,
        }
    }
}

/// Maps failure kinds to policies and tracks retry budgets.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct FallbackPolicyEngine {
    table: Arc<PolicyTable>,
    retry: Arc<DashMap<FailureKind, RetryState>>,
    clock: Arc<dyn Clock>,
}

impl FallbackPolicyEngine {
    /// Create an engine over the given policy table.
    pub fn new(table: PolicyTable) -> Self {
        Self::with_clock(table, Arc::new(SystemClock))
    }

    /// Create with an injected clock.
    pub fn with_clock(table: PolicyTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(table),
            retry: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Create with the default policy table.
    pub fn with_default() -> Self {
        Self::new(PolicyTable::default())
    }

    /// The effective policy for a kind.
    pub fn policy_for(&self, kind: FailureKind) -> &FallbackPolicy {
        self.table.policy_for(kind)
    }

    /// Attempts recorded for `kind` since its last reset.
    pub fn attempts(&self, kind: FailureKind) -> u32 {
        self.retry.get(&kind).map(|s| s.attempts).unwrap_or(0)
    }

    /// Current retry state for `kind`, if any attempt was ever recorded.
    pub fn retry_state(&self, kind: FailureKind) -> Option<RetryState> {
        self.retry.get(&kind).map(|s| s.clone())
    }

    /// Record one attempt for `kind`; returns the new attempt count.
    pub fn record_attempt(&self, kind: FailureKind) -> u32 {
        let mut entry = self.retry.entry(kind).or_insert_with(|| RetryState::new(kind));
        entry.attempts += 1;
        entry.last_attempt_ms = Some(self.clock.now_millis());
        debug!("recorded attempt {} for {}", entry.attempts, kind);
        entry.attempts
    }

    /// Reset one kind's counter after a confirmed successful recovery.
    pub fn reset(&self, kind: FailureKind) {
        self.retry.remove(&kind);
        debug!("reset retry counter for {}", kind);
    }

    /// Drop all retry bookkeeping (teardown).
    pub fn reset_all(&self) {
        self.retry.clear();
    }

    /// Whether `kind` has spent its retry budget.
    pub fn retries_exhausted(&self, kind: FailureKind) -> bool {
        self.attempts(kind) >= self.policy_for(kind).max_retries
    }

    /// True when the fallback surface should replace the AR view: either
    /// the policy says so outright, or a retry-with-prompt budget is gone.
    pub fn should_show_fallback_surface(&self, event: &FailureEvent) -> bool {
        let policy = self.policy_for(event.kind);
        match policy.strategy {
            RecoveryStrategy::ShowFallbackSurface => true,
            RecoveryStrategy::RetryWithPrompt => self.retries_exhausted(event.kind),
            _ => false,
        }
    }

    /// True when the orchestrator should schedule automatic recovery.
    pub fn should_auto_recover(&self, event: &FailureEvent) -> bool {
        let policy = self.policy_for(event.kind);
        policy.strategy == RecoveryStrategy::AutoRecover && !self.retries_exhausted(event.kind)
    }

    /// True when the app should drop fidelity but keep running.
    pub fn should_gracefully_degrade(&self, event: &FailureEvent) -> bool {
        self.policy_for(event.kind).strategy == RecoveryStrategy::GracefulDegrade
    }

    /// The message to surface for `event`, if the policy notifies at all.
    pub fn user_message(&self, event: &FailureEvent) -> Option<String> {
        let policy = self.policy_for(event.kind);
        if !policy.notify_user {
            return None;
        }
        Some(
            policy
                .message
                .clone()
                .unwrap_or_else(|| event.message.clone()),
        )
    }
}
