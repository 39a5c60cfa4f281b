//! The recovery orchestrator.
//!
//! Consumes failure events, consults the policy engine, and drives bounded
//! backed-off retries of a caller-supplied recovery action. Exactly one
//! recovery runs at a time across all failure kinds; within one recovery,
//! attempts are strictly sequential. No failure escapes this boundary:
//! an action that returns `false` or panics becomes a retry-or-exhaust
//! decision, never a crash.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::failure::{FailureEvent, FailureKind};
use peeka_kernel::notify::UserNotifier;

use crate::fallback::FallbackPolicyEngine;
use crate::observer::{ListenerToken, Listeners};

use super::backoff::RecoveryBackoff;
use super::metrics::RecoveryMetrics;

/// A caller-supplied recovery operation. Returns `true` on success.
pub type RecoveryAction = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No recovery in flight.
    Idle,
    /// A recovery task is running (possibly sleeping between attempts).
    Recovering,
}

/// How [`RecoveryOrchestrator::handle`] disposed of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDisposition {
    /// A recovery task was scheduled.
    Scheduled,
    /// Dropped for auto-recovery because a recovery was already in flight.
    Ignored,
    /// The fallback surface was requested (permanent failure or spent
    /// retry-with-prompt budget).
    FallbackSurface,
    /// Graceful degradation applies; no retry.
    Degraded,
    /// Logged, at most a passive notification.
    Logged,
}

/// Terminal result of one recovery effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryResult {
    /// An attempt returned success.
    Succeeded,
    /// The retry budget was spent without success.
    Exhausted,
}

/// Notification payload for recovery completion listeners.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryOutcome {
    /// The failure kind that was being recovered.
    pub kind: FailureKind,
    /// Terminal result.
    pub result: RecoveryResult,
    /// Attempts executed in this effort.
    pub attempts: u32,
}

/// One history entry per handled event.
#[derive(Debug, Clone)]
pub struct RecoveryRecord {
    /// The event as received.
    pub event: FailureEvent,
    /// How it was disposed of.
    pub disposition: HandleDisposition,
    /// When it was handled, Unix-epoch ms.
    pub handled_at_ms: u64,
}

/// Configuration for [`RecoveryOrchestrator`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecoveryConfig {
    /// Backoff schedule for retries.
    pub backoff: RecoveryBackoff,
    /// Maximum retained history entries.
    pub history_limit: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            backoff: RecoveryBackoff::default(),
            history_limit: 50,
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(mut self, backoff: RecoveryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

struct OrchestratorInner {
    config: RecoveryConfig,
    engine: FallbackPolicyEngine,
    notifier: Arc<dyn UserNotifier>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    listeners: Listeners<RecoveryOutcome>,
    metrics: Arc<RecoveryMetrics>,
    history: parking_lot::RwLock<VecDeque<RecoveryRecord>>,
}

/// Single-in-flight recovery driver.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct RecoveryOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl RecoveryOrchestrator {
    /// Create an orchestrator over the given policy engine and notifier.
    pub fn new(
        config: RecoveryConfig,
        engine: FallbackPolicyEngine,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self::with_clock(config, engine, notifier, Arc::new(SystemClock))
    }

    /// Create with an injected clock.
    pub fn with_clock(
        config: RecoveryConfig,
        engine: FallbackPolicyEngine,
        notifier: Arc<dyn UserNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                engine,
                notifier,
                clock,
                in_flight: AtomicBool::new(false),
                task: parking_lot::Mutex::new(None),
                listeners: Listeners::new(),
                metrics: Arc::new(RecoveryMetrics::new()),
                history: parking_lot::RwLock::new(VecDeque::new()),
            }),
        }
    }

    /// Handle one failure event with the given recovery action.
    ///
    /// Must be called from within a tokio runtime; scheduled recoveries
    /// run on a spawned task. The returned disposition says what was
    /// decided, not how the recovery eventually ends; subscribe with
    /// [`RecoveryOrchestrator::on_outcome`] for that.
    pub fn handle(&self, event: &FailureEvent, action: RecoveryAction) -> HandleDisposition {
        let disposition = self.decide(event, action);
        self.record(event, disposition);
        disposition
    }

    /// Current orchestrator state.
    pub fn state(&self) -> OrchestratorState {
        if self.inner.in_flight.load(Ordering::SeqCst) {
            OrchestratorState::Recovering
        } else {
            OrchestratorState::Idle
        }
    }

    /// Register a listener for terminal recovery outcomes.
    pub fn on_outcome<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&RecoveryOutcome) + Send + Sync + 'static,
    {
        self.inner.listeners.register(callback)
    }

    /// Remove an outcome listener.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.inner.listeners.unregister(token)
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Arc<RecoveryMetrics> {
        &self.inner.metrics
    }

    /// The policy engine this orchestrator consults.
    pub fn engine(&self) -> &FallbackPolicyEngine {
        &self.inner.engine
    }

    /// Snapshot of handled-event history, oldest first.
    pub fn history(&self) -> Vec<RecoveryRecord> {
        self.inner.history.read().iter().cloned().collect()
    }

    /// Abort any in-flight recovery and drop listeners.
    pub async fn shutdown(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.in_flight.store(false, Ordering::SeqCst);
        self.inner.listeners.clear();
        info!("RecoveryOrchestrator shutdown complete");
    }

    // =========================================================================
    // Private methods
    // =========================================================================

    fn decide(&self, event: &FailureEvent, action: RecoveryAction) -> HandleDisposition {
        let engine = &self.inner.engine;

        if engine.should_show_fallback_surface(event) {
            let message = engine
                .user_message(event)
                .unwrap_or_else(|| event.message.clone());
            warn!("surfacing fallback for {}: {}", event.kind, message);
            self.inner
                .notifier
                .notify(&message, event.kind, event.kind.is_retryable());
            return HandleDisposition::FallbackSurface;
        }

        if engine.should_gracefully_degrade(event) {
            info!("gracefully degrading for {}", event.kind);
            if let Some(message) = engine.user_message(event) {
                self.inner.notifier.notify(&message, event.kind, false);
            }
            return HandleDisposition::Degraded;
        }

        if engine.should_auto_recover(event) {
            // Single-in-flight: only one recovery effort at a time, for
            // any kind.
            if self
                .inner
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!(
                    "recovery already in flight; ignoring {} for auto-recovery",
                    event.kind
                );
                self.inner.metrics.record_ignored();
                return HandleDisposition::Ignored;
            }

            self.spawn_recovery(event.clone(), action);
            return HandleDisposition::Scheduled;
        }

        debug!("minimal handling for {}: {}", event.kind, event.message);
        if let Some(message) = engine.user_message(event) {
            self.inner.notifier.notify(&message, event.kind, false);
        }
        HandleDisposition::Logged
    }

    fn spawn_recovery(&self, event: FailureEvent, action: RecoveryAction) {
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            orchestrator.run_recovery(event, action).await;
            orchestrator.inner.in_flight.store(false, Ordering::SeqCst);
        });
        *self.inner.task.lock() = Some(handle);
    }

    async fn run_recovery(&self, event: FailureEvent, action: RecoveryAction) {
        let kind = event.kind;
        let policy = self.inner.engine.policy_for(kind).clone();
        let backoff = &self.inner.config.backoff;

        loop {
            let prior_attempts = self.inner.engine.attempts(kind);
            let delay = backoff.delay(policy.retry_delay, prior_attempts);
            debug!(
                "recovery for {} sleeping {:?} before attempt {}",
                kind,
                delay,
                prior_attempts + 1
            );
            tokio::time::sleep(delay).await;

            let attempt = self.inner.engine.record_attempt(kind);
            self.inner.metrics.record_attempt();

            // A panicking action is a failed attempt, nothing more.
            let succeeded = AssertUnwindSafe(action())
                .catch_unwind()
                .await
                .unwrap_or(false);

            if succeeded {
                info!("recovery for {} succeeded on attempt {}", kind, attempt);
                self.inner.engine.reset(kind);
                self.inner.metrics.record_success();
                self.inner.listeners.notify(&RecoveryOutcome {
                    kind,
                    result: RecoveryResult::Succeeded,
                    attempts: attempt,
                });
                return;
            }

            self.inner.metrics.record_failure();
            warn!(
                "recovery attempt {}/{} for {} failed",
                attempt, policy.max_retries, kind
            );

            if attempt >= policy.max_retries {
                self.inner.metrics.record_exhaustion();
                let message = policy
                    .message
                    .clone()
                    .unwrap_or_else(|| event.message.clone());
                self.inner.notifier.notify(&message, kind, false);
                self.inner.listeners.notify(&RecoveryOutcome {
                    kind,
                    result: RecoveryResult::Exhausted,
                    attempts: attempt,
                });
                return;
            }
        }
    }

    fn record(&self, event: &FailureEvent, disposition: HandleDisposition) {
        let mut history = self.inner.history.write();
        if history.len() >= self.inner.config.history_limit {
            history.pop_front();
        }
        history.push_back(RecoveryRecord {
            event: event.clone(),
            disposition,
            handled_at_ms: self.inner.clock.now_millis(),
        });
    }
}
