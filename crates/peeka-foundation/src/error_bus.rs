//! Typed failure event bus.
//!
//! Every fault in the AR pipeline is published here as a
//! [`FailureEvent`]. The bus does three things on publish:
//!
//! - appends the event to a bounded history (oldest evicted first),
//! - invokes token-registered synchronous listeners,
//! - fans out to `tokio::sync::broadcast` subscribers.
//!
//! Publishing never fails; zero subscribers is not an error. User-visible
//! surfacing is a policy decision made downstream, never by the bus.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use peeka_kernel::failure::{FailureEvent, FailureKind};

use crate::observer::{ListenerToken, Listeners};

/// Configuration for [`ErrorBus`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorBusConfig {
    /// Broadcast channel capacity; slow subscribers lag past this.
    pub channel_capacity: usize,
    /// Maximum retained history entries.
    pub history_limit: usize,
}

impl Default for ErrorBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            history_limit: 100,
        }
    }
}

impl ErrorBusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

struct ErrorBusInner {
    config: ErrorBusConfig,
    sender: broadcast::Sender<FailureEvent>,
    listeners: Listeners<FailureEvent>,
    history: RwLock<VecDeque<FailureEvent>>,
}

/// Publish/subscribe channel for failure events.
///
/// This type is cheaply cloneable — all clones share the same underlying
/// state.
#[derive(Clone)]
pub struct ErrorBus {
    inner: Arc<ErrorBusInner>,
}

impl ErrorBus {
    /// Create a bus with the given configuration.
    pub fn new(config: ErrorBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(ErrorBusInner {
                config,
                sender,
                listeners: Listeners::new(),
                history: RwLock::new(VecDeque::new()),
            }),
        }
    }

    /// Create with default configuration.
    pub fn with_default() -> Self {
        Self::new(ErrorBusConfig::default())
    }

    /// Publish a failure event to history, listeners, and subscribers.
    pub fn publish(&self, event: FailureEvent) {
        match event.kind.recoverability() {
            peeka_kernel::failure::Recoverability::Informational => {
                debug!(kind = %event.kind, "failure observed: {}", event.message);
            }
            _ => {
                warn!(kind = %event.kind, "failure observed: {}", event.message);
            }
        }

        {
            let mut history = self.inner.history.write();
            if history.len() >= self.inner.config.history_limit {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        self.inner.listeners.notify(&event);

        // A send error only means there are currently no subscribers.
        let _ = self.inner.sender.send(event);
    }

    /// Subscribe to future events on a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FailureEvent> {
        self.inner.sender.subscribe()
    }

    /// Register a synchronous listener; keep the token to unregister.
    pub fn on_failure<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&FailureEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.register(callback)
    }

    /// Remove a previously registered listener.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.inner.listeners.unregister(token)
    }

    /// Snapshot of retained history, oldest first.
    pub fn history(&self) -> Vec<FailureEvent> {
        self.inner.history.read().iter().cloned().collect()
    }

    /// Retained history entries of one kind, oldest first.
    pub fn history_for(&self, kind: FailureKind) -> Vec<FailureEvent> {
        self.inner
            .history
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.inner.history.read().len()
    }

    /// Drop all retained history.
    pub fn clear_history(&self) {
        self.inner.history.write().clear();
    }

    /// Number of live broadcast subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl Default for ErrorBus {
    fn default() -> Self {
        Self::with_default()
    }
}
