//! Token-based observer registry.
//!
//! Components that fan out state changes (error bus, thermal monitor,
//! resource monitor, recovery orchestrator) share this registry instead of
//! ad hoc callback lists: `register` returns a [`ListenerToken`],
//! `unregister` takes it back, and `notify` iterates over a snapshot so a
//! listener may unregister itself (or others) mid-notification without
//! invalidating the iteration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Opaque handle returned by [`Listeners::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A registry of listeners for events of type `T`.
pub struct Listeners<T> {
    next_id: AtomicU64,
    callbacks: RwLock<HashMap<u64, Callback<T>>>,
}

impl<T> Listeners<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener; keep the token to unregister later.
    pub fn register<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.write().insert(id, Arc::new(callback));
        ListenerToken(id)
    }

    /// Remove a listener. Returns false if the token was already gone.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.callbacks.write().remove(&token.0).is_some()
    }

    /// Invoke every registered listener with `event`.
    ///
    /// Iterates a snapshot taken under the read lock, so callbacks are free
    /// to register/unregister listeners on this same registry.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self.callbacks.read().values().cloned().collect();
        for callback in snapshot {
            callback(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Drop all listeners.
    pub fn clear(&self) {
        self.callbacks.write().clear();
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}
