//! Mock collaborators for the kernel seams.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use peeka_foundation::thermal::SensorSource;
use peeka_kernel::asset::{AssetError, AssetLoader, AssetQuality, SceneAsset};
use peeka_kernel::failure::{FailureEvent, FailureKind};
use peeka_kernel::notify::UserNotifier;
use peeka_kernel::session::{ArSessionHandle, SessionError};

/// Build a failure event pinned at t=0.
pub fn test_event(kind: FailureKind, message: &str) -> FailureEvent {
    FailureEvent::at(kind, message, 0)
}

/// A trivially sized scene asset.
pub struct TestAsset {
    identity: String,
    size_bytes: u64,
}

impl SceneAsset for TestAsset {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Build a test asset handle.
pub fn test_asset(identity: &str, size_bytes: u64) -> Arc<dyn SceneAsset> {
    Arc::new(TestAsset {
        identity: identity.to_string(),
        size_bytes,
    })
}

/// In-memory AR session tracking nodes and lifecycle calls.
#[derive(Default)]
pub struct MockArSession {
    nodes: Mutex<Vec<String>>,
    pub start_count: AtomicUsize,
    pub pause_count: AtomicUsize,
    pub resume_count: AtomicUsize,
    pub stop_count: AtomicUsize,
    /// When set, `start` fails this many more times before succeeding.
    pub start_failures_remaining: AtomicUsize,
}

impl MockArSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Session pre-populated with nodes placed in the given order.
    pub fn with_nodes(node_ids: &[&str]) -> Arc<Self> {
        let session = Self::default();
        *session.nodes.lock() = node_ids.iter().map(|s| s.to_string()).collect();
        Arc::new(session)
    }

    /// Make the next `count` calls to `start` fail.
    pub fn fail_next_starts(&self, count: usize) {
        self.start_failures_remaining.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArSessionHandle for MockArSession {
    async fn start(&self) -> Result<(), SessionError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.start_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.start_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::Backend("scripted start failure".into()));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), SessionError> {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), SessionError> {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_node(&self, node_id: &str, _asset_identity: &str) -> Result<(), SessionError> {
        self.nodes.lock().push(node_id.to_string());
        Ok(())
    }

    async fn remove_node(&self, node_id: &str) -> Result<(), SessionError> {
        self.nodes.lock().retain(|n| n != node_id);
        Ok(())
    }

    async fn active_node_ids(&self) -> Vec<String> {
        self.nodes.lock().clone()
    }
}

/// Loader that counts invocations and can be scripted to fail.
#[derive(Default)]
pub struct CountingLoader {
    pub load_count: AtomicUsize,
    pub failures_remaining: AtomicUsize,
    /// Size reported by every produced asset.
    pub asset_size_bytes: u64,
}

impl CountingLoader {
    pub fn new(asset_size_bytes: u64) -> Arc<Self> {
        Arc::new(Self {
            load_count: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            asset_size_bytes,
        })
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetLoader for CountingLoader {
    async fn load(
        &self,
        identity: &str,
        _quality: AssetQuality,
    ) -> Result<Arc<dyn SceneAsset>, AssetError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(AssetError::Backend("scripted load failure".into()));
        }
        Ok(test_asset(identity, self.asset_size_bytes))
    }
}

/// Notifier recording every surfaced message.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, FailureKind, bool)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, FailureKind, bool)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl UserNotifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: FailureKind, retryable: bool) {
        self.calls
            .lock()
            .push((message.to_string(), kind, retryable));
    }
}

/// Sensor replaying a scripted temperature sequence, holding the last
/// value once the script runs out.
pub struct ScriptedSensor {
    temps: Mutex<Vec<f32>>,
}

impl ScriptedSensor {
    pub fn new(temps: Vec<f32>) -> Arc<Self> {
        assert!(!temps.is_empty(), "script needs at least one temperature");
        Arc::new(Self {
            temps: Mutex::new(temps),
        })
    }
}

impl SensorSource for ScriptedSensor {
    fn sample(&self, _active_nodes: usize) -> f32 {
        let mut temps = self.temps.lock();
        if temps.len() > 1 {
            temps.remove(0)
        } else {
            temps[0]
        }
    }
}
