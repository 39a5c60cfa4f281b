//! Resource monitoring and cache pressure relief.
//!
//! A fixed-interval sampler estimates memory usage with a linear model
//! (`active_nodes * C1 + cached_assets * C2`) and acts on two watermarks:
//!
//! - above **critical**: clear the model cache entirely
//! - above **high**: trim the cache to its configured target
//!
//! The public degraded flag is the OR of two independent sources: memory
//! pressure (owned here) and thermal pressure (owned by the thermal
//! monitor, only ever read here). Recovering from memory pressure alone
//! never clears thermal degradation.
//!
//! Foreground/background transitions pause and resume sampling; going to
//! background also proactively pauses the AR session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::failure::{FailureEvent, FailureKind};
use peeka_kernel::session::ArSessionHandle;

use crate::error_bus::ErrorBus;
use crate::model_cache::ModelCache;
use crate::observer::{ListenerToken, Listeners};
use crate::thermal::ThermalMonitor;

/// Configuration for [`ResourceMonitor`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceConfig {
    /// Sampling interval.
    pub sample_interval: Duration,
    /// Estimated bytes above which the cache is trimmed.
    pub high_watermark_bytes: u64,
    /// Estimated bytes above which the cache is cleared.
    pub critical_watermark_bytes: u64,
    /// Estimated cost of one active scene node (C1).
    pub active_asset_cost_bytes: u64,
    /// Estimated cost of one cached asset (C2).
    pub cached_asset_cost_bytes: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(10),
            high_watermark_bytes: 300 * 1024 * 1024,
            critical_watermark_bytes: 500 * 1024 * 1024,
            active_asset_cost_bytes: 40 * 1024 * 1024,
            cached_asset_cost_bytes: 25 * 1024 * 1024,
        }
    }
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_watermarks(mut self, high: u64, critical: u64) -> Self {
        self.high_watermark_bytes = high;
        self.critical_watermark_bytes = critical;
        self
    }

    pub fn with_asset_costs(mut self, active: u64, cached: u64) -> Self {
        self.active_asset_cost_bytes = active;
        self.cached_asset_cost_bytes = cached;
        self
    }

    /// Linear memory estimate for the given counts.
    pub fn estimate_bytes(&self, active_count: usize, cached_count: usize) -> u64 {
        active_count as u64 * self.active_asset_cost_bytes
            + cached_count as u64 * self.cached_asset_cost_bytes
    }
}

/// Point-in-time view of estimated resource usage.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ResourceSnapshot {
    /// Linear-model memory estimate.
    pub estimated_memory_bytes: u64,
    /// Active scene nodes at sampling time.
    pub active_asset_count: usize,
    /// Cached assets at sampling time.
    pub cached_asset_count: usize,
    /// OR of memory and thermal degradation.
    pub degraded: bool,
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            estimated_memory_bytes: 0,
            active_asset_count: 0,
            cached_asset_count: 0,
            degraded: false,
        }
    }
}

struct ResourceMonitorInner {
    config: ResourceConfig,
    cache: ModelCache,
    session: Arc<dyn ArSessionHandle>,
    thermal: ThermalMonitor,
    error_bus: Option<ErrorBus>,
    clock: Arc<dyn Clock>,
    memory_degraded: AtomicBool,
    snapshot: RwLock<ResourceSnapshot>,
    listeners: Listeners<ResourceSnapshot>,
    paused: AtomicBool,
    is_running: AtomicBool,
    shutdown_flag: AtomicBool,
    background_handle: Mutex<Option<JoinHandle<()>>>,
    bus_token: parking_lot::Mutex<Option<ListenerToken>>,
}

/// Periodic resource sampler governing the model cache.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct ResourceMonitor {
    inner: Arc<ResourceMonitorInner>,
}

impl ResourceMonitor {
    /// Create a new monitor over the given cache, session, and thermal
    /// monitor.
    pub fn new(
        config: ResourceConfig,
        cache: ModelCache,
        session: Arc<dyn ArSessionHandle>,
        thermal: ThermalMonitor,
    ) -> Self {
        Self {
            inner: Arc::new(ResourceMonitorInner {
                config,
                cache,
                session,
                thermal,
                error_bus: None,
                clock: Arc::new(SystemClock),
                memory_degraded: AtomicBool::new(false),
                snapshot: RwLock::new(ResourceSnapshot::default()),
                listeners: Listeners::new(),
                paused: AtomicBool::new(false),
                is_running: AtomicBool::new(false),
                shutdown_flag: AtomicBool::new(false),
                background_handle: Mutex::new(None),
                bus_token: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Attach the error bus: pressure actions publish `memory-pressure`
    /// events, and published pressure events trigger an immediate sample.
    pub fn with_error_bus(self, bus: ErrorBus) -> Self {
        let inner = ResourceMonitorInner {
            config: self.inner.config.clone(),
            cache: self.inner.cache.clone(),
            session: self.inner.session.clone(),
            thermal: self.inner.thermal.clone(),
            error_bus: Some(bus),
            clock: self.inner.clock.clone(),
            memory_degraded: AtomicBool::new(false),
            snapshot: RwLock::new(ResourceSnapshot::default()),
            listeners: Listeners::new(),
            paused: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
            shutdown_flag: AtomicBool::new(false),
            background_handle: Mutex::new(None),
            bus_token: parking_lot::Mutex::new(None),
        };
        let monitor = Self {
            inner: Arc::new(inner),
        };

        if let Some(bus) = &monitor.inner.error_bus {
            let observer = monitor.clone();
            let token = bus.on_failure(move |event| {
                if matches!(
                    event.kind,
                    FailureKind::MemoryPressure | FailureKind::ResourcePressure
                ) {
                    // Publish may happen off-runtime; only react when a
                    // runtime is available to run the sample.
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        let monitor = observer.clone();
                        handle.spawn(async move {
                            monitor.sample_once().await;
                        });
                    }
                }
            });
            *monitor.inner.bus_token.lock() = Some(token);
        }

        monitor
    }

    /// Start the periodic sampler task.
    pub fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            warn!("ResourceMonitor is already running");
            return;
        }
        self.inner.shutdown_flag.store(false, Ordering::SeqCst);

        info!(
            "ResourceMonitor started: interval={:?}, watermarks=({}, {}) bytes",
            self.inner.config.sample_interval,
            self.inner.config.high_watermark_bytes,
            self.inner.config.critical_watermark_bytes
        );

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.inner.config.sample_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if monitor.inner.shutdown_flag.load(Ordering::SeqCst) {
                    debug!("ResourceMonitor sampler shutting down");
                    break;
                }
                if monitor.inner.paused.load(Ordering::SeqCst) {
                    continue;
                }
                monitor.sample_once().await;
            }
        });

        let monitor = self.clone();
        tokio::spawn(async move {
            *monitor.inner.background_handle.lock().await = Some(handle);
        });
    }

    /// Stop sampling, unregister bus observation, release the task.
    pub async fn shutdown(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.background_handle.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let (Some(bus), Some(token)) = (
            self.inner.error_bus.as_ref(),
            self.inner.bus_token.lock().take(),
        ) {
            bus.unregister(token);
        }
        self.inner.listeners.clear();
        info!("ResourceMonitor shutdown complete");
    }

    /// Take one sample, apply watermark actions, refresh the snapshot.
    pub async fn sample_once(&self) {
        let active_count = self.inner.session.active_node_count().await;
        let cached_count = self.inner.cache.len().await;
        let estimated = self.inner.config.estimate_bytes(active_count, cached_count);

        let was_degraded = self.inner.memory_degraded.load(Ordering::SeqCst);

        if estimated >= self.inner.config.critical_watermark_bytes {
            warn!(
                "memory estimate {} above critical watermark; clearing cache",
                estimated
            );
            self.inner.cache.clear().await;
            self.inner.memory_degraded.store(true, Ordering::SeqCst);
            if !was_degraded {
                self.publish_pressure(estimated, "critical memory pressure");
            }
        } else if estimated >= self.inner.config.high_watermark_bytes {
            let target = self.inner.cache.trim_target();
            warn!(
                "memory estimate {} above high watermark; trimming cache to {}",
                estimated, target
            );
            self.inner.cache.trim(target).await;
            self.inner.memory_degraded.store(true, Ordering::SeqCst);
        } else {
            self.inner.memory_degraded.store(false, Ordering::SeqCst);
        }

        // Thermal degradation is owned elsewhere; OR it in, never clear it.
        let degraded =
            self.inner.memory_degraded.load(Ordering::SeqCst) || self.inner.thermal.is_degraded();

        let snapshot = ResourceSnapshot {
            estimated_memory_bytes: estimated,
            // Counts after any trim/clear would be stale for the estimate;
            // report what the estimate was computed from.
            active_asset_count: active_count,
            cached_asset_count: cached_count,
            degraded,
        };
        *self.inner.snapshot.write().await = snapshot;
        self.inner.listeners.notify(&snapshot);
    }

    /// The most recent snapshot.
    pub async fn snapshot(&self) -> ResourceSnapshot {
        *self.inner.snapshot.read().await
    }

    /// Whether the combined degraded flag is set.
    pub async fn is_degraded(&self) -> bool {
        self.inner.memory_degraded.load(Ordering::SeqCst) || self.inner.thermal.is_degraded()
    }

    /// Whether memory degradation specifically is active.
    pub fn is_memory_degraded(&self) -> bool {
        self.inner.memory_degraded.load(Ordering::SeqCst)
    }

    /// App moved to the background: stop sampling and proactively pause
    /// the AR session.
    pub async fn on_background(&self) {
        if self.inner.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("app backgrounded; pausing sampling and AR session");
        if let Err(e) = self.inner.session.pause().await {
            warn!("failed to pause AR session on backgrounding: {}", e);
        }
    }

    /// App returned to the foreground: resume sampling and the session.
    pub async fn on_foreground(&self) {
        if !self.inner.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("app foregrounded; resuming sampling and AR session");
        if let Err(e) = self.inner.session.resume().await {
            warn!("failed to resume AR session on foregrounding: {}", e);
        }
    }

    /// Whether sampling is currently paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Register a snapshot listener.
    pub fn on_snapshot<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&ResourceSnapshot) + Send + Sync + 'static,
    {
        self.inner.listeners.register(callback)
    }

    /// Remove a snapshot listener.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.inner.listeners.unregister(token)
    }

    // Internal methods

    fn publish_pressure(&self, estimated: u64, message: &str) {
        if let Some(bus) = &self.inner.error_bus {
            bus.publish(
                FailureEvent::new(
                    FailureKind::MemoryPressure,
                    message,
                    self.inner.clock.as_ref(),
                )
                .with_context("estimated_bytes", serde_json::json!(estimated)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use peeka_kernel::asset::{AssetQuality, SceneAsset};
    use peeka_kernel::clock::ManualClock;
    use peeka_kernel::session::SessionError;
    use std::sync::atomic::AtomicUsize;

    use crate::model_cache::{CacheKey, ModelCacheConfig};
    use crate::thermal::{SensorSource, ThermalConfig, ThermalMonitor};

    struct FixedSensor(f32);

    impl SensorSource for FixedSensor {
        fn sample(&self, _active_nodes: usize) -> f32 {
            self.0
        }
    }

    struct NullMitigation;

    #[async_trait]
    impl crate::thermal::MitigationHooks for NullMitigation {
        async fn mild(&self) {}
        async fn severe(&self) {}
    }

    struct FakeSession {
        nodes: SyncMutex<Vec<String>>,
        pause_count: AtomicUsize,
        resume_count: AtomicUsize,
    }

    impl FakeSession {
        fn with_node_count(count: usize) -> Arc<Self> {
            Arc::new(Self {
                nodes: SyncMutex::new((0..count).map(|i| format!("node-{i}")).collect()),
                pause_count: AtomicUsize::new(0),
                resume_count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ArSessionHandle for FakeSession {
        async fn start(&self) -> Result<(), SessionError> {
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
            Ok(())
        }
        async fn add_node(&self, node_id: &str, _asset: &str) -> Result<(), SessionError> {
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

    struct TestAsset(String);

    impl SceneAsset for TestAsset {
        fn identity(&self) -> &str {
            &self.0
        }
        fn size_bytes(&self) -> u64 {
            64
        }
    }

    fn thermal_at(temp: f32) -> ThermalMonitor {
        ThermalMonitor::new(
            ThermalConfig::default(),
            Arc::new(FixedSensor(temp)),
            FakeSession::with_node_count(0),
            Arc::new(NullMitigation),
        )
    }

    async fn fill_cache(cache: &ModelCache, count: usize) {
        for i in 0..count {
            let identity = format!("asset-{i}");
            let id = identity.clone();
            cache
                .get_or_load(&CacheKey::new(identity, AssetQuality::default()), || async {
                    Ok(Arc::new(TestAsset(id)) as Arc<dyn SceneAsset>)
                })
                .await
                .unwrap();
        }
    }

    fn config_for_tests() -> ResourceConfig {
        // 1 byte per asset makes the watermarks easy to hit exactly.
        ResourceConfig::default()
            .with_asset_costs(1, 1)
            .with_watermarks(5, 10)
    }

    #[tokio::test]
    async fn test_snapshot_below_watermarks_is_clean() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(ModelCacheConfig::default().with_max_entries(50), clock);
        fill_cache(&cache, 2).await;

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache.clone(),
            FakeSession::with_node_count(1),
            thermal_at(30.0),
        );

        monitor.sample_once().await;
        let snapshot = monitor.snapshot().await;

        assert_eq!(snapshot.active_asset_count, 1);
        assert_eq!(snapshot.cached_asset_count, 2);
        assert_eq!(snapshot.estimated_memory_bytes, 3);
        assert!(!snapshot.degraded);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_high_watermark_trims_cache() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(
            ModelCacheConfig::default()
                .with_max_entries(50)
                .with_trim_target(3),
            clock,
        );
        fill_cache(&cache, 7).await;

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache.clone(),
            FakeSession::with_node_count(0),
            thermal_at(30.0),
        );

        monitor.sample_once().await;

        assert_eq!(cache.len().await, 3);
        assert!(monitor.is_memory_degraded());
        assert!(monitor.snapshot().await.degraded);
    }

    #[tokio::test]
    async fn test_critical_watermark_clears_cache_and_publishes() {
        let clock = ManualClock::new(0);
        let bus = ErrorBus::with_default();
        let cache = ModelCache::with_clock(ModelCacheConfig::default().with_max_entries(50), clock);
        fill_cache(&cache, 12).await;

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache.clone(),
            FakeSession::with_node_count(0),
            thermal_at(30.0),
        )
        .with_error_bus(bus.clone());

        monitor.sample_once().await;

        assert_eq!(cache.len().await, 0);
        assert!(monitor.is_memory_degraded());
        assert_eq!(bus.history_for(FailureKind::MemoryPressure).len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_clears_memory_flag() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(ModelCacheConfig::default().with_max_entries(50), clock);
        fill_cache(&cache, 12).await;

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache.clone(),
            FakeSession::with_node_count(0),
            thermal_at(30.0),
        );

        monitor.sample_once().await;
        assert!(monitor.is_memory_degraded());

        // Cache is now empty; next sample is below both watermarks.
        monitor.sample_once().await;
        assert!(!monitor.is_memory_degraded());
        assert!(!monitor.snapshot().await.degraded);
    }

    #[tokio::test]
    async fn test_thermal_degradation_survives_memory_recovery() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(ModelCacheConfig::default().with_max_entries(50), clock);
        fill_cache(&cache, 12).await;

        let thermal = thermal_at(40.0); // Elevated
        thermal.sample_once().await;
        assert!(thermal.is_degraded());

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache.clone(),
            FakeSession::with_node_count(0),
            thermal.clone(),
        );

        monitor.sample_once().await;
        assert!(monitor.snapshot().await.degraded);

        // Memory condition clears; thermal is still elevated, so the
        // combined flag must stay set.
        monitor.sample_once().await;
        assert!(!monitor.is_memory_degraded());
        assert!(monitor.snapshot().await.degraded);
        assert!(monitor.is_degraded().await);
    }

    #[tokio::test]
    async fn test_background_pauses_session_and_sampling() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(ModelCacheConfig::default(), clock);
        let session = FakeSession::with_node_count(0);

        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache,
            session.clone(),
            thermal_at(30.0),
        );

        monitor.on_background().await;
        assert!(monitor.is_paused());
        assert_eq!(session.pause_count.load(Ordering::SeqCst), 1);

        // Idempotent while already backgrounded.
        monitor.on_background().await;
        assert_eq!(session.pause_count.load(Ordering::SeqCst), 1);

        monitor.on_foreground().await;
        assert!(!monitor.is_paused());
        assert_eq!(session.resume_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let clock = ManualClock::new(0);
        let cache = ModelCache::with_clock(ModelCacheConfig::default(), clock);
        let monitor = ResourceMonitor::new(
            config_for_tests(),
            cache,
            FakeSession::with_node_count(0),
            thermal_at(30.0),
        );

        monitor.start();
        monitor.shutdown().await;
        monitor.shutdown().await;
        assert!(!monitor.inner.is_running.load(Ordering::SeqCst));
    }
}
