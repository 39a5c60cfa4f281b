//! Thermal monitoring and mitigation.
//!
//! Implements the three-state thermal machine:
//! - Normal: full fidelity
//! - Elevated: degraded flag set, mild mitigation applied
//! - Critical: mild + severe mitigation (scene eviction, cache clear)
//!
//! Transitions are driven purely by sampling; no retry or backoff applies
//! here. Classification is against two thresholds
//! (`elevated_threshold < critical_threshold`); one sample that crosses
//! both moves straight from Normal to Critical, which is intentional.
//!
//! The temperature source is an injectable [`SensorSource`]. The default
//! [`SimulatedThermalSensor`] derives a deterministic value from elapsed
//! time and AR activity; a platform sensor drops in without touching the
//! state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::failure::{FailureEvent, FailureKind};
use peeka_kernel::session::ArSessionHandle;

use crate::error_bus::ErrorBus;
use crate::model_cache::ModelCache;
use crate::observer::{ListenerToken, Listeners};

/// Thermal classification, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ThermalState {
    /// Below the elevated threshold.
    Normal,
    /// At or above the elevated threshold.
    Elevated,
    /// At or above the critical threshold.
    Critical,
}

impl std::fmt::Display for ThermalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThermalState::Normal => write!(f, "normal"),
            ThermalState::Elevated => write!(f, "elevated"),
            ThermalState::Critical => write!(f, "critical"),
        }
    }
}

/// One temperature observation with its classification.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ThermalSample {
    /// Sampled temperature in °C.
    pub temperature: f32,
    /// Classification against the configured thresholds.
    pub state: ThermalState,
}

/// Notification payload for thermal state transitions.
#[derive(Debug, Clone, Copy)]
pub struct ThermalStateChanged {
    /// State before the transition.
    pub old_state: ThermalState,
    /// State after the transition.
    pub new_state: ThermalState,
    /// The temperature that triggered it.
    pub temperature: f32,
    /// Whether the thermal-degraded flag is now set.
    pub degraded: bool,
}

/// Configuration for [`ThermalMonitor`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ThermalConfig {
    /// Temperature at or above which the state becomes Elevated (°C).
    pub elevated_threshold: f32,
    /// Temperature at or above which the state becomes Critical (°C).
    pub critical_threshold: f32,
    /// Sampling interval.
    pub sample_interval: Duration,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            elevated_threshold: 39.0,
            critical_threshold: 42.0,
            sample_interval: Duration::from_secs(5),
        }
    }
}

impl ThermalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(mut self, elevated: f32, critical: f32) -> Self {
        self.elevated_threshold = elevated;
        self.critical_threshold = critical;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Classify a temperature against the thresholds.
    pub fn classify(&self, temperature: f32) -> ThermalState {
        if temperature >= self.critical_threshold {
            ThermalState::Critical
        } else if temperature >= self.elevated_threshold {
            ThermalState::Elevated
        } else {
            ThermalState::Normal
        }
    }
}

/// Source of temperature samples.
pub trait SensorSource: Send + Sync {
    /// Produce a temperature reading given the current AR activity level
    /// (number of active scene nodes).
    fn sample(&self, active_nodes: usize) -> f32;
}

/// Deterministic temperature model: ambient baseline plus a warm-up term
/// growing with elapsed session time, plus a per-node activity term.
///
/// A stand-in for platform sensor access, kept behind [`SensorSource`] so a
/// real sensor substitutes cleanly.
pub struct SimulatedThermalSensor {
    clock: Arc<dyn Clock>,
    started_at_ms: u64,
    base_temp: f32,
    warmup_per_minute: f32,
    warmup_cap: f32,
    per_node: f32,
}

impl SimulatedThermalSensor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at_ms = clock.now_millis();
        Self {
            clock,
            started_at_ms,
            base_temp: 31.0,
            warmup_per_minute: 0.8,
            warmup_cap: 8.0,
            per_node: 0.6,
        }
    }
}

impl SensorSource for SimulatedThermalSensor {
    fn sample(&self, active_nodes: usize) -> f32 {
        let elapsed_min =
            (self.clock.now_millis().saturating_sub(self.started_at_ms)) as f32 / 60_000.0;
        let warmup = (elapsed_min * self.warmup_per_minute).min(self.warmup_cap);
        self.base_temp + warmup + active_nodes as f32 * self.per_node
    }
}

/// Side effects applied when entering Elevated/Critical states.
#[async_trait]
pub trait MitigationHooks: Send + Sync {
    /// Mild mitigation, applied on entering Elevated and Critical
    /// (e.g. reduced shadow/render quality).
    async fn mild(&self);

    /// Severe mitigation, applied on entering Critical only.
    async fn severe(&self);
}

/// Default mitigation: mild lowers render fidelity (delegated to listeners
/// of the state-change notification); severe drops every scene node except
/// the most recently placed one and clears the model cache.
pub struct DefaultMitigation {
    session: Arc<dyn ArSessionHandle>,
    cache: ModelCache,
}

impl DefaultMitigation {
    pub fn new(session: Arc<dyn ArSessionHandle>, cache: ModelCache) -> Arc<Self> {
        Arc::new(Self { session, cache })
    }
}

#[async_trait]
impl MitigationHooks for DefaultMitigation {
    async fn mild(&self) {
        info!("thermal mitigation: reducing render fidelity");
    }

    async fn severe(&self) {
        let node_ids = self.session.active_node_ids().await;
        if node_ids.len() > 1 {
            // Oldest placements first; keep only the newest.
            for node_id in &node_ids[..node_ids.len() - 1] {
                if let Err(e) = self.session.remove_node(node_id).await {
                    warn!("failed to evict node {}: {}", node_id, e);
                }
            }
        }
        self.cache.clear().await;
        info!("thermal mitigation: scene evicted and cache cleared");
    }
}

struct ThermalMonitorInner {
    config: ThermalConfig,
    sensor: Arc<dyn SensorSource>,
    session: Arc<dyn ArSessionHandle>,
    mitigation: Arc<dyn MitigationHooks>,
    error_bus: Option<ErrorBus>,
    clock: Arc<dyn Clock>,
    state: RwLock<ThermalState>,
    last_sample: RwLock<Option<ThermalSample>>,
    degraded: AtomicBool,
    listeners: Listeners<ThermalStateChanged>,
    is_running: AtomicBool,
    shutdown_flag: AtomicBool,
    background_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Periodic thermal sampler with transition side effects.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct ThermalMonitor {
    inner: Arc<ThermalMonitorInner>,
}

impl ThermalMonitor {
    /// Create a new monitor. Call [`ThermalMonitor::start`] to begin
    /// sampling, or drive it manually with [`ThermalMonitor::sample_once`].
    pub fn new(
        config: ThermalConfig,
        sensor: Arc<dyn SensorSource>,
        session: Arc<dyn ArSessionHandle>,
        mitigation: Arc<dyn MitigationHooks>,
    ) -> Self {
        Self {
            inner: Arc::new(ThermalMonitorInner {
                config,
                sensor,
                session,
                mitigation,
                error_bus: None,
                clock: Arc::new(SystemClock),
                state: RwLock::new(ThermalState::Normal),
                last_sample: RwLock::new(None),
                degraded: AtomicBool::new(false),
                listeners: Listeners::new(),
                is_running: AtomicBool::new(false),
                shutdown_flag: AtomicBool::new(false),
                background_handle: Mutex::new(None),
            }),
        }
    }

    /// Attach the error bus: entering Critical publishes a `thermal`
    /// failure event. Builder-style, call before [`ThermalMonitor::start`].
    pub fn with_error_bus(self, bus: ErrorBus) -> Self {
        self.rebuild(Some(bus), self.inner.clock.clone())
    }

    /// Use an injected clock for event timestamps.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild(self.inner.error_bus.clone(), clock)
    }

    fn rebuild(&self, error_bus: Option<ErrorBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ThermalMonitorInner {
                config: self.inner.config.clone(),
                sensor: self.inner.sensor.clone(),
                session: self.inner.session.clone(),
                mitigation: self.inner.mitigation.clone(),
                error_bus,
                clock,
                state: RwLock::new(ThermalState::Normal),
                last_sample: RwLock::new(None),
                degraded: AtomicBool::new(false),
                listeners: Listeners::new(),
                is_running: AtomicBool::new(false),
                shutdown_flag: AtomicBool::new(false),
                background_handle: Mutex::new(None),
            }),
        }
    }

    /// Start the periodic sampler task.
    pub fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            warn!("ThermalMonitor is already running");
            return;
        }
        self.inner.shutdown_flag.store(false, Ordering::SeqCst);

        info!(
            "ThermalMonitor started: thresholds=({}, {}), interval={:?}",
            self.inner.config.elevated_threshold,
            self.inner.config.critical_threshold,
            self.inner.config.sample_interval
        );

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.inner.config.sample_interval);
            // The first tick fires immediately; skip it so sampling starts
            // one interval after start().
            interval.tick().await;
            loop {
                interval.tick().await;
                if monitor.inner.shutdown_flag.load(Ordering::SeqCst) {
                    debug!("ThermalMonitor sampler shutting down");
                    break;
                }
                monitor.sample_once().await;
            }
        });

        let monitor = self.clone();
        tokio::spawn(async move {
            *monitor.inner.background_handle.lock().await = Some(handle);
        });
    }

    /// Stop sampling and release the background task.
    pub async fn shutdown(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.inner.background_handle.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.listeners.clear();
        info!("ThermalMonitor shutdown complete");
    }

    /// Take one sample and apply any resulting transition.
    pub async fn sample_once(&self) {
        let active_nodes = self.inner.session.active_node_count().await;
        let temperature = self.inner.sensor.sample(active_nodes);
        let new_state = self.inner.config.classify(temperature);

        *self.inner.last_sample.write().await = Some(ThermalSample {
            temperature,
            state: new_state,
        });

        let old_state = *self.inner.state.read().await;
        if new_state != old_state {
            self.transition(old_state, new_state, temperature).await;
        }
    }

    /// Current thermal state.
    pub async fn state(&self) -> ThermalState {
        *self.inner.state.read().await
    }

    /// The most recent sample, if any.
    pub async fn last_sample(&self) -> Option<ThermalSample> {
        *self.inner.last_sample.read().await
    }

    /// Whether thermal degradation is active (Elevated or Critical).
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// Register a state-change listener.
    pub fn on_state_change<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&ThermalStateChanged) + Send + Sync + 'static,
    {
        self.inner.listeners.register(callback)
    }

    /// Remove a state-change listener.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.inner.listeners.unregister(token)
    }

    // Internal methods

    async fn transition(&self, old_state: ThermalState, new_state: ThermalState, temperature: f32) {
        *self.inner.state.write().await = new_state;

        match new_state {
            ThermalState::Normal => {
                self.inner.degraded.store(false, Ordering::SeqCst);
                info!("thermal state {} -> {} ({temperature:.1}°C)", old_state, new_state);
            }
            ThermalState::Elevated => {
                self.inner.degraded.store(true, Ordering::SeqCst);
                warn!("thermal state {} -> {} ({temperature:.1}°C)", old_state, new_state);
                self.inner.mitigation.mild().await;
            }
            ThermalState::Critical => {
                self.inner.degraded.store(true, Ordering::SeqCst);
                warn!("thermal state {} -> {} ({temperature:.1}°C)", old_state, new_state);
                self.inner.mitigation.mild().await;
                self.inner.mitigation.severe().await;
                if let Some(bus) = &self.inner.error_bus {
                    bus.publish(
                        FailureEvent::new(
                            FailureKind::Thermal,
                            "device reached critical thermal state",
                            self.inner.clock.as_ref(),
                        )
                        .with_context("temperature", serde_json::json!(temperature)),
                    );
                }
            }
        }

        self.inner.listeners.notify(&ThermalStateChanged {
            old_state,
            new_state,
            temperature,
            degraded: self.inner.degraded.load(Ordering::SeqCst),
        });
    }
}
