//! Explicit wiring of the resilience core.
//!
//! There are no module-level singletons anywhere in this workspace: every
//! component is constructed exactly once by [`ResilienceContextBuilder`]
//! and handed to its dependents by reference. The builder takes the
//! collaborator seams, fills unset configuration from the device profile
//! and persisted settings, and produces a [`ResilienceContext`] owning all
//! six components.

use std::sync::Arc;

use tracing::info;

use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::notify::{NoopNotifier, UserNotifier};
use peeka_kernel::session::ArSessionHandle;
use peeka_kernel::settings::{PersistentSettings, StaticSettings};

use crate::device::{self, DeviceProfile};
use crate::error_bus::{ErrorBus, ErrorBusConfig};
use crate::fallback::{FallbackPolicyEngine, PolicyTable};
use crate::model_cache::{ModelCache, ModelCacheConfig};
use crate::observer::ListenerToken;
use crate::recovery::{RecoveryAction, RecoveryConfig, RecoveryOrchestrator};
use crate::resource::{ResourceConfig, ResourceMonitor};
use crate::thermal::{
    DefaultMitigation, MitigationHooks, SensorSource, SimulatedThermalSensor, ThermalConfig,
    ThermalMonitor,
};

/// Builder for [`ResilienceContext`].
pub struct ResilienceContextBuilder {
    session: Arc<dyn ArSessionHandle>,
    notifier: Arc<dyn UserNotifier>,
    settings: Arc<dyn PersistentSettings>,
    clock: Arc<dyn Clock>,
    sensor: Option<Arc<dyn SensorSource>>,
    mitigation: Option<Arc<dyn MitigationHooks>>,
    device_profile: Option<DeviceProfile>,
    policy_table: PolicyTable,
    bus_config: ErrorBusConfig,
    thermal_config: ThermalConfig,
    recovery_config: RecoveryConfig,
    cache_config: Option<ModelCacheConfig>,
    resource_config: Option<ResourceConfig>,
}

impl ResilienceContextBuilder {
    /// Start a builder around the one required collaborator.
    pub fn new(session: Arc<dyn ArSessionHandle>) -> Self {
        Self {
            session,
            notifier: Arc::new(NoopNotifier),
            settings: Arc::new(StaticSettings::default()),
            clock: Arc::new(SystemClock),
            sensor: None,
            mitigation: None,
            device_profile: None,
            policy_table: PolicyTable::default(),
            bus_config: ErrorBusConfig::default(),
            thermal_config: ThermalConfig::default(),
            recovery_config: RecoveryConfig::default(),
            cache_config: None,
            resource_config: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn UserNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn PersistentSettings>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn SensorSource>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_mitigation(mut self, mitigation: Arc<dyn MitigationHooks>) -> Self {
        self.mitigation = Some(mitigation);
        self
    }

    pub fn with_device_profile(mut self, profile: DeviceProfile) -> Self {
        self.device_profile = Some(profile);
        self
    }

    pub fn with_policy_table(mut self, table: PolicyTable) -> Self {
        self.policy_table = table;
        self
    }

    pub fn with_bus_config(mut self, config: ErrorBusConfig) -> Self {
        self.bus_config = config;
        self
    }

    pub fn with_thermal_config(mut self, config: ThermalConfig) -> Self {
        self.thermal_config = config;
        self
    }

    pub fn with_recovery_config(mut self, config: RecoveryConfig) -> Self {
        self.recovery_config = config;
        self
    }

    pub fn with_cache_config(mut self, config: ModelCacheConfig) -> Self {
        self.cache_config = Some(config);
        self
    }

    pub fn with_resource_config(mut self, config: ResourceConfig) -> Self {
        self.resource_config = Some(config);
        self
    }

    /// Construct and wire every component.
    pub fn build(self) -> ResilienceContext {
        let profile = self.device_profile.unwrap_or_else(device::detect_device);

        let cache_config = self
            .cache_config
            .unwrap_or_else(|| device::derive_cache_config(&profile, self.settings.as_ref()));
        let resource_config = self
            .resource_config
            .unwrap_or_else(|| device::derive_resource_config(&profile, self.settings.as_ref()));

        let bus = ErrorBus::new(self.bus_config);
        let cache =
            ModelCache::with_clock(cache_config, self.clock.clone()).with_error_bus(bus.clone());

        let sensor = self
            .sensor
            .unwrap_or_else(|| Arc::new(SimulatedThermalSensor::new(self.clock.clone())));
        let mitigation = self
            .mitigation
            .unwrap_or_else(|| DefaultMitigation::new(self.session.clone(), cache.clone()));

        let thermal = ThermalMonitor::new(
            self.thermal_config,
            sensor,
            self.session.clone(),
            mitigation,
        )
        .with_clock(self.clock.clone())
        .with_error_bus(bus.clone());

        let resource = ResourceMonitor::new(
            resource_config,
            cache.clone(),
            self.session.clone(),
            thermal.clone(),
        )
        .with_error_bus(bus.clone());

        let engine = FallbackPolicyEngine::with_clock(self.policy_table, self.clock.clone());
        let orchestrator = RecoveryOrchestrator::with_clock(
            self.recovery_config,
            engine.clone(),
            self.notifier.clone(),
            self.clock.clone(),
        );

        info!("resilience context built (device: {:?})", profile.os);

        ResilienceContext {
            session: self.session,
            settings: self.settings,
            bus,
            cache,
            thermal,
            resource,
            engine,
            orchestrator,
            recovery_token: parking_lot::Mutex::new(None),
        }
    }
}

/// The fully wired resilience core.
pub struct ResilienceContext {
    session: Arc<dyn ArSessionHandle>,
    settings: Arc<dyn PersistentSettings>,
    /// Failure event bus.
    pub bus: ErrorBus,
    /// Asset cache.
    pub cache: ModelCache,
    /// Thermal monitor.
    pub thermal: ThermalMonitor,
    /// Resource monitor.
    pub resource: ResourceMonitor,
    /// Policy engine (shared with the orchestrator).
    pub engine: FallbackPolicyEngine,
    /// Recovery orchestrator.
    pub orchestrator: RecoveryOrchestrator,
    recovery_token: parking_lot::Mutex<Option<ListenerToken>>,
}

impl ResilienceContext {
    /// Start the monitors. A no-op when AR is disabled in settings.
    pub fn start(&self) {
        if !self.settings.ar_enabled() {
            info!("AR disabled in settings; monitors not started");
            return;
        }
        self.thermal.start();
        self.resource.start();
    }

    /// Route bus failures into the orchestrator with the given recovery
    /// action. Returns the bus token; [`ResilienceContext::shutdown`]
    /// unregisters it automatically.
    pub fn install_recovery_action(&self, action: RecoveryAction) -> ListenerToken {
        let orchestrator = self.orchestrator.clone();
        let token = self.bus.on_failure(move |event| {
            // Recovery scheduling needs a runtime; skip routing when the
            // publish happened off-runtime.
            if tokio::runtime::Handle::try_current().is_ok() {
                orchestrator.handle(event, action.clone());
            }
        });
        *self.recovery_token.lock() = Some(token);
        token
    }

    /// The AR session collaborator this context was built around.
    pub fn session(&self) -> &Arc<dyn ArSessionHandle> {
        &self.session
    }

    /// Tear everything down: monitors, orchestrator, cache, counters.
    pub async fn shutdown(&self) {
        self.resource.shutdown().await;
        self.thermal.shutdown().await;
        self.orchestrator.shutdown().await;

        let token = self.recovery_token.lock().take();
        if let Some(token) = token {
            self.bus.unregister(token);
        }

        self.cache.clear().await;
        self.engine.reset_all();
        self.bus.clear_history();
        info!("resilience context shut down");
    }
}
