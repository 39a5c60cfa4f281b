#![allow(
    dead_code,
    unused_imports,
    non_camel_case_types,
    ambiguous_glob_reexports
)]
//! Peeka Foundation - resilience and resource governance for the AR
//! pipeline.
//!
//! Six cooperating components: the error bus, the model cache, the
//! thermal and resource monitors, the fallback policy engine, and the
//! recovery orchestrator. [`context::ResilienceContextBuilder`] wires them
//! together from the kernel's collaborator seams.

// observer module - token-based listener registries
pub mod observer;

// error_bus module - typed failure pub/sub with bounded history
pub mod error_bus;

// model_cache module - keyed LRU asset cache with memory accounting
pub mod model_cache;

// thermal module - three-state thermal machine and mitigation
pub mod thermal;

// resource module - watermark-driven cache pressure relief
pub mod resource;

// device module - device profiling for threshold derivation
pub mod device;

// fallback module - per-kind policies and decisions
pub mod fallback;

// recovery module - single-in-flight backed-off retry
pub mod recovery;

// context module - explicit dependency wiring
pub mod context;

// Re-export observer types
pub use observer::{ListenerToken, Listeners};

// Re-export error bus types
pub use error_bus::{ErrorBus, ErrorBusConfig};

// Re-export model cache types
pub use model_cache::{CacheError, CacheKey, CacheStats, ModelCache, ModelCacheConfig};

// Re-export thermal types
pub use thermal::{
    DefaultMitigation,
    MitigationHooks,
    SensorSource,
    SimulatedThermalSensor,
    ThermalConfig,
    ThermalMonitor,
    ThermalSample,
    ThermalState,
    ThermalStateChanged,
};

// Re-export resource types
pub use resource::{ResourceConfig, ResourceMonitor, ResourceSnapshot};

// Re-export device types
pub use device::{DeviceProfile, OsClassification, detect_device};

// Re-export fallback types
pub use fallback::{
    FallbackPolicy,
    FallbackPolicyEngine,
    PolicyTable,
    RecoveryStrategy,
    RetryState,
};

// Re-export recovery types
pub use recovery::{
    HandleDisposition,
    OrchestratorState,
    RecoveryAction,
    RecoveryBackoff,
    RecoveryConfig,
    RecoveryMetrics,
    RecoveryMetricsSnapshot,
    RecoveryOrchestrator,
    RecoveryOutcome,
    RecoveryRecord,
    RecoveryResult,
};

// Re-export context types
pub use context::{ResilienceContext, ResilienceContextBuilder};
