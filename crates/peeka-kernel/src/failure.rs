//! Failure taxonomy and failure events.
//!
//! Every fault observed anywhere in the AR pipeline (session lifecycle,
//! model loading, placement, platform capability checks) is normalized
//! into a [`FailureEvent`] carrying a closed [`FailureKind`]. The kind
//! alone determines default recoverability ([`Recoverability`]) and which
//! fallback policy applies; free-form details ride along for logging and
//! user messaging but never drive control flow.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

/// Closed enumeration of everything that can go wrong in the AR pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Engine or capability bootstrap failed.
    Initialization,
    /// The AR session could not be started.
    SessionStart,
    /// The AR session could not be paused.
    SessionPause,
    /// The AR session could not be resumed.
    SessionResume,
    /// The AR session could not be stopped cleanly.
    SessionStop,
    /// A 3D asset failed to load.
    ModelLoading,
    /// A loaded asset could not be placed in the scene.
    ModelPlacement,
    /// A hit test against the scene produced no usable result.
    HitTesting,
    /// The governance layer detected resource pressure.
    ResourcePressure,
    /// The device lacks a required AR/ML capability.
    DeviceIncompatible,
    /// A required permission (camera, typically) was denied.
    PermissionDenied,
    /// A network-backed operation failed.
    Network,
    /// Thermal pressure reported by the thermal monitor.
    Thermal,
    /// Memory pressure reported by the resource monitor.
    MemoryPressure,
    /// Anything that does not fit the taxonomy.
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Initialization => "initialization",
            FailureKind::SessionStart => "session-start",
            FailureKind::SessionPause => "session-pause",
            FailureKind::SessionResume => "session-resume",
            FailureKind::SessionStop => "session-stop",
            FailureKind::ModelLoading => "model-loading",
            FailureKind::ModelPlacement => "model-placement",
            FailureKind::HitTesting => "hit-testing",
            FailureKind::ResourcePressure => "resource-pressure",
            FailureKind::DeviceIncompatible => "device-incompatible",
            FailureKind::PermissionDenied => "permission-denied",
            FailureKind::Network => "network",
            FailureKind::Thermal => "thermal",
            FailureKind::MemoryPressure => "memory-pressure",
            FailureKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Default recoverability class of a [`FailureKind`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recoverability {
    /// Never auto-retried; always surfaces a fallback.
    Permanent,
    /// Eligible for auto-recovery or graceful degradation per policy.
    Transient,
    /// Logged only; never surfaced, never retried.
    Informational,
    /// Conservative default for unmapped kinds.
    Unknown,
}

impl FailureKind {
    /// Classify the default recoverability of this kind.
    pub fn recoverability(&self) -> Recoverability {
        match self {
            FailureKind::DeviceIncompatible | FailureKind::PermissionDenied => {
                Recoverability::Permanent
            }
            FailureKind::Initialization
            | FailureKind::SessionStart
            | FailureKind::SessionPause
            | FailureKind::SessionResume
            | FailureKind::SessionStop
            | FailureKind::ModelLoading
            | FailureKind::ModelPlacement
            | FailureKind::ResourcePressure
            | FailureKind::Network
            | FailureKind::Thermal
            | FailureKind::MemoryPressure => Recoverability::Transient,
            FailureKind::HitTesting => Recoverability::Informational,
            FailureKind::Unknown => Recoverability::Unknown,
        }
    }

    /// Whether this kind may ever be auto-retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.recoverability(),
            Recoverability::Permanent | Recoverability::Informational
        )
    }
}

/// A single failure observation. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Unique id of this observation.
    pub id: Uuid,
    /// The taxonomy kind driving policy selection.
    pub kind: FailureKind,
    /// Short human-readable description.
    pub message: String,
    /// Optional longer detail (underlying error text, asset id, ...).
    pub detail: Option<String>,
    /// When the failure occurred, Unix-epoch milliseconds.
    pub occurred_at_ms: u64,
    /// Free-form structured context for logging and diagnostics.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl FailureEvent {
    /// Create a new event stamped with the given clock.
    pub fn new(kind: FailureKind, message: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            detail: None,
            occurred_at_ms: clock.now_millis(),
            context: HashMap::new(),
        }
    }

    /// Create a new event with an explicit timestamp.
    pub fn at(kind: FailureKind, message: impl Into<String>, occurred_at_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            detail: None,
            occurred_at_ms,
            context: HashMap::new(),
        }
    }

    /// Attach a detail string.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Shorthand for this event's default recoverability.
    pub fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }
}

impl std::fmt::Display for FailureEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "[{}] {}: {}", self.kind, self.message, detail),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}
