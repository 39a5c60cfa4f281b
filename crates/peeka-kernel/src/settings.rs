//! Read-only persisted settings consulted at construction time.
//!
//! The core never writes settings; it reads two flags when deriving initial
//! thresholds and cache capacity. Persistence itself is an external
//! collaborator.

use serde::{Deserialize, Serialize};

/// User preference for asset fidelity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreference {
    /// Prefer low-fidelity assets and small caches.
    Low,
    /// Platform defaults.
    #[default]
    Balanced,
    /// Prefer full-fidelity assets; larger cache budget.
    High,
}

/// Collaborator exposing persisted, read-only configuration flags.
pub trait PersistentSettings: Send + Sync {
    /// Whether AR features are enabled at all.
    fn ar_enabled(&self) -> bool;

    /// The user's fidelity preference.
    fn quality_preference(&self) -> QualityPreference;
}

/// Fixed in-memory settings, for tests and defaults.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    pub ar_enabled: bool,
    pub quality_preference: QualityPreference,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            ar_enabled: true,
            quality_preference: QualityPreference::Balanced,
        }
    }
}

impl PersistentSettings for StaticSettings {
    fn ar_enabled(&self) -> bool {
        self.ar_enabled
    }

    fn quality_preference(&self) -> QualityPreference {
        self.quality_preference
    }
}
