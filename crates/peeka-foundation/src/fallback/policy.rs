//! Fallback policy declarations.
//!
//! One [`FallbackPolicy`] per [`FailureKind`], collected in a
//! [`PolicyTable`] loaded at startup. Policies are immutable
//! configuration; the engine layers retry state on top.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use peeka_kernel::failure::FailureKind;

/// How the app reacts to a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// Replace the AR surface with a friendly fallback screen.
    ShowFallbackSurface,
    /// Retry, surfacing a retry prompt once the budget is spent.
    RetryWithPrompt,
    /// Retry automatically without involving the user.
    AutoRecover,
    /// Keep running at reduced fidelity.
    GracefulDegrade,
    /// Log and show at most a passive notice.
    MinimalNotify,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStrategy::ShowFallbackSurface => write!(f, "show-fallback-surface"),
            RecoveryStrategy::RetryWithPrompt => write!(f, "retry-with-prompt"),
            RecoveryStrategy::AutoRecover => write!(f, "auto-recover"),
            RecoveryStrategy::GracefulDegrade => write!(f, "graceful-degrade"),
            RecoveryStrategy::MinimalNotify => write!(f, "minimal-notify"),
        }
    }
}

mod duration_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Declarative reaction to one failure kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Strategy to apply.
    pub strategy: RecoveryStrategy,
    /// Maximum automatic retry attempts.
    pub max_retries: u32,
    /// Base delay before the first retry; backoff scales from here.
    #[serde(rename = "retry_delay_ms", with = "duration_millis")]
    pub retry_delay: Duration,
    /// Whether the user is told about this failure.
    pub notify_user: bool,
    /// Child-friendly message shown when `notify_user` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FallbackPolicy {
    /// Automatic recovery with the given budget.
    pub fn auto(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            strategy: RecoveryStrategy::AutoRecover,
            max_retries,
            retry_delay,
            notify_user: false,
            message: None,
        }
    }

    /// Retry, prompting the user once exhausted.
    pub fn retry_with_prompt(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            strategy: RecoveryStrategy::RetryWithPrompt,
            max_retries,
            retry_delay,
            notify_user: true,
            message: None,
        }
    }

    /// Immediate fallback surface; never retried.
    pub fn fallback_surface(message: impl Into<String>) -> Self {
        Self {
            strategy: RecoveryStrategy::ShowFallbackSurface,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            notify_user: true,
            message: Some(message.into()),
        }
    }

    /// Keep going at reduced fidelity.
    pub fn degrade() -> Self {
        Self {
            strategy: RecoveryStrategy::GracefulDegrade,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            notify_user: false,
            message: None,
        }
    }

    /// Log only.
    pub fn minimal() -> Self {
        Self {
            strategy: RecoveryStrategy::MinimalNotify,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            notify_user: false,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_notify_user(mut self, notify: bool) -> Self {
        self.notify_user = notify;
        self
    }
}

/// The full kind → policy mapping with a default for unmapped kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Explicit per-kind policies.
    pub policies: HashMap<FailureKind, FallbackPolicy>,
    /// Applied to any kind without an explicit entry.
    pub default_policy: FallbackPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut policies = HashMap::new();

        policies.insert(
            FailureKind::Initialization,
            FallbackPolicy::retry_with_prompt(2, Duration::from_secs(2))
                .with_message("The magic camera is taking a moment to wake up"),
        );
        policies.insert(
            FailureKind::SessionStart,
            FallbackPolicy::auto(3, Duration::from_secs(2)),
        );
        policies.insert(
            FailureKind::SessionPause,
            FallbackPolicy::auto(2, Duration::from_secs(1)),
        );
        policies.insert(
            FailureKind::SessionResume,
            FallbackPolicy::auto(3, Duration::from_secs(1)),
        );
        policies.insert(FailureKind::SessionStop, FallbackPolicy::minimal());
        policies.insert(
            FailureKind::ModelLoading,
            FallbackPolicy::auto(3, Duration::from_secs(2)),
        );
        policies.insert(
            FailureKind::ModelPlacement,
            FallbackPolicy::retry_with_prompt(2, Duration::from_secs(1))
                .with_message("Let's try putting that somewhere else"),
        );
        policies.insert(FailureKind::HitTesting, FallbackPolicy::minimal());
        policies.insert(FailureKind::ResourcePressure, FallbackPolicy::degrade());
        policies.insert(
            FailureKind::DeviceIncompatible,
            FallbackPolicy::fallback_surface(
                "This device can't do the camera magic, but you can still explore pictures!",
            ),
        );
        policies.insert(
            FailureKind::PermissionDenied,
            FallbackPolicy::fallback_surface(
                "We need the camera to find your toys. Ask a grown-up to help!",
            ),
        );
        policies.insert(
            FailureKind::Network,
            FallbackPolicy::auto(3, Duration::from_secs(5)),
        );
        policies.insert(
            FailureKind::Thermal,
            FallbackPolicy::degrade()
                .with_notify_user(true)
                .with_message("Taking a little break to cool down"),
        );
        policies.insert(
            FailureKind::MemoryPressure,
            FallbackPolicy::auto(3, Duration::from_secs(30)),
        );

        Self {
            policies,
            default_policy: FallbackPolicy::retry_with_prompt(1, Duration::from_secs(2))
                .with_message("Something unexpected happened, let's try again"),
        }
    }
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the effective policy for a kind (explicit entry or default).
    pub fn policy_for(&self, kind: FailureKind) -> &FallbackPolicy {
        self.policies.get(&kind).unwrap_or(&self.default_policy)
    }

    /// Override one kind's policy.
    pub fn with_policy(mut self, kind: FailureKind, policy: FallbackPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    /// Parse a table from TOML, e.g.:
    ///
    /// ```toml
    /// [policies.model-loading]
    /// strategy = "auto-recover"
    /// max_retries = 3
    /// retry_delay_ms = 2000
    /// notify_user = false
    ///
    /// [default_policy]
    /// strategy = "retry-with-prompt"
    /// max_retries = 1
    /// retry_delay_ms = 2000
    /// notify_user = true
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load a table from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
