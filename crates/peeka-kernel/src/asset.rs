//! Asset loading contract.
//!
//! The cache and the recovery layer never touch asset bytes; they hold
//! opaque [`SceneAsset`] handles produced by an [`AssetLoader`]
//! collaborator. Quality parameters are part of the request so the same
//! logical asset can exist at several fidelities side by side.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors produced by asset loading.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum AssetError {
    /// The asset identity is unknown to the loader.
    #[error("asset not found: {0}")]
    NotFound(String),
    /// The loader failed to decode or prepare the asset.
    #[error("asset decode failed for {identity}: {reason}")]
    Decode { identity: String, reason: String },
    /// The underlying platform call failed.
    #[error("asset backend error: {0}")]
    Backend(String),
}

/// Level of geometric/texture detail requested for an asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Reduced geometry, low-resolution textures.
    Low,
    /// Default fidelity.
    #[default]
    Medium,
    /// Full-fidelity asset.
    High,
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetailLevel::Low => write!(f, "low"),
            DetailLevel::Medium => write!(f, "medium"),
            DetailLevel::High => write!(f, "high"),
        }
    }
}

/// Quality parameters for one asset request.
///
/// These participate in cache-key derivation: the same identity at two
/// different qualities is two independent cache entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AssetQuality {
    /// Requested detail level.
    pub detail: DetailLevel,
    /// Whether texture compression is applied.
    pub compressed: bool,
    /// Maximum texture edge length in pixels.
    pub max_texture_px: u32,
}

impl Default for AssetQuality {
    fn default() -> Self {
        Self {
            detail: DetailLevel::Medium,
            compressed: true,
            max_texture_px: 1024,
        }
    }
}

impl AssetQuality {
    /// Reduced-fidelity preset used under thermal or memory pressure.
    pub fn degraded() -> Self {
        Self {
            detail: DetailLevel::Low,
            compressed: true,
            max_texture_px: 512,
        }
    }

    /// Full-fidelity preset.
    pub fn full() -> Self {
        Self {
            detail: DetailLevel::High,
            compressed: false,
            max_texture_px: 2048,
        }
    }

    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn with_max_texture_px(mut self, px: u32) -> Self {
        self.max_texture_px = px;
        self
    }
}

/// A loaded 3D asset held by the cache.
///
/// Implementations wrap whatever the rendering layer needs (mesh handles,
/// texture ids); the governance core only ever asks for identity and size.
pub trait SceneAsset: Send + Sync {
    /// Logical identity of the asset (e.g. `"dinosaur"`).
    fn identity(&self) -> &str;

    /// Estimated resident size in bytes, used for memory accounting.
    fn size_bytes(&self) -> u64;
}

/// Collaborator that produces [`SceneAsset`]s on demand.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Load `identity` at the requested quality.
    async fn load(
        &self,
        identity: &str,
        quality: AssetQuality,
    ) -> Result<Arc<dyn SceneAsset>, AssetError>;
}
