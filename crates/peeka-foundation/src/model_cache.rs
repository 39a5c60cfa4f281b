//! ModelCache - keyed LRU store for loaded 3D assets.
//!
//! This module provides ModelCache for governing loaded scene assets:
//! - On-demand loading through a caller-supplied loader
//! - LRU eviction with a pinned "always keep" set
//! - Incremental memory accounting (no full scans)
//! - Quality-variant keys so one logical asset can coexist at several
//!   fidelities, each independently evictable
//!
//! # Example
//!
//! ```rust,no_run
//! use peeka_foundation::model_cache::{ModelCache, ModelCacheConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ModelCacheConfig::default()
//!         .with_max_entries(8)
//!         .with_trim_target(4);
//!
//!     let cache = ModelCache::new(config);
//!     // ... use the cache
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use peeka_kernel::asset::{AssetError, AssetQuality, SceneAsset};
use peeka_kernel::clock::{Clock, SystemClock};
use peeka_kernel::failure::{FailureEvent, FailureKind};

use crate::error_bus::ErrorBus;

/// Errors produced by ModelCache operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The loader failed to produce an asset.
    #[error("asset load failed: {0}")]
    Load(#[from] AssetError),
    /// The requested key is not present.
    #[error("cache miss: {0}")]
    Miss(String),
}

/// Convenience alias used throughout this module.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache key: a pure function of asset identity and quality parameters.
///
/// Requesting the same logical asset at different quality settings yields
/// distinct keys, so a degraded variant never aliases the full-fidelity
/// one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Logical asset identity.
    pub identity: String,
    /// Quality parameters baked into the key.
    pub quality: AssetQuality,
}

impl CacheKey {
    /// Build a key for `identity` at `quality`.
    pub fn new(identity: impl Into<String>, quality: AssetQuality) -> Self {
        Self {
            identity: identity.into(),
            quality,
        }
    }

    /// Deterministic string encoding used as the storage key.
    pub fn encode(&self) -> String {
        format!(
            "{}@d:{};c:{};t:{}",
            self.identity,
            self.quality.detail,
            u8::from(self.quality.compressed),
            self.quality.max_texture_px
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Configuration for ModelCache.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelCacheConfig {
    /// Maximum number of entries to keep.
    pub max_entries: usize,
    /// Target entry count when trimming under pressure.
    pub trim_target: usize,
    /// Asset identities that are pinned on insert (any quality variant).
    pub pinned_identities: Vec<String>,
}

impl Default for ModelCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            trim_target: 5,
            pinned_identities: vec![],
        }
    }
}

impl ModelCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_trim_target(mut self, target: usize) -> Self {
        self.trim_target = target;
        self
    }

    pub fn with_pinned_identities(mut self, identities: Vec<String>) -> Self {
        self.pinned_identities = identities;
        self
    }
}

/// One live cache entry.
#[derive(Clone)]
struct CacheEntry {
    key: CacheKey,
    asset: Arc<dyn SceneAsset>,
    last_accessed_ms: u64,
    access_count: u64,
    size_bytes: u64,
    pinned: bool,
}

struct ModelCacheInner {
    config: ModelCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    memory_bytes: AtomicU64,
    clock: Arc<dyn Clock>,
    error_bus: Option<ErrorBus>,
}

/// ModelCache - LRU cache for loaded scene assets.
///
/// This type is cheaply cloneable — all clones share the same underlying
/// state.
#[derive(Clone)]
pub struct ModelCache {
    inner: Arc<ModelCacheInner>,
}

impl ModelCache {
    /// Create a new ModelCache with the given configuration.
    pub fn new(config: ModelCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with an injected clock (tests use [`peeka_kernel::ManualClock`]).
    pub fn with_clock(config: ModelCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ModelCacheInner {
                config,
                entries: RwLock::new(HashMap::new()),
                memory_bytes: AtomicU64::new(0),
                clock,
                error_bus: None,
            }),
        }
    }

    /// Attach the error bus so loader failures are published as
    /// model-loading failure events.
    pub fn with_error_bus(self, bus: ErrorBus) -> Self {
        let inner = ModelCacheInner {
            config: self.inner.config.clone(),
            entries: RwLock::new(HashMap::new()),
            memory_bytes: AtomicU64::new(0),
            clock: self.inner.clock.clone(),
            error_bus: Some(bus),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Return the cached asset for `key`, or load and insert it.
    ///
    /// A hit refreshes `last_accessed` and the access counter. A miss
    /// awaits `loader`; on success the asset is inserted (evicting LRU
    /// entries past `max_entries`), on failure a `ModelLoading` event is
    /// published and nothing is inserted.
    pub async fn get_or_load<F, Fut>(&self, key: &CacheKey, loader: F) -> Result<Arc<dyn SceneAsset>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Arc<dyn SceneAsset>, AssetError>>,
    {
        let encoded = key.encode();

        // Fast path: hit.
        {
            let mut entries = self.inner.entries.write().await;
            if let Some(entry) = entries.get_mut(&encoded) {
                entry.last_accessed_ms = self.inner.clock.now_millis();
                entry.access_count += 1;
                debug!("cache hit: {}", encoded);
                return Ok(entry.asset.clone());
            }
        }

        // Miss: load outside the lock.
        let asset = match loader().await {
            Ok(asset) => asset,
            Err(e) => {
                warn!("asset load failed for {}: {}", encoded, e);
                if let Some(bus) = &self.inner.error_bus {
                    bus.publish(
                        FailureEvent::new(
                            FailureKind::ModelLoading,
                            format!("failed to load asset {}", key.identity),
                            self.inner.clock.as_ref(),
                        )
                        .with_detail(e.to_string())
                        .with_context("cache_key", serde_json::json!(encoded)),
                    );
                }
                return Err(CacheError::Load(e));
            }
        };

        let size_bytes = asset.size_bytes();
        let pinned = self
            .inner
            .config
            .pinned_identities
            .iter()
            .any(|id| id == &key.identity);

        let entry = CacheEntry {
            key: key.clone(),
            asset: asset.clone(),
            last_accessed_ms: self.inner.clock.now_millis(),
            access_count: 1,
            size_bytes,
            pinned,
        };

        {
            let mut entries = self.inner.entries.write().await;
            // A racing load may have inserted the same key; keep ours and
            // account once.
            if entries.insert(encoded.clone(), entry).is_none() {
                self.inner.memory_bytes.fetch_add(size_bytes, Ordering::SeqCst);
            }
            let max = self.inner.config.max_entries;
            if entries.len() > max {
                self.trim_locked(&mut entries, max);
            }
        }

        debug!("cached asset {} ({} bytes)", encoded, size_bytes);
        Ok(asset)
    }

    /// Whether `key` is currently cached.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.read().await.contains_key(&key.encode())
    }

    /// Pin an entry so LRU trimming skips it. No-op if absent.
    pub async fn pin(&self, key: &CacheKey) {
        if let Some(entry) = self.inner.entries.write().await.get_mut(&key.encode()) {
            entry.pinned = true;
        }
    }

    /// Unpin an entry, making it evictable again. No-op if absent.
    pub async fn unpin(&self, key: &CacheKey) {
        if let Some(entry) = self.inner.entries.write().await.get_mut(&key.encode()) {
            entry.pinned = false;
        }
    }

    /// Evict unpinned entries, oldest access first, until the entry count
    /// is at most `target` or nothing evictable remains.
    pub async fn trim(&self, target: usize) {
        let mut entries = self.inner.entries.write().await;
        self.trim_locked(&mut entries, target);
    }

    /// Remove everything, pinned entries included, and zero the memory
    /// counter. Idempotent.
    pub async fn clear(&self) {
        let mut entries = self.inner.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        self.inner.memory_bytes.store(0, Ordering::SeqCst);
        if dropped > 0 {
            info!("model cache cleared ({} entries dropped)", dropped);
        }
    }

    /// Current entry count.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// Estimated resident bytes, maintained incrementally on insert/evict.
    pub fn estimated_memory_bytes(&self) -> u64 {
        self.inner.memory_bytes.load(Ordering::SeqCst)
    }

    /// Cache statistics snapshot.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.read().await;
        CacheStats {
            entries: entries.len(),
            pinned_entries: entries.values().filter(|e| e.pinned).count(),
            max_entries: self.inner.config.max_entries,
            estimated_memory_bytes: self.estimated_memory_bytes(),
        }
    }

    /// The configured trim target, used by the resource monitor.
    pub fn trim_target(&self) -> usize {
        self.inner.config.trim_target
    }

    // Internal methods

    fn trim_locked(&self, entries: &mut HashMap<String, CacheEntry>, target: usize) {
        if entries.len() <= target {
            return;
        }

        // Evictable entries strictly ascending by last access.
        let mut candidates: Vec<(String, u64, u64)> = entries
            .values()
            .filter(|e| !e.pinned)
            .map(|e| (e.key.encode(), e.last_accessed_ms, e.size_bytes))
            .collect();
        candidates.sort_by_key(|(_, accessed, _)| *accessed);

        for (encoded, _, size) in candidates {
            if entries.len() <= target {
                break;
            }
            entries.remove(&encoded);
            self.inner.memory_bytes.fetch_sub(size, Ordering::SeqCst);
            info!("evicted cached asset: {}", encoded);
        }
    }
}

/// Statistics about the model cache.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    /// Number of live entries.
    pub entries: usize,
    /// Number of pinned entries.
    pub pinned_entries: usize,
    /// Configured maximum entry count.
    pub max_entries: usize,
    /// Estimated resident bytes.
    pub estimated_memory_bytes: u64,
}
