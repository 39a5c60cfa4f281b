//! Device profiling for threshold derivation.
//!
//! Samples the host's memory situation once at startup and, together with
//! the user's persisted quality preference, derives the initial resource
//! watermarks and cache capacity. The profile is a snapshot; live
//! pressure tracking is the resource monitor's job.

use peeka_kernel::settings::{PersistentSettings, QualityPreference};

use crate::model_cache::ModelCacheConfig;
use crate::resource::ResourceConfig;

/// Represents the operating system of the host device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsClassification {
    Ios,
    Android,
    MacOS,
    Linux,
    Other(String),
}

/// Holds information about the host device relevant to governance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub os: OsClassification,
    /// Total system memory in bytes.
    pub total_memory_bytes: u64,
    /// Currently available system memory in bytes.
    pub available_memory_bytes: u64,
}

/// Detects the host device's profile dynamically.
pub fn detect_device() -> DeviceProfile {
    let os = match std::env::consts::OS {
        "ios" => OsClassification::Ios,
        "android" => OsClassification::Android,
        "macos" => OsClassification::MacOS,
        "linux" => OsClassification::Linux,
        other => OsClassification::Other(other.to_string()),
    };

    // Fetch memory stats via sysinfo
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();

    DeviceProfile {
        os,
        total_memory_bytes: sys.total_memory(),
        available_memory_bytes: sys.available_memory(),
    }
}

/// Derive resource watermarks from the device profile.
///
/// The high watermark is an eighth of total memory and the critical
/// watermark a fifth, nudged down one step for a Low quality preference.
pub fn derive_resource_config(
    profile: &DeviceProfile,
    settings: &dyn PersistentSettings,
) -> ResourceConfig {
    let total = profile.total_memory_bytes.max(1024 * 1024 * 1024);
    let (high_div, critical_div) = match settings.quality_preference() {
        QualityPreference::Low => (12, 8),
        QualityPreference::Balanced => (8, 5),
        QualityPreference::High => (6, 4),
    };

    ResourceConfig::default().with_watermarks(total / high_div, total / critical_div)
}

/// Derive cache capacity from the quality preference.
pub fn derive_cache_config(
    profile: &DeviceProfile,
    settings: &dyn PersistentSettings,
) -> ModelCacheConfig {
    // Devices under 3 GiB get the small-cache treatment regardless of
    // preference.
    let constrained = profile.total_memory_bytes < 3 * 1024 * 1024 * 1024;
    let max_entries = match settings.quality_preference() {
        _ if constrained => 6,
        QualityPreference::Low => 6,
        QualityPreference::Balanced => 10,
        QualityPreference::High => 16,
    };

    ModelCacheConfig::default()
        .with_max_entries(max_entries)
        .with_trim_target(max_entries / 2)
}
