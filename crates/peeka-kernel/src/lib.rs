//! Peeka Kernel - contracts for the AR resilience core.
//!
//! This crate defines the kernel-level contract shared by every component of
//! the resilience and resource-governance subsystem:
//!
//! - **Failure taxonomy**: [`failure::FailureKind`], [`failure::FailureEvent`]
//! - **Collaborator seams**: [`asset::AssetLoader`], [`session::ArSessionHandle`],
//!   [`notify::UserNotifier`], [`settings::PersistentSettings`]
//! - **Clock abstraction**: [`clock::Clock`] for deterministic tests
//! - **Unified errors**: [`error::CoreError`] / [`error::CoreResult`]
//!
//! Per the kernel rules: trait definitions live here, concrete
//! implementations live in `peeka-foundation`, and the kernel must never
//! depend on the foundation.

// clock module
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// failure module
pub mod failure;
pub use failure::{FailureEvent, FailureKind, Recoverability};

// asset module
pub mod asset;
pub use asset::{AssetError, AssetLoader, AssetQuality, DetailLevel, SceneAsset};

// session module
pub mod session;
pub use session::{ArSessionHandle, SessionError};

// notify module
pub mod notify;
pub use notify::{NoopNotifier, UserNotifier};

// settings module
pub mod settings;
pub use settings::{PersistentSettings, QualityPreference, StaticSettings};

// logging module
pub mod logging;

// error module
pub mod error;
pub use error::{CoreError, CoreResult};
