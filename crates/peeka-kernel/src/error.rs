//! Crate-level error types for `peeka-kernel`.
//!
//! Provides a unified [`CoreError`] that composes errors from every seam
//! (assets, session, IO, serialization) together with
//! [`error_stack::Report`] for rich, context-carrying error propagation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use peeka_kernel::error::{CoreError, CoreResult};
//! use error_stack::ResultExt;
//!
//! fn load_policies() -> CoreResult<()> {
//!     let raw = std::fs::read_to_string("policies.toml")
//!         .map_err(CoreError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach("loading policies.toml")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::asset::AssetError;
use crate::session::SessionError;

/// Crate-level error type for the resilience core.
///
/// Wraps each seam's typed error via `#[from]` so that the `?` operator
/// converts them automatically. Use [`error_stack::Report<CoreError>`]
/// (via [`CoreResult`]) to attach human-readable context as the error
/// propagates up the call stack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An error originating from asset loading.
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// An error originating from the AR session collaborator.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// `Result` alias carrying an [`error_stack::Report`] for context chains.
pub type CoreResult<T> = Result<T, error_stack::Report<CoreError>>;
