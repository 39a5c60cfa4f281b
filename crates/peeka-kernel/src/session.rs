//! AR session contract.
//!
//! The platform AR session (camera feed, tracking, scene graph) is an
//! external collaborator. The resilience core drives it through this seam:
//! recovery actions restart it, the resource monitor pauses it on
//! backgrounding, and thermal mitigation evicts its nodes.

use async_trait::async_trait;

/// Errors surfaced by the AR session collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The session is in a state that cannot accept this call.
    #[error("invalid session state: {0}")]
    InvalidState(String),
    /// Required platform capability is missing.
    #[error("AR unsupported on this device: {0}")]
    Unsupported(String),
    /// The underlying platform call failed.
    #[error("session backend error: {0}")]
    Backend(String),
}

/// Handle to the platform AR session.
///
/// `active_node_ids` returns ids ordered by placement time, oldest first;
/// severe thermal mitigation relies on that ordering to keep only the most
/// recently placed node.
#[async_trait]
pub trait ArSessionHandle: Send + Sync {
    /// Start (or restart) the session.
    async fn start(&self) -> Result<(), SessionError>;

    /// Pause the session, keeping tracking state.
    async fn pause(&self) -> Result<(), SessionError>;

    /// Resume a paused session.
    async fn resume(&self) -> Result<(), SessionError>;

    /// Stop the session and release platform resources.
    async fn stop(&self) -> Result<(), SessionError>;

    /// Place a node for the given asset identity.
    async fn add_node(&self, node_id: &str, asset_identity: &str) -> Result<(), SessionError>;

    /// Remove a placed node.
    async fn remove_node(&self, node_id: &str) -> Result<(), SessionError>;

    /// Ids of currently placed nodes, oldest placement first.
    async fn active_node_ids(&self) -> Vec<String>;

    /// Convenience: number of currently placed nodes.
    async fn active_node_count(&self) -> usize {
        self.active_node_ids().await.len()
    }
}
