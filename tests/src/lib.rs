//! Shared test utilities for the Peeka resilience core.
//!
//! Mock collaborators implementing every kernel seam, plus helpers for
//! driving the governance components deterministically in integration
//! tests.

pub mod mocks;

pub use mocks::{
    CountingLoader, MockArSession, RecordingNotifier, ScriptedSensor, test_asset, test_event,
};

/// Install a test tracing subscriber (idempotent).
pub fn init_tracing() {
    peeka_kernel::logging::try_init();
}
