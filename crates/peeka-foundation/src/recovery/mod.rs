//! Recovery Orchestration
//!
//! This module owns automatic recovery of failed operations. It includes:
//! - A single-in-flight orchestrator driving bounded, backed-off retries
//! - Exponential backoff with a capped multiplier (and optional jitter)
//! - Metrics for attempts, successes, failures, and exhaustions
//!
//! # Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                     RecoveryOrchestrator                         |
//! +------------------------------------------------------------------+
//! |                                                                  |
//! |   +--------+   auto-recover policy    +------------+             |
//! |   |  IDLE  | -----------------------> | RECOVERING |             |
//! |   +--------+                          +------------+             |
//! |        ^                                |        |               |
//! |        |  success (counter reset)       |        | attempt fails |
//! |        +--------------------------------+        | budget left   |
//! |        |                                         v               |
//! |        |  exhausted (fallback          next backoff step         |
//! |        |  surface notification)        (base * min(2^n, cap))    |
//! |        +------------------------------------+                    |
//! |                                                                  |
//! +------------------------------------------------------------------+
//! ```
//!
//! At most one recovery action executes at any instant across all failure
//! kinds; overlapping destructive recoveries (a session teardown racing a
//! cache clear) are worse than a dropped retry. Events arriving while a
//! recovery is in flight are recorded in history and counted, but ignored
//! for auto-recovery purposes.

pub mod backoff;
pub mod metrics;
pub mod orchestrator;

pub use backoff::RecoveryBackoff;
pub use metrics::{RecoveryMetrics, RecoveryMetricsSnapshot};
pub use orchestrator::{
    HandleDisposition, OrchestratorState, RecoveryAction, RecoveryConfig, RecoveryOrchestrator,
    RecoveryOutcome, RecoveryRecord, RecoveryResult,
};
