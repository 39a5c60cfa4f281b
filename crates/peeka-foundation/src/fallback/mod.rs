//! Fallback Policy Engine
//!
//! This module decides how the app reacts to each failure kind. It
//! includes:
//! - Declarative per-kind policies (strategy, retry budget, delay,
//!   user-notification flag)
//! - A policy table with a conservative default for unmapped kinds
//! - Pure decision helpers over (policy, retry state)
//! - Per-kind retry counters, reset only by an explicit success signal
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                    FallbackPolicyEngine                      |
//! +--------------------------------------------------------------+
//! |                                                              |
//! |   FailureEvent ──> policy_for(kind) ──> FallbackPolicy       |
//! |                          |                                   |
//! |                          v                                   |
//! |        should_auto_recover? ── yes ──> RecoveryOrchestrator  |
//! |                |                                             |
//! |                no                                            |
//! |                v                                             |
//! |        should_show_fallback_surface?  ──> fallback UI        |
//! |                |                                             |
//! |                no                                            |
//! |                v                                             |
//! |        should_gracefully_degrade? ──> reduced fidelity       |
//! |                |                                             |
//! |                no ──> minimal notification (log only)        |
//! |                                                              |
//! +--------------------------------------------------------------+
//! ```
//!
//! Retry counting lives here so that decisions stay pure: the orchestrator
//! records attempts and signals success; the engine only ever reads its
//! own counters when answering.

pub mod engine;
pub mod policy;

pub use engine::{FallbackPolicyEngine, RetryState};
pub use policy::{FallbackPolicy, PolicyTable, RecoveryStrategy};
