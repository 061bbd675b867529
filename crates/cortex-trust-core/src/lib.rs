// crates/cortex-trust-core/src/lib.rs
// ============================================================================
// Module: Cortex Trust Core Library
// Description: Pure types and pure functions for the trust gate decision core.
// Purpose: Classify tool calls, update trust scores, and model persisted state
//          without any I/O.
// Dependencies: regex, once_cell, serde, serde_json, thiserror, url, uuid
// ============================================================================

//! ## Overview
//! Cortex Trust Core holds every type and function in the trust/hook decision
//! pipeline that can be computed without touching disk, a clock source beyond
//! [`time::Timestamp::now`], or a network. Everything here is deterministic
//! given its inputs.
//! Invariants:
//! - No module in this crate performs I/O.
//! - Classification and score updates are pure functions.
//! - Persisted entity types carry no behavior beyond construction and display.
//!
//! Security posture: the classifier and redaction filter are the system's
//! first line of defense against secret leakage and tier-4 bypass; see
//! `redaction` and `classifier` module docs for the specific guarantees.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod category;
pub mod classifier;
pub mod context;
pub mod identifiers;
pub mod milestone;
pub mod model;
pub mod redaction;
pub mod score;
pub mod session;
pub mod store;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use category::Category;
pub use category::Tier;
pub use classifier::Classification;
pub use classifier::classify;
pub use context::ContextFeatures;
pub use context::RiskLevel;
pub use context::extract as extract_context;
pub use identifiers::ConfirmationId;
pub use identifiers::DecisionId;
pub use identifiers::MilestoneId;
pub use identifiers::OverrideId;
pub use milestone::detect as detect_milestone;
pub use model::Decision;
pub use model::GateDecisionKind;
pub use model::Milestone;
pub use model::MilestoneType;
pub use model::Outcome;
pub use model::OverrideType;
pub use model::PendingConfirmation;
pub use model::PendingOutcome;
pub use model::TrustOverride;
pub use model::TrustScore;
pub use redaction::redact;
pub use score::apply_outcome;
pub use score::outcome_value;
pub use session::is_interactive;
pub use store::AdvisoryActionRate;
pub use store::ResolveOutcomeResult;
pub use store::StoreError;
pub use store::TrustStore;
pub use time::Timestamp;
