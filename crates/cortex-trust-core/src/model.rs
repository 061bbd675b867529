// crates/cortex-trust-core/src/model.rs
// ============================================================================
// Module: Cortex Trust Entities
// Description: Persisted entity types for the trust gate data model.
// Purpose: Model Decision, TrustScore, TrustOverride, Milestone,
//          PendingOutcome, and PendingConfirmation rows.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! These types mirror the data model table in spec.md §3 field for field.
//! They carry no behavior beyond construction; all mutation happens through
//! [`crate::store::TrustStore`] methods so ownership stays with the component
//! the spec assigns (Trust Gate writes `Decision`, Outcome Collector owns
//! `TrustScore`, Override Manager owns `TrustOverride`, Milestone Detector
//! owns `Milestone`).

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::category::Category;
use crate::category::Tier;
use crate::identifiers::ConfirmationId;
use crate::identifiers::DecisionId;
use crate::identifiers::MilestoneId;
use crate::identifiers::OverrideId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Gate Decision
// ============================================================================

/// The gate's synchronous verdict for a tool call.
///
/// # Invariants
/// - Variants are stable for programmatic handling and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecisionKind {
    /// The action may proceed autonomously.
    Pass,
    /// The action must pause for human confirmation.
    Pause,
    /// The action is blocked.
    Block,
}

impl GateDecisionKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Pause => "pause",
            Self::Block => "block",
        }
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// The resolved outcome of a decision, driving the EWMA score update.
///
/// # Invariants
/// - `Pending` is the only variant a freshly created [`Decision`] may carry.
/// - Once resolved to any other variant, a `Decision` is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Not yet resolved.
    Pending,
    /// The feedback window expired with no adverse signal, or the action was
    /// explicitly confirmed correct.
    Pass,
    /// A human flagged the action as a minor mistake.
    CorrectedMinor,
    /// A human flagged the action as a significant mistake.
    CorrectedSignificant,
    /// The tool itself reported an internal (Helios) error.
    ToolErrorHelios,
    /// The tool reported an external error outside Cortex's control.
    ToolErrorExternal,
    /// An interactive reviewer (Matthew) explicitly denied the action.
    DeniedByMatthew,
}

impl Outcome {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::CorrectedMinor => "corrected_minor",
            Self::CorrectedSignificant => "corrected_significant",
            Self::ToolErrorHelios => "tool_error_helios",
            Self::ToolErrorExternal => "tool_error_external",
            Self::DeniedByMatthew => "denied_by_matthew",
        }
    }

    /// Parses an outcome from its stable wire label.
    #[must_use]
    pub fn from_str(label: &str) -> Option<Self> {
        Some(match label {
            "pending" => Self::Pending,
            "pass" => Self::Pass,
            "corrected_minor" => Self::CorrectedMinor,
            "corrected_significant" => Self::CorrectedSignificant,
            "tool_error_helios" => Self::ToolErrorHelios,
            "tool_error_external" => Self::ToolErrorExternal,
            "denied_by_matthew" => Self::DeniedByMatthew,
            _ => return None,
        })
    }

    /// Returns `true` for every variant other than [`Outcome::Pending`].
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// A single gate verdict, immutable once its outcome resolves.
///
/// # Invariants
/// - `params_summary` is at most 250 characters and has passed through
///   [`crate::redaction::redact`].
/// - `outcome` starts as [`Outcome::Pending`] and is written exactly once
///   more by the Outcome Collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Primary key.
    pub decision_id: DecisionId,
    /// When the decision was made.
    pub timestamp: Timestamp,
    /// Session that requested the tool call.
    pub session_id: String,
    /// Name of the invoked tool.
    pub tool_name: String,
    /// Stable digest of the raw params, for correlation without storing them.
    pub params_hash: String,
    /// Sanitized, length-capped rendering of the params for audit review.
    pub params_summary: String,
    /// Risk tier assigned by the classifier.
    pub tier: Tier,
    /// Category assigned by the classifier.
    pub category: Category,
    /// The gate's verdict.
    pub gate_decision: GateDecisionKind,
    /// Trust score at the moment of decision.
    pub score_at_decision: f64,
    /// Whether a category override was active at decision time.
    pub override_active: bool,
    /// Resolved outcome, or [`Outcome::Pending`].
    pub outcome: Outcome,
    /// Free-form label describing how the outcome was resolved.
    pub outcome_source: Option<String>,
    /// When the outcome was resolved.
    pub outcome_resolved_at: Option<Timestamp>,
    /// Raw correction text, when the outcome came from a correction.
    pub correction_message: Option<String>,
}

// ============================================================================
// SECTION: TrustScore
// ============================================================================

/// The current EWMA trust state for one category.
///
/// # Invariants
/// - `current_score` is always clamped to `[0, 1]`.
/// - Tier 4 rows have `ewma_alpha == 0.0` and never change after bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// The category this row tracks (unique).
    pub category: Category,
    /// The category's tier (denormalized for fast reads).
    pub tier: Tier,
    /// Current EWMA score.
    pub current_score: f64,
    /// EWMA smoothing factor for this tier.
    pub ewma_alpha: f64,
    /// Total resolved decisions for this category.
    pub decision_count: u64,
    /// Cached count of decisions in the trailing 30 days.
    pub decisions_last_30d: u64,
    /// When this row was last mutated.
    pub last_updated: Timestamp,
    /// The score this category was bootstrapped with.
    pub initial_score: f64,
}

// ============================================================================
// SECTION: TrustOverride
// ============================================================================

/// The kind of override action recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    /// The category is force-allowed regardless of score.
    Granted,
    /// The category is force-blocked regardless of score.
    Revoked,
}

impl OverrideType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
        }
    }

    /// Parses an override type from its stable wire label.
    #[must_use]
    pub fn from_str(label: &str) -> Option<Self> {
        match label {
            "granted" => Some(Self::Granted),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// A category-wide override of the score-based gate.
///
/// # Invariants
/// - At most one row per category has `active == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustOverride {
    /// Primary key.
    pub override_id: OverrideId,
    /// The category this override applies to.
    pub category: Category,
    /// Grant or revoke.
    pub override_type: OverrideType,
    /// Human-supplied justification.
    pub reason: String,
    /// Session id of the interactive caller who granted this override.
    pub granted_by: String,
    /// When the override was created.
    pub granted_at: Timestamp,
    /// Optional expiry.
    pub expires_at: Option<Timestamp>,
    /// When the override was deactivated, if it has been.
    pub revoked_at: Option<Timestamp>,
    /// Whether this override is currently in effect.
    pub active: bool,
}

// ============================================================================
// SECTION: Milestone
// ============================================================================

/// An observable event on a category's score trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    /// The category crossed its threshold for the first time.
    FirstAutoApprove,
    /// The category's effective gate state improved a level.
    TierPromotion,
    /// The category's effective gate state worsened a level.
    TierDemotion,
    /// A decision in this category was blocked.
    Blocked,
    /// An override was granted for this category.
    OverrideGranted,
    /// An override was revoked for this category.
    OverrideRevoked,
}

impl MilestoneType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstAutoApprove => "first_auto_approve",
            Self::TierPromotion => "tier_promotion",
            Self::TierDemotion => "tier_demotion",
            Self::Blocked => "blocked",
            Self::OverrideGranted => "override_granted",
            Self::OverrideRevoked => "override_revoked",
        }
    }
}

/// An append-only record of a milestone event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Primary key.
    pub milestone_id: MilestoneId,
    /// When the milestone occurred.
    pub timestamp: Timestamp,
    /// The category the milestone concerns.
    pub category: Category,
    /// The kind of milestone.
    pub milestone_type: MilestoneType,
    /// Score prior to the triggering event, when applicable.
    pub old_score: Option<f64>,
    /// Score as of the milestone.
    pub new_score: f64,
    /// Free-form label describing what triggered the milestone.
    pub trigger: String,
}

// ============================================================================
// SECTION: PendingOutcome
// ============================================================================

/// Tracks a `pass` decision awaiting feedback-window resolution.
///
/// # Invariants
/// - Exists iff its `Decision` has `gate_decision == Pass` and
///   `outcome == Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOutcome {
    /// Foreign key to the decision awaiting resolution.
    pub decision_id: DecisionId,
    /// When the feedback window closes.
    pub feedback_window_expires_at: Timestamp,
    /// When this row was created.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: PendingConfirmation
// ============================================================================

/// Tracks a `pause` decision awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Primary key.
    pub confirmation_id: ConfirmationId,
    /// The decision this confirmation concerns.
    pub decision_id: DecisionId,
    /// Name of the invoked tool.
    pub tool_name: String,
    /// Raw tool params, preserved for the reviewer.
    pub params_json: Value,
    /// Sanitized human-readable summary.
    pub summary: String,
    /// Trust score at decision time.
    pub score: f64,
    /// The threshold the score fell short of.
    pub threshold: f64,
    /// The category this confirmation concerns.
    pub category: Category,
    /// When this confirmation expires if unresolved.
    pub expires_at: Timestamp,
    /// Whether a human has resolved this confirmation.
    pub resolved: bool,
    /// Free-form resolution label, once resolved.
    pub resolution: Option<String>,
    /// When the confirmation was resolved.
    pub resolved_at: Option<Timestamp>,
}
