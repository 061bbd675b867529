// crates/cortex-trust-core/src/store.rs
// ============================================================================
// Module: Cortex Trust Store Trait
// Description: The storage seam every engine component depends on.
// Purpose: Let `cortex-trust-engine` depend on persistence behavior without
//          depending on SQLite directly; `cortex-trust-store` is the sole
//          implementor.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! `TrustStore` is the Rust rendering of "a transactional key-value + SQL
//! shaped store" from the external-interfaces section: every method that
//! spans more than one table commits as a single unit, so the implementor
//! (not the caller) owns the transaction boundary. This mirrors keeping
//! multi-statement atomicity inside the store crate rather than in whatever
//! happens to call it.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::category::Category;
use crate::identifiers::ConfirmationId;
use crate::identifiers::DecisionId;
use crate::model::Decision;
use crate::model::Milestone;
use crate::model::Outcome;
use crate::model::PendingConfirmation;
use crate::model::PendingOutcome;
use crate::model::TrustOverride;
use crate::model::TrustScore;
use crate::time::Timestamp;

/// Errors a [`TrustStore`] implementation may report.
///
/// # Invariants
/// - No variant leaks a backend-specific type; `Backend` carries only a
///   display string so callers never need to depend on `rusqlite`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage backend reported a failure.
    #[error("store backend error: {0}")]
    Backend(String),
    /// A row the caller expected to exist was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A row already exists where the caller expected to insert one.
    #[error("already exists: {0}")]
    Conflict(String),
}

/// The outcome of a [`TrustStore::resolve_outcome`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolveOutcomeResult {
    /// `false` when the decision did not exist or was already resolved
    /// (resolution is idempotent; a repeat call is a no-op, not an error).
    pub applied: bool,
    /// The category's trust score after this resolution, when `applied`.
    pub new_score: Option<TrustScore>,
}

/// Per-`(source, advisory_type)` tracking state for the Feedback Tracker,
/// persisted so action-rate windows survive a restart exactly like pending
/// outcomes do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryActionRate {
    /// Origin of the advisory (e.g. an SOP id or a memory atom id).
    pub source: String,
    /// The kind of advisory being tracked.
    pub advisory_type: String,
    /// Times the advisory was surfaced.
    pub surfaced_count: u64,
    /// Times the agent's subsequent action matched the advisory's guidance.
    pub followed_count: u64,
    /// Start of the current tracking window.
    pub window_started_at: Timestamp,
    /// When this row was last updated.
    pub last_updated: Timestamp,
}

/// The storage seam for every persisted trust-gate entity.
///
/// # Invariants
/// - Methods that touch more than one table are atomic: callers never
///   observe a partially applied multi-table write.
/// - All implementations are safe to call from multiple threads
///   concurrently; internal serialization is the implementor's concern.
pub trait TrustStore: Send + Sync {
    /// Appends a new decision row.
    fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError>;

    /// Fetches a decision by id.
    fn get_decision(&self, decision_id: DecisionId) -> Result<Option<Decision>, StoreError>;

    /// Lists decisions made at or after `since`, most recent first, capped at
    /// `limit` rows. Supports the Reporter's weekly outcome breakdown.
    fn list_decisions_since(&self, since: Timestamp, limit: u32) -> Result<Vec<Decision>, StoreError>;

    /// Fetches the current trust score for a category, if bootstrapped.
    fn get_trust_score(&self, category: Category) -> Result<Option<TrustScore>, StoreError>;

    /// Inserts or replaces a category's trust score row.
    fn upsert_trust_score(&self, score: &TrustScore) -> Result<(), StoreError>;

    /// Fetches the currently active, non-expired override for a category.
    fn get_active_override(&self, category: Category) -> Result<Option<TrustOverride>, StoreError>;

    /// Inserts a new override row. The caller is responsible for having
    /// deactivated any prior active override for the same category first.
    fn insert_override(&self, trust_override: &TrustOverride) -> Result<(), StoreError>;

    /// Deactivates every currently active override, returning the count
    /// deactivated.
    fn revoke_all_overrides(&self, revoked_at: Timestamp) -> Result<u64, StoreError>;

    /// Deactivates the currently active override for one category, if any,
    /// returning the count deactivated (`0` or `1`).
    fn deactivate_overrides_for_category(&self, category: Category, revoked_at: Timestamp) -> Result<u64, StoreError>;

    /// Lists every currently active override.
    fn list_active_overrides(&self) -> Result<Vec<TrustOverride>, StoreError>;

    /// Appends a milestone row.
    fn insert_milestone(&self, milestone: &Milestone) -> Result<(), StoreError>;

    /// Lists milestones, most recent first, optionally filtered to one
    /// category, capped at `limit` rows.
    fn list_milestones(&self, category: Option<Category>, limit: u32) -> Result<Vec<Milestone>, StoreError>;

    /// Records that a `pass` decision is awaiting feedback-window resolution.
    fn insert_pending_outcome(&self, pending: &PendingOutcome) -> Result<(), StoreError>;

    /// Lists pending outcomes whose feedback window has closed by `as_of`.
    fn list_expired_pending_outcomes(&self, as_of: Timestamp) -> Result<Vec<PendingOutcome>, StoreError>;

    /// Atomically resolves a decision's outcome: updates the `Decision` row,
    /// removes its `PendingOutcome` row (if any), and applies the EWMA update
    /// to the category's `TrustScore` using `alpha`, all as one transaction.
    ///
    /// Idempotent: resolving a decision that does not exist, or that is
    /// already resolved, returns `applied: false` rather than an error.
    fn resolve_outcome(
        &self,
        decision_id: DecisionId,
        outcome: Outcome,
        source: &str,
        alpha: f64,
        resolved_at: Timestamp,
    ) -> Result<ResolveOutcomeResult, StoreError>;

    /// Records a new confirmation awaiting human review.
    fn insert_pending_confirmation(&self, confirmation: &PendingConfirmation) -> Result<(), StoreError>;

    /// Fetches a pending confirmation by id.
    fn get_pending_confirmation(
        &self,
        confirmation_id: ConfirmationId,
    ) -> Result<Option<PendingConfirmation>, StoreError>;

    /// Lists every unresolved confirmation.
    fn list_pending_confirmations(&self) -> Result<Vec<PendingConfirmation>, StoreError>;

    /// Marks a confirmation resolved with a free-form resolution label.
    /// Idempotent: resolving an already-resolved or missing confirmation
    /// returns `false` rather than an error.
    fn resolve_pending_confirmation(
        &self,
        confirmation_id: ConfirmationId,
        resolution: &str,
        resolved_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Fetches the advisory action-rate row for a `(source, advisory_type)`
    /// pair, if one has been tracked yet.
    fn get_advisory_rate(
        &self,
        source: &str,
        advisory_type: &str,
    ) -> Result<Option<AdvisoryActionRate>, StoreError>;

    /// Inserts or replaces an advisory action-rate row.
    fn upsert_advisory_rate(&self, rate: &AdvisoryActionRate) -> Result<(), StoreError>;
}
