// crates/cortex-trust-engine/src/gate.rs
// ============================================================================
// Module: Trust Gate
// Description: The single synchronous entry point for "can this proceed?".
// Purpose: Classify a tool call, apply overrides and score thresholds, and
//          durably record the verdict before returning it.
// Dependencies: cortex-trust-core, cortex-trust-store
// ============================================================================

//! ## Overview
//! [`TrustGate::check`] is synchronous and non-suspending by design: a
//! decision and (for `pass`) its pending-outcome row are committed before the
//! call returns, so no caller ever observes a verdict the store hasn't
//! already durably recorded. The six-step contract below is deliberately
//! linear — override lookup, then the tier-4 hardcap, then score comparison —
//! because each step can short-circuit the rest.

use std::sync::Arc;

use cortex_trust_core::Category;
use cortex_trust_core::Decision;
use cortex_trust_core::DecisionId;
use cortex_trust_core::GateDecisionKind;
use cortex_trust_core::Outcome;
use cortex_trust_core::OverrideType;
use cortex_trust_core::PendingOutcome;
use cortex_trust_core::StoreError;
use cortex_trust_core::Tier;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustStore;
use cortex_trust_core::classify;
use cortex_trust_core::redact;
use serde_json::Value;
use thiserror::Error;

use crate::config::TrustConfig;
use crate::telemetry::GateEvent;
use crate::telemetry::TrustMetrics;

/// Errors the Trust Gate can report. Per the error-handling design, a store
/// failure on the hot path degrades to a conservative `block`, not an error
/// the caller must additionally branch on — `GateError` exists for the rare
/// case persistence itself is impossible.
#[derive(Debug, Error)]
pub enum GateError {
    /// The store was unavailable; the caller should treat this as `block`.
    #[error("trust store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// The reason a gate verdict was reached, a stable label for audit and CLI
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    ExplicitGrantOverride,
    ExplicitRevokeOverride,
    FinancialHardcap,
    ScoreAboveThreshold,
    ScoreBelowThresholdAboveFloor,
    ScoreBelowFloor,
}

impl GateReason {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitGrantOverride => "explicit_grant_override",
            Self::ExplicitRevokeOverride => "explicit_revoke_override",
            Self::FinancialHardcap => "financial_hardcap",
            Self::ScoreAboveThreshold => "score_above_threshold",
            Self::ScoreBelowThresholdAboveFloor => "score_below_threshold_above_floor",
            Self::ScoreBelowFloor => "score_below_floor",
        }
    }
}

/// The structured result of a [`TrustGate::check`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateResult {
    pub result: GateDecisionKind,
    pub reason: GateReason,
    pub tier: Tier,
    pub category: Category,
    pub score: f64,
    pub threshold: Option<f64>,
    pub decision_id: DecisionId,
    pub override_active: bool,
}

/// The trust gate: classification, override lookup, threshold comparison,
/// and durable decision logging in one synchronous operation.
pub struct TrustGate {
    store: Arc<dyn TrustStore>,
    config: TrustConfig,
    metrics: Arc<dyn TrustMetrics>,
}

impl TrustGate {
    /// Builds a gate over `store`, using `config`'s thresholds and floors and
    /// reporting through `metrics`.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, config: TrustConfig, metrics: Arc<dyn TrustMetrics>) -> Self {
        Self { store, config, metrics }
    }

    /// Evaluates a tool call and records its verdict.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] only when the store itself is unreachable; the
    /// caller is expected to treat that as a `block`.
    pub fn check(&self, tool_name: &str, params: &Value, session_id: &str) -> Result<GateResult, GateError> {
        let classification = classify(tool_name, params);
        let now = Timestamp::now();

        let active_override = self.store.get_active_override(classification.category)?;
        if let Some(active_override) = active_override {
            let (result, reason) = match active_override.override_type {
                OverrideType::Granted => (GateDecisionKind::Pass, GateReason::ExplicitGrantOverride),
                OverrideType::Revoked => (GateDecisionKind::Block, GateReason::ExplicitRevokeOverride),
            };
            let score = self.current_score(classification.category, now)?;
            return self.finish(classification.tier, classification.category, result, reason, score, None, true, tool_name, params, session_id, now);
        }

        if classification.tier == Tier::Tier4 {
            let score = self.current_score(classification.category, now)?;
            return self.finish(
                classification.tier,
                classification.category,
                GateDecisionKind::Pause,
                GateReason::FinancialHardcap,
                score,
                None,
                false,
                tool_name,
                params,
                session_id,
                now,
            );
        }

        let score = self.current_score(classification.category, now)?;
        let tier_config = self.config.for_tier(classification.tier);
        let threshold = tier_config.threshold.unwrap_or(f64::INFINITY);
        let floor = tier_config.floor.unwrap_or(f64::INFINITY);

        let (result, reason) = if score >= threshold {
            (GateDecisionKind::Pass, GateReason::ScoreAboveThreshold)
        } else if score >= floor {
            (GateDecisionKind::Pause, GateReason::ScoreBelowThresholdAboveFloor)
        } else {
            (GateDecisionKind::Block, GateReason::ScoreBelowFloor)
        };

        self.finish(
            classification.tier,
            classification.category,
            result,
            reason,
            score,
            tier_config.threshold,
            false,
            tool_name,
            params,
            session_id,
            now,
        )
    }

    /// Reads the current score for `category`, falling back to the
    /// configured tier initial score when no row exists yet (step 4's
    /// "bootstrap on read" recovery).
    fn current_score(&self, category: Category, _now: Timestamp) -> Result<f64, GateError> {
        match self.store.get_trust_score(category)? {
            Some(score) => Ok(score.current_score),
            None => Ok(cortex_trust_store::migrate::default_initial_score(category)),
        }
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the gate's single linear contract, not a seam worth splitting")]
    fn finish(
        &self,
        tier: Tier,
        category: Category,
        result: GateDecisionKind,
        reason: GateReason,
        score: f64,
        threshold: Option<f64>,
        override_active: bool,
        tool_name: &str,
        params: &Value,
        session_id: &str,
        now: Timestamp,
    ) -> Result<GateResult, GateError> {
        let decision_id = DecisionId::new();
        let params_summary = summarize_params(params);

        let decision = Decision {
            decision_id,
            timestamp: now,
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            params_hash: params_digest(params),
            params_summary,
            tier,
            category,
            gate_decision: result,
            score_at_decision: score,
            override_active,
            outcome: Outcome::Pending,
            outcome_source: None,
            outcome_resolved_at: None,
            correction_message: None,
        };
        self.store.insert_decision(&decision)?;

        if result == GateDecisionKind::Pass {
            let tier_config = self.config.for_tier(tier);
            let pending = PendingOutcome {
                decision_id,
                feedback_window_expires_at: now.plus_millis(tier_config.feedback_window_ms),
                created_at: now,
            };
            self.store.insert_pending_outcome(&pending)?;
        }

        self.metrics.record_gate_decision(GateEvent { tier, category, decision: result, override_active, score });

        Ok(GateResult { result, reason, tier, category, score, threshold, decision_id, override_active })
    }
}

/// Reduces raw params to a redacted, length-capped summary for the audit log.
fn summarize_params(params: &Value) -> String {
    const MAX_SUMMARY_CHARS: usize = 250;
    let rendered = params.to_string();
    let redacted = redact(&rendered);
    cortex_trust_core::redaction::truncate(&redacted, MAX_SUMMARY_CHARS)
}

/// A stable digest of the raw params, used to correlate repeated calls
/// without persisting their (potentially sensitive) content.
fn params_digest(params: &Value) -> String {
    use std::hash::Hash;
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    params.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;

    use cortex_trust_core::Category;
    use cortex_trust_core::GateDecisionKind;
    use cortex_trust_core::Tier;
    use cortex_trust_core::TrustStore;
    use cortex_trust_store::SqliteStoreConfig;
    use cortex_trust_store::SqliteTrustStore;
    use serde_json::json;

    use super::TrustGate;
    use crate::config::TrustConfig;
    use crate::telemetry::NoopMetrics;

    fn gate() -> TrustGate {
        let store = SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store");
        TrustGate::new(Arc::new(store), TrustConfig::default(), Arc::new(NoopMetrics))
    }

    #[test]
    fn tier4_hardcap_pauses_regardless_of_score() {
        let gate = gate();
        let result = gate
            .check("exec", &json!({"command": "augur trade --symbol BTC --qty 1"}), "s1")
            .expect("check");
        assert_eq!(result.result, GateDecisionKind::Pause);
        assert_eq!(result.tier, Tier::Tier4);
        assert_eq!(result.category, Category::FinancialAugur);
    }

    #[test]
    fn tier4_hardcap_survives_compound_bypass_attempt() {
        let gate = gate();
        let result = gate
            .check("exec", &json!({"command": "ls && augur trade --execute"}), "s1")
            .expect("check");
        assert_eq!(result.tier, Tier::Tier4);
    }

    #[test]
    fn read_only_exec_below_tier1_threshold_initially_pauses() {
        let gate = gate();
        let result = gate.check("exec", &json!({"command": "ls -la"}), "s1").expect("check");
        assert_eq!(result.tier, Tier::Tier1);
        assert!(result.score < 0.85);
    }

    #[test]
    fn repeated_passes_eventually_cross_threshold_and_pass() {
        let gate = gate();
        let params = json!({"path": "/tmp/a.txt"});
        let mut last = gate.check("write_file", &params, "s1").expect("check");
        for _ in 0..20 {
            gate.resolve_pass_for_test(last.decision_id);
            last = gate.check("write_file", &params, "s1").expect("check");
            if last.result == GateDecisionKind::Pass {
                break;
            }
        }
        assert_eq!(last.result, GateDecisionKind::Pass);
    }

    impl TrustGate {
        /// Test-only helper: resolves a pending decision with `pass` using
        /// the gate's own store and tier alpha, bypassing the public
        /// `OutcomeCollector` seam to keep this module's tests self-contained.
        fn resolve_pass_for_test(&self, decision_id: cortex_trust_core::DecisionId) {
            let decision = self.store.get_decision(decision_id).expect("get decision").expect("exists");
            let tier_alpha = cortex_trust_store::migrate::default_alpha(decision.category);
            self.store
                .resolve_outcome(decision_id, cortex_trust_core::Outcome::Pass, "test", tier_alpha, cortex_trust_core::Timestamp::now())
                .expect("resolve");
        }
    }
}
