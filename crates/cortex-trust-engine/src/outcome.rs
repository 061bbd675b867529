// crates/cortex-trust-engine/src/outcome.rs
// ============================================================================
// Module: Outcome Collector
// Description: Resolves pending decisions via sweeper, correction text, or
//              tool error callbacks, each converging on one atomic operation.
// Purpose: Be the single writer of trust-score movement.
// Dependencies: cortex-trust-core, cortex-trust-store, once_cell, regex, tokio
// ============================================================================

//! ## Overview
//! Three entry paths — [`OutcomeCollector::sweep_once`] (feedback-window
//! expiry), [`OutcomeCollector::record_correction`] (human correction text),
//! and [`OutcomeCollector::record_tool_error`] (a tool's own error path) — all
//! resolve down to [`cortex_trust_core::TrustStore::resolve_outcome`], which
//! owns the full atomic update. This module never touches `trust_scores`
//! directly; it only decides *which* decision resolves to *which* outcome.
//! Every successful resolution also calls the Milestone Detector
//! ([`cortex_trust_core::detect_milestone`]) with the score transition it just
//! applied, persisting a [`Milestone`] row when one fired.

use std::sync::Arc;

use cortex_trust_core::Category;
use cortex_trust_core::Decision;
use cortex_trust_core::DecisionId;
use cortex_trust_core::Milestone;
use cortex_trust_core::MilestoneId;
use cortex_trust_core::MilestoneType;
use cortex_trust_core::Outcome;
use cortex_trust_core::ResolveOutcomeResult;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustStore;
use cortex_trust_core::detect_milestone;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::TrustConfig;
use crate::telemetry::OutcomeEvent;
use crate::telemetry::TrustMetrics;

/// The severity a correction-text classification assigned, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionSeverity {
    Minor,
    Significant,
}

impl CorrectionSeverity {
    fn outcome(self) -> Outcome {
        match self {
            Self::Minor => Outcome::CorrectedMinor,
            Self::Significant => Outcome::CorrectedSignificant,
        }
    }
}

/// The result of [`OutcomeCollector::record_correction`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    /// Whether a pending decision was found and resolved.
    pub resolved: bool,
    /// The resolved decision, when `resolved`.
    pub decision_id: Option<DecisionId>,
    /// The detected severity, when a correction pattern matched at all (even
    /// if no eligible pending decision was found to apply it to).
    pub severity: Option<CorrectionSeverity>,
}

/// Significant-correction keywords — production-impacting mistakes.
static SIGNIFICANT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(broke|broken|crash(ed)?|critical|revert(ed)?|disaster|lost data|corrupt(ed)?)\b")
        .expect("static pattern")
});

/// Minor-correction keywords, deliberately narrow. Must never match a bare
/// "no" — ordinary conversational negation must not drift scores.
static MINOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(wrong|not right|undo|fix that|redo|bad move|incorrect)\b").expect("static pattern")
});

/// Classifies free-form correction text into a severity, or `None` if no
/// correction pattern matched.
#[must_use]
pub fn classify_correction(text: &str) -> Option<CorrectionSeverity> {
    if SIGNIFICANT_PATTERN.is_match(text) {
        Some(CorrectionSeverity::Significant)
    } else if MINOR_PATTERN.is_match(text) {
        Some(CorrectionSeverity::Minor)
    } else {
        None
    }
}

/// Resolves pending decisions through the gate's three entry paths.
pub struct OutcomeCollector {
    store: Arc<dyn TrustStore>,
    config: TrustConfig,
    metrics: Arc<dyn TrustMetrics>,
}

impl OutcomeCollector {
    /// Builds a collector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, config: TrustConfig, metrics: Arc<dyn TrustMetrics>) -> Self {
        Self { store, config, metrics }
    }

    /// Resolves `decision_id` to `outcome`, attributed to `source`. Thin
    /// wrapper over the store's atomic resolution, adding the tier-alpha
    /// lookup and the telemetry event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only on a genuine backend failure; an already
    /// resolved or missing decision is reported as `applied: false`, not an
    /// error.
    pub fn resolve_outcome(&self, decision_id: DecisionId, outcome: Outcome, source: &str) -> Result<ResolveOutcomeResult, StoreError> {
        let Some(decision) = self.store.get_decision(decision_id)? else {
            return Ok(ResolveOutcomeResult { applied: false, new_score: None });
        };
        let alpha = cortex_trust_store::migrate::default_alpha(decision.category);
        let old_score = self
            .store
            .get_trust_score(decision.category)?
            .map_or_else(|| cortex_trust_store::migrate::default_initial_score(decision.category), |s| s.current_score);

        let now = Timestamp::now();
        let result = self.store.resolve_outcome(decision_id, outcome, source, alpha, now)?;

        if result.applied {
            if let Some(new_score) = result.new_score {
                self.metrics.record_outcome(OutcomeEvent {
                    category: decision.category,
                    outcome,
                    old_score,
                    new_score: new_score.current_score,
                });
                self.detect_and_record_milestone(decision.category, decision.tier, old_score, new_score.current_score, now)?;
            }
        }
        Ok(result)
    }

    /// Calls the Milestone Detector with the score transition just applied
    /// and, if it fired, persists the resulting [`Milestone`] row.
    fn detect_and_record_milestone(&self, category: Category, tier: cortex_trust_core::Tier, old_score: f64, new_score: f64, now: Timestamp) -> Result<(), StoreError> {
        let tier_config = self.config.for_tier(tier);
        let already_auto_approved = self
            .store
            .list_milestones(Some(category), u32::MAX)?
            .iter()
            .any(|m| m.milestone_type == MilestoneType::FirstAutoApprove);

        let Some(milestone_type) = detect_milestone(old_score, new_score, tier_config.threshold, tier_config.floor, already_auto_approved) else {
            return Ok(());
        };

        self.store.insert_milestone(&Milestone {
            milestone_id: MilestoneId::new(),
            timestamp: now,
            category,
            milestone_type,
            old_score: Some(old_score),
            new_score,
            trigger: milestone_type.as_str().to_string(),
        })?;
        self.metrics.record_milestone(category, milestone_type.as_str());
        Ok(())
    }

    /// Runs one sweep: resolves every pending outcome whose feedback window
    /// has closed by `as_of` to `pass`, attributed to
    /// `"feedback_window_expired"`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure; individual resolution
    /// failures do not stop the sweep over the remaining rows — per the
    /// error-handling design, a failed resolution stays pending and retries
    /// on the next sweep.
    pub fn sweep_once(&self, as_of: Timestamp) -> Result<u64, StoreError> {
        let expired = self.store.list_expired_pending_outcomes(as_of)?;
        let mut resolved = 0u64;
        for pending in expired {
            if self.resolve_outcome(pending.decision_id, Outcome::Pass, "feedback_window_expired").is_ok() {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Runs the sweeper forever on a fixed interval, yielding between
    /// batches so it never monopolizes the runtime.
    pub async fn run_forever(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let _ = self.sweep_once(Timestamp::now());
        }
    }

    /// Classifies `text` and, if a correction severity is detected, resolves
    /// the most recent pending decision within the configured correction
    /// window (optionally scoped to `category`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_correction(&self, text: &str, category: Option<Category>) -> Result<CorrectionOutcome, StoreError> {
        let Some(severity) = classify_correction(text) else {
            return Ok(CorrectionOutcome { resolved: false, decision_id: None, severity: None });
        };

        let now = Timestamp::now();
        let window_start = now.minus_millis(self.config.correction_window_ms);
        let Some(target) = self.most_recent_eligible_pending(category, window_start)? else {
            return Ok(CorrectionOutcome { resolved: false, decision_id: None, severity: Some(severity) });
        };

        let result = self.resolve_outcome(target, severity.outcome(), "correction_text")?;
        Ok(CorrectionOutcome { resolved: result.applied, decision_id: Some(target), severity: Some(severity) })
    }

    /// Finds the most recent decision that is still pending, within the
    /// correction window, optionally scoped to a category.
    fn most_recent_eligible_pending(&self, category: Option<Category>, window_start: Timestamp) -> Result<Option<DecisionId>, StoreError> {
        let expired = self.store.list_expired_pending_outcomes(Timestamp::from_epoch_millis(u64::MAX))?;
        let mut candidates: Vec<Decision> = Vec::new();
        for pending in expired {
            if let Some(decision) = self.store.get_decision(pending.decision_id)? {
                if decision.outcome == Outcome::Pending
                    && decision.timestamp.epoch_millis() >= window_start.epoch_millis()
                    && category.is_none_or(|c| c == decision.category)
                {
                    candidates.push(decision);
                }
            }
        }
        candidates.sort_by_key(|d| d.timestamp.epoch_millis());
        Ok(candidates.pop().map(|d| d.decision_id))
    }

    /// Resolves `decision_id` as a tool error, attributing it to Cortex's own
    /// infrastructure (`is_internal = true`) or an external system.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_tool_error(&self, decision_id: DecisionId, is_internal: bool, _message: &str) -> Result<ResolveOutcomeResult, StoreError> {
        let outcome = if is_internal { Outcome::ToolErrorHelios } else { Outcome::ToolErrorExternal };
        self.resolve_outcome(decision_id, outcome, "tool_error")
    }
}

trait OptionExt<T> {
    fn is_none_or(self, predicate: impl FnOnce(T) -> bool) -> bool;
}

impl<T> OptionExt<T> for Option<T> {
    fn is_none_or(self, predicate: impl FnOnce(T) -> bool) -> bool {
        match self {
            None => true,
            Some(value) => predicate(value),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;

    use cortex_trust_core::MilestoneType;
    use cortex_trust_core::Outcome;
    use cortex_trust_core::TrustStore;
    use cortex_trust_store::SqliteStoreConfig;
    use cortex_trust_store::SqliteTrustStore;
    use serde_json::json;

    use super::CorrectionSeverity;
    use super::OutcomeCollector;
    use super::classify_correction;
    use crate::config::TrustConfig;
    use crate::gate::TrustGate;
    use crate::telemetry::NoopMetrics;

    fn harness() -> (TrustGate, OutcomeCollector) {
        let store: Arc<dyn cortex_trust_core::TrustStore> =
            Arc::new(SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store"));
        let gate = TrustGate::new(store.clone(), TrustConfig::default(), Arc::new(NoopMetrics));
        let collector = OutcomeCollector::new(store, TrustConfig::default(), Arc::new(NoopMetrics));
        (gate, collector)
    }

    #[test]
    fn bare_no_does_not_classify_as_a_correction() {
        assert_eq!(classify_correction("no"), None);
        assert_eq!(classify_correction("no thanks"), None);
    }

    #[test]
    fn significant_keywords_classify_significant() {
        assert_eq!(classify_correction("that broke production, revert"), Some(CorrectionSeverity::Significant));
    }

    #[test]
    fn minor_keywords_classify_minor() {
        assert_eq!(classify_correction("undo that, it's wrong"), Some(CorrectionSeverity::Minor));
    }

    #[test]
    fn sweep_resolves_expired_pending_outcomes_to_pass() {
        let (gate, collector) = harness();
        let result = gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
        let far_future = cortex_trust_core::Timestamp::now().plus_millis(365 * 24 * 60 * 60 * 1000);
        let resolved = collector.sweep_once(far_future).expect("sweep");
        assert_eq!(resolved, 1);
        let decision = collector.store.get_decision(result.decision_id).expect("get").expect("exists");
        assert_eq!(decision.outcome, Outcome::Pass);
    }

    #[test]
    fn correction_outside_window_does_not_resolve() {
        let (gate, collector) = harness();
        gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
        let outcome = collector.record_correction("that broke everything", None).expect("record");
        assert!(outcome.resolved);

        let (gate2, collector2) = harness();
        gate2.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
        let mut short_window_config = TrustConfig::default();
        short_window_config.correction_window_ms = 0;
        let short_collector =
            OutcomeCollector::new(collector2.store.clone(), short_window_config, Arc::new(NoopMetrics));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let outcome2 = short_collector.record_correction("that broke everything", None).expect("record");
        assert!(!outcome2.resolved);
    }

    #[test]
    fn repeated_passes_crossing_threshold_emit_first_auto_approve_milestone() {
        let (gate, collector) = harness();
        let mut result = gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
        for _ in 0..30 {
            collector.resolve_outcome(result.decision_id, Outcome::Pass, "test").expect("resolve");
            result = gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
            if result.result == cortex_trust_core::GateDecisionKind::Pass {
                break;
            }
        }
        assert_eq!(result.result, cortex_trust_core::GateDecisionKind::Pass);

        let milestones = collector.store.list_milestones(Some(cortex_trust_core::Category::WriteFile), 10).expect("list");
        assert!(milestones.iter().any(|m| m.milestone_type == MilestoneType::FirstAutoApprove));
    }

    #[test]
    fn falling_back_below_threshold_after_auto_approve_emits_tier_demotion() {
        let (gate, collector) = harness();
        let mut result = gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
        for _ in 0..30 {
            collector.resolve_outcome(result.decision_id, Outcome::Pass, "test").expect("resolve");
            result = gate.check("write_file", &json!({"path": "/tmp/a"}), "matthew").expect("check");
            if result.result == cortex_trust_core::GateDecisionKind::Pass {
                break;
            }
        }
        assert_eq!(result.result, cortex_trust_core::GateDecisionKind::Pass);

        collector.resolve_outcome(result.decision_id, Outcome::CorrectedSignificant, "test").expect("resolve");

        let milestones = collector.store.list_milestones(Some(cortex_trust_core::Category::WriteFile), 10).expect("list");
        assert!(milestones.iter().any(|m| m.milestone_type == MilestoneType::TierDemotion));
    }
}
