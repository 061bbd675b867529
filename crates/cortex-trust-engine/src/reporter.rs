// crates/cortex-trust-engine/src/reporter.rs
// ============================================================================
// Module: Reporter
// Description: Renders a human-readable trust-state summary, plus a weekly
//              rollup of promotions/demotions/blocks/outcomes.
// Purpose: Turn the store's raw rows into the status view an operator reads.
// Dependencies: cortex-trust-core
// ============================================================================

//! ## Overview
//! Pure read path: the Reporter never mutates the store. [`Reporter::report`]
//! covers every category's current state; [`Reporter::weekly_summary`] covers
//! the trailing 7 days of milestones and decision outcomes.

use std::sync::Arc;

use cortex_trust_core::Category;
use cortex_trust_core::MilestoneType;
use cortex_trust_core::Outcome;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustStore;

use crate::config::TrustConfig;

const BAR_WIDTH: usize = 20;
const SEVEN_DAYS_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// A category's rendered row in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStatus {
    pub category: Category,
    pub tier: u8,
    pub score: f64,
    pub bar: String,
    pub state_label: &'static str,
    pub override_active: bool,
}

/// The full trust-state report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub categories: Vec<CategoryStatus>,
    pub active_overrides: Vec<cortex_trust_core::TrustOverride>,
    pub recent_milestones: Vec<cortex_trust_core::Milestone>,
}

/// Per-outcome decision counts over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutcomeBreakdown {
    pub pass: u64,
    pub corrected_minor: u64,
    pub corrected_significant: u64,
    pub tool_error_helios: u64,
    pub tool_error_external: u64,
    pub denied_by_matthew: u64,
    pub pending: u64,
}

/// The 7-day rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummary {
    pub promotions: u64,
    pub demotions: u64,
    pub blocks: u64,
    pub outcomes: OutcomeBreakdown,
}

/// Produces [`Report`] and [`WeeklySummary`] views over the store.
pub struct Reporter {
    store: Arc<dyn TrustStore>,
    config: TrustConfig,
}

impl Reporter {
    /// Builds a reporter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, config: TrustConfig) -> Self {
        Self { store, config }
    }

    /// Builds the current-state report across every known category.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn report(&self) -> Result<Report, StoreError> {
        let mut categories = Vec::with_capacity(Category::ALL.len());
        for &category in Category::ALL {
            let tier = category.tier();
            let thresholds = self.config.for_tier(tier);
            let score = self
                .store
                .get_trust_score(category)?
                .map_or_else(|| cortex_trust_store::migrate::default_initial_score(category), |row| row.current_score);
            let override_active = self.store.get_active_override(category)?.is_some();
            categories.push(CategoryStatus {
                category,
                tier: tier.number(),
                score,
                bar: score_bar(score),
                state_label: state_label(score, thresholds.threshold, thresholds.floor, override_active),
                override_active,
            });
        }
        categories.sort_by_key(|status| (status.tier, status.category.as_str()));

        let active_overrides = self.store.list_active_overrides()?;
        let recent_milestones = self.store.list_milestones(None, 10)?;

        Ok(Report { categories, active_overrides, recent_milestones })
    }

    /// Builds the 7-day rollup as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn weekly_summary(&self, now: Timestamp) -> Result<WeeklySummary, StoreError> {
        let since = now.minus_millis(SEVEN_DAYS_MS);
        let milestones = self.store.list_milestones(None, u32::MAX)?;
        let mut promotions = 0u64;
        let mut demotions = 0u64;
        let mut blocks = 0u64;
        for milestone in milestones.iter().filter(|m| m.timestamp.epoch_millis() >= since.epoch_millis()) {
            match milestone.milestone_type {
                MilestoneType::TierPromotion | MilestoneType::FirstAutoApprove => promotions += 1,
                MilestoneType::TierDemotion => demotions += 1,
                MilestoneType::Blocked => blocks += 1,
                MilestoneType::OverrideGranted | MilestoneType::OverrideRevoked => {}
            }
        }

        let decisions = self.store.list_decisions_since(since, u32::MAX)?;
        let mut outcomes = OutcomeBreakdown::default();
        for decision in &decisions {
            match decision.outcome {
                Outcome::Pass => outcomes.pass += 1,
                Outcome::CorrectedMinor => outcomes.corrected_minor += 1,
                Outcome::CorrectedSignificant => outcomes.corrected_significant += 1,
                Outcome::ToolErrorHelios => outcomes.tool_error_helios += 1,
                Outcome::ToolErrorExternal => outcomes.tool_error_external += 1,
                Outcome::DeniedByMatthew => outcomes.denied_by_matthew += 1,
                Outcome::Pending => outcomes.pending += 1,
            }
        }

        Ok(WeeklySummary { promotions, demotions, blocks, outcomes })
    }

    /// Renders [`Report`] as the plain-text view an operator reads.
    #[must_use]
    pub fn render_text(report: &Report) -> String {
        let mut out = String::new();
        out.push_str("Trust Report\n============\n\n");
        let mut current_tier = 0;
        for status in &report.categories {
            if status.tier != current_tier {
                current_tier = status.tier;
                out.push_str(&format!("-- Tier {current_tier} --\n"));
            }
            out.push_str(&format!(
                "  {:<20} [{}] {:>5.2} {}{}\n",
                status.category.as_str(),
                status.bar,
                status.score,
                status.state_label,
                if status.override_active { " (override active)" } else { "" },
            ));
        }

        if !report.active_overrides.is_empty() {
            out.push_str("\nActive Overrides\n----------------\n");
            for over in &report.active_overrides {
                out.push_str(&format!("  {} -> {} by {}\n", over.category.as_str(), over.override_type.as_str(), over.granted_by));
            }
        }

        if !report.recent_milestones.is_empty() {
            out.push_str("\nRecent Milestones\n-----------------\n");
            for milestone in &report.recent_milestones {
                out.push_str(&format!("  {} {} {}\n", milestone.timestamp.to_iso8601(), milestone.category.as_str(), milestone.milestone_type.as_str()));
            }
        }

        out
    }

    /// Renders [`WeeklySummary`] as the plain-text weekly view.
    #[must_use]
    pub fn render_weekly_text(summary: &WeeklySummary) -> String {
        format!(
            "Weekly Summary\n==============\npromotions: {}\ndemotions: {}\nblocks: {}\n\nOutcomes\n--------\npass: {}\ncorrected_minor: {}\ncorrected_significant: {}\ntool_error_helios: {}\ntool_error_external: {}\ndenied_by_matthew: {}\npending: {}\n",
            summary.promotions,
            summary.demotions,
            summary.blocks,
            summary.outcomes.pass,
            summary.outcomes.corrected_minor,
            summary.outcomes.corrected_significant,
            summary.outcomes.tool_error_helios,
            summary.outcomes.tool_error_external,
            summary.outcomes.denied_by_matthew,
            summary.outcomes.pending,
        )
    }
}

/// Renders a 20-cell ASCII bar proportional to `score` in `[0, 1]`.
fn score_bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    let mut bar = String::with_capacity(BAR_WIDTH);
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(BAR_WIDTH - filled));
    bar
}

/// Labels a category's effective gate state for the current score.
fn state_label(score: f64, threshold: Option<f64>, floor: Option<f64>, override_active: bool) -> &'static str {
    if override_active {
        return "override";
    }
    match (threshold, floor) {
        (Some(threshold), Some(floor)) => {
            if score >= threshold {
                "auto-approve"
            } else if score >= floor {
                "pause"
            } else {
                "blocked"
            }
        }
        _ => "hardcap",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;

    use cortex_trust_core::Category;
    use cortex_trust_store::SqliteStoreConfig;
    use cortex_trust_store::SqliteTrustStore;
    use serde_json::json;

    use super::Reporter;
    use super::score_bar;
    use crate::config::TrustConfig;
    use crate::gate::TrustGate;
    use crate::telemetry::NoopMetrics;

    fn reporter_over_fresh_store() -> Reporter {
        let store: Arc<dyn cortex_trust_core::TrustStore> = Arc::new(SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store"));
        Reporter::new(store, TrustConfig::default())
    }

    #[test]
    fn score_bar_is_full_at_one_and_empty_at_zero() {
        assert_eq!(score_bar(1.0), "#".repeat(20));
        assert_eq!(score_bar(0.0), "-".repeat(20));
    }

    #[test]
    fn report_covers_every_known_category() {
        let reporter = reporter_over_fresh_store();
        let report = reporter.report().expect("report");
        assert_eq!(report.categories.len(), Category::ALL.len());
    }

    #[test]
    fn rendered_text_contains_every_category_name() {
        let reporter = reporter_over_fresh_store();
        let report = reporter.report().expect("report");
        let text = Reporter::render_text(&report);
        for &category in Category::ALL {
            assert!(text.contains(category.as_str()), "missing {}", category.as_str());
        }
    }

    #[test]
    fn weekly_summary_counts_recent_blocks() {
        let store: Arc<dyn cortex_trust_core::TrustStore> = Arc::new(SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store"));
        let gate = TrustGate::new(store.clone(), TrustConfig::default(), Arc::new(NoopMetrics));
        let reporter = Reporter::new(store, TrustConfig::default());
        let result = gate.check("financial_crypto", &json!({"amount": 9000}), "matthew").expect("check");
        assert_eq!(result.result, cortex_trust_core::GateDecisionKind::Pause);
        let summary = reporter.weekly_summary(cortex_trust_core::Timestamp::now().plus_millis(1000)).expect("weekly");
        assert_eq!(summary.outcomes.pending, 1);
    }
}
