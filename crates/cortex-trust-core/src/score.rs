// crates/cortex-trust-core/src/score.rs
// ============================================================================
// Module: Cortex Trust Score Updater
// Description: Pure EWMA trust score arithmetic.
// Purpose: Turn a resolved outcome into a new, clamped trust score.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! The Outcome Collector drives every category's trust score with a simple
//! exponentially weighted moving average: `new = alpha * x + (1 - alpha) *
//! old`, where `x` is the signed reward for the resolved outcome. This module
//! is the pure arithmetic only; persistence and scheduling live in
//! `cortex-trust-engine`.

use crate::model::Outcome;

/// Returns the signed reward value for a resolved outcome.
///
/// [`Outcome::Pending`] has no reward; callers must not invoke the updater
/// for a pending outcome.
///
/// # Invariants
/// - Values are fixed constants from the category reward table; they do not
///   vary by category or tier.
#[must_use]
pub const fn outcome_value(outcome: Outcome) -> f64 {
    match outcome {
        Outcome::Pending => 0.0,
        Outcome::Pass => 1.0,
        Outcome::CorrectedMinor => -0.5,
        Outcome::CorrectedSignificant => -1.0,
        Outcome::ToolErrorHelios => -0.3,
        Outcome::ToolErrorExternal => 0.0,
        Outcome::DeniedByMatthew => -0.2,
    }
}

/// Applies one resolved outcome to a trust score via EWMA, clamped to `[0, 1]`.
///
/// Returns `old_score` unchanged when `outcome` is [`Outcome::Pending`] or
/// `alpha` is `0.0` (the tier-4 case, where scores never move).
///
/// # Invariants
/// - The result is always in `[0.0, 1.0]`.
/// - `apply_outcome(s, Outcome::Pending, a) == s` for any `a`.
/// - `apply_outcome(s, o, 0.0) == s` for any `o`.
#[must_use]
pub fn apply_outcome(old_score: f64, outcome: Outcome, alpha: f64) -> f64 {
    if matches!(outcome, Outcome::Pending) || alpha == 0.0 {
        return old_score;
    }
    let reward = outcome_value(outcome);
    // Reward lands in [-1, 1]; remap to [0, 1] so the EWMA target shares the
    // score's own range instead of pulling it negative.
    let target = (reward + 1.0) / 2.0;
    let updated = alpha * target + (1.0 - alpha) * old_score;
    updated.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::apply_outcome;
    use super::outcome_value;
    use crate::model::Outcome;

    #[test]
    fn pending_outcome_leaves_score_unchanged() {
        assert_eq!(apply_outcome(0.42, Outcome::Pending, 0.2), 0.42);
    }

    #[test]
    fn zero_alpha_leaves_score_unchanged() {
        assert_eq!(apply_outcome(0.42, Outcome::Pass, 0.0), 0.42);
    }

    #[test]
    fn repeated_passes_climb_toward_one() {
        let mut score = 0.5;
        for _ in 0..50 {
            score = apply_outcome(score, Outcome::Pass, 0.2);
        }
        assert!(score > 0.95, "score should converge near 1.0, got {score}");
    }

    #[test]
    fn repeated_significant_corrections_fall_toward_zero() {
        let mut score = 0.5;
        for _ in 0..50 {
            score = apply_outcome(score, Outcome::CorrectedSignificant, 0.2);
        }
        assert!(score < 0.05, "score should converge near 0.0, got {score}");
    }

    #[test]
    fn result_is_always_clamped() {
        let result = apply_outcome(1.0, Outcome::Pass, 1.0);
        assert!((0.0..=1.0).contains(&result));
        let result = apply_outcome(0.0, Outcome::CorrectedSignificant, 1.0);
        assert!((0.0..=1.0).contains(&result));
    }

    #[test]
    fn minor_correction_reward_is_between_pass_and_significant() {
        assert!(outcome_value(Outcome::CorrectedSignificant) < outcome_value(Outcome::CorrectedMinor));
        assert!(outcome_value(Outcome::CorrectedMinor) < outcome_value(Outcome::Pass));
    }
}
