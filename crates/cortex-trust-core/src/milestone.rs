// crates/cortex-trust-core/src/milestone.rs
// ============================================================================
// Module: Milestone Detector
// Description: Detects score-threshold crossings and classifies them into a
//              milestone type.
// Purpose: Turn a bare (old_score, new_score) pair into the one observable
//          event, if any, worth recording on a category's trajectory.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! Pure function, no I/O: [`detect`] only needs the tier's threshold/floor and
//! the score before and after a resolution to decide whether a milestone
//! fired. It cannot by itself tell a *first* auto-approve from a later one —
//! that requires knowing whether this category has ever auto-approved before
//! — so callers pass that fact in as `already_auto_approved` rather than the
//! detector reaching into a store.

use crate::model::MilestoneType;

/// A score's effective gate state for a given tier's threshold/floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoreState {
    Blocked,
    Paused,
    AutoApprove,
}

fn classify_state(score: f64, threshold: f64, floor: f64) -> ScoreState {
    if score >= threshold {
        ScoreState::AutoApprove
    } else if score >= floor {
        ScoreState::Paused
    } else {
        ScoreState::Blocked
    }
}

/// Detects the milestone, if any, crossed by moving from `old_score` to
/// `new_score` under a tier's `threshold`/`floor`.
///
/// Tier 4's infinite threshold/floor (`None`) never produces a milestone:
/// there is no score-based state for the Milestone Detector to cross.
/// `already_auto_approved` should reflect whether this category has already
/// recorded a [`MilestoneType::FirstAutoApprove`] milestone; it decides
/// whether a crossing into the auto-approve state is reported as
/// [`MilestoneType::FirstAutoApprove`] or [`MilestoneType::TierPromotion`].
///
/// # Invariants
/// - Returns `None` when `old_score` and `new_score` fall in the same state.
#[must_use]
pub fn detect(old_score: f64, new_score: f64, threshold: Option<f64>, floor: Option<f64>, already_auto_approved: bool) -> Option<MilestoneType> {
    let (threshold, floor) = match (threshold, floor) {
        (Some(threshold), Some(floor)) => (threshold, floor),
        _ => return None,
    };

    let old_state = classify_state(old_score, threshold, floor);
    let new_state = classify_state(new_score, threshold, floor);
    if old_state == new_state {
        return None;
    }

    match (old_state, new_state) {
        (_, ScoreState::AutoApprove) => {
            if already_auto_approved {
                Some(MilestoneType::TierPromotion)
            } else {
                Some(MilestoneType::FirstAutoApprove)
            }
        }
        (_, ScoreState::Blocked) => Some(MilestoneType::Blocked),
        (ScoreState::Blocked, ScoreState::Paused) => Some(MilestoneType::TierPromotion),
        (ScoreState::AutoApprove, ScoreState::Paused) => Some(MilestoneType::TierDemotion),
        (ScoreState::Paused, ScoreState::Paused) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::MilestoneType;
    use super::detect;

    const THRESHOLD: Option<f64> = Some(0.7);
    const FLOOR: Option<f64> = Some(0.4);

    #[test]
    fn crossing_into_auto_approve_for_the_first_time_is_first_auto_approve() {
        let milestone = detect(0.65, 0.72, THRESHOLD, FLOOR, false);
        assert_eq!(milestone, Some(MilestoneType::FirstAutoApprove));
    }

    #[test]
    fn crossing_into_auto_approve_again_is_tier_promotion() {
        let milestone = detect(0.65, 0.72, THRESHOLD, FLOOR, true);
        assert_eq!(milestone, Some(MilestoneType::TierPromotion));
    }

    #[test]
    fn crossing_from_blocked_to_paused_is_tier_promotion() {
        let milestone = detect(0.3, 0.5, THRESHOLD, FLOOR, false);
        assert_eq!(milestone, Some(MilestoneType::TierPromotion));
    }

    #[test]
    fn falling_from_auto_approve_to_paused_is_tier_demotion() {
        let milestone = detect(0.75, 0.5, THRESHOLD, FLOOR, true);
        assert_eq!(milestone, Some(MilestoneType::TierDemotion));
    }

    #[test]
    fn falling_below_floor_is_blocked() {
        let milestone = detect(0.5, 0.2, THRESHOLD, FLOOR, true);
        assert_eq!(milestone, Some(MilestoneType::Blocked));
    }

    #[test]
    fn falling_straight_from_auto_approve_to_blocked_is_blocked() {
        let milestone = detect(0.9, 0.1, THRESHOLD, FLOOR, true);
        assert_eq!(milestone, Some(MilestoneType::Blocked));
    }

    #[test]
    fn staying_within_the_same_state_detects_nothing() {
        assert_eq!(detect(0.5, 0.55, THRESHOLD, FLOOR, false), None);
        assert_eq!(detect(0.8, 0.9, THRESHOLD, FLOOR, true), None);
    }

    #[test]
    fn tier4_infinite_threshold_never_detects_a_milestone() {
        assert_eq!(detect(0.1, 0.9, None, None, false), None);
    }
}
