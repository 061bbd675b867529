// crates/cortex-trust-core/src/session.rs
// ============================================================================
// Module: Cortex Trust Session Interactivity
// Description: Pure classification of whether a session can grant overrides.
// Purpose: Be the sole mechanism preventing an agent running in a subordinate
//          session from escalating its own privileges via the override path.
// Dependencies: once_cell, regex
// ============================================================================

//! ## Overview
//! A session is interactive unless its identifier matches a pattern
//! indicating a non-interactive context: a pipeline stage, a subagent, an
//! isolated background session, a cron job, or an unattended background task.
//! [`Override Manager`](crate) calls this before any mutation so the check is
//! independently testable from the store (§8.7's self-escalation property).

use once_cell::sync::Lazy;
use regex::Regex;

static NON_INTERACTIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(pipeline|subagent|isolated|background|cron)[-_]").expect("static pattern")
});

/// Returns whether `session_id` identifies an interactive session, i.e. one
/// with a human able to answer a confirmation or authorize an override.
///
/// # Invariants
/// - Any identifier matching the non-interactive prefix pattern is never
///   interactive, regardless of its remaining content.
/// - An empty session id is never interactive.
#[must_use]
pub fn is_interactive(session_id: &str) -> bool {
    if session_id.is_empty() {
        return false;
    }
    !NON_INTERACTIVE_PATTERN.is_match(session_id)
}

#[cfg(test)]
mod tests {
    use super::is_interactive;

    #[test]
    fn pipeline_session_is_not_interactive() {
        assert!(!is_interactive("pipeline-task-042"));
    }

    #[test]
    fn subagent_session_is_not_interactive() {
        assert!(!is_interactive("subagent-worker-3"));
    }

    #[test]
    fn cron_session_is_not_interactive() {
        assert!(!is_interactive("cron-nightly-digest"));
    }

    #[test]
    fn background_and_isolated_sessions_are_not_interactive() {
        assert!(!is_interactive("background-sync"));
        assert!(!is_interactive("isolated-sandbox-7"));
    }

    #[test]
    fn empty_session_id_is_never_interactive() {
        assert!(!is_interactive(""));
    }

    #[test]
    fn ordinary_session_id_is_interactive() {
        assert!(is_interactive("matthew-laptop-session"));
    }
}
