// crates/cortex-trust-engine/src/override_manager.rs
// ============================================================================
// Module: Override Manager
// Description: Grants and revokes category-level overrides of the score gate.
// Purpose: Be the sole mutator of trust_overrides, gated on session
//          interactivity so an agent can never grant itself privilege.
// Dependencies: cortex-trust-core
// ============================================================================

//! ## Overview
//! [`OverrideManager::set_override`] step 1 — rejecting a non-interactive
//! caller — is the system's only defense against self-escalation (spec
//! property 7, scenario S5): a subordinate session invoking the grant path
//! on its own behalf must fail with no state change, full stop, before any
//! other step runs.

use std::sync::Arc;

use cortex_trust_core::Category;
use cortex_trust_core::Milestone;
use cortex_trust_core::MilestoneId;
use cortex_trust_core::MilestoneType;
use cortex_trust_core::OverrideId;
use cortex_trust_core::OverrideType;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustOverride;
use cortex_trust_core::TrustStore;
use cortex_trust_core::is_interactive;
use thiserror::Error;

/// Errors the Override Manager can report.
#[derive(Debug, Error)]
pub enum OverrideError {
    /// The caller's session is not interactive; no state was changed.
    #[error("caller session '{0}' is not interactive; override rejected")]
    NonInteractiveCaller(String),
    /// The `expires_in` duration string could not be parsed.
    #[error("malformed expires_in duration: '{0}'")]
    MalformedDuration(String),
    /// The store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Grants and revokes category-wide overrides of the score-based gate.
pub struct OverrideManager {
    store: Arc<dyn TrustStore>,
}

impl OverrideManager {
    /// Builds a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Grants or revokes an override for `category`.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::NonInteractiveCaller`] without touching the
    /// store if `caller_session_id` is not interactive. Returns
    /// [`OverrideError::MalformedDuration`] if `expires_in` does not parse.
    pub fn set_override(
        &self,
        category: Category,
        override_type: OverrideType,
        reason: &str,
        caller_session_id: &str,
        expires_in: Option<&str>,
    ) -> Result<TrustOverride, OverrideError> {
        if !is_interactive(caller_session_id) {
            return Err(OverrideError::NonInteractiveCaller(caller_session_id.to_string()));
        }

        let expires_at = match expires_in {
            Some(raw) => Some(parse_duration(raw).ok_or_else(|| OverrideError::MalformedDuration(raw.to_string()))?),
            None => None,
        };

        let now = Timestamp::now();
        self.store.deactivate_overrides_for_category(category, now)?;

        let trust_override = TrustOverride {
            override_id: OverrideId::new(),
            category,
            override_type,
            reason: reason.to_string(),
            granted_by: caller_session_id.to_string(),
            granted_at: now,
            expires_at: expires_at.map(|millis| now.plus_millis(millis)),
            revoked_at: None,
            active: true,
        };
        self.store.insert_override(&trust_override)?;

        let current_score =
            self.store.get_trust_score(category)?.map_or_else(|| cortex_trust_store::migrate::default_initial_score(category), |s| s.current_score);
        let milestone_type = match override_type {
            OverrideType::Granted => MilestoneType::OverrideGranted,
            OverrideType::Revoked => MilestoneType::OverrideRevoked,
        };
        self.store.insert_milestone(&Milestone {
            milestone_id: MilestoneId::new(),
            timestamp: now,
            category,
            milestone_type,
            old_score: None,
            new_score: current_score,
            trigger: format!("override_{}_by_{}", override_type.as_str(), caller_session_id),
        })?;

        Ok(trust_override)
    }

    /// Deactivates every active override, for emergency lockdown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn revoke_all(&self) -> Result<u64, StoreError> {
        self.store.revoke_all_overrides(Timestamp::now())
    }

    /// Lists every currently active, non-expired override.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn list_active(&self) -> Result<Vec<TrustOverride>, StoreError> {
        self.store.list_active_overrides()
    }
}

/// Parses a duration string of the form `Nm`, `Nh`, or `Nd` into
/// milliseconds.
fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let amount: u64 = digits.parse().ok()?;
    let per_unit_ms = match unit {
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        _ => return None,
    };
    Some(amount * per_unit_ms)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;

    use cortex_trust_core::Category;
    use cortex_trust_core::OverrideType;
    use cortex_trust_store::SqliteStoreConfig;
    use cortex_trust_store::SqliteTrustStore;

    use super::OverrideError;
    use super::OverrideManager;
    use super::parse_duration;

    fn manager() -> OverrideManager {
        let store = SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store");
        OverrideManager::new(Arc::new(store))
    }

    #[test]
    fn non_interactive_caller_is_rejected_with_no_state_change() {
        let manager = manager();
        let result = manager.set_override(Category::Deploy, OverrideType::Granted, "need it", "pipeline-task-042", None);
        assert!(matches!(result, Err(OverrideError::NonInteractiveCaller(_))));
        let active = manager.list_active().expect("list");
        assert!(active.iter().all(|o| o.category != Category::Deploy));
    }

    #[test]
    fn grant_then_revoke_round_trips() {
        let manager = manager();
        manager.set_override(Category::Deploy, OverrideType::Granted, "release window", "matthew-laptop", None).expect("grant");
        let active = manager.list_active().expect("list");
        assert!(active.iter().any(|o| o.category == Category::Deploy && o.override_type == OverrideType::Granted));

        manager.set_override(Category::Deploy, OverrideType::Revoked, "window closed", "matthew-laptop", None).expect("revoke");
        let active = manager.list_active().expect("list");
        let deploy_override = active.iter().find(|o| o.category == Category::Deploy).expect("override present");
        assert_eq!(deploy_override.override_type, OverrideType::Revoked);
    }

    #[test]
    fn revoke_all_clears_every_active_override() {
        let manager = manager();
        manager.set_override(Category::Deploy, OverrideType::Granted, "r", "matthew-laptop", None).expect("grant");
        manager.set_override(Category::ConfigChange, OverrideType::Granted, "r", "matthew-laptop", None).expect("grant");
        let revoked = manager.revoke_all().expect("revoke all");
        assert_eq!(revoked, 2);
        assert!(manager.list_active().expect("list").is_empty());
    }

    #[test]
    fn expires_in_duration_parses_minutes_hours_days() {
        assert_eq!(parse_duration("30m"), Some(30 * 60 * 1000));
        assert_eq!(parse_duration("2h"), Some(2 * 60 * 60 * 1000));
        assert_eq!(parse_duration("1d"), Some(24 * 60 * 60 * 1000));
        assert_eq!(parse_duration("garbage"), None);
    }

    #[test]
    fn malformed_expires_in_is_rejected() {
        let manager = manager();
        let result = manager.set_override(Category::Deploy, OverrideType::Granted, "r", "matthew-laptop", Some("nonsense"));
        assert!(matches!(result, Err(OverrideError::MalformedDuration(_))));
    }
}
