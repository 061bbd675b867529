// crates/cortex-trust-engine/src/config.rs
// ============================================================================
// Module: Cortex Trust Engine Configuration
// Description: Tunable thresholds, windows, and limits for every component.
// Purpose: Centralize the defaults spec.md pins per tier/component so no
//          magic number is duplicated across gate/outcome/enforcement code.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! One [`TrustConfig`] is constructed once and shared (by reference or
//! `Arc`) across every engine component. Defaults match the distilled spec's
//! per-tier tables exactly; [`TrustConfig::validate`] rejects a
//! caller-supplied config that would violate an invariant (e.g. a threshold
//! below its floor) before any component starts using it.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors constructing or validating a [`TrustConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A tier's floor is not strictly below its threshold.
    #[error("tier {tier} floor ({floor}) must be below threshold ({threshold})")]
    FloorAboveThreshold { tier: u8, floor: String, threshold: String },
    /// A duration-bearing field was zero where a positive value is required.
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    /// The config file could not be read from disk.
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The config file's contents were not valid TOML for this shape.
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// Per-tier gate thresholds: `current_score ≥ threshold` passes,
/// `floor ≤ current_score < threshold` pauses, below `floor` blocks.
/// `None` represents the tier-4 "infinite" threshold/floor (never passes
/// without an explicit override).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub threshold: Option<f64>,
    pub floor: Option<f64>,
    pub feedback_window_ms: u64,
}

/// Every tunable the engine needs, grouped by owning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Indexed by `tier.number() - 1`.
    pub tiers: [TierThresholds; 4],
    /// Window after a `pass` decision in which a correction can still
    /// resolve it. Default 30 minutes.
    pub correction_window_ms: u64,
    /// Confirmation TTL before a `pause` expires unresolved. Default 10 min.
    pub confirmation_ttl_ms: u64,
    /// Knowledge lookup deadline. Default 200ms.
    pub max_lookup_ms: u64,
    /// Cooldown between repeated knowledge injections for the same key.
    /// Default 15 minutes.
    pub enforcement_cooldown_ms: u64,
    /// Maximum rendered knowledge payload length. Default 4000 chars.
    pub max_knowledge_length: usize,
    /// SOP and memory cache TTL. Default 30 minutes.
    pub knowledge_cache_ttl_ms: u64,
    /// Feedback Tracker's implicit-acknowledgment window. Default 10 min.
    pub feedback_ack_window_ms: u64,
    /// Global enforcement level, before the per-category escalation rule.
    /// Default `Advisory`.
    pub enforcement_level: crate::enforcement::EnforcementLevel,
    /// Bypass token lifetime. Default 1 hour.
    pub bypass_token_ttl_ms: u64,
    /// Cooldown-key store size above which the oldest entries are pruned.
    /// Default 10,000.
    pub cooldown_store_capacity: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            tiers: [
                TierThresholds { threshold: Some(0.5), floor: Some(0.2), feedback_window_ms: 30 * 60 * 1000 },
                TierThresholds { threshold: Some(0.7), floor: Some(0.4), feedback_window_ms: 30 * 60 * 1000 },
                TierThresholds { threshold: Some(0.85), floor: Some(0.6), feedback_window_ms: 60 * 60 * 1000 },
                TierThresholds { threshold: None, floor: None, feedback_window_ms: 60 * 60 * 1000 },
            ],
            correction_window_ms: 30 * 60 * 1000,
            confirmation_ttl_ms: 10 * 60 * 1000,
            max_lookup_ms: 200,
            enforcement_cooldown_ms: 15 * 60 * 1000,
            max_knowledge_length: 4000,
            knowledge_cache_ttl_ms: 30 * 60 * 1000,
            feedback_ack_window_ms: 10 * 60 * 1000,
            enforcement_level: crate::enforcement::EnforcementLevel::Advisory,
            bypass_token_ttl_ms: 60 * 60 * 1000,
            cooldown_store_capacity: 10_000,
        }
    }
}

impl TrustConfig {
    /// Loads a config from a TOML file at `path`, falling back to
    /// [`TrustConfig::default`] for any field the file omits, then validates
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if `path` cannot be read,
    /// [`ConfigError::Parse`] if its contents are not valid TOML for this
    /// shape, or a validation error if the parsed config is inconsistent.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the threshold/floor/feedback-window triple for a tier.
    #[must_use]
    pub fn for_tier(&self, tier: cortex_trust_core::Tier) -> TierThresholds {
        self.tiers[(tier.number() - 1) as usize]
    }

    /// Validates internal consistency: every tier's floor must sit strictly
    /// below its threshold, and every duration field must be nonzero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, tier) in self.tiers.iter().enumerate() {
            if let (Some(threshold), Some(floor)) = (tier.threshold, tier.floor) {
                if floor >= threshold {
                    return Err(ConfigError::FloorAboveThreshold {
                        tier: (idx + 1) as u8,
                        floor: floor.to_string(),
                        threshold: threshold.to_string(),
                    });
                }
            }
            if tier.feedback_window_ms == 0 {
                return Err(ConfigError::ZeroDuration { field: "feedback_window_ms" });
            }
        }
        if self.correction_window_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "correction_window_ms" });
        }
        if self.confirmation_ttl_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "confirmation_ttl_ms" });
        }
        if self.max_lookup_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "max_lookup_ms" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use super::ConfigError;
    use super::TrustConfig;

    #[test]
    fn default_config_validates() {
        TrustConfig::default().validate().expect("default config is valid");
    }

    #[test]
    fn floor_at_or_above_threshold_is_rejected() {
        let mut config = TrustConfig::default();
        config.tiers[0].floor = Some(0.9);
        let err = config.validate().expect_err("should reject");
        assert!(matches!(err, ConfigError::FloorAboveThreshold { tier: 1, .. }));
    }

    #[test]
    fn zero_correction_window_is_rejected() {
        let mut config = TrustConfig::default();
        config.correction_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_roundtrips_the_default_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trust.toml");
        let serialized = toml::to_string(&TrustConfig::default()).expect("serialize");
        std::fs::write(&path, serialized).expect("write config");

        let loaded = TrustConfig::load_from_file(&path).expect("load config");
        assert_eq!(loaded, TrustConfig::default());
    }

    #[test]
    fn load_from_file_reports_io_error_for_missing_path() {
        let err = TrustConfig::load_from_file(std::path::Path::new("/nonexistent/trust.toml")).expect_err("should fail");
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn tier4_has_no_finite_threshold() {
        let config = TrustConfig::default();
        let tier4 = config.for_tier(cortex_trust_core::Tier::Tier4);
        assert_eq!(tier4.threshold, None);
        assert_eq!(tier4.floor, None);
    }
}
