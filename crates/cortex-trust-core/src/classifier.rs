// crates/cortex-trust-core/src/classifier.rs
// ============================================================================
// Module: Cortex Trust Classifier
// Description: Pure (tool_name, params) -> (tier, category) mapping.
// Purpose: The sole entry point that assigns risk tier and category to a
//          tool call; every downstream component trusts its verdict.
// Dependencies: once_cell, regex, serde_json
// ============================================================================

//! ## Overview
//! [`classify`] is an ordered rule table: the first rule whose constraints
//! all match wins. One rule precedes the table entirely and cannot be
//! shadowed — the tier-4 financial screen, run unanchored against a `exec`
//! call's `command` field before anything else, including the read-only
//! shortcuts that would otherwise promote `exec` to tier 1. A compound shell
//! command such as `ls && augur trade --live` must still classify as tier 4;
//! anchoring the read-only check first would let it slip through.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::category::Category;
use crate::category::Tier;

/// The verdict a classification produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Assigned risk tier.
    pub tier: Tier,
    /// Assigned category.
    pub category: Category,
}

impl Classification {
    const fn new(category: Category) -> Self {
        Self { tier: category.tier(), category }
    }
}

/// Tier-4 financial command patterns, checked first and unanchored.
static TIER4_PATTERNS: Lazy<[(Regex, Category); 3]> = Lazy::new(|| {
    [
        (
            Regex::new(r"(?i)\baugur\s+(trade|order|position)\b").expect("static pattern"),
            Category::FinancialAugur,
        ),
        (
            Regex::new(r"(?i)\b(crypto|wallet)\s*(transfer|send|withdraw)\b").expect("static pattern"),
            Category::FinancialCrypto,
        ),
        (
            Regex::new(r"(?i)\bstripe\s+(charge|payout|transfer|refund)\b").expect("static pattern"),
            Category::FinancialStripe,
        ),
    ]
});

/// A short allowlist of clearly observational shell commands. Matched
/// anchored at the start of the command string only *after* the tier-4
/// screen has cleared it.
static READ_ONLY_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(ls|cat|grep|ps|df|du|whoami|pwd|echo|head|tail|find|git\s+(status|log|diff|show))\b")
        .expect("static pattern")
});

static DEPLOY_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(deploy|release)\b").expect("static pattern"));

static SERVICE_RESTART_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(systemctl\s+(restart|stop|start)|service\s+\w+\s+restart)\b").expect("static pattern"));

/// Tool names that map directly to a category without inspecting params.
const DIRECT_TOOL_CATEGORIES: &[(&str, Category)] = &[
    ("read_file", Category::ReadFile),
    ("exec_status", Category::ExecStatus),
    ("cortex_query", Category::CortexQuery),
    ("web_search", Category::WebSearch),
    ("synapse_read", Category::SynapseRead),
    ("write_file", Category::WriteFile),
    ("cortex_write", Category::CortexWrite),
    ("synapse_send", Category::SynapseSend),
    ("cron_create", Category::CronCreate),
    ("session_spawn", Category::SessionSpawn),
    ("service_restart", Category::ServiceRestart),
    ("config_change", Category::ConfigChange),
    ("gateway_action", Category::GatewayAction),
    ("cron_modify", Category::CronModify),
    ("deploy", Category::Deploy),
    ("financial_augur", Category::FinancialAugur),
    ("financial_crypto", Category::FinancialCrypto),
    ("financial_stripe", Category::FinancialStripe),
];

/// Classifies a tool call into a `(tier, category)` pair.
///
/// # Invariants
/// - Pure: identical `(tool_name, params)` always yields an identical result.
/// - Never fails; an unmatched call falls back to `(tier 2, write_file)`.
/// - The tier-4 screen over `exec`'s `command` field always runs before any
///   read-only shortcut, regardless of rule-table order.
#[must_use]
pub fn classify(tool_name: &str, params: &Value) -> Classification {
    let command = params.get("command").and_then(Value::as_str);

    if tool_name == "exec" {
        if let Some(command) = command {
            if let Some(category) = tier4_screen(command) {
                return Classification::new(category);
            }
            if READ_ONLY_COMMAND.is_match(command) {
                return Classification::new(Category::ExecStatus);
            }
            if DEPLOY_COMMAND.is_match(command) {
                return Classification::new(Category::Deploy);
            }
            if SERVICE_RESTART_COMMAND.is_match(command) {
                return Classification::new(Category::ServiceRestart);
            }
        }
        return Classification::new(Category::WriteFile);
    }

    for (name, category) in DIRECT_TOOL_CATEGORIES {
        if tool_name == *name {
            return Classification::new(*category);
        }
    }

    Classification::new(Category::WriteFile)
}

/// Runs the unanchored tier-4 screen over a raw command string.
fn tier4_screen(command: &str) -> Option<Category> {
    TIER4_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(command))
        .map(|(_, category)| *category)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::classify;
    use crate::category::Category;
    use crate::category::Tier;

    #[test]
    fn classify_is_deterministic() {
        let params = json!({"command": "ls -la"});
        let first = classify("exec", &params);
        let second = classify("exec", &params);
        assert_eq!(first, second);
    }

    #[test]
    fn read_only_exec_is_tier_one() {
        let result = classify("exec", &json!({"command": "ls -la /tmp"}));
        assert_eq!(result.tier, Tier::Tier1);
        assert_eq!(result.category, Category::ExecStatus);
    }

    #[test]
    fn tier4_command_is_never_shadowed_by_read_only_prefix() {
        let result = classify("exec", &json!({"command": "ls && augur trade --symbol BTC --qty 1"}));
        assert_eq!(result.tier, Tier::Tier4);
        assert_eq!(result.category, Category::FinancialAugur);
    }

    #[test]
    fn bare_tier4_command_classifies_tier4() {
        let result = classify("exec", &json!({"command": "augur trade --symbol BTC --qty 1"}));
        assert_eq!(result.tier, Tier::Tier4);
    }

    #[test]
    fn every_read_only_prefix_is_shadowed_by_any_tier4_command() {
        let prefixes = ["ls -la", "cat file.txt", "git status", "pwd"];
        let tier4_commands = [
            "augur trade --execute",
            "crypto transfer --to abc",
            "stripe charge --amount 100",
        ];
        for prefix in prefixes {
            for tier4 in tier4_commands {
                let compound = format!("{prefix} && {tier4}");
                let result = classify("exec", &json!({"command": compound}));
                assert_eq!(result.tier, Tier::Tier4, "compound command {compound} did not classify tier 4");
            }
        }
    }

    #[test]
    fn unmatched_exec_command_falls_back_to_tier_two() {
        let result = classify("exec", &json!({"command": "some totally unknown tool invocation"}));
        assert_eq!(result.tier, Tier::Tier2);
        assert_eq!(result.category, Category::WriteFile);
    }

    #[test]
    fn unknown_tool_name_falls_back_to_tier_two_write_file() {
        let result = classify("mystery_tool", &json!({}));
        assert_eq!(result.tier, Tier::Tier2);
        assert_eq!(result.category, Category::WriteFile);
    }

    #[test]
    fn direct_tool_name_maps_to_its_category() {
        let result = classify("financial_crypto", &json!({}));
        assert_eq!(result.tier, Tier::Tier4);
        assert_eq!(result.category, Category::FinancialCrypto);
    }
}
