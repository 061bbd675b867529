// crates/cortex-trust-core/src/category.rs
// ============================================================================
// Module: Cortex Trust Categories
// Description: The closed risk-tier and category taxonomy.
// Purpose: Give every other module one shared, exhaustive vocabulary for
//          "how risky is this action".
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`Tier`] is the ordinal risk tier (1 read-only .. 4 financial). [`Category`]
//! is the fine-grained action class within a tier. Both are closed enums: the
//! distilled spec's `params` dynamic-typing is re-architected at this boundary
//! into sum types, per the redesign note in spec.md §9.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Ordinal risk tier from 1 (read-only, safe) to 4 (irreversible, financial).
///
/// # Invariants
/// - Strictly ordered: `Tier1 < Tier2 < Tier3 < Tier4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Read-only, reversible actions.
    Tier1 = 1,
    /// Write actions with easy recovery.
    Tier2 = 2,
    /// Service-affecting or configuration actions.
    Tier3 = 3,
    /// Irreversible or financial actions.
    Tier4 = 4,
}

impl Tier {
    /// Returns the tier as its ordinal number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Tier1 => 1,
            Self::Tier2 => 2,
            Self::Tier3 => 3,
            Self::Tier4 => 4,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

/// Fine-grained action class within a tier.
///
/// # Invariants
/// - The set is closed; [`Category::ALL`] enumerates every member exactly
///   once and is the source of truth for trust-score bootstrap rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Tier 1: read a file's contents.
    ReadFile,
    /// Tier 1: poll the status of a previously started process or job.
    ExecStatus,
    /// Tier 1: query Cortex's own memory store.
    CortexQuery,
    /// Tier 1: perform a web search.
    WebSearch,
    /// Tier 1: read from the Synapse messaging system.
    SynapseRead,
    /// Tier 2: write a file.
    WriteFile,
    /// Tier 2: write to Cortex's own memory store.
    CortexWrite,
    /// Tier 2: send a Synapse message.
    SynapseSend,
    /// Tier 2: create a scheduled job.
    CronCreate,
    /// Tier 2: spawn a subordinate agent session.
    SessionSpawn,
    /// Tier 3: restart a service.
    ServiceRestart,
    /// Tier 3: change a configuration value.
    ConfigChange,
    /// Tier 3: act on an API gateway.
    GatewayAction,
    /// Tier 3: modify an existing scheduled job.
    CronModify,
    /// Tier 3: deploy a build.
    Deploy,
    /// Tier 4: trade through the Augur financial connector.
    FinancialAugur,
    /// Tier 4: move funds through a cryptocurrency connector.
    FinancialCrypto,
    /// Tier 4: move funds through the Stripe connector.
    FinancialStripe,
}

impl Category {
    /// Every category, in a stable order. Source of truth for bootstrap rows.
    pub const ALL: &'static [Category] = &[
        Category::ReadFile,
        Category::ExecStatus,
        Category::CortexQuery,
        Category::WebSearch,
        Category::SynapseRead,
        Category::WriteFile,
        Category::CortexWrite,
        Category::SynapseSend,
        Category::CronCreate,
        Category::SessionSpawn,
        Category::ServiceRestart,
        Category::ConfigChange,
        Category::GatewayAction,
        Category::CronModify,
        Category::Deploy,
        Category::FinancialAugur,
        Category::FinancialCrypto,
        Category::FinancialStripe,
    ];

    /// Returns the tier this category belongs to.
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self {
            Self::ReadFile
            | Self::ExecStatus
            | Self::CortexQuery
            | Self::WebSearch
            | Self::SynapseRead => Tier::Tier1,
            Self::WriteFile
            | Self::CortexWrite
            | Self::SynapseSend
            | Self::CronCreate
            | Self::SessionSpawn => Tier::Tier2,
            Self::ServiceRestart
            | Self::ConfigChange
            | Self::GatewayAction
            | Self::CronModify
            | Self::Deploy => Tier::Tier3,
            Self::FinancialAugur | Self::FinancialCrypto | Self::FinancialStripe => Tier::Tier4,
        }
    }

    /// Returns the stable wire/storage label for this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::ExecStatus => "exec_status",
            Self::CortexQuery => "cortex_query",
            Self::WebSearch => "web_search",
            Self::SynapseRead => "synapse_read",
            Self::WriteFile => "write_file",
            Self::CortexWrite => "cortex_write",
            Self::SynapseSend => "synapse_send",
            Self::CronCreate => "cron_create",
            Self::SessionSpawn => "session_spawn",
            Self::ServiceRestart => "service_restart",
            Self::ConfigChange => "config_change",
            Self::GatewayAction => "gateway_action",
            Self::CronModify => "cron_modify",
            Self::Deploy => "deploy",
            Self::FinancialAugur => "financial_augur",
            Self::FinancialCrypto => "financial_crypto",
            Self::FinancialStripe => "financial_stripe",
        }
    }

    /// Parses a category from its stable wire/storage label.
    #[must_use]
    pub fn from_str(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|category| category.as_str() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Category;
    use super::Tier;

    #[test]
    fn every_category_round_trips_its_label() {
        for category in Category::ALL {
            let label = category.as_str();
            assert_eq!(Category::from_str(label), Some(*category));
        }
    }

    #[test]
    fn tier_four_categories_are_financial() {
        for category in Category::ALL {
            if category.tier() == Tier::Tier4 {
                assert!(category.as_str().starts_with("financial_"));
            }
        }
    }

    #[test]
    fn tier_ordering_is_strict() {
        assert!(Tier::Tier1 < Tier::Tier2);
        assert!(Tier::Tier2 < Tier::Tier3);
        assert!(Tier::Tier3 < Tier::Tier4);
    }
}
