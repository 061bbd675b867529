// crates/cortex-trust-engine/src/lib.rs
// ============================================================================
// Crate: cortex-trust-engine
// Description: Orchestrates the trust gate, outcome resolution, overrides,
//              knowledge discovery, enforcement, reporting, and feedback.
// Purpose: Wire the pure types in cortex-trust-core and the persistence in
//          cortex-trust-store into the one facade an embedder calls.
// Dependencies: async-trait, cortex-trust-core, cortex-trust-store, tokio
// ============================================================================

//! ## Overview
//! [`TrustCore`] is the single entry point: one call per external event
//! (an impending tool call, a resolved outcome, correction text, an override
//! request, a report request). Every sub-component is built once at
//! [`TrustCore::new`] and shared by `Arc` internally; callers never construct
//! [`crate::gate::TrustGate`] or [`crate::outcome::OutcomeCollector`] directly
//! unless they need finer-grained control than the facade offers.

pub mod config;
pub mod enforcement;
pub mod feedback;
pub mod gate;
pub mod knowledge;
pub mod messaging;
pub mod outcome;
pub mod override_manager;
pub mod reporter;
pub mod telemetry;

use std::sync::Arc;

use cortex_trust_core::Category;
use cortex_trust_core::DecisionId;
use cortex_trust_core::Outcome;
use cortex_trust_core::OverrideType;
use cortex_trust_core::ResolveOutcomeResult;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustOverride;
use cortex_trust_core::TrustStore;
use serde_json::Value;
use thiserror::Error;

use crate::config::TrustConfig;
use crate::enforcement::EnforcementEngine;
use crate::enforcement::EnforcementVerdict;
use crate::feedback::FeedbackTracker;
use crate::gate::GateError;
use crate::gate::GateResult;
use crate::gate::TrustGate;
use crate::knowledge::KnowledgeDiscovery;
use crate::knowledge::KnowledgeResult;
use crate::knowledge::MemoryStore;
use crate::knowledge::SopLoader;
use crate::outcome::CorrectionOutcome;
use crate::outcome::OutcomeCollector;
use crate::override_manager::OverrideError;
use crate::override_manager::OverrideManager;
use crate::reporter::Report;
use crate::reporter::Reporter;
use crate::reporter::WeeklySummary;
use crate::telemetry::TrustMetrics;

/// The union of every sub-component's error type, so a caller driving
/// [`TrustCore`] has exactly one error type to match on.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The outcome of [`TrustCore::check`]: the gate's verdict plus what the
/// Enforcement Engine decided to do about it.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub gate: GateResult,
    pub knowledge: KnowledgeResult,
    pub verdict: EnforcementVerdict,
}

/// Wires the Trust Gate, Outcome Collector, Override Manager, Knowledge
/// Discovery, Enforcement Engine, Reporter, and Feedback Tracker into one
/// facade over a shared store.
pub struct TrustCore {
    store: Arc<dyn TrustStore>,
    config: TrustConfig,
    gate: TrustGate,
    outcomes: OutcomeCollector,
    overrides: OverrideManager,
    knowledge: KnowledgeDiscovery,
    enforcement: EnforcementEngine,
    reporter: Reporter,
    feedback: FeedbackTracker,
}

impl TrustCore {
    /// Builds every sub-component over `store`, sharing one [`TrustConfig`]
    /// and [`TrustMetrics`] sink. `memory_store` is shared between Knowledge
    /// Discovery (reads) and the Feedback Tracker (pattern promotion writes).
    #[must_use]
    pub fn new(
        store: Arc<dyn TrustStore>,
        config: TrustConfig,
        metrics: Arc<dyn TrustMetrics>,
        sop_loader: Box<dyn SopLoader>,
        memory_store: Arc<dyn MemoryStore>,
    ) -> Self {
        let gate = TrustGate::new(store.clone(), config.clone(), metrics.clone());
        let outcomes = OutcomeCollector::new(store.clone(), config.clone(), metrics);
        let overrides = OverrideManager::new(store.clone());
        let knowledge = KnowledgeDiscovery::new(
            sop_loader,
            memory_store.clone(),
            std::time::Duration::from_millis(config.knowledge_cache_ttl_ms),
            std::time::Duration::from_millis(config.max_lookup_ms),
        );
        let enforcement = EnforcementEngine::new(
            config.enforcement_level,
            config.enforcement_cooldown_ms,
            config.max_knowledge_length,
            config.cooldown_store_capacity,
            config.bypass_token_ttl_ms,
        );
        let reporter = Reporter::new(store.clone(), config.clone());
        let feedback = FeedbackTracker::new(store.clone(), memory_store, config.feedback_ack_window_ms);
        Self { store, config, gate, outcomes, overrides, knowledge, enforcement, reporter, feedback }
    }

    /// Runs a complete check for an impending tool call: classify, gate,
    /// look up knowledge, correlate the call against open advisory deliveries,
    /// filter out habitually-ignored advisories, and decide what (if
    /// anything) to inject.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Gate`] if the gate check itself fails, or
    /// [`TrustError::Store`] if the feedback bookkeeping hits a backend
    /// failure.
    pub async fn check(
        &self,
        tool_name: &str,
        params: &Value,
        session_id: &str,
        keywords: &[String],
        categories: &[String],
        project_path: Option<&str>,
        service_type: Option<&str>,
        bypass_token: Option<&str>,
    ) -> Result<CheckResult, TrustError> {
        let gate_result = self.gate.check(tool_name, params, session_id)?;
        let params_json = params.to_string();
        let knowledge = self.knowledge.lookup(&params_json, keywords, categories).await;
        let now = Timestamp::now();

        self.feedback.record_tool_call(tool_name, &params_json, now)?;
        let knowledge = self.suppress_ignored_advisories(knowledge);

        let verdict = self.enforcement.decide(tool_name, project_path, service_type, &gate_result, &knowledge, now, bypass_token);
        self.record_advisory_deliveries(tool_name, &knowledge, &verdict, now)?;

        Ok(CheckResult { gate: gate_result, knowledge, verdict })
    }

    /// Drops SOP/memory advisories the Feedback Tracker has flagged as
    /// habitually ignored for this source, before the Enforcement Engine
    /// ever sees them.
    fn suppress_ignored_advisories(&self, mut knowledge: KnowledgeResult) -> KnowledgeResult {
        knowledge.sops.retain(|sop| !self.feedback.should_suppress_delivery(&sop.path, "sop").unwrap_or(false));
        knowledge.memories.retain(|memory| !self.feedback.should_suppress_delivery(&memory.id, "memory").unwrap_or(false));
        knowledge
    }

    /// Registers every advisory actually delivered in `verdict` with the
    /// Feedback Tracker, so a later matching tool call can be correlated as
    /// acted-on.
    fn record_advisory_deliveries(&self, tool_name: &str, knowledge: &KnowledgeResult, verdict: &EnforcementVerdict, now: Timestamp) -> Result<(), StoreError> {
        if !matches!(verdict, EnforcementVerdict::AllowWithAdvisory { .. } | EnforcementVerdict::BlockPendingReview { .. }) {
            return Ok(());
        }
        for sop in &knowledge.sops {
            let delivery_id = format!("{tool_name}:{}:sop:{}", now.epoch_millis(), sop.label);
            self.feedback.record_delivery(&delivery_id, &sop.path, "sop", &[sop.label.clone()], &[tool_name.to_string()], now)?;
        }
        for memory in &knowledge.memories {
            let delivery_id = format!("{tool_name}:{}:memory:{}", now.epoch_millis(), memory.id);
            self.feedback.record_delivery(&delivery_id, &memory.id, "memory", &[memory.category.clone()], &[tool_name.to_string()], now)?;
        }
        Ok(())
    }

    /// Resolves `decision_id` to `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn resolve_outcome(&self, decision_id: DecisionId, outcome: Outcome, source: &str) -> Result<ResolveOutcomeResult, StoreError> {
        self.outcomes.resolve_outcome(decision_id, outcome, source)
    }

    /// Classifies and applies correction text to the most recent eligible
    /// pending decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_correction(&self, text: &str, category: Option<Category>) -> Result<CorrectionOutcome, StoreError> {
        self.outcomes.record_correction(text, category)
    }

    /// Resolves `decision_id` as a tool error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_tool_error(&self, decision_id: DecisionId, is_internal: bool, message: &str) -> Result<ResolveOutcomeResult, StoreError> {
        self.outcomes.record_tool_error(decision_id, is_internal, message)
    }

    /// Runs one sweep of expired pending outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn sweep_once(&self, as_of: Timestamp) -> Result<u64, StoreError> {
        self.outcomes.sweep_once(as_of)
    }

    /// Grants or revokes a category override.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Override`] if the caller is non-interactive or
    /// `expires_in` is malformed.
    pub fn set_override(
        &self,
        category: Category,
        override_type: OverrideType,
        reason: &str,
        caller_session_id: &str,
        expires_in: Option<&str>,
    ) -> Result<TrustOverride, TrustError> {
        Ok(self.overrides.set_override(category, override_type, reason, caller_session_id, expires_in)?)
    }

    /// Deactivates every active override.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn revoke_all(&self) -> Result<u64, StoreError> {
        self.overrides.revoke_all()
    }

    /// Lists every currently active override.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn list_active(&self) -> Result<Vec<TrustOverride>, StoreError> {
        self.overrides.list_active()
    }

    /// Builds the current-state report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn generate_report(&self) -> Result<Report, StoreError> {
        self.reporter.report()
    }

    /// Builds the trailing-7-day rollup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn generate_weekly_summary(&self, now: Timestamp) -> Result<WeeklySummary, StoreError> {
        self.reporter.weekly_summary(now)
    }

    /// Returns the shared store handle, for callers that need direct access
    /// (e.g. the CLI's read-only inspection commands).
    #[must_use]
    pub fn store(&self) -> Arc<dyn TrustStore> {
        self.store.clone()
    }

    /// Returns the shared configuration.
    #[must_use]
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }
}
