// crates/cortex-trust-engine/src/telemetry.rs
// ============================================================================
// Module: Trust Engine Telemetry
// Description: Observability hooks for gate decisions and outcome resolution.
// Purpose: Provide metric events without hard dependencies on a metrics stack.
// Dependencies: cortex-trust-core
// ============================================================================

//! ## Overview
//! Dependency-light so a deployment can plug in Prometheus or OpenTelemetry
//! without redesign. Every engine component that mutates trust state emits
//! exactly one event per operation through a shared `&dyn TrustMetrics`.

use cortex_trust_core::Category;
use cortex_trust_core::GateDecisionKind;
use cortex_trust_core::Outcome;
use cortex_trust_core::Tier;

/// A single gate verdict event, for counters and dashboards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateEvent {
    pub tier: Tier,
    pub category: Category,
    pub decision: GateDecisionKind,
    pub override_active: bool,
    pub score: f64,
}

/// A single outcome-resolution event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeEvent {
    pub category: Category,
    pub outcome: Outcome,
    pub old_score: f64,
    pub new_score: f64,
}

/// Metrics sink for trust gate decisions and outcome resolutions.
pub trait TrustMetrics: Send + Sync {
    /// Records a gate verdict.
    fn record_gate_decision(&self, event: GateEvent);
    /// Records an outcome resolution and the resulting score movement.
    fn record_outcome(&self, event: OutcomeEvent);
    /// Records that a category's effective gate state changed (milestone).
    fn record_milestone(&self, category: Category, label: &str);
}

/// No-op metrics sink, the default for components that don't wire one in.
pub struct NoopMetrics;

impl TrustMetrics for NoopMetrics {
    fn record_gate_decision(&self, _event: GateEvent) {}
    fn record_outcome(&self, _event: OutcomeEvent) {}
    fn record_milestone(&self, _category: Category, _label: &str) {}
}

#[cfg(test)]
mod tests {
    use cortex_trust_core::Category;
    use cortex_trust_core::GateDecisionKind;
    use cortex_trust_core::Tier;

    use super::GateEvent;
    use super::NoopMetrics;
    use super::TrustMetrics;

    #[test]
    fn noop_metrics_accepts_every_event_without_panicking() {
        let metrics = NoopMetrics;
        metrics.record_gate_decision(GateEvent {
            tier: Tier::Tier1,
            category: Category::ReadFile,
            decision: GateDecisionKind::Pass,
            override_active: false,
            score: 0.8,
        });
        metrics.record_milestone(Category::ReadFile, "first_auto_approve");
    }
}
