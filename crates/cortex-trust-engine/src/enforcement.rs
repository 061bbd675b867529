// crates/cortex-trust-engine/src/enforcement.rs
// ============================================================================
// Module: Enforcement Engine
// Description: Combines a gate decision with discovered knowledge into an
//              allow/advisory/block verdict, cooldown-gated against spam.
// Purpose: Be the only place that decides whether to interrupt the agent
//          with an injected knowledge payload.
// Dependencies: cortex-trust-core, std::sync
// ============================================================================

//! ## Overview
//! [`EnforcementEngine`] sits downstream of both [`crate::gate::TrustGate`]
//! and [`crate::knowledge::KnowledgeDiscovery`]; it never calls back into
//! either — Knowledge Discovery is a pure data source, the Gate's decision is
//! handed in as a value. This one-directional wiring is what resolves the
//! cyclic-looking Engine/Discovery relationship: the cooldown key is computed
//! here, from Discovery's output, not the other way around.

use std::collections::HashMap;
use std::sync::Mutex;

use cortex_trust_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::gate::GateResult;
use crate::knowledge::KnowledgeResult;
use crate::knowledge::MemoryRecord;
use crate::knowledge::SopMatch;

/// Global enforcement level, before the per-category escalation rule in
/// [`EnforcementEngine::decide`] step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    Disabled,
    Advisory,
    Category,
    Strict,
}

/// What the Enforcement Engine decided to do with a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum EnforcementVerdict {
    /// Proceed with no injection.
    AllowSilently,
    /// Proceed, but with an informational payload attached.
    AllowWithAdvisory { payload: String },
    /// Block pending acknowledgment of the attached payload.
    BlockPendingReview { payload: String },
    /// Proceed under an active emergency bypass; metadata records the fact.
    AllowUnderBypass,
}

struct CooldownStore {
    last_injected: HashMap<String, Timestamp>,
    capacity: usize,
}

impl CooldownStore {
    fn new(capacity: usize) -> Self {
        Self { last_injected: HashMap::new(), capacity }
    }

    fn recently_injected(&self, key: &str, now: Timestamp, cooldown_ms: u64) -> bool {
        self.last_injected.get(key).is_some_and(|last| now.epoch_millis().saturating_sub(last.epoch_millis()) < cooldown_ms)
    }

    fn record(&mut self, key: String, now: Timestamp) {
        if self.last_injected.len() >= self.capacity {
            if let Some(oldest_key) = self.last_injected.iter().min_by_key(|(_, ts)| ts.epoch_millis()).map(|(k, _)| k.clone()) {
                self.last_injected.remove(&oldest_key);
            }
        }
        self.last_injected.insert(key, now);
    }
}

/// Combines gate decisions and discovered knowledge into a final verdict,
/// suppressing repeated injections via a bounded cooldown store.
pub struct EnforcementEngine {
    level: EnforcementLevel,
    cooldown_ms: u64,
    max_payload_len: usize,
    cooldowns: Mutex<CooldownStore>,
    bypass_tokens: Mutex<HashMap<String, Timestamp>>,
    bypass_ttl_ms: u64,
}

impl EnforcementEngine {
    /// Builds an engine at the given global `level`.
    #[must_use]
    pub fn new(level: EnforcementLevel, cooldown_ms: u64, max_payload_len: usize, cooldown_store_capacity: usize, bypass_ttl_ms: u64) -> Self {
        Self {
            level,
            cooldown_ms,
            max_payload_len,
            cooldowns: Mutex::new(CooldownStore::new(cooldown_store_capacity)),
            bypass_tokens: Mutex::new(HashMap::new()),
            bypass_ttl_ms,
        }
    }

    /// Mints a bypass token, valid for `bypass_ttl_ms` from `now`. Intended
    /// to be called only from an administrative channel (e.g. the CLI).
    pub fn issue_bypass_token(&self, token: String, now: Timestamp) {
        if let Ok(mut tokens) = self.bypass_tokens.lock() {
            tokens.insert(token, now.plus_millis(self.bypass_ttl_ms));
        }
    }

    /// Returns `true` and consumes `token` if it is present and unexpired.
    fn consume_bypass(&self, token: &str, now: Timestamp) -> bool {
        let Ok(mut tokens) = self.bypass_tokens.lock() else { return false };
        match tokens.remove(token) {
            Some(expires_at) => now.is_before_or_at(expires_at),
            None => false,
        }
    }

    /// Runs the full decision procedure for a completed gate check plus its
    /// accompanying knowledge lookup.
    pub fn decide(
        &self,
        tool_name: &str,
        project_path: Option<&str>,
        service_type: Option<&str>,
        gate: &GateResult,
        knowledge: &KnowledgeResult,
        now: Timestamp,
        bypass_token: Option<&str>,
    ) -> EnforcementVerdict {
        if self.level == EnforcementLevel::Disabled {
            return EnforcementVerdict::AllowSilently;
        }
        if let Some(token) = bypass_token {
            if self.consume_bypass(token, now) {
                return EnforcementVerdict::AllowUnderBypass;
            }
        }

        let key = cooldown_key(tool_name, project_path, service_type, &knowledge.sops, &knowledge.memories);
        let on_cooldown = self.cooldowns.lock().is_ok_and(|store| store.recently_injected(&key, now, self.cooldown_ms));
        if on_cooldown {
            return EnforcementVerdict::AllowSilently;
        }

        if knowledge.sops.is_empty() && knowledge.memories.is_empty() {
            return EnforcementVerdict::AllowSilently;
        }

        let effective = self.effective_level(knowledge);
        let payload = render_payload(tool_name, gate, knowledge, project_path, service_type, self.max_payload_len);

        match effective {
            EnforcementLevel::Disabled => EnforcementVerdict::AllowSilently,
            EnforcementLevel::Advisory => EnforcementVerdict::AllowWithAdvisory { payload },
            EnforcementLevel::Category | EnforcementLevel::Strict => {
                if let Ok(mut store) = self.cooldowns.lock() {
                    store.record(key, now);
                }
                EnforcementVerdict::BlockPendingReview { payload }
            }
        }
    }

    /// Resolves the effective level per category-escalation rule: at global
    /// `Category`, any SOP present promotes `Advisory` up to `Category`.
    fn effective_level(&self, knowledge: &KnowledgeResult) -> EnforcementLevel {
        if self.level != EnforcementLevel::Category {
            return self.level;
        }
        if !knowledge.sops.is_empty() {
            EnforcementLevel::Category
        } else {
            EnforcementLevel::Advisory
        }
    }
}

/// Computes a stable cooldown key from the inputs that would make two
/// injections "the same" from the agent's point of view.
fn cooldown_key(tool_name: &str, project_path: Option<&str>, service_type: Option<&str>, sops: &[SopMatch], memories: &[MemoryRecord]) -> String {
    let mut labels: Vec<&str> = sops.iter().map(|m| m.label.as_str()).collect();
    labels.sort_unstable();
    let mut categories: Vec<&str> = memories.iter().map(|m| m.category.as_str()).collect();
    categories.sort_unstable();
    categories.dedup();
    format!("{tool_name}|{}|{}|{}|{}", project_path.unwrap_or(""), service_type.unwrap_or(""), labels.join(","), categories.join(","))
}

const TRUNCATION_MARKER: &str = "\n[...truncated...]";

/// Renders the deterministic knowledge payload per the formatting contract:
/// header, top-3 SOPs (1000 chars each), top-5-per-category memories (200
/// chars each), a context section, and an instruction footer, capped overall.
fn render_payload(tool_name: &str, gate: &GateResult, knowledge: &KnowledgeResult, project_path: Option<&str>, service_type: Option<&str>, max_len: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Knowledge Advisory: {tool_name} ===\n"));
    out.push_str(&format!("risk tier: {} | sources: {} sops, {} memories\n\n", gate.tier.number(), knowledge.sops.len(), knowledge.memories.len()));

    if !knowledge.sops.is_empty() {
        out.push_str("-- Standing Procedures --\n");
        for sop in knowledge.sops.iter().take(3) {
            out.push_str(&format!("[{}] {}\n", sop.label, truncate_chars(&sop.content, 1000)));
        }
        out.push('\n');
    }

    if !knowledge.memories.is_empty() {
        out.push_str("-- Relevant Memories --\n");
        let mut by_category: HashMap<&str, Vec<&MemoryRecord>> = HashMap::new();
        for memory in &knowledge.memories {
            by_category.entry(memory.category.as_str()).or_default().push(memory);
        }
        let mut categories: Vec<&&str> = by_category.keys().collect();
        categories.sort();
        for category in categories {
            let mut records = by_category[*category].clone();
            records.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
            out.push_str(&format!("[{category}]\n"));
            for memory in records.iter().take(5) {
                out.push_str(&format!("  ({:.2}) {}\n", memory.confidence, truncate_chars(&memory.content, 200)));
            }
        }
        out.push('\n');
    }

    out.push_str("-- Context --\n");
    out.push_str(&format!(
        "project: {} | service: {} | lookup: {}ms{}\n\n",
        project_path.unwrap_or("unknown"),
        service_type.unwrap_or("unknown"),
        knowledge.elapsed.as_millis(),
        if knowledge.timed_out { " (memory lookup timed out)" } else { "" },
    ));

    out.push_str("Review the above before proceeding; acknowledge to continue.\n");

    truncate_with_marker(&out, max_len)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}

fn truncate_with_marker(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let budget = max_len.saturating_sub(TRUNCATION_MARKER.len());
    let mut boundary = budget.min(text.len());
    while !text.is_char_boundary(boundary) && boundary > 0 {
        boundary -= 1;
    }
    let mut truncated = text[..boundary].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::time::Duration;

    use cortex_trust_core::Category;
    use cortex_trust_core::Tier;

    use super::EnforcementEngine;
    use super::EnforcementLevel;
    use super::EnforcementVerdict;
    use crate::gate::GateReason;
    use crate::gate::GateResult;
    use crate::knowledge::KnowledgeResult;
    use crate::knowledge::MemoryRecord;
    use crate::knowledge::SopMatch;
    use cortex_trust_core::DecisionId;
    use cortex_trust_core::GateDecisionKind;
    use cortex_trust_core::Timestamp;

    fn gate_result() -> GateResult {
        GateResult {
            result: GateDecisionKind::Pass,
            reason: GateReason::ScoreAboveThreshold,
            tier: Tier::Tier1,
            category: Category::ReadFile,
            score: 0.9,
            threshold: Some(0.5),
            decision_id: DecisionId::new(),
            override_active: false,
        }
    }

    fn knowledge_with_sop() -> KnowledgeResult {
        KnowledgeResult {
            sops: vec![SopMatch { label: "git-force-push".to_string(), path: "sops/git/force_push.md".to_string(), content: "be careful".to_string(), priority: 100 }],
            memories: vec![],
            elapsed: Duration::from_millis(5),
            timed_out: false,
        }
    }

    fn empty_knowledge() -> KnowledgeResult {
        KnowledgeResult { sops: vec![], memories: vec![], elapsed: Duration::from_millis(1), timed_out: false }
    }

    #[test]
    fn disabled_level_always_allows_silently() {
        let disabled = EnforcementEngine::new(EnforcementLevel::Disabled, 0, 4000, 10_000, 3_600_000);
        let verdict = disabled.decide("git_push", None, None, &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), None);
        assert_eq!(verdict, EnforcementVerdict::AllowSilently);
    }

    #[test]
    fn no_knowledge_allows_silently_even_at_strict_level() {
        let engine = EnforcementEngine::new(EnforcementLevel::Strict, 0, 4000, 10_000, 3_600_000);
        let verdict = engine.decide("git_push", None, None, &gate_result(), &empty_knowledge(), Timestamp::from_epoch_millis(0), None);
        assert_eq!(verdict, EnforcementVerdict::AllowSilently);
    }

    #[test]
    fn strict_level_with_knowledge_blocks_pending_review() {
        let engine = EnforcementEngine::new(EnforcementLevel::Strict, 900_000, 4000, 10_000, 3_600_000);
        let verdict = engine.decide("git_push", Some("/repo"), Some("git"), &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), None);
        assert!(matches!(verdict, EnforcementVerdict::BlockPendingReview { .. }));
    }

    #[test]
    fn repeated_injection_within_cooldown_allows_silently() {
        let engine = EnforcementEngine::new(EnforcementLevel::Strict, 900_000, 4000, 10_000, 3_600_000);
        let first = engine.decide("git_push", Some("/repo"), Some("git"), &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(1000), None);
        assert!(matches!(first, EnforcementVerdict::BlockPendingReview { .. }));
        let second = engine.decide("git_push", Some("/repo"), Some("git"), &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(2000), None);
        assert_eq!(second, EnforcementVerdict::AllowSilently);
    }

    #[test]
    fn valid_bypass_token_is_consumed_exactly_once() {
        let engine = EnforcementEngine::new(EnforcementLevel::Strict, 0, 4000, 10_000, 3_600_000);
        engine.issue_bypass_token("tok-1".to_string(), Timestamp::from_epoch_millis(0));
        let first = engine.decide("git_push", None, None, &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), Some("tok-1"));
        assert_eq!(first, EnforcementVerdict::AllowUnderBypass);
        let second = engine.decide("git_push", None, None, &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), Some("tok-1"));
        assert_ne!(second, EnforcementVerdict::AllowUnderBypass);
    }

    #[test]
    fn category_level_promotes_to_category_when_sop_present() {
        let engine = EnforcementEngine::new(EnforcementLevel::Category, 0, 4000, 10_000, 3_600_000);
        let verdict = engine.decide("git_push", None, None, &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), None);
        assert!(matches!(verdict, EnforcementVerdict::BlockPendingReview { .. }));
    }

    #[test]
    fn category_level_without_sop_stays_advisory() {
        let engine = EnforcementEngine::new(EnforcementLevel::Category, 0, 4000, 10_000, 3_600_000);
        let memory_only = KnowledgeResult {
            sops: vec![],
            memories: vec![MemoryRecord { id: "m1".to_string(), content: "past incident".to_string(), confidence: 0.8, category: "deploy".to_string(), last_accessed: Timestamp::from_epoch_millis(0), access_count: 1 }],
            elapsed: Duration::from_millis(1),
            timed_out: false,
        };
        let verdict = engine.decide("git_push", None, None, &gate_result(), &memory_only, Timestamp::from_epoch_millis(0), None);
        assert!(matches!(verdict, EnforcementVerdict::AllowWithAdvisory { .. }));
    }

    #[test]
    fn payload_is_capped_at_max_length_with_marker() {
        let engine = EnforcementEngine::new(EnforcementLevel::Advisory, 0, 120, 10_000, 3_600_000);
        let verdict = engine.decide("git_push", Some("/repo"), Some("git"), &gate_result(), &knowledge_with_sop(), Timestamp::from_epoch_millis(0), None);
        let EnforcementVerdict::AllowWithAdvisory { payload } = verdict else { panic!("expected advisory") };
        assert!(payload.len() <= 120);
        assert!(payload.ends_with("...truncated...]"));
    }
}
