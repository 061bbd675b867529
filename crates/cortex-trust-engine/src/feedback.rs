// crates/cortex-trust-engine/src/feedback.rs
// ============================================================================
// Module: Feedback Tracker & Pattern Promoter
// Description: Tracks whether delivered advisories get acted on, and
//              promotes consistently-useful advisories into memory atoms.
// Purpose: Let the Enforcement Engine's injection rate self-tune, and let
//          recurring operator corrections become durable causal knowledge.
// Dependencies: async-trait, cortex-trust-core, std::sync
// ============================================================================

//! ## Overview
//! Two independent detection paths feed one per-`(source, advisory_type)`
//! action-rate row: [`FeedbackTracker::record_tool_call`] (implicit, scoped
//! to a source-relevant tool allowlist to avoid the known over-broad-match
//! failure mode) and [`FeedbackTracker::record_explicit_ack`] (acknowledgment
//! phrase in the user's reply). [`FeedbackTracker::sweep_expired`] decrements
//! a row when a delivered advisory's window closes with no action.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use cortex_trust_core::AdvisoryActionRate;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustStore;

use crate::knowledge::KnowledgeError;
use crate::knowledge::MemoryStore;

const RATE_DECREMENT: f64 = 0.05;
const MIN_OBSERVATIONS_FOR_SUPPRESSION: u64 = 5;
const SUPPRESSION_FLOOR: f64 = 0.15;
const MIN_ACTED_ON_FOR_PROMOTION: u64 = 3;
const PROMOTION_RATE_THRESHOLD: f64 = 0.3;

/// A single advisory delivery awaiting its acknowledgment window to close.
#[derive(Debug, Clone)]
struct PendingDelivery {
    source: String,
    advisory_type: String,
    keyword_allowlist: Vec<String>,
    tool_allowlist: Vec<String>,
    expires_at: Timestamp,
}

/// The result of checking a tool call against open delivery windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActedOnMatch {
    pub source: String,
    pub advisory_type: String,
}

/// Tracks advisory delivery/acknowledgment and promotes recurring,
/// consistently-useful advisories into memory atoms.
pub struct FeedbackTracker {
    store: Arc<dyn TrustStore>,
    memory_store: Arc<dyn MemoryStore>,
    ack_window_ms: u64,
    pending: Mutex<HashMap<String, PendingDelivery>>,
}

impl FeedbackTracker {
    /// Builds a tracker over `store`, using `memory_store` for pattern
    /// promotion lookups and writes.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>, memory_store: Arc<dyn MemoryStore>, ack_window_ms: u64) -> Self {
        Self { store, memory_store, ack_window_ms, pending: Mutex::new(HashMap::new()) }
    }

    /// Registers a delivered advisory, opening its acknowledgment window and
    /// bumping `surfaced_count`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_delivery(
        &self,
        delivery_id: &str,
        source: &str,
        advisory_type: &str,
        keyword_allowlist: &[String],
        tool_allowlist: &[String],
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(
                delivery_id.to_string(),
                PendingDelivery {
                    source: source.to_string(),
                    advisory_type: advisory_type.to_string(),
                    keyword_allowlist: keyword_allowlist.to_vec(),
                    tool_allowlist: tool_allowlist.to_vec(),
                    expires_at: now.plus_millis(self.ack_window_ms),
                },
            );
        }
        self.bump(source, advisory_type, now, |rate| rate.surfaced_count += 1)
    }

    /// Checks `tool_name`/`params_json` against every open delivery window;
    /// a match (allowed tool, allowlisted keyword present) resolves that
    /// delivery as acted-on and bumps `followed_count`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_tool_call(&self, tool_name: &str, params_json: &str, now: Timestamp) -> Result<Vec<ActedOnMatch>, StoreError> {
        let matched: Vec<(String, PendingDelivery)> = {
            let Ok(mut pending) = self.pending.lock() else { return Ok(Vec::new()) };
            let matched_ids: Vec<String> = pending
                .iter()
                .filter(|(_, delivery)| {
                    now.is_before_or_at(delivery.expires_at)
                        && delivery.tool_allowlist.iter().any(|t| t == tool_name)
                        && delivery.keyword_allowlist.iter().any(|kw| params_json.contains(kw.as_str()))
                })
                .map(|(id, _)| id.clone())
                .collect();
            matched_ids.into_iter().filter_map(|id| pending.remove(&id).map(|d| (id, d))).collect()
        };

        let mut results = Vec::with_capacity(matched.len());
        for (_, delivery) in matched {
            self.bump(&delivery.source, &delivery.advisory_type, now, |rate| rate.followed_count += 1)?;
            results.push(ActedOnMatch { source: delivery.source, advisory_type: delivery.advisory_type });
        }
        Ok(results)
    }

    /// Checks `user_text` for an acknowledgment phrase and, if present,
    /// resolves the most recent open delivery for `source`/`advisory_type` as
    /// acted-on via the explicit signal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn record_explicit_ack(&self, source: &str, advisory_type: &str, user_text: &str, ack_phrases: &[&str], now: Timestamp) -> Result<bool, StoreError> {
        if !ack_phrases.iter().any(|phrase| user_text.to_lowercase().contains(&phrase.to_lowercase())) {
            return Ok(false);
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|_, delivery| !(delivery.source == source && delivery.advisory_type == advisory_type));
        }
        self.bump(source, advisory_type, now, |rate| rate.followed_count += 1)?;
        Ok(true)
    }

    /// Resolves every delivery window that has closed by `now` with no
    /// action, decrementing its rate row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn sweep_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        let expired: Vec<PendingDelivery> = {
            let Ok(mut pending) = self.pending.lock() else { return Ok(0) };
            let expired_ids: Vec<String> = pending.iter().filter(|(_, d)| !now.is_before_or_at(d.expires_at)).map(|(id, _)| id.clone()).collect();
            expired_ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
        };
        let count = expired.len() as u64;
        for delivery in expired {
            self.decrement(&delivery.source, &delivery.advisory_type, now)?;
        }
        Ok(count)
    }

    /// Returns `true` if delivery frequency for this `(source, advisory_type)`
    /// pair should be halved: enough observations have accumulated and the
    /// action rate has fallen below the configured floor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure.
    pub fn should_suppress_delivery(&self, source: &str, advisory_type: &str) -> Result<bool, StoreError> {
        let Some(rate) = self.store.get_advisory_rate(source, advisory_type)? else { return Ok(false) };
        if rate.surfaced_count < MIN_OBSERVATIONS_FOR_SUPPRESSION {
            return Ok(false);
        }
        let ratio = action_ratio(&rate);
        Ok(ratio < SUPPRESSION_FLOOR && rate.surfaced_count % 2 == 0)
    }

    /// Evaluates whether `(source, advisory_type)` has earned promotion into
    /// a durable memory atom, and creates one if so and no sufficiently
    /// similar atom already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a backend failure, or
    /// [`KnowledgeError`] if the memory-store lookup/write fails.
    pub async fn maybe_promote_pattern(
        &self,
        source: &str,
        advisory_type: &str,
        subject: &str,
        action: &str,
        outcome: &str,
        consequences: &str,
    ) -> Result<Option<String>, PromotionError> {
        let Some(rate) = self.store.get_advisory_rate(source, advisory_type)? else { return Ok(None) };
        if rate.followed_count < MIN_ACTED_ON_FOR_PROMOTION || action_ratio(&rate) <= PROMOTION_RATE_THRESHOLD {
            return Ok(None);
        }

        let existing = self
            .memory_store
            .search_memories_with_confidence(&[subject.to_string(), action.to_string()], &[], 0.9, 1)
            .await
            .map_err(PromotionError::Memory)?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let confidence = 0.5 + 0.2 * (action_ratio(&rate) - PROMOTION_RATE_THRESHOLD).clamp(0.0, 1.0);
        let atom_id = self
            .memory_store
            .atom_create(subject, action, outcome, consequences, &format!("feedback_promotion:{source}:{advisory_type}"), confidence.clamp(0.5, 0.7))
            .await
            .map_err(PromotionError::Memory)?;
        Ok(Some(atom_id))
    }

    fn bump(&self, source: &str, advisory_type: &str, now: Timestamp, apply: impl FnOnce(&mut AdvisoryActionRate)) -> Result<(), StoreError> {
        let mut rate = self.store.get_advisory_rate(source, advisory_type)?.unwrap_or_else(|| AdvisoryActionRate {
            source: source.to_string(),
            advisory_type: advisory_type.to_string(),
            surfaced_count: 0,
            followed_count: 0,
            window_started_at: now,
            last_updated: now,
        });
        apply(&mut rate);
        rate.last_updated = now;
        self.store.upsert_advisory_rate(&rate)
    }

    fn decrement(&self, source: &str, advisory_type: &str, now: Timestamp) -> Result<(), StoreError> {
        let Some(mut rate) = self.store.get_advisory_rate(source, advisory_type)? else { return Ok(()) };
        rate.followed_count = rate.followed_count.saturating_sub((rate.surfaced_count as f64 * RATE_DECREMENT) as u64);
        rate.last_updated = now;
        self.store.upsert_advisory_rate(&rate)
    }
}

fn action_ratio(rate: &AdvisoryActionRate) -> f64 {
    if rate.surfaced_count == 0 {
        0.0
    } else {
        rate.followed_count as f64 / rate.surfaced_count as f64
    }
}

/// Errors from [`FeedbackTracker::maybe_promote_pattern`].
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("memory store error: {0}")]
    Memory(KnowledgeError),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;

    use async_trait::async_trait;
    use cortex_trust_store::SqliteStoreConfig;
    use cortex_trust_store::SqliteTrustStore;

    use super::FeedbackTracker;
    use crate::knowledge::KnowledgeError;
    use crate::knowledge::MemoryRecord;
    use crate::knowledge::MemoryStore;

    struct StubMemoryStore {
        existing: Vec<MemoryRecord>,
    }

    #[async_trait]
    impl MemoryStore for StubMemoryStore {
        async fn search_memories_with_confidence(
            &self,
            _query: &[String],
            _categories: &[String],
            _min_confidence: f64,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, KnowledgeError> {
            Ok(self.existing.clone())
        }

        async fn atom_create(&self, _subject: &str, _action: &str, _outcome: &str, _consequences: &str, _source: &str, confidence: f64) -> Result<String, KnowledgeError> {
            Ok(format!("atom-{confidence:.2}"))
        }
    }

    fn tracker(existing_atoms: Vec<MemoryRecord>) -> FeedbackTracker {
        let store: Arc<dyn cortex_trust_core::TrustStore> = Arc::new(SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open store"));
        FeedbackTracker::new(store, Arc::new(StubMemoryStore { existing: existing_atoms }), 10 * 60 * 1000)
    }

    #[test]
    fn matching_tool_call_within_window_is_acted_on() {
        let tracker = tracker(vec![]);
        let now = cortex_trust_core::Timestamp::from_epoch_millis(1000);
        tracker
            .record_delivery("d1", "sops/git/force_push.md", "sop", &["--force".to_string()], &["exec".to_string()], now)
            .expect("record");
        let matches = tracker.record_tool_call("exec", r#"{"command": "git push --force"}"#, now.plus_millis(1000)).expect("tool call");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source, "sops/git/force_push.md");
    }

    #[test]
    fn tool_call_outside_allowlist_does_not_count() {
        let tracker = tracker(vec![]);
        let now = cortex_trust_core::Timestamp::from_epoch_millis(1000);
        tracker
            .record_delivery("d1", "sops/git/force_push.md", "sop", &["--force".to_string()], &["exec".to_string()], now)
            .expect("record");
        let matches = tracker.record_tool_call("write_file", r#"{"path": "--force"}"#, now.plus_millis(1000)).expect("tool call");
        assert!(matches.is_empty());
    }

    #[test]
    fn expired_delivery_decrements_without_panicking() {
        let tracker = tracker(vec![]);
        let now = cortex_trust_core::Timestamp::from_epoch_millis(1000);
        tracker.record_delivery("d1", "source-a", "sop", &[], &[], now).expect("record");
        let swept = tracker.sweep_expired(now.plus_millis(20 * 60 * 1000)).expect("sweep");
        assert_eq!(swept, 1);
    }

    #[test]
    fn explicit_ack_phrase_counts_as_acted_on() {
        let tracker = tracker(vec![]);
        let now = cortex_trust_core::Timestamp::from_epoch_millis(1000);
        tracker.record_delivery("d1", "source-a", "sop", &[], &[], now).expect("record");
        let acted = tracker.record_explicit_ack("source-a", "sop", "ok, got it, will do", &["got it"], now).expect("ack");
        assert!(acted);
    }

    #[tokio::test]
    async fn promotion_is_skipped_when_a_similar_atom_already_exists() {
        let existing = MemoryRecord {
            id: "atom-existing".to_string(),
            content: "already here".to_string(),
            confidence: 0.9,
            category: "deploy".to_string(),
            last_accessed: cortex_trust_core::Timestamp::from_epoch_millis(0),
            access_count: 1,
        };
        let tracker = tracker(vec![existing]);
        let now = cortex_trust_core::Timestamp::from_epoch_millis(1000);
        for _ in 0..4 {
            tracker.record_delivery("d", "source-a", "sop", &["{}".to_string()], &["exec".to_string()], now).expect("record");
            let matches = tracker.record_tool_call("exec", "{}", now).expect("tool call");
            assert_eq!(matches.len(), 1);
        }
        let promoted = tracker.maybe_promote_pattern("source-a", "sop", "deploy", "ran migration first", "clean deploy", "no rollback needed").await.expect("promote");
        assert_eq!(promoted, None);
    }
}
