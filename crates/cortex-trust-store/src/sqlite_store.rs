// crates/cortex-trust-store/src/sqlite_store.rs
// ============================================================================
// Module: SQLite Trust Store
// Description: Single-writer SqliteTrustStore implementing TrustStore.
// Purpose: Durable, transactional persistence for every trust gate entity.
// Dependencies: cortex-trust-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! One [`SqliteTrustStore`] owns one `SQLite` connection behind a
//! [`std::sync::Mutex`]. Every [`cortex_trust_core::TrustStore`] method
//! serializes through that mutex, matching this system's synchronous,
//! per-tool-call write pattern (the teacher's writer-thread/batching design
//! targets higher write throughput than a single trust decision per call
//! needs; see `DESIGN.md` for the full comparison).

use std::path::Path;
use std::sync::Mutex;

use cortex_trust_core::AdvisoryActionRate;
use cortex_trust_core::Category;
use cortex_trust_core::ConfirmationId;
use cortex_trust_core::Decision;
use cortex_trust_core::DecisionId;
use cortex_trust_core::GateDecisionKind;
use cortex_trust_core::Milestone;
use cortex_trust_core::MilestoneId;
use cortex_trust_core::MilestoneType;
use cortex_trust_core::Outcome;
use cortex_trust_core::OverrideId;
use cortex_trust_core::OverrideType;
use cortex_trust_core::PendingConfirmation;
use cortex_trust_core::PendingOutcome;
use cortex_trust_core::ResolveOutcomeResult;
use cortex_trust_core::StoreError;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustOverride;
use cortex_trust_core::TrustScore;
use cortex_trust_core::TrustStore;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use thiserror::Error;

use crate::migrate;

/// Default busy timeout applied to every connection.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors opening or migrating a [`SqliteTrustStore`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The underlying `SQLite` library reported an error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// The on-disk schema version is newer than this binary understands.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Connection configuration for [`SqliteTrustStore::open`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file. `:memory:` is accepted for tests.
    pub path: String,
    /// Busy-wait timeout in milliseconds before a lock contention error.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config pointing at a file path with default timeouts.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().display().to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Builds a config for an in-memory database, used by tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { path: ":memory:".to_string(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
    }
}

/// The sole `SQLite`-backed implementation of `TrustStore`.
pub struct SqliteTrustStore {
    connection: Mutex<Connection>,
}

impl SqliteTrustStore {
    /// Opens (creating if absent) and migrates a trust store at `config.path`.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut connection = open_connection(config)?;
        migrate::bootstrap(&mut connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Locks the single writer connection, surfacing a poisoned mutex (a
    /// prior panic while holding the lock) as a backend error rather than
    /// panicking the caller in turn.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Backend("trust store mutex poisoned".to_string()))
    }
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

// ============================================================================
// SECTION: Row mapping helpers
// ============================================================================

fn category_from_row(row: &Row<'_>, idx: &str) -> rusqlite::Result<Category> {
    let label: String = row.get(idx)?;
    Category::from_str(&label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other(
            format!("unknown category label: {label}"),
        )))
    })
}

fn outcome_from_row(row: &Row<'_>, idx: &str) -> rusqlite::Result<Outcome> {
    let label: String = row.get(idx)?;
    Outcome::from_str(&label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other(
            format!("unknown outcome label: {label}"),
        )))
    })
}

fn gate_decision_from_label(label: &str) -> rusqlite::Result<GateDecisionKind> {
    match label {
        "pass" => Ok(GateDecisionKind::Pass),
        "pause" => Ok(GateDecisionKind::Pause),
        "block" => Ok(GateDecisionKind::Block),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(format!("unknown gate decision label: {other}"))),
        )),
    }
}

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<Decision> {
    let gate_label: String = row.get("gate_decision")?;
    let tier_num: u8 = row.get("tier")?;
    Ok(Decision {
        decision_id: DecisionId::from_uuid(
            row.get::<_, String>("decision_id")?.parse().map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
            })?,
        ),
        timestamp: Timestamp::from_epoch_millis(row.get::<_, i64>("timestamp")? as u64),
        session_id: row.get("session_id")?,
        tool_name: row.get("tool_name")?,
        params_hash: row.get("params_hash")?,
        params_summary: row.get("params_summary")?,
        tier: tier_from_u8(tier_num)?,
        category: category_from_row(row, "category")?,
        gate_decision: gate_decision_from_label(&gate_label)?,
        score_at_decision: row.get("score_at_decision")?,
        override_active: row.get::<_, i64>("override_active")? != 0,
        outcome: outcome_from_row(row, "outcome")?,
        outcome_source: row.get("outcome_source")?,
        outcome_resolved_at: row
            .get::<_, Option<i64>>("outcome_resolved_at")?
            .map(|v| Timestamp::from_epoch_millis(v as u64)),
        correction_message: row.get("correction_message")?,
    })
}

fn tier_from_u8(value: u8) -> rusqlite::Result<cortex_trust_core::Tier> {
    use cortex_trust_core::Tier;
    match value {
        1 => Ok(Tier::Tier1),
        2 => Ok(Tier::Tier2),
        3 => Ok(Tier::Tier3),
        4 => Ok(Tier::Tier4),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            Box::new(std::io::Error::other(format!("unknown tier: {other}"))),
        )),
    }
}

fn trust_score_from_row(row: &Row<'_>) -> rusqlite::Result<TrustScore> {
    let tier_num: u8 = row.get("tier")?;
    Ok(TrustScore {
        category: category_from_row(row, "category")?,
        tier: tier_from_u8(tier_num)?,
        current_score: row.get("current_score")?,
        ewma_alpha: row.get("ewma_alpha")?,
        decision_count: row.get::<_, i64>("decision_count")? as u64,
        decisions_last_30d: row.get::<_, i64>("decisions_last_30d")? as u64,
        last_updated: Timestamp::from_epoch_millis(row.get::<_, i64>("last_updated")? as u64),
        initial_score: row.get("initial_score")?,
    })
}

fn override_from_row(row: &Row<'_>) -> rusqlite::Result<TrustOverride> {
    let type_label: String = row.get("override_type")?;
    Ok(TrustOverride {
        override_id: OverrideId::from_uuid(row.get::<_, String>("override_id")?.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
        })?),
        category: category_from_row(row, "category")?,
        override_type: OverrideType::from_str(&type_label).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad override type")))
        })?,
        reason: row.get("reason")?,
        granted_by: row.get("granted_by")?,
        granted_at: Timestamp::from_epoch_millis(row.get::<_, i64>("granted_at")? as u64),
        expires_at: row.get::<_, Option<i64>>("expires_at")?.map(|v| Timestamp::from_epoch_millis(v as u64)),
        revoked_at: row.get::<_, Option<i64>>("revoked_at")?.map(|v| Timestamp::from_epoch_millis(v as u64)),
        active: row.get::<_, i64>("active")? != 0,
    })
}

fn milestone_type_from_label(label: &str) -> rusqlite::Result<MilestoneType> {
    Ok(match label {
        "first_auto_approve" => MilestoneType::FirstAutoApprove,
        "tier_promotion" => MilestoneType::TierPromotion,
        "tier_demotion" => MilestoneType::TierDemotion,
        "blocked" => MilestoneType::Blocked,
        "override_granted" => MilestoneType::OverrideGranted,
        "override_revoked" => MilestoneType::OverrideRevoked,
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::other(format!("unknown milestone type: {other}"))),
            ));
        }
    })
}

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    let type_label: String = row.get("milestone_type")?;
    Ok(Milestone {
        milestone_id: MilestoneId::from_uuid(row.get::<_, String>("milestone_id")?.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
        })?),
        timestamp: Timestamp::from_epoch_millis(row.get::<_, i64>("timestamp")? as u64),
        category: category_from_row(row, "category")?,
        milestone_type: milestone_type_from_label(&type_label)?,
        old_score: row.get("old_score")?,
        new_score: row.get("new_score")?,
        trigger: row.get("trigger")?,
    })
}

fn pending_outcome_from_row(row: &Row<'_>) -> rusqlite::Result<PendingOutcome> {
    Ok(PendingOutcome {
        decision_id: DecisionId::from_uuid(row.get::<_, String>("decision_id")?.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
        })?),
        feedback_window_expires_at: Timestamp::from_epoch_millis(row.get::<_, i64>("feedback_window_expires_at")? as u64),
        created_at: Timestamp::from_epoch_millis(row.get::<_, i64>("created_at")? as u64),
    })
}

fn pending_confirmation_from_row(row: &Row<'_>) -> rusqlite::Result<PendingConfirmation> {
    let params_text: String = row.get("params_json")?;
    let params_json = serde_json::from_str(&params_text).unwrap_or(serde_json::Value::Null);
    Ok(PendingConfirmation {
        confirmation_id: ConfirmationId::from_uuid(row.get::<_, String>("confirmation_id")?.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
        })?),
        decision_id: DecisionId::from_uuid(row.get::<_, String>("decision_id")?.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other("bad uuid")))
        })?),
        tool_name: row.get("tool_name")?,
        params_json,
        summary: row.get("summary")?,
        score: row.get("score")?,
        threshold: row.get("threshold")?,
        category: category_from_row(row, "category")?,
        expires_at: Timestamp::from_epoch_millis(row.get::<_, i64>("expires_at")? as u64),
        resolved: row.get::<_, i64>("resolved")? != 0,
        resolution: row.get("resolution")?,
        resolved_at: row.get::<_, Option<i64>>("resolved_at")?.map(|v| Timestamp::from_epoch_millis(v as u64)),
    })
}

fn advisory_rate_from_row(row: &Row<'_>) -> rusqlite::Result<AdvisoryActionRate> {
    Ok(AdvisoryActionRate {
        source: row.get("source")?,
        advisory_type: row.get("advisory_type")?,
        surfaced_count: row.get::<_, i64>("surfaced_count")? as u64,
        followed_count: row.get::<_, i64>("followed_count")? as u64,
        window_started_at: Timestamp::from_epoch_millis(row.get::<_, i64>("window_started_at")? as u64),
        last_updated: Timestamp::from_epoch_millis(row.get::<_, i64>("last_updated")? as u64),
    })
}

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

// ============================================================================
// SECTION: TrustStore implementation
// ============================================================================

impl TrustStore for SqliteTrustStore {
    fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO decision_log
                (decision_id, timestamp, session_id, tool_name, params_hash, params_summary,
                 tier, category, gate_decision, score_at_decision, override_active, outcome,
                 outcome_source, outcome_resolved_at, correction_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                decision.decision_id.as_uuid().to_string(),
                decision.timestamp.epoch_millis() as i64,
                decision.session_id,
                decision.tool_name,
                decision.params_hash,
                decision.params_summary,
                decision.tier.number(),
                decision.category.as_str(),
                decision.gate_decision.as_str(),
                decision.score_at_decision,
                decision.override_active as i64,
                decision.outcome.as_str(),
                decision.outcome_source,
                decision.outcome_resolved_at.map(|v| v.epoch_millis() as i64),
                decision.correction_message,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_decision(&self, decision_id: DecisionId) -> Result<Option<Decision>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM decision_log WHERE decision_id = ?1",
            params![decision_id.as_uuid().to_string()],
            |row| decision_from_row(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn list_decisions_since(&self, since: Timestamp, limit: u32) -> Result<Vec<Decision>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM decision_log WHERE timestamp >= ?1 ORDER BY timestamp DESC LIMIT ?2")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![since.epoch_millis() as i64, limit], |row| decision_from_row(row))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn get_trust_score(&self, category: Category) -> Result<Option<TrustScore>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM trust_scores WHERE category = ?1",
            params![category.as_str()],
            |row| trust_score_from_row(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn upsert_trust_score(&self, score: &TrustScore) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO trust_scores
                (category, tier, current_score, ewma_alpha, decision_count,
                 decisions_last_30d, last_updated, initial_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(category) DO UPDATE SET
                tier = excluded.tier,
                current_score = excluded.current_score,
                ewma_alpha = excluded.ewma_alpha,
                decision_count = excluded.decision_count,
                decisions_last_30d = excluded.decisions_last_30d,
                last_updated = excluded.last_updated,
                initial_score = excluded.initial_score",
            params![
                score.category.as_str(),
                score.tier.number(),
                score.current_score,
                score.ewma_alpha,
                score.decision_count as i64,
                score.decisions_last_30d as i64,
                score.last_updated.epoch_millis() as i64,
                score.initial_score,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_active_override(&self, category: Category) -> Result<Option<TrustOverride>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM trust_overrides WHERE category = ?1 AND active = 1
             ORDER BY granted_at DESC LIMIT 1",
            params![category.as_str()],
            |row| override_from_row(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn insert_override(&self, trust_override: &TrustOverride) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO trust_overrides
                (override_id, category, override_type, reason, granted_by,
                 granted_at, expires_at, revoked_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trust_override.override_id.as_uuid().to_string(),
                trust_override.category.as_str(),
                trust_override.override_type.as_str(),
                trust_override.reason,
                trust_override.granted_by,
                trust_override.granted_at.epoch_millis() as i64,
                trust_override.expires_at.map(|v| v.epoch_millis() as i64),
                trust_override.revoked_at.map(|v| v.epoch_millis() as i64),
                trust_override.active as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn revoke_all_overrides(&self, revoked_at: Timestamp) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count = conn
            .execute(
                "UPDATE trust_overrides SET active = 0, revoked_at = ?1 WHERE active = 1",
                params![revoked_at.epoch_millis() as i64],
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn deactivate_overrides_for_category(&self, category: Category, revoked_at: Timestamp) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count = conn
            .execute(
                "UPDATE trust_overrides SET active = 0, revoked_at = ?1 WHERE active = 1 AND category = ?2",
                params![revoked_at.epoch_millis() as i64, category.as_str()],
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn list_active_overrides(&self) -> Result<Vec<TrustOverride>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM trust_overrides WHERE active = 1 ORDER BY granted_at DESC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| override_from_row(row))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn insert_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO milestones
                (milestone_id, timestamp, category, milestone_type, old_score, new_score, trigger)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                milestone.milestone_id.as_uuid().to_string(),
                milestone.timestamp.epoch_millis() as i64,
                milestone.category.as_str(),
                milestone.milestone_type.as_str(),
                milestone.old_score,
                milestone.new_score,
                milestone.trigger,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn list_milestones(&self, category: Option<Category>, limit: u32) -> Result<Vec<Milestone>, StoreError> {
        let conn = self.lock()?;
        let rows = match category {
            Some(category) => {
                let mut stmt = conn
                    .prepare("SELECT * FROM milestones WHERE category = ?1 ORDER BY timestamp DESC LIMIT ?2")
                    .map_err(db_err)?;
                stmt.query_map(params![category.as_str(), limit], |row| milestone_from_row(row))
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT * FROM milestones ORDER BY timestamp DESC LIMIT ?1")
                    .map_err(db_err)?;
                stmt.query_map(params![limit], |row| milestone_from_row(row))
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?
            }
        };
        Ok(rows)
    }

    fn insert_pending_outcome(&self, pending: &PendingOutcome) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_outcomes (decision_id, feedback_window_expires_at, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                pending.decision_id.as_uuid().to_string(),
                pending.feedback_window_expires_at.epoch_millis() as i64,
                pending.created_at.epoch_millis() as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn list_expired_pending_outcomes(&self, as_of: Timestamp) -> Result<Vec<PendingOutcome>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM pending_outcomes WHERE feedback_window_expires_at <= ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![as_of.epoch_millis() as i64], |row| pending_outcome_from_row(row))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn resolve_outcome(
        &self,
        decision_id: DecisionId,
        outcome: Outcome,
        source: &str,
        alpha: f64,
        resolved_at: Timestamp,
    ) -> Result<ResolveOutcomeResult, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let existing: Option<(String, bool)> = tx
            .query_row(
                "SELECT category, outcome != 'pending' FROM decision_log WHERE decision_id = ?1",
                params![decision_id.as_uuid().to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((category_label, already_resolved)) = existing else {
            return Ok(ResolveOutcomeResult { applied: false, new_score: None });
        };
        if already_resolved {
            return Ok(ResolveOutcomeResult { applied: false, new_score: None });
        }

        tx.execute(
            "UPDATE decision_log
             SET outcome = ?1, outcome_source = ?2, outcome_resolved_at = ?3
             WHERE decision_id = ?4",
            params![
                outcome.as_str(),
                source,
                resolved_at.epoch_millis() as i64,
                decision_id.as_uuid().to_string(),
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM pending_outcomes WHERE decision_id = ?1",
            params![decision_id.as_uuid().to_string()],
        )
        .map_err(db_err)?;

        let mut score_row = tx
            .query_row(
                "SELECT * FROM trust_scores WHERE category = ?1",
                params![category_label],
                |row| trust_score_from_row(row),
            )
            .map_err(db_err)?;

        let new_current = cortex_trust_core::apply_outcome(score_row.current_score, outcome, alpha);
        score_row.current_score = new_current;
        score_row.decision_count += 1;
        score_row.last_updated = resolved_at;

        let thirty_days_ago = resolved_at.minus_millis(30 * 24 * 60 * 60 * 1000).epoch_millis() as i64;
        let decisions_last_30d: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM decision_log WHERE category = ?1 AND timestamp >= ?2",
                params![category_label, thirty_days_ago],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        score_row.decisions_last_30d = decisions_last_30d as u64;

        tx.execute(
            "UPDATE trust_scores
             SET current_score = ?1, decision_count = ?2, decisions_last_30d = ?3, last_updated = ?4
             WHERE category = ?5",
            params![
                score_row.current_score,
                score_row.decision_count as i64,
                score_row.decisions_last_30d as i64,
                score_row.last_updated.epoch_millis() as i64,
                category_label,
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(ResolveOutcomeResult { applied: true, new_score: Some(score_row) })
    }

    fn insert_pending_confirmation(&self, confirmation: &PendingConfirmation) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let params_text = serde_json::to_string(&confirmation.params_json).map_err(|err| StoreError::Backend(err.to_string()))?;
        conn.execute(
            "INSERT INTO pending_confirmations
                (confirmation_id, decision_id, tool_name, params_json, summary, score,
                 threshold, category, expires_at, resolved, resolution, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                confirmation.confirmation_id.as_uuid().to_string(),
                confirmation.decision_id.as_uuid().to_string(),
                confirmation.tool_name,
                params_text,
                confirmation.summary,
                confirmation.score,
                confirmation.threshold,
                confirmation.category.as_str(),
                confirmation.expires_at.epoch_millis() as i64,
                confirmation.resolved as i64,
                confirmation.resolution,
                confirmation.resolved_at.map(|v| v.epoch_millis() as i64),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_pending_confirmation(&self, confirmation_id: ConfirmationId) -> Result<Option<PendingConfirmation>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM pending_confirmations WHERE confirmation_id = ?1",
            params![confirmation_id.as_uuid().to_string()],
            |row| pending_confirmation_from_row(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn list_pending_confirmations(&self) -> Result<Vec<PendingConfirmation>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM pending_confirmations WHERE resolved = 0 ORDER BY expires_at ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| pending_confirmation_from_row(row))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn resolve_pending_confirmation(
        &self,
        confirmation_id: ConfirmationId,
        resolution: &str,
        resolved_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE pending_confirmations
                 SET resolved = 1, resolution = ?1, resolved_at = ?2
                 WHERE confirmation_id = ?3 AND resolved = 0",
                params![resolution, resolved_at.epoch_millis() as i64, confirmation_id.as_uuid().to_string()],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    fn get_advisory_rate(&self, source: &str, advisory_type: &str) -> Result<Option<AdvisoryActionRate>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM advisory_action_rates WHERE source = ?1 AND advisory_type = ?2",
            params![source, advisory_type],
            |row| advisory_rate_from_row(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn upsert_advisory_rate(&self, rate: &AdvisoryActionRate) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO advisory_action_rates
                (source, advisory_type, surfaced_count, followed_count, window_started_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source, advisory_type) DO UPDATE SET
                surfaced_count = excluded.surfaced_count,
                followed_count = excluded.followed_count,
                window_started_at = excluded.window_started_at,
                last_updated = excluded.last_updated",
            params![
                rate.source,
                rate.advisory_type,
                rate.surfaced_count as i64,
                rate.followed_count as i64,
                rate.window_started_at.epoch_millis() as i64,
                rate.last_updated.epoch_millis() as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use cortex_trust_core::Category;
    use cortex_trust_core::Decision;
    use cortex_trust_core::DecisionId;
    use cortex_trust_core::GateDecisionKind;
    use cortex_trust_core::Outcome;
    use cortex_trust_core::Tier;
    use cortex_trust_core::Timestamp;
    use cortex_trust_core::TrustStore;

    use super::SqliteStoreConfig;
    use super::SqliteTrustStore;

    fn test_store() -> SqliteTrustStore {
        SqliteTrustStore::open(&SqliteStoreConfig::in_memory()).expect("open in-memory store")
    }

    fn sample_decision(category: Category) -> Decision {
        Decision {
            decision_id: DecisionId::new(),
            timestamp: Timestamp::now(),
            session_id: "interactive-1".to_string(),
            tool_name: "read_file".to_string(),
            params_hash: "abc123".to_string(),
            params_summary: "path=/tmp/a".to_string(),
            tier: category.tier(),
            category,
            gate_decision: GateDecisionKind::Pass,
            score_at_decision: 0.75,
            override_active: false,
            outcome: Outcome::Pending,
            outcome_source: None,
            outcome_resolved_at: None,
            correction_message: None,
        }
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trust.sqlite3");

        {
            let store = SqliteTrustStore::open(&SqliteStoreConfig::file(&path)).expect("open file store");
            store.insert_decision(&sample_decision(Category::ReadFile)).expect("insert");
        }

        let reopened = SqliteTrustStore::open(&SqliteStoreConfig::file(&path)).expect("reopen file store");
        let score = reopened.get_trust_score(Category::ReadFile).expect("query").expect("seeded row");
        assert_eq!(score.category, Category::ReadFile);
    }

    #[test]
    fn bootstrap_seeds_every_category() {
        let store = test_store();
        for category in Category::ALL {
            let score = store.get_trust_score(*category).expect("query").expect("seeded row");
            assert_eq!(score.category, *category);
        }
    }

    #[test]
    fn tier4_categories_seed_with_zero_alpha() {
        let store = test_store();
        let score = store.get_trust_score(Category::FinancialStripe).expect("query").expect("row");
        assert_eq!(score.tier, Tier::Tier4);
        assert_eq!(score.ewma_alpha, 0.0);
        assert_eq!(score.current_score, 0.0);
    }

    #[test]
    fn insert_and_fetch_decision_round_trips() {
        let store = test_store();
        let decision = sample_decision(Category::ReadFile);
        store.insert_decision(&decision).expect("insert");
        let fetched = store.get_decision(decision.decision_id).expect("query").expect("row present");
        assert_eq!(fetched, decision);
    }

    #[test]
    fn resolve_outcome_updates_decision_and_score_atomically() {
        let store = test_store();
        let decision = sample_decision(Category::ReadFile);
        store.insert_decision(&decision).expect("insert");

        let alpha = 0.08;
        let result = store
            .resolve_outcome(decision.decision_id, Outcome::Pass, "feedback_window_expired", alpha, Timestamp::now())
            .expect("resolve");
        assert!(result.applied);
        let new_score = result.new_score.expect("score present");
        assert!(new_score.current_score >= 0.75);

        let fetched = store.get_decision(decision.decision_id).expect("query").expect("row");
        assert_eq!(fetched.outcome, Outcome::Pass);
    }

    #[test]
    fn resolve_outcome_is_idempotent() {
        let store = test_store();
        let decision = sample_decision(Category::ReadFile);
        store.insert_decision(&decision).expect("insert");

        let first = store
            .resolve_outcome(decision.decision_id, Outcome::Pass, "feedback_window_expired", 0.08, Timestamp::now())
            .expect("resolve");
        assert!(first.applied);

        let second = store
            .resolve_outcome(decision.decision_id, Outcome::CorrectedSignificant, "late_correction", 0.08, Timestamp::now())
            .expect("resolve again");
        assert!(!second.applied);

        let fetched = store.get_decision(decision.decision_id).expect("query").expect("row");
        assert_eq!(fetched.outcome, Outcome::Pass, "second resolution must not overwrite the first");
    }

    #[test]
    fn resolve_outcome_on_missing_decision_is_a_no_op() {
        let store = test_store();
        let result = store
            .resolve_outcome(DecisionId::new(), Outcome::Pass, "feedback_window_expired", 0.08, Timestamp::now())
            .expect("resolve");
        assert!(!result.applied);
        assert!(result.new_score.is_none());
    }

    #[test]
    fn tier4_category_score_never_moves() {
        let store = test_store();
        let decision = sample_decision(Category::FinancialStripe);
        store.insert_decision(&decision).expect("insert");
        let result = store
            .resolve_outcome(decision.decision_id, Outcome::Pass, "feedback_window_expired", 0.0, Timestamp::now())
            .expect("resolve");
        let score = result.new_score.expect("score");
        assert_eq!(score.current_score, 0.0);
    }

    #[test]
    fn override_round_trips_and_revoke_all_clears_it() {
        use cortex_trust_core::OverrideId;
        use cortex_trust_core::OverrideType;
        use cortex_trust_core::TrustOverride;

        let store = test_store();
        let over = TrustOverride {
            override_id: OverrideId::new(),
            category: Category::Deploy,
            override_type: OverrideType::Granted,
            reason: "on-call approved".to_string(),
            granted_by: "interactive-matthew".to_string(),
            granted_at: Timestamp::now(),
            expires_at: None,
            revoked_at: None,
            active: true,
        };
        store.insert_override(&over).expect("insert override");
        let active = store.get_active_override(Category::Deploy).expect("query").expect("active");
        assert_eq!(active.override_id, over.override_id);

        let revoked_count = store.revoke_all_overrides(Timestamp::now()).expect("revoke all");
        assert_eq!(revoked_count, 1);
        assert!(store.get_active_override(Category::Deploy).expect("query").is_none());
    }
}
