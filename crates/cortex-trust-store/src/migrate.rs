// crates/cortex-trust-store/src/migrate.rs
// ============================================================================
// Module: Cortex Trust Schema Migration
// Description: Idempotent schema bootstrap for the trust gate SQLite store.
// Purpose: Create (or advance) the six core tables plus score-row seeding.
// Dependencies: cortex-trust-core, rusqlite
// ============================================================================

//! ## Overview
//! Mirrors the teacher's `store_meta(version INTEGER)` + `CREATE TABLE IF NOT
//! EXISTS` versioning idiom: [`bootstrap`] is safe to call on every process
//! start. A fresh database gets the full schema in one transaction; an
//! existing database at the current version is a no-op; a future schema
//! version we don't recognize is a hard error rather than silent data loss.

use cortex_trust_core::Category;
use cortex_trust_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::sqlite_store::SqliteStoreError;

/// Current schema version. Bump when adding a migration arm below.
const SCHEMA_VERSION: i64 = 1;

/// Default EWMA alpha per tier, index 0 unused (tiers are 1-indexed).
const DEFAULT_ALPHA: [f64; 5] = [0.0, 0.08, 0.10, 0.15, 0.00];
/// Default initial score per tier, index 0 unused.
const DEFAULT_INITIAL_SCORE: [f64; 5] = [0.0, 0.75, 0.65, 0.55, 0.0];

/// Creates the schema if absent, or validates/advances it if present, then
/// seeds one `trust_scores` row per [`Category::ALL`] via `INSERT OR IGNORE`
/// so re-running bootstrap never clobbers an evolved score.
pub fn bootstrap(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(SCHEMA_V1).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }

    seed_trust_scores(&tx)?;

    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS decision_log (
    decision_id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    params_hash TEXT NOT NULL,
    params_summary TEXT NOT NULL,
    tier INTEGER NOT NULL,
    category TEXT NOT NULL,
    gate_decision TEXT NOT NULL,
    score_at_decision REAL NOT NULL,
    override_active INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    outcome_source TEXT,
    outcome_resolved_at INTEGER,
    correction_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_decision_log_category ON decision_log (category, timestamp);
CREATE INDEX IF NOT EXISTS idx_decision_log_session ON decision_log (session_id, timestamp);

CREATE TABLE IF NOT EXISTS trust_scores (
    category TEXT PRIMARY KEY,
    tier INTEGER NOT NULL,
    current_score REAL NOT NULL,
    ewma_alpha REAL NOT NULL,
    decision_count INTEGER NOT NULL,
    decisions_last_30d INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    initial_score REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS trust_overrides (
    override_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    override_type TEXT NOT NULL,
    reason TEXT NOT NULL,
    granted_by TEXT NOT NULL,
    granted_at INTEGER NOT NULL,
    expires_at INTEGER,
    revoked_at INTEGER,
    active INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trust_overrides_category_active
    ON trust_overrides (category, active);

CREATE TABLE IF NOT EXISTS milestones (
    milestone_id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    category TEXT NOT NULL,
    milestone_type TEXT NOT NULL,
    old_score REAL,
    new_score REAL NOT NULL,
    trigger TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_milestones_category ON milestones (category, timestamp);

CREATE TABLE IF NOT EXISTS pending_outcomes (
    decision_id TEXT PRIMARY KEY,
    feedback_window_expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (decision_id) REFERENCES decision_log (decision_id)
);
CREATE INDEX IF NOT EXISTS idx_pending_outcomes_expiry
    ON pending_outcomes (feedback_window_expires_at);

CREATE TABLE IF NOT EXISTS pending_confirmations (
    confirmation_id TEXT PRIMARY KEY,
    decision_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    params_json TEXT NOT NULL,
    summary TEXT NOT NULL,
    score REAL NOT NULL,
    threshold REAL NOT NULL,
    category TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    resolved INTEGER NOT NULL,
    resolution TEXT,
    resolved_at INTEGER,
    FOREIGN KEY (decision_id) REFERENCES decision_log (decision_id)
);
CREATE INDEX IF NOT EXISTS idx_pending_confirmations_resolved
    ON pending_confirmations (resolved, expires_at);

CREATE TABLE IF NOT EXISTS advisory_action_rates (
    source TEXT NOT NULL,
    advisory_type TEXT NOT NULL,
    surfaced_count INTEGER NOT NULL,
    followed_count INTEGER NOT NULL,
    window_started_at INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    PRIMARY KEY (source, advisory_type)
);
";

/// Seeds one `trust_scores` row per category using `INSERT OR IGNORE`, so
/// calling this on an already-seeded database leaves existing rows (and
/// whatever score history they carry) untouched.
fn seed_trust_scores(tx: &rusqlite::Transaction<'_>) -> Result<(), SqliteStoreError> {
    let now = Timestamp::now().epoch_millis();
    for category in Category::ALL {
        let tier = category.tier().number() as usize;
        let alpha = DEFAULT_ALPHA[tier];
        let initial_score = DEFAULT_INITIAL_SCORE[tier];
        tx.execute(
            "INSERT OR IGNORE INTO trust_scores
                (category, tier, current_score, ewma_alpha, decision_count,
                 decisions_last_30d, last_updated, initial_score)
             VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?3)",
            params![
                category.as_str(),
                category.tier().number(),
                initial_score,
                alpha,
                now as i64,
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Returns the seed score a category's `trust_scores` row was bootstrapped
/// with, used by the engine crate to detect a category's first crossing of
/// its pass threshold for milestone detection.
#[must_use]
pub fn default_initial_score(category: Category) -> f64 {
    DEFAULT_INITIAL_SCORE[category.tier().number() as usize]
}

/// Returns the default EWMA alpha for a category's tier.
#[must_use]
pub fn default_alpha(category: Category) -> f64 {
    DEFAULT_ALPHA[category.tier().number() as usize]
}
