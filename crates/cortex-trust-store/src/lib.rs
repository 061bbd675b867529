// crates/cortex-trust-store/src/lib.rs
// ============================================================================
// Module: Cortex Trust Store
// Description: SQLite-backed implementation of cortex_trust_core::TrustStore.
// Purpose: Durable, single-writer persistence for the trust gate data model.
// Dependencies: cortex-trust-core, rusqlite, serde_json, thiserror, uuid
// ============================================================================

//! ## Overview
//! This crate is the only place in the workspace that depends on `rusqlite`
//! directly. It owns one `SQLite` connection per [`SqliteTrustStore`], guarded
//! by a single mutex so every write serializes through one writer, and
//! implements [`cortex_trust_core::TrustStore`] against the six tables
//! bootstrapped by [`migrate::bootstrap`].
//! Security posture: every query binds parameters through `rusqlite::params!`;
//! no SQL string ever incorporates caller-supplied data directly.

pub mod migrate;
mod sqlite_store;

pub use sqlite_store::SqliteStoreConfig;
pub use sqlite_store::SqliteStoreError;
pub use sqlite_store::SqliteTrustStore;
