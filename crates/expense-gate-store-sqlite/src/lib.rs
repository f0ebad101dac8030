// crates/expense-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Gate Store
// Description: Durable store backend for the Expense Gate access core.
// Purpose: Persist memberships, subscriptions, the webhook ledger, and quota counters.
// Dependencies: expense-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteGateStore`], a single-file `SQLite` backend for
//! every store interface in `expense-gate-core`. Quota admission and webhook
//! commits run as immediate transactions so several server processes may
//! share one database file.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteGateStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
