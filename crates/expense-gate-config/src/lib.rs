// crates/expense-gate-config/src/lib.rs
// ============================================================================
// Module: Expense Gate Config Library
// Description: Canonical config model and fail-closed validation.
// Purpose: Single source of truth for expense-gate.toml semantics.
// Dependencies: expense-gate-core, expense-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `expense-gate-config` defines the configuration model for the Expense Gate
//! server and CLI, validates it strictly, and captures process environment
//! signals once at startup.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
