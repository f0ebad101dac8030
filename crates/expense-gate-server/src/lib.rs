// crates/expense-gate-server/src/lib.rs
// ============================================================================
// Module: Expense Gate Server Library
// Description: HTTP surface and audit sinks for the Expense Gate access core.
// Purpose: Expose webhook ingress and the access query API over axum.
// Dependencies: crate::{audit, server}
// ============================================================================

//! ## Overview
//! The server crate wires configuration, stores, and the access core into an
//! axum router. Billing webhooks and access queries are recorded through
//! JSON-line [`audit::AuditSink`] implementations.

pub mod audit;
pub mod server;

pub use audit::AccessAuditEvent;
pub use audit::AccessAuditParams;
pub use audit::AuditSecuritySink;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::WebhookAuditEvent;
pub use audit::WebhookAuditParams;
pub use audit::build_audit_sink;
pub use audit::token_fingerprint;
pub use server::ExpenseGateServer;
pub use server::ServerError;
pub use server::ServerInputs;
pub use server::StoreBackend;
