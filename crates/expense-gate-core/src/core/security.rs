// crates/expense-gate-core/src/core/security.rs
// ============================================================================
// Module: Expense Gate Security Events
// Description: Deployment signals and structured security event payloads.
// Purpose: Carry environment classification inputs and audit-grade events.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`EnvironmentSignals`] is captured once at process start and handed to
//! the environment guard; nothing downstream re-reads process environment.
//! [`SecurityEvent`] is the payload emitted through the security event sink
//! when the guard refuses or grants an unauthenticated fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Environment Signals
// ============================================================================

/// Deployment signals used to classify production.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSignals {
    /// Explicit environment name (for example `production`).
    pub environment_name: Option<String>,
    /// Explicit deployment stage.
    pub deployment_stage: Option<String>,
    /// Deployment region identifier.
    pub region: Option<String>,
    /// Explicit local-development override.
    pub local_development: bool,
}

// ============================================================================
// SECTION: Security Events
// ============================================================================

/// Security event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    /// Fallback identity requested in a production-classified environment.
    AuthenticationBypassAttempt,
    /// Fallback identity issued in an explicit non-production environment.
    UnauthenticatedFallbackIssued,
}

impl SecurityEventKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthenticationBypassAttempt => "AUTHENTICATION_BYPASS_ATTEMPT",
            Self::UnauthenticatedFallbackIssued => "UNAUTHENTICATED_FALLBACK_ISSUED",
        }
    }
}

/// Security event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate response.
    Critical,
}

/// Structured security event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Event kind.
    pub kind: SecurityEventKind,
    /// Event severity.
    pub severity: Severity,
    /// Time of the event.
    pub timestamp: Timestamp,
    /// Human-readable summary.
    pub message: String,
    /// Signals observed at classification time.
    pub signals: EnvironmentSignals,
    /// Signals that classified the runtime as production.
    pub production_reasons: Vec<String>,
    /// Subject involved, when known.
    pub subject: Option<String>,
}
