// crates/expense-gate-core/src/runtime/environment.rs
// ============================================================================
// Module: Expense Gate Environment Guard
// Description: Production classification and unauthenticated fallback policy.
// Purpose: Refuse fallback identities unless a safe context is positively confirmed.
// Dependencies: crate::core, crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! The guard classifies the runtime as production when any of these holds:
//! 1. the environment name is `production` (or `prod`);
//! 2. the deployment stage is `production` (or `prod`);
//! 3. the region equals the configured production region, unless the
//!    local-development override is set.
//!
//! The override only suppresses the region heuristic. A fallback identity is
//! never issued in a production-classified runtime; asking for one there is
//! recorded as a critical security event and fails the request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::EnvironmentSignals;
use crate::core::SecurityEvent;
use crate::core::SecurityEventKind;
use crate::core::Severity;
use crate::core::SubjectId;
use crate::core::Timestamp;
use crate::interfaces::SecurityEventSink;
use crate::runtime::token::Principal;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Labels accepted as an explicit production signal.
const PRODUCTION_LABELS: [&str; 2] = ["production", "prod"];

/// Default fallback identity lifetime.
pub const DEFAULT_FALLBACK_TTL_SECS: u64 = 60 * 60;

/// Signal that contributed to a production classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionSignal {
    /// Environment name says production.
    EnvironmentName,
    /// Deployment stage says production.
    DeploymentStage,
    /// Region matches the production region.
    RegionHeuristic,
}

impl ProductionSignal {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentName => "environment_name",
            Self::DeploymentStage => "deployment_stage",
            Self::RegionHeuristic => "region_heuristic",
        }
    }
}

impl fmt::Display for ProductionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Production classification with the signals that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionClassification {
    /// Matching signals in priority order; empty means non-production.
    pub reasons: Vec<ProductionSignal>,
}

impl ProductionClassification {
    /// Returns true when any signal classified production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Identity substituted for a missing or invalid token in local development.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackIdentity {
    /// Subject the fallback principal acts as.
    pub subject_id: SubjectId,
    /// Optional email for the fallback principal.
    pub email: Option<String>,
    /// Lifetime of the issued principal.
    pub ttl_secs: u64,
}

/// Guard configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentGuardConfig {
    /// Region that identifies production deployments.
    pub production_region: Option<String>,
    /// Fallback identity; absent means fallback is never available.
    pub fallback: Option<FallbackIdentity>,
}

/// Raised when a fallback is requested in a production-classified runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentSecurityError {
    /// Fallback identity refused.
    #[error("unauthenticated fallback refused: runtime classified as production ({reasons})")]
    BypassAttempt {
        /// Comma-separated production signals.
        reasons: String,
    },
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Environment guard bound to signals captured at startup.
#[derive(Clone)]
pub struct EnvironmentGuard {
    /// Signals captured at process start.
    signals: EnvironmentSignals,
    /// Guard settings.
    config: EnvironmentGuardConfig,
    /// Security event sink.
    sink: Arc<dyn SecurityEventSink>,
}

impl fmt::Debug for EnvironmentGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentGuard")
            .field("signals", &self.signals)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EnvironmentGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(
        signals: EnvironmentSignals,
        config: EnvironmentGuardConfig,
        sink: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            signals,
            config,
            sink,
        }
    }

    /// Returns the captured signals.
    #[must_use]
    pub const fn signals(&self) -> &EnvironmentSignals {
        &self.signals
    }

    /// Classifies the runtime.
    #[must_use]
    pub fn classify(&self) -> ProductionClassification {
        let mut reasons = Vec::new();
        if is_production_label(self.signals.environment_name.as_deref()) {
            reasons.push(ProductionSignal::EnvironmentName);
        }
        if is_production_label(self.signals.deployment_stage.as_deref()) {
            reasons.push(ProductionSignal::DeploymentStage);
        }
        if !self.signals.local_development
            && let (Some(region), Some(production_region)) =
                (self.signals.region.as_deref(), self.config.production_region.as_deref())
            && region.trim().eq_ignore_ascii_case(production_region.trim())
        {
            reasons.push(ProductionSignal::RegionHeuristic);
        }
        ProductionClassification { reasons }
    }

    /// Returns true when the runtime is classified as production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.classify().is_production()
    }

    /// Returns true only in an explicit local-development, non-production
    /// runtime with a configured fallback identity.
    #[must_use]
    pub fn allow_unauthenticated_fallback(&self) -> bool {
        !self.is_production() && self.signals.local_development && self.config.fallback.is_some()
    }

    /// Returns true when the fallback path should be consulted at all.
    #[must_use]
    pub const fn fallback_requested(&self) -> bool {
        self.signals.local_development || self.config.fallback.is_some()
    }

    /// Attempts to issue the fallback principal.
    ///
    /// Returns `Ok(None)` when fallback is simply unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentSecurityError::BypassAttempt`] when the runtime is
    /// classified as production; a critical security event is emitted first.
    pub fn fallback_principal(&self, now: Timestamp) -> Result<Option<Principal>, EnvironmentSecurityError> {
        let classification = self.classify();
        if classification.is_production() {
            let reasons: Vec<String> =
                classification.reasons.iter().map(|reason| reason.as_str().to_string()).collect();
            self.sink.record(&SecurityEvent {
                kind: SecurityEventKind::AuthenticationBypassAttempt,
                severity: Severity::Critical,
                timestamp: now,
                message: "unauthenticated fallback requested in production-classified runtime"
                    .to_string(),
                signals: self.signals.clone(),
                production_reasons: reasons.clone(),
                subject: self.config.fallback.as_ref().map(|identity| identity.subject_id.to_string()),
            });
            return Err(EnvironmentSecurityError::BypassAttempt {
                reasons: reasons.join(","),
            });
        }
        if !self.allow_unauthenticated_fallback() {
            return Ok(None);
        }
        let Some(identity) = &self.config.fallback else {
            return Ok(None);
        };
        self.sink.record(&SecurityEvent {
            kind: SecurityEventKind::UnauthenticatedFallbackIssued,
            severity: Severity::Warning,
            timestamp: now,
            message: "unauthenticated fallback identity issued".to_string(),
            signals: self.signals.clone(),
            production_reasons: Vec::new(),
            subject: Some(identity.subject_id.to_string()),
        });
        let ttl = i64::try_from(identity.ttl_secs).unwrap_or(i64::MAX);
        Ok(Some(Principal {
            subject_id: identity.subject_id.clone(),
            issued_at: now,
            expires_at: now.plus_secs(ttl),
            tenant_id: None,
            email: identity.email.clone(),
        }))
    }
}

/// Returns true when `value` is an explicit production label.
fn is_production_label(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        let value = value.trim();
        PRODUCTION_LABELS.iter().any(|label| label.eq_ignore_ascii_case(value))
    })
}
