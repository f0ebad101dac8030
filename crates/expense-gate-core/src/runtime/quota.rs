// crates/expense-gate-core/src/runtime/quota.rs
// ============================================================================
// Module: Expense Gate Quota Enforcer
// Description: Exact resource caps via atomic conditional increments.
// Purpose: Admit at most `limit` creations per tenant, kind, and period.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! Admission is one call to [`QuotaStore::try_increment`], which increments
//! only when the pre-increment value is below the limit. There is no read
//! before the write. Unlimited caps admit without touching the counter.
//! Store failures surface as [`QuotaError`]; callers must deny.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::Limit;
use crate::core::QuotaKey;
use crate::core::ResourceKind;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::interfaces::IncrementOutcome;
use crate::interfaces::QuotaStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rejection payload used to drive upgrade prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaExceeded {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Contracted cap.
    pub limit: u64,
    /// Current usage.
    pub usage: u64,
}

/// Admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted and admitted; `usage` is the post-increment count.
    Admitted {
        /// Usage after admission.
        usage: u64,
    },
    /// Admitted under an unlimited cap; no counter was touched.
    Unmetered,
    /// Cap reached.
    Rejected(QuotaExceeded),
}

impl Admission {
    /// Returns true unless rejected.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Quota failures. The caller must treat these as a denial.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Store failure or unknown outcome.
    #[error("quota store failure: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Enforcer
// ============================================================================

/// Quota enforcer over a [`QuotaStore`].
#[derive(Clone)]
pub struct QuotaEnforcer {
    /// Durable counters.
    store: Arc<dyn QuotaStore>,
}

impl QuotaEnforcer {
    /// Creates an enforcer.
    #[must_use]
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Attempts to admit one creation of `kind` for `tenant_id` under `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when the store cannot confirm the outcome.
    pub fn try_admit(
        &self,
        tenant_id: &TenantId,
        kind: ResourceKind,
        limit: Limit,
        now: Timestamp,
    ) -> Result<Admission, QuotaError> {
        let Limit::AtMost(cap) = limit else {
            return Ok(Admission::Unmetered);
        };
        let key = QuotaKey::at(tenant_id.clone(), kind, now);
        match self.store.try_increment(&key, cap)? {
            IncrementOutcome::Admitted { count } => Ok(Admission::Admitted { usage: count }),
            IncrementOutcome::AtLimit { count } => Ok(Admission::Rejected(QuotaExceeded {
                kind,
                limit: cap,
                usage: count,
            })),
        }
    }

    /// Releases one unit of `kind` (resource deleted). Saturates at zero.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when the store write fails.
    pub fn release(&self, tenant_id: &TenantId, kind: ResourceKind, now: Timestamp) -> Result<u64, QuotaError> {
        let key = QuotaKey::at(tenant_id.clone(), kind, now);
        Ok(self.store.decrement(&key)?)
    }

    /// Returns current usage of `kind` in the period containing `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError`] when the lookup fails.
    pub fn usage(&self, tenant_id: &TenantId, kind: ResourceKind, now: Timestamp) -> Result<u64, QuotaError> {
        let key = QuotaKey::at(tenant_id.clone(), kind, now);
        Ok(self.store.count(&key)?)
    }
}
