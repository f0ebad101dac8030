// crates/expense-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Expense Gate Interfaces
// Description: Backend-agnostic store and audit interfaces.
// Purpose: Define the durable-state contracts the access core depends on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The access core keeps no shared in-process state between requests. Every
//! cross-request guarantee is pushed into these interfaces:
//! - [`QuotaStore::try_increment`] is a single conditional write.
//! - [`SubscriptionStore::commit_event`] records the ledger entry and the
//!   resulting subscription record in one atomic unit.
//!
//! Implementations must fail closed: an unknown outcome is an error, never a
//! success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::EventId;
use crate::core::Membership;
use crate::core::QuotaKey;
use crate::core::SecurityEvent;
use crate::core::SubjectId;
use crate::core::SubscriptionRecord;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::WebhookEventRecord;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("gate store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("gate store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("gate store version mismatch: {0}")]
    VersionMismatch(String),
    /// Caller supplied invalid data.
    #[error("gate store invalid data: {0}")]
    Invalid(String),
    /// Store did not answer in time; the outcome is unknown.
    #[error("gate store unavailable: {0}")]
    Unavailable(String),
    /// Store reported an error.
    #[error("gate store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Memberships
// ============================================================================

/// Membership lookups and maintenance.
pub trait MembershipStore: Send + Sync {
    /// Loads the membership for a subject.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn membership(&self, subject_id: &SubjectId) -> Result<Option<Membership>, StoreError>;

    /// Inserts or replaces a membership.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_membership(&self, membership: &Membership) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Subscriptions
// ============================================================================

/// Result of evaluating a webhook against the current subscription record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Persist this record.
    Write(SubscriptionRecord),
    /// Leave the record unchanged.
    Skip(String),
    /// Write nothing, not even the ledger entry, so a corrected redelivery
    /// can still apply.
    Reject(TransitionRejection),
}

/// Why an event was refused without being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRejection {
    /// The event names a plan tier absent from the limit table.
    UnknownPlanTier(String),
    /// A creation event names no plan tier and none can be inherited.
    MissingPlanTier,
}

/// Outcome of [`SubscriptionStore::commit_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The event id was already in the ledger; nothing was written.
    Duplicate {
        /// Record as currently stored.
        current: Option<SubscriptionRecord>,
    },
    /// The record was written and the event marked processed.
    Written {
        /// Record as now stored.
        record: SubscriptionRecord,
    },
    /// The event was marked processed without changing the record.
    Skipped {
        /// Record as currently stored.
        current: Option<SubscriptionRecord>,
        /// Why no transition applied.
        reason: String,
    },
    /// The transition refused the event; neither the record nor the ledger
    /// was written.
    Rejected {
        /// Record as currently stored.
        current: Option<SubscriptionRecord>,
        /// Refusal reason.
        rejection: TransitionRejection,
    },
}

/// Transition callback evaluated inside the store's atomic unit.
pub type TransitionFn<'a> = dyn Fn(Option<&SubscriptionRecord>) -> TransitionDecision + 'a;

/// Subscription records plus the webhook idempotency ledger.
pub trait SubscriptionStore: Send + Sync {
    /// Loads the subscription record for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn subscription(&self, tenant_id: &TenantId) -> Result<Option<SubscriptionRecord>, StoreError>;

    /// Applies one webhook event atomically.
    ///
    /// Within a single atomic unit the store must: return
    /// [`CommitOutcome::Duplicate`] if `event.event_id` is already in the
    /// ledger; otherwise evaluate `decide` against the tenant's current
    /// record, persist the record when told to, and insert `event` into the
    /// ledger. Either both writes happen or neither does. A
    /// [`TransitionDecision::Reject`] writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the unit cannot be committed.
    fn commit_event(
        &self,
        tenant_id: &TenantId,
        event: &WebhookEventRecord,
        decide: &TransitionFn<'_>,
    ) -> Result<CommitOutcome, StoreError>;

    /// Loads a ledger entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn webhook_event(&self, event_id: &EventId) -> Result<Option<WebhookEventRecord>, StoreError>;

    /// Deletes ledger entries received strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn prune_webhook_events(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Quota Counters
// ============================================================================

/// Outcome of a conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was below the limit and now holds `count`.
    Admitted {
        /// Post-increment value.
        count: u64,
    },
    /// The counter was already at (or above) the limit; nothing changed.
    AtLimit {
        /// Current value.
        count: u64,
    },
}

/// Durable quota counters.
pub trait QuotaStore: Send + Sync {
    /// Increments the counter iff its pre-increment value is `< limit`, as a
    /// single atomic operation. Missing counters start at zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the outcome cannot be confirmed.
    fn try_increment(&self, key: &QuotaKey, limit: u64) -> Result<IncrementOutcome, StoreError>;

    /// Atomically decrements the counter, saturating at zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn decrement(&self, key: &QuotaKey) -> Result<u64, StoreError>;

    /// Returns the current counter value (zero when absent).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn count(&self, key: &QuotaKey) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Security Event Sink
// ============================================================================

/// Receives structured security events.
pub trait SecurityEventSink: Send + Sync {
    /// Records a security event.
    fn record(&self, event: &SecurityEvent);
}

/// Security event sink that discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSecurityEventSink;

impl SecurityEventSink for NoopSecurityEventSink {
    fn record(&self, _event: &SecurityEvent) {}
}
