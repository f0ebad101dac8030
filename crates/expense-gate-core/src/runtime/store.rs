// crates/expense-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Expense Gate In-Memory Store
// Description: Mutex-guarded in-memory implementation of every store interface.
// Purpose: Provide a deterministic store for tests and local development.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! A single mutex guards all state, so each trait call is one atomic unit,
//! which is the contract a durable store provides through transactions.
//! State is lost on restart; use the `SQLite` store for anything durable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::EventId;
use crate::core::Membership;
use crate::core::QuotaKey;
use crate::core::SubjectId;
use crate::core::SubscriptionRecord;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::WebhookEventRecord;
use crate::interfaces::CommitOutcome;
use crate::interfaces::IncrementOutcome;
use crate::interfaces::MembershipStore;
use crate::interfaces::QuotaStore;
use crate::interfaces::StoreError;
use crate::interfaces::SubscriptionStore;
use crate::interfaces::TransitionDecision;
use crate::interfaces::TransitionFn;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// All in-memory state.
#[derive(Debug, Default)]
struct GateState {
    /// Memberships by subject.
    memberships: BTreeMap<SubjectId, Membership>,
    /// Subscription records by tenant.
    subscriptions: BTreeMap<TenantId, SubscriptionRecord>,
    /// Idempotency ledger by event id.
    webhook_events: BTreeMap<EventId, WebhookEventRecord>,
    /// Quota counters.
    counters: BTreeMap<QuotaKey, u64>,
}

/// In-memory gate store for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGateStore {
    /// Shared state protected by one mutex.
    state: Arc<Mutex<GateState>>,
}

impl InMemoryGateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, GateState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("gate store mutex poisoned".to_string()))
    }
}

impl MembershipStore for InMemoryGateStore {
    fn membership(&self, subject_id: &SubjectId) -> Result<Option<Membership>, StoreError> {
        Ok(self.lock()?.memberships.get(subject_id).cloned())
    }

    fn upsert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        self.lock()?.memberships.insert(membership.subject_id.clone(), membership.clone());
        Ok(())
    }
}

impl SubscriptionStore for InMemoryGateStore {
    fn subscription(&self, tenant_id: &TenantId) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(self.lock()?.subscriptions.get(tenant_id).cloned())
    }

    fn commit_event(
        &self,
        tenant_id: &TenantId,
        event: &WebhookEventRecord,
        decide: &TransitionFn<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let mut guard = self.lock()?;
        let current = guard.subscriptions.get(tenant_id).cloned();
        if guard.webhook_events.contains_key(&event.event_id) {
            return Ok(CommitOutcome::Duplicate { current });
        }
        let outcome = match decide(current.as_ref()) {
            TransitionDecision::Write(record) => {
                if &record.tenant_id != tenant_id {
                    return Err(StoreError::Invalid("record tenant does not match event tenant".to_string()));
                }
                guard.subscriptions.insert(tenant_id.clone(), record.clone());
                CommitOutcome::Written { record }
            }
            TransitionDecision::Skip(reason) => CommitOutcome::Skipped { current, reason },
            TransitionDecision::Reject(rejection) => {
                return Ok(CommitOutcome::Rejected { current, rejection });
            }
        };
        guard.webhook_events.insert(event.event_id.clone(), event.clone());
        drop(guard);
        Ok(outcome)
    }

    fn webhook_event(&self, event_id: &EventId) -> Result<Option<WebhookEventRecord>, StoreError> {
        Ok(self.lock()?.webhook_events.get(event_id).cloned())
    }

    fn prune_webhook_events(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let before = guard.webhook_events.len();
        guard.webhook_events.retain(|_, record| record.received_at >= cutoff);
        let removed = before - guard.webhook_events.len();
        drop(guard);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

impl QuotaStore for InMemoryGateStore {
    fn try_increment(&self, key: &QuotaKey, limit: u64) -> Result<IncrementOutcome, StoreError> {
        let mut guard = self.lock()?;
        let count = guard.counters.get(key).copied().unwrap_or(0);
        if count >= limit {
            return Ok(IncrementOutcome::AtLimit { count });
        }
        guard.counters.insert(key.clone(), count + 1);
        drop(guard);
        Ok(IncrementOutcome::Admitted { count: count + 1 })
    }

    fn decrement(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let Some(counter) = guard.counters.get_mut(key) else {
            return Ok(0);
        };
        *counter = counter.saturating_sub(1);
        Ok(*counter)
    }

    fn count(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        Ok(self.lock()?.counters.get(key).copied().unwrap_or(0))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
