// crates/expense-gate-core/src/runtime/subscription.rs
// ============================================================================
// Module: Expense Gate Subscription State Machine
// Description: Applies verified billing events to per-tenant subscription records.
// Purpose: Maintain subscription state from at-least-once, unordered webhooks.
// Dependencies: crate::{core, interfaces, runtime::webhook}, thiserror
// ============================================================================

//! ## Overview
//! States: `none -> trialing -> active <-> past_due -> canceled`.
//!
//! [`transition`] is a pure function from the current record and an event to
//! a [`TransitionDecision`]. [`SubscriptionStateMachine::apply`] validates
//! tenant linkage, then hands `transition` to
//! [`SubscriptionStore::commit_event`], which checks the idempotency ledger
//! and writes the ledger entry together with the record.
//!
//! Plan tier labels matter only to `created`, `trial_started` and `updated`.
//! Those events are rejected without a ledger entry when the label is unknown,
//! or when a creation has no tier to start from. Every other kind ignores the
//! label. Rejection runs after the duplicate check, so a redelivered event
//! reports as a duplicate whatever it carries.
//!
//! Events that match no transition are still marked processed, so a second
//! copy of a `payment_failed` can never move `active -> past_due` twice.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::EventId;
use crate::core::PlanTier;
use crate::core::SubscriptionRecord;
use crate::core::SubscriptionStatus;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::WebhookEventRecord;
use crate::interfaces::CommitOutcome;
use crate::interfaces::StoreError;
use crate::interfaces::SubscriptionStore;
use crate::interfaces::TransitionDecision;
use crate::interfaces::TransitionRejection;
use crate::runtime::webhook::BillingEventKind;
use crate::runtime::webhook::VerifiedEvent;

// ============================================================================
// SECTION: Errors and Outcomes
// ============================================================================

/// Subscription application failures. No state is written for any of these.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Event lacks tenant linkage.
    #[error("event {event_id} has no tenant context")]
    MissingTenantContext {
        /// Offending event.
        event_id: EventId,
    },
    /// Event names a plan tier absent from the static limit table.
    #[error("event {event_id} references unknown plan tier {tier}")]
    UnknownPlanTier {
        /// Offending event.
        event_id: EventId,
        /// Unrecognized tier label.
        tier: String,
    },
    /// Creation event names no plan tier and no earlier record supplies one.
    #[error("event {event_id} creates a subscription without a plan tier")]
    MissingPlanTier {
        /// Offending event.
        event_id: EventId,
    },
    /// Store failure; the provider will redeliver.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Record written.
    Applied(SubscriptionRecord),
    /// Event id already processed; record unchanged.
    Duplicate(Option<SubscriptionRecord>),
    /// Event recorded without a state change.
    Ignored {
        /// Current record.
        current: Option<SubscriptionRecord>,
        /// Why no transition applied.
        reason: String,
    },
}

impl ApplyOutcome {
    /// Returns the stable outcome label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Duplicate(_) => "duplicate",
            Self::Ignored { .. } => "ignored",
        }
    }

    /// Returns the record after the event.
    #[must_use]
    pub const fn record(&self) -> Option<&SubscriptionRecord> {
        match self {
            Self::Applied(record) => Some(record),
            Self::Duplicate(current) | Self::Ignored { current, .. } => current.as_ref(),
        }
    }
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

/// Validated event data consumed by [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionInput {
    /// Target tenant.
    pub tenant_id: TenantId,
    /// Event kind.
    pub kind: BillingEventKind,
    /// Event id.
    pub event_id: EventId,
    /// Plan tier named by the event.
    pub plan_tier: Option<PlanTier>,
    /// Tier label the event carries when it matches no known tier.
    pub unknown_plan_tier: Option<String>,
    /// Provider subscription id named by the event.
    pub provider_subscription_id: Option<String>,
    /// Provider customer id named by the event.
    pub provider_customer_id: Option<String>,
    /// Billing period end named by the event.
    pub current_period_end: Option<Timestamp>,
    /// Application time.
    pub at: Timestamp,
}

/// Computes the state change for `input` against `current`.
#[must_use]
pub fn transition(current: Option<&SubscriptionRecord>, input: &TransitionInput) -> TransitionDecision {
    let skip = |reason: &str| TransitionDecision::Skip(reason.to_string());
    if let Some(label) = &input.unknown_plan_tier
        && matches!(
            input.kind,
            BillingEventKind::Created | BillingEventKind::TrialStarted | BillingEventKind::Updated
        )
    {
        return TransitionDecision::Reject(TransitionRejection::UnknownPlanTier(label.clone()));
    }
    match (&input.kind, current) {
        (BillingEventKind::Unknown(event_type), _) => {
            TransitionDecision::Skip(format!("unhandled event type {event_type}"))
        }
        (BillingEventKind::Created | BillingEventKind::TrialStarted, None) => start_trial(None, input),
        (BillingEventKind::Created | BillingEventKind::TrialStarted, Some(record)) => {
            let resubscribed = record.status == SubscriptionStatus::Canceled
                && input.provider_subscription_id.is_some()
                && input.provider_subscription_id != record.provider_subscription_id;
            if resubscribed || record.status == SubscriptionStatus::None {
                start_trial(Some(record), input)
            } else {
                skip("subscription already exists")
            }
        }
        (_, None) => skip("no subscription record"),
        (_, Some(record)) if record.status == SubscriptionStatus::Canceled => {
            skip("subscription is canceled")
        }
        (_, Some(record))
            if input.provider_subscription_id.is_some()
                && record.provider_subscription_id.is_some()
                && input.provider_subscription_id != record.provider_subscription_id =>
        {
            skip("event references a different subscription")
        }
        (BillingEventKind::Activated | BillingEventKind::PaymentSucceeded, Some(record)) => {
            match record.status {
                SubscriptionStatus::Trialing | SubscriptionStatus::PastDue => {
                    write(record, input, SubscriptionStatus::Active, record.plan_tier)
                }
                SubscriptionStatus::Active if input.current_period_end.is_some() => {
                    write(record, input, SubscriptionStatus::Active, record.plan_tier)
                }
                _ => skip("no payment transition from current status"),
            }
        }
        (BillingEventKind::PaymentFailed, Some(record)) => {
            if record.status == SubscriptionStatus::Active {
                write(record, input, SubscriptionStatus::PastDue, record.plan_tier)
            } else {
                skip("payment failure only applies to active subscriptions")
            }
        }
        (BillingEventKind::Canceled, Some(record)) => {
            write(record, input, SubscriptionStatus::Canceled, record.plan_tier)
        }
        (BillingEventKind::Updated, Some(record)) => match (record.status, input.plan_tier) {
            (SubscriptionStatus::Active | SubscriptionStatus::Trialing, Some(tier)) => {
                write(record, input, record.status, tier)
            }
            (SubscriptionStatus::Active | SubscriptionStatus::Trialing, None) => {
                skip("update without plan tier")
            }
            _ => skip("plan changes only apply to active or trialing subscriptions"),
        },
    }
}

/// Creates a fresh trialing record, replacing `previous` when resubscribing.
fn start_trial(previous: Option<&SubscriptionRecord>, input: &TransitionInput) -> TransitionDecision {
    let Some(plan_tier) = input.plan_tier.or_else(|| previous.map(|record| record.plan_tier)) else {
        return TransitionDecision::Reject(TransitionRejection::MissingPlanTier);
    };
    TransitionDecision::Write(SubscriptionRecord {
        tenant_id: input.tenant_id.clone(),
        plan_tier,
        status: SubscriptionStatus::Trialing,
        provider_subscription_id: input.provider_subscription_id.clone(),
        provider_customer_id: input
            .provider_customer_id
            .clone()
            .or_else(|| previous.and_then(|record| record.provider_customer_id.clone())),
        current_period_end: input.current_period_end,
        updated_at: input.at,
        last_event_id: Some(input.event_id.clone()),
    })
}

/// Derives the next version of `record`.
fn write(
    record: &SubscriptionRecord,
    input: &TransitionInput,
    status: SubscriptionStatus,
    plan_tier: PlanTier,
) -> TransitionDecision {
    TransitionDecision::Write(SubscriptionRecord {
        tenant_id: record.tenant_id.clone(),
        plan_tier,
        status,
        provider_subscription_id: record
            .provider_subscription_id
            .clone()
            .or_else(|| input.provider_subscription_id.clone()),
        provider_customer_id: input
            .provider_customer_id
            .clone()
            .or_else(|| record.provider_customer_id.clone()),
        current_period_end: input.current_period_end.or(record.current_period_end),
        updated_at: input.at,
        last_event_id: Some(input.event_id.clone()),
    })
}

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// Applies verified billing events through a [`SubscriptionStore`].
#[derive(Clone)]
pub struct SubscriptionStateMachine {
    /// Durable subscription store.
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionStateMachine {
    /// Creates a state machine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Applies one verified event.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] for missing tenant linkage, a creation or
    /// update naming an unknown or absent plan tier, or store failures.
    /// Nothing is written in those cases.
    pub fn apply(&self, event: &VerifiedEvent) -> Result<ApplyOutcome, SubscriptionError> {
        let tenant_id = event.tenant_id().map(TenantId::new).ok_or_else(|| {
            SubscriptionError::MissingTenantContext {
                event_id: event.event_id.clone(),
            }
        })?;
        let (plan_tier, unknown_plan_tier) = match event.data.custom_data.plan_tier.as_deref() {
            Some(label) => match PlanTier::parse(label) {
                Ok(tier) => (Some(tier), None),
                Err(err) => (None, Some(err.0)),
            },
            None => (None, None),
        };
        let input = TransitionInput {
            tenant_id: tenant_id.clone(),
            kind: event.kind.clone(),
            event_id: event.event_id.clone(),
            plan_tier,
            unknown_plan_tier,
            provider_subscription_id: event.provider_subscription_id().map(str::to_string),
            provider_customer_id: event.data.customer_id.clone(),
            current_period_end: event.current_period_end(),
            at: event.received_at,
        };
        let ledger_entry = WebhookEventRecord {
            event_id: event.event_id.clone(),
            received_at: event.received_at,
            event_type: event.event_type.clone(),
            processed: true,
        };
        let outcome = self
            .store
            .commit_event(&tenant_id, &ledger_entry, &|current| transition(current, &input))?;
        let event_id = event.event_id.clone();
        match outcome {
            CommitOutcome::Duplicate { current } => Ok(ApplyOutcome::Duplicate(current)),
            CommitOutcome::Written { record } => Ok(ApplyOutcome::Applied(record)),
            CommitOutcome::Skipped { current, reason } => Ok(ApplyOutcome::Ignored { current, reason }),
            CommitOutcome::Rejected { rejection: TransitionRejection::UnknownPlanTier(tier), .. } => {
                Err(SubscriptionError::UnknownPlanTier { event_id, tier })
            }
            CommitOutcome::Rejected { rejection: TransitionRejection::MissingPlanTier, .. } => {
                Err(SubscriptionError::MissingPlanTier { event_id })
            }
        }
    }

    /// Returns the stored record for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub fn current(&self, tenant_id: &TenantId) -> Result<Option<SubscriptionRecord>, StoreError> {
        self.store.subscription(tenant_id)
    }

    /// Removes ledger entries received before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub fn prune_ledger(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.store.prune_webhook_events(cutoff)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::use_debug, reason = "Test-only assertions.")]

    use super::*;

    fn input(kind: BillingEventKind, tier: Option<PlanTier>) -> TransitionInput {
        TransitionInput {
            tenant_id: TenantId::new("tenant-1"),
            kind,
            event_id: EventId::new("evt-1"),
            plan_tier: tier,
            unknown_plan_tier: None,
            provider_subscription_id: Some("sub-1".to_string()),
            provider_customer_id: Some("cus-1".to_string()),
            current_period_end: Some(Timestamp::from_unix_secs(2_000)),
            at: Timestamp::from_unix_secs(1_000),
        }
    }

    fn record(status: SubscriptionStatus) -> SubscriptionRecord {
        SubscriptionRecord {
            tenant_id: TenantId::new("tenant-1"),
            plan_tier: PlanTier::Starter,
            status,
            provider_subscription_id: Some("sub-1".to_string()),
            provider_customer_id: Some("cus-1".to_string()),
            current_period_end: Some(Timestamp::from_unix_secs(1_500)),
            updated_at: Timestamp::from_unix_secs(900),
            last_event_id: None,
        }
    }

    fn written(decision: TransitionDecision) -> SubscriptionRecord {
        match decision {
            TransitionDecision::Write(record) => record,
            TransitionDecision::Skip(reason) => panic!("expected write, skipped: {reason}"),
            TransitionDecision::Reject(rejection) => panic!("expected write, rejected: {rejection:?}"),
        }
    }

    #[test]
    fn created_without_record_starts_trial() {
        let next = written(transition(None, &input(BillingEventKind::Created, Some(PlanTier::Starter))));
        assert_eq!(next.status, SubscriptionStatus::Trialing);
        assert_eq!(next.plan_tier, PlanTier::Starter);
        assert_eq!(next.last_event_id, Some(EventId::new("evt-1")));
    }

    #[test]
    fn created_without_tier_is_rejected() {
        let decision = transition(None, &input(BillingEventKind::Created, None));
        assert_eq!(decision, TransitionDecision::Reject(TransitionRejection::MissingPlanTier));
    }

    #[test]
    fn unknown_tier_rejects_only_tier_bearing_kinds() {
        let current = record(SubscriptionStatus::Active);
        for kind in [BillingEventKind::Created, BillingEventKind::TrialStarted, BillingEventKind::Updated] {
            let mut event = input(kind, None);
            event.unknown_plan_tier = Some("legacy_gold".to_string());
            assert_eq!(
                transition(Some(&current), &event),
                TransitionDecision::Reject(TransitionRejection::UnknownPlanTier("legacy_gold".to_string()))
            );
        }

        let mut failed = input(BillingEventKind::PaymentFailed, None);
        failed.unknown_plan_tier = Some("legacy_gold".to_string());
        let next = written(transition(Some(&current), &failed));
        assert_eq!(next.status, SubscriptionStatus::PastDue);
        assert_eq!(next.plan_tier, PlanTier::Starter);

        let mut canceled = input(BillingEventKind::Canceled, None);
        canceled.unknown_plan_tier = Some("legacy_gold".to_string());
        assert_eq!(written(transition(Some(&current), &canceled)).status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn payment_moves_trial_and_past_due_to_active() {
        for status in [SubscriptionStatus::Trialing, SubscriptionStatus::PastDue] {
            let current = record(status);
            let next = written(transition(Some(&current), &input(BillingEventKind::PaymentSucceeded, None)));
            assert_eq!(next.status, SubscriptionStatus::Active);
            assert_eq!(next.current_period_end, Some(Timestamp::from_unix_secs(2_000)));
        }
    }

    #[test]
    fn payment_failure_only_from_active() {
        let current = record(SubscriptionStatus::Active);
        let next = written(transition(Some(&current), &input(BillingEventKind::PaymentFailed, None)));
        assert_eq!(next.status, SubscriptionStatus::PastDue);
        let again = transition(Some(&next), &input(BillingEventKind::PaymentFailed, None));
        assert!(matches!(again, TransitionDecision::Skip(_)));
    }

    #[test]
    fn canceled_is_terminal() {
        let current = record(SubscriptionStatus::Canceled);
        for kind in [
            BillingEventKind::Activated,
            BillingEventKind::PaymentFailed,
            BillingEventKind::Updated,
            BillingEventKind::Canceled,
        ] {
            assert!(matches!(
                transition(Some(&current), &input(kind, Some(PlanTier::Enterprise))),
                TransitionDecision::Skip(_)
            ));
        }
    }

    #[test]
    fn resubscription_after_cancel_starts_new_trial() {
        let current = record(SubscriptionStatus::Canceled);
        let mut event = input(BillingEventKind::Created, Some(PlanTier::Professional));
        assert!(matches!(transition(Some(&current), &event), TransitionDecision::Skip(_)));
        event.provider_subscription_id = Some("sub-2".to_string());
        let next = written(transition(Some(&current), &event));
        assert_eq!(next.status, SubscriptionStatus::Trialing);
        assert_eq!(next.provider_subscription_id.as_deref(), Some("sub-2"));
    }

    #[test]
    fn update_changes_tier_and_keeps_status() {
        let current = record(SubscriptionStatus::Active);
        let next = written(transition(
            Some(&current),
            &input(BillingEventKind::Updated, Some(PlanTier::Enterprise)),
        ));
        assert_eq!(next.plan_tier, PlanTier::Enterprise);
        assert_eq!(next.status, SubscriptionStatus::Active);
        let past_due = record(SubscriptionStatus::PastDue);
        assert!(matches!(
            transition(Some(&past_due), &input(BillingEventKind::Updated, Some(PlanTier::Free))),
            TransitionDecision::Skip(_)
        ));
    }

    #[test]
    fn events_for_other_subscriptions_are_ignored() {
        let current = record(SubscriptionStatus::Active);
        let mut event = input(BillingEventKind::Canceled, None);
        event.provider_subscription_id = Some("sub-old".to_string());
        assert!(matches!(transition(Some(&current), &event), TransitionDecision::Skip(_)));
    }
}
