// crates/expense-gate-core/src/core/subscription.rs
// ============================================================================
// Module: Expense Gate Subscription Records
// Description: Subscription status, per-tenant subscription records, and ledger entries.
// Purpose: Persisted shapes written by the subscription state machine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! One [`SubscriptionRecord`] exists per tenant once the first creation
//! webhook arrives. Records are never deleted; `canceled` is terminal for a
//! provider subscription id. [`WebhookEventRecord`] is the idempotency ledger
//! entry keyed by provider event id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EventId;
use crate::core::identifiers::TenantId;
use crate::core::plan::PlanTier;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No subscription has been observed.
    None,
    /// Trial period.
    Trialing,
    /// Paid and current.
    Active,
    /// Latest charge failed; access is retained.
    PastDue,
    /// Terminal.
    Canceled,
}

impl SubscriptionStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Returns true when the plan tier of a record in this status is honored.
    #[must_use]
    pub const fn is_entitled(self) -> bool {
        matches!(self, Self::Trialing | Self::Active | Self::PastDue)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Per-tenant subscription state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Contracted plan tier.
    pub plan_tier: PlanTier,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Billing provider subscription id.
    pub provider_subscription_id: Option<String>,
    /// Billing provider customer id.
    pub provider_customer_id: Option<String>,
    /// End of the current paid or trial period.
    pub current_period_end: Option<Timestamp>,
    /// Time of the last applied change.
    pub updated_at: Timestamp,
    /// Event that produced this version of the record.
    pub last_event_id: Option<EventId>,
}

/// Returns the tier whose limits apply to a tenant with `record`.
///
/// Tenants without a record, or whose subscription is canceled, fall back to
/// [`PlanTier::Free`].
#[must_use]
pub fn effective_tier(record: Option<&SubscriptionRecord>) -> PlanTier {
    match record {
        Some(record) if record.status.is_entitled() => record.plan_tier,
        _ => PlanTier::Free,
    }
}

/// Idempotency ledger entry for one billing webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Provider event id.
    pub event_id: EventId,
    /// First time the event was seen.
    pub received_at: Timestamp,
    /// Provider event type string.
    pub event_type: String,
    /// Whether the event has been applied (or deliberately ignored).
    pub processed: bool,
}
