// crates/expense-gate-core/src/core/mod.rs
// ============================================================================
// Module: Expense Gate Core Types
// Description: Domain types shared by every access-core component.
// Purpose: Group identifiers, time, plans, access, subscriptions, and events.
// Dependencies: serde, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! Plain data types with stable wire forms. No I/O happens here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod hashing;
pub mod identifiers;
pub mod plan;
pub mod security;
pub mod subscription;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access::Membership;
pub use access::MembershipStatus;
pub use access::Permission;
pub use access::ResourceRef;
pub use access::Role;
pub use access::ScopedCapability;
pub use hashing::sha256_hex;
pub use identifiers::EventId;
pub use identifiers::SubjectId;
pub use identifiers::TenantId;
pub use plan::LIFETIME_PERIOD;
pub use plan::Limit;
pub use plan::PLAN_LIMITS_VERSION;
pub use plan::PlanLimits;
pub use plan::PlanTier;
pub use plan::QuotaKey;
pub use plan::ResourceKind;
pub use plan::UnknownPlanTier;
pub use security::EnvironmentSignals;
pub use security::SecurityEvent;
pub use security::SecurityEventKind;
pub use security::Severity;
pub use subscription::SubscriptionRecord;
pub use subscription::SubscriptionStatus;
pub use subscription::WebhookEventRecord;
pub use subscription::effective_tier;
pub use self::time::Clock;
pub use self::time::ManualClock;
pub use self::time::SystemClock;
pub use self::time::Timestamp;
