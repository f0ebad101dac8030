// crates/expense-gate-core/src/lib.rs
// ============================================================================
// Module: Expense Gate Core Library
// Description: Public API surface for the Expense Gate access core.
// Purpose: Expose domain types, store interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Expense Gate core decides, for every inbound API request or billing
//! webhook, who is acting, what they may do, and whether their tenant is
//! currently entitled to do it. It is storage-agnostic: durable state is
//! reached only through the traits in [`interfaces`], and every atomic
//! guarantee (quota admission, webhook idempotency) is delegated to the
//! store implementation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::CommitOutcome;
pub use interfaces::IncrementOutcome;
pub use interfaces::MembershipStore;
pub use interfaces::NoopSecurityEventSink;
pub use interfaces::QuotaStore;
pub use interfaces::SecurityEventSink;
pub use interfaces::StoreError;
pub use interfaces::SubscriptionStore;
pub use interfaces::TransitionDecision;
pub use interfaces::TransitionRejection;
pub use runtime::AccessContext;
pub use runtime::AccessDenial;
pub use runtime::AccessGate;
pub use runtime::Admission;
pub use runtime::ApplyOutcome;
pub use runtime::AuthError;
pub use runtime::AuthErrorKind;
pub use runtime::BillingEventKind;
pub use runtime::EnvironmentGuard;
pub use runtime::EnvironmentGuardConfig;
pub use runtime::EnvironmentSecurityError;
pub use runtime::FallbackIdentity;
pub use runtime::InMemoryGateStore;
pub use runtime::KeySet;
pub use runtime::PermissionDecision;
pub use runtime::PermissionEvaluator;
pub use runtime::PermissionReason;
pub use runtime::Principal;
pub use runtime::QuotaAdmission;
pub use runtime::QuotaEnforcer;
pub use runtime::QuotaError;
pub use runtime::QuotaExceeded;
pub use runtime::SubscriptionError;
pub use runtime::SubscriptionStateMachine;
pub use runtime::SubscriptionView;
pub use runtime::TokenClaims;
pub use runtime::TokenSigner;
pub use runtime::TokenVerifier;
pub use runtime::TokenVerifierConfig;
pub use runtime::VerifiedEvent;
pub use runtime::WebhookSecret;
pub use runtime::WebhookSignatureError;
pub use runtime::WebhookVerifier;
pub use runtime::WebhookVerifierConfig;
