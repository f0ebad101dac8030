// crates/expense-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Expense Gate Runtime
// Description: Access-core components and their request-path composition.
// Purpose: Group verifiers, evaluators, enforcers, and in-memory stores.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Leaf-first: token verification, environment guard, permission
//! evaluation, webhook verification, the subscription state machine, quota
//! enforcement, and the [`AccessGate`] that composes the request path.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod environment;
pub mod gate;
pub mod permissions;
pub mod quota;
pub mod store;
pub mod subscription;
pub mod token;
pub mod webhook;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use environment::EnvironmentGuard;
pub use environment::EnvironmentGuardConfig;
pub use environment::EnvironmentSecurityError;
pub use environment::FallbackIdentity;
pub use environment::ProductionClassification;
pub use environment::ProductionSignal;
pub use gate::AccessContext;
pub use gate::AccessDenial;
pub use gate::AccessGate;
pub use gate::QuotaAdmission;
pub use gate::SubscriptionView;
pub use gate::parse_bearer_token;
pub use permissions::PermissionDecision;
pub use permissions::PermissionEvaluator;
pub use permissions::PermissionReason;
pub use quota::Admission;
pub use quota::QuotaEnforcer;
pub use quota::QuotaError;
pub use quota::QuotaExceeded;
pub use store::InMemoryGateStore;
pub use subscription::ApplyOutcome;
pub use subscription::SubscriptionError;
pub use subscription::SubscriptionStateMachine;
pub use subscription::TransitionInput;
pub use subscription::transition;
pub use token::AuthError;
pub use token::AuthErrorKind;
pub use token::InvalidPublicKey;
pub use token::KeySet;
pub use token::Principal;
pub use token::TokenClaims;
pub use token::TokenSigner;
pub use token::TokenVerifier;
pub use token::TokenVerifierConfig;
pub use webhook::BillingEventData;
pub use webhook::BillingEventKind;
pub use webhook::SignatureHeader;
pub use webhook::VerifiedEvent;
pub use webhook::WebhookSecret;
pub use webhook::WebhookSignatureError;
pub use webhook::WebhookVerifier;
pub use webhook::WebhookVerifierConfig;
