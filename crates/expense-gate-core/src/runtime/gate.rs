// crates/expense-gate-core/src/runtime/gate.rs
// ============================================================================
// Module: Expense Gate Access Gate
// Description: Request-path composition of authentication, authorization, and quota.
// Purpose: Reduce every access question to allow or deny-with-reason.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror
// ============================================================================

//! ## Overview
//! Request flow: bearer parsing, [`TokenVerifier`], the
//! [`EnvironmentGuard`] fallback path (only after a verification failure),
//! membership resolution, [`PermissionEvaluator`], and [`QuotaEnforcer`].
//!
//! Every failure is mapped into the closed [`AccessDenial`] set. Nothing
//! reaches a business handler in a form that could pass for success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::Clock;
use crate::core::Limit;
use crate::core::Membership;
use crate::core::Permission;
use crate::core::PlanLimits;
use crate::core::PlanTier;
use crate::core::ResourceKind;
use crate::core::ResourceRef;
use crate::core::SubscriptionStatus;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::effective_tier;
use crate::interfaces::MembershipStore;
use crate::interfaces::SubscriptionStore;
use crate::runtime::environment::EnvironmentGuard;
use crate::runtime::environment::EnvironmentSecurityError;
use crate::runtime::permissions::PermissionEvaluator;
use crate::runtime::permissions::PermissionReason;
use crate::runtime::quota::Admission;
use crate::runtime::quota::QuotaEnforcer;
use crate::runtime::quota::QuotaExceeded;
use crate::runtime::token::AuthError;
use crate::runtime::token::AuthErrorKind;
use crate::runtime::token::MAX_TOKEN_BYTES;
use crate::runtime::token::Principal;
use crate::runtime::token::TokenVerifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header length.
pub const MAX_AUTH_HEADER_BYTES: usize = MAX_TOKEN_BYTES + 16;

// ============================================================================
// SECTION: Denials
// ============================================================================

/// Closed set of access denials.
#[derive(Debug, Error)]
pub enum AccessDenial {
    /// Bearer credential missing or rejected.
    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthError),
    /// Fallback identity requested in a production-classified runtime.
    #[error(transparent)]
    EnvironmentSecurity(#[from] EnvironmentSecurityError),
    /// Subject has no tenant membership.
    #[error("subject has no tenant membership")]
    NoMembership,
    /// Membership exists but is not active.
    #[error("tenant membership is not active")]
    MembershipInactive,
    /// Role or ownership check failed.
    #[error("permission denied: {0}")]
    PermissionDenied(PermissionReason),
    /// Plan cap reached.
    #[error("quota exceeded for {}: {} of {}", .0.kind, .0.usage, .0.limit)]
    QuotaExceeded(QuotaExceeded),
    /// Store unavailable or failed; outcome unknown.
    #[error("access core unavailable: {0}")]
    Unavailable(String),
}

impl AccessDenial {
    /// Returns the stable reason label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::EnvironmentSecurity(_) => "environment_security",
            Self::NoMembership => "no_membership",
            Self::MembershipInactive => "membership_inactive",
            Self::PermissionDenied(_) => "permission_denied",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Returns the HTTP status code for this denial.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) | Self::EnvironmentSecurity(_) => 401,
            Self::NoMembership | Self::MembershipInactive | Self::PermissionDenied(_) => 403,
            Self::QuotaExceeded(_) => 402,
            Self::Unavailable(_) => 503,
        }
    }

    /// Returns the token failure kind for unauthenticated denials.
    #[must_use]
    pub const fn auth_kind(&self) -> Option<AuthErrorKind> {
        match self {
            Self::Unauthenticated(err) => Some(err.kind),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Context and Views
// ============================================================================

/// Authenticated request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessContext {
    /// Caller identity with tenant resolved.
    pub principal: Principal,
    /// Caller membership.
    pub membership: Membership,
    /// True when the principal came from the local-development fallback.
    pub via_fallback: bool,
}

impl AccessContext {
    /// Returns the caller's tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.membership.tenant_id
    }
}

/// Admission result with the plan context it was decided under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaAdmission {
    /// Tier whose limits applied.
    pub tier: PlanTier,
    /// Cap that applied.
    pub limit: Limit,
    /// Outcome.
    pub admission: Admission,
}

/// Subscription state as exposed to business handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    /// Tenant.
    pub tenant_id: TenantId,
    /// Stored status (`none` when no record exists).
    pub status: SubscriptionStatus,
    /// Contracted tier, when a record exists.
    pub plan_tier: Option<PlanTier>,
    /// Tier whose limits currently apply.
    pub effective_tier: PlanTier,
    /// Limits of the effective tier.
    pub limits: PlanLimits,
    /// Current period end.
    pub current_period_end: Option<Timestamp>,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Request-path access gate.
#[derive(Clone)]
pub struct AccessGate {
    /// Bearer token verifier.
    tokens: TokenVerifier,
    /// Environment guard for the fallback path.
    environment: EnvironmentGuard,
    /// Membership lookups.
    memberships: Arc<dyn MembershipStore>,
    /// Subscription lookups.
    subscriptions: Arc<dyn SubscriptionStore>,
    /// Quota admission.
    quota: QuotaEnforcer,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(
        tokens: TokenVerifier,
        environment: EnvironmentGuard,
        memberships: Arc<dyn MembershipStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        quota: QuotaEnforcer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            environment,
            memberships,
            subscriptions,
            quota,
            clock,
        }
    }

    /// Returns the gate clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Authenticates a request from its `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial`] when no usable principal or active membership
    /// can be established.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AccessContext, AccessDenial> {
        let verified = parse_bearer_token(authorization)
            .and_then(|token| self.tokens.verify(token, self.clock.as_ref()));
        let (mut principal, via_fallback) = match verified {
            Ok(principal) => (principal, false),
            Err(auth_err) => {
                if !self.environment.fallback_requested() {
                    return Err(AccessDenial::Unauthenticated(auth_err));
                }
                match self.environment.fallback_principal(self.clock.now())? {
                    Some(principal) => (principal, true),
                    None => return Err(AccessDenial::Unauthenticated(auth_err)),
                }
            }
        };

        let membership = self
            .memberships
            .membership(&principal.subject_id)
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))?
            .ok_or(AccessDenial::NoMembership)?;
        if !membership.is_active() {
            return Err(AccessDenial::MembershipInactive);
        }
        principal.tenant_id = Some(membership.tenant_id.clone());
        Ok(AccessContext {
            principal,
            membership,
            via_fallback,
        })
    }

    /// Checks `permission`, optionally against a specific resource.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::PermissionDenied`] when the check fails.
    pub fn check_permission(
        &self,
        ctx: &AccessContext,
        permission: Permission,
        resource: Option<&ResourceRef>,
    ) -> Result<PermissionReason, AccessDenial> {
        let decision = PermissionEvaluator::check(&ctx.membership, permission, resource);
        if decision.allowed {
            Ok(decision.reason)
        } else {
            Err(AccessDenial::PermissionDenied(decision.reason))
        }
    }

    /// Returns the tier whose limits apply to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::Unavailable`] when the subscription lookup fails.
    pub fn effective_tier(&self, tenant_id: &TenantId) -> Result<PlanTier, AccessDenial> {
        let record = self
            .subscriptions
            .subscription(tenant_id)
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))?;
        Ok(effective_tier(record.as_ref()))
    }

    /// Attempts to admit one creation of `kind` for the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::QuotaExceeded`] at the cap and
    /// [`AccessDenial::Unavailable`] when the outcome cannot be confirmed.
    pub fn try_admit(&self, ctx: &AccessContext, kind: ResourceKind) -> Result<QuotaAdmission, AccessDenial> {
        let tier = self.effective_tier(ctx.tenant_id())?;
        let limit = tier.limits().limit_for(kind);
        let admission = self
            .quota
            .try_admit(ctx.tenant_id(), kind, limit, self.clock.now())
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))?;
        if let Admission::Rejected(exceeded) = admission {
            return Err(AccessDenial::QuotaExceeded(exceeded));
        }
        Ok(QuotaAdmission {
            tier,
            limit,
            admission,
        })
    }

    /// Releases one unit of `kind` for the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::Unavailable`] when the store write fails.
    pub fn release(&self, ctx: &AccessContext, kind: ResourceKind) -> Result<u64, AccessDenial> {
        self.quota
            .release(ctx.tenant_id(), kind, self.clock.now())
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))
    }

    /// Returns current usage of `kind` for the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::Unavailable`] when the lookup fails.
    pub fn usage(&self, ctx: &AccessContext, kind: ResourceKind) -> Result<u64, AccessDenial> {
        self.quota
            .usage(ctx.tenant_id(), kind, self.clock.now())
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))
    }

    /// Returns the subscription view for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenial::Unavailable`] when the lookup fails.
    pub fn subscription_status(&self, tenant_id: &TenantId) -> Result<SubscriptionView, AccessDenial> {
        let record = self
            .subscriptions
            .subscription(tenant_id)
            .map_err(|err| AccessDenial::Unavailable(err.to_string()))?;
        let tier = effective_tier(record.as_ref());
        Ok(SubscriptionView {
            tenant_id: tenant_id.clone(),
            status: record.as_ref().map_or(SubscriptionStatus::None, |record| record.status),
            plan_tier: record.as_ref().map(|record| record.plan_tier),
            effective_tier: tier,
            limits: tier.limits(),
            current_period_end: record.as_ref().and_then(|record| record.current_period_end),
        })
    }
}

// ============================================================================
// SECTION: Bearer Parsing
// ============================================================================

/// Extracts the token from an `Authorization: Bearer <token>` value.
///
/// # Errors
///
/// Returns [`AuthErrorKind::Malformed`] when the header is missing,
/// oversized, or not a bearer credential.
pub fn parse_bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let malformed = |message: &str| AuthError::new(AuthErrorKind::Malformed, message);
    let value = authorization.ok_or_else(|| malformed("missing authorization header"))?;
    if value.len() > MAX_AUTH_HEADER_BYTES {
        return Err(malformed("authorization header too large"));
    }
    let (scheme, token) =
        value.trim().split_once(' ').ok_or_else(|| malformed("invalid authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(malformed("unsupported authorization scheme"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(malformed("empty bearer token"));
    }
    Ok(token)
}
