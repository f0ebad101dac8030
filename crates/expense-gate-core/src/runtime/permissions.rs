// crates/expense-gate-core/src/runtime/permissions.rs
// ============================================================================
// Module: Expense Gate Permission Evaluator
// Description: Role/permission lookup and ownership-scoped access decisions.
// Purpose: Answer authorization questions from the static role matrix.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Ownership-scoped access follows a fixed precedence: the `-all` variant
//! grants access regardless of ownership; otherwise the `-own` variant
//! grants access only when the requester owns the resource; otherwise the
//! request is denied. A denial is a normal outcome (HTTP 403), not an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::core::Membership;
use crate::core::Permission;
use crate::core::ResourceRef;
use crate::core::Role;
use crate::core::SubjectId;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Reason attached to a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionReason {
    /// Role holds the permission (or its tenant-wide variant).
    Granted,
    /// Role holds the own-resource variant and the requester owns the resource.
    GrantedOwnResource,
    /// Membership is not active.
    MembershipInactive,
    /// Resource belongs to another tenant.
    CrossTenant,
    /// Role lacks the permission.
    RoleLacksPermission,
    /// Role holds only the own-resource variant and the requester is not the owner.
    NotResourceOwner,
}

impl PermissionReason {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::GrantedOwnResource => "granted_own_resource",
            Self::MembershipInactive => "membership_inactive",
            Self::CrossTenant => "cross_tenant",
            Self::RoleLacksPermission => "role_lacks_permission",
            Self::NotResourceOwner => "not_resource_owner",
        }
    }
}

impl fmt::Display for PermissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionDecision {
    /// Whether access is granted.
    pub allowed: bool,
    /// Decision reason.
    pub reason: PermissionReason,
}

impl PermissionDecision {
    /// Allowing decision.
    const fn allow(reason: PermissionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    /// Denying decision.
    const fn deny(reason: PermissionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Stateless evaluator over the static role matrix.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    /// Returns true when `role` holds `permission`.
    #[must_use]
    pub fn has_permission(role: Role, permission: Permission) -> bool {
        role.permissions().contains(&permission)
    }

    /// Ownership-scoped check with precedence all > own > none.
    #[must_use]
    pub fn can_access(
        role: Role,
        permission_all: Permission,
        permission_own: Permission,
        requester_id: &SubjectId,
        resource_owner_id: &SubjectId,
    ) -> bool {
        Self::scoped_decision(role, permission_all, permission_own, requester_id, resource_owner_id)
            .allowed
    }

    /// Full check for an authenticated member, optionally against a resource.
    ///
    /// For ownership-scoped permissions with a resource, either variant of
    /// the capability is evaluated with [`Self::can_access`] precedence.
    /// Without a resource the requested token is required, except that an
    /// `-own` request is also satisfied by the `-all` variant.
    #[must_use]
    pub fn check(
        membership: &Membership,
        permission: Permission,
        resource: Option<&ResourceRef>,
    ) -> PermissionDecision {
        if !membership.is_active() {
            return PermissionDecision::deny(PermissionReason::MembershipInactive);
        }
        if let Some(resource) = resource
            && resource.tenant_id != membership.tenant_id
        {
            return PermissionDecision::deny(PermissionReason::CrossTenant);
        }

        let role = membership.role;
        match (permission.scoped(), resource) {
            (Some(capability), Some(resource)) => Self::scoped_decision(
                role,
                capability.all(),
                capability.own(),
                &membership.subject_id,
                &resource.owner_id,
            ),
            (Some(capability), None) => {
                if Self::has_permission(role, permission)
                    || Self::has_permission(role, capability.all())
                {
                    PermissionDecision::allow(PermissionReason::Granted)
                } else {
                    PermissionDecision::deny(PermissionReason::RoleLacksPermission)
                }
            }
            (None, _) => {
                if Self::has_permission(role, permission) {
                    PermissionDecision::allow(PermissionReason::Granted)
                } else {
                    PermissionDecision::deny(PermissionReason::RoleLacksPermission)
                }
            }
        }
    }

    /// Shared precedence logic for ownership-scoped capabilities.
    fn scoped_decision(
        role: Role,
        permission_all: Permission,
        permission_own: Permission,
        requester_id: &SubjectId,
        resource_owner_id: &SubjectId,
    ) -> PermissionDecision {
        if Self::has_permission(role, permission_all) {
            return PermissionDecision::allow(PermissionReason::Granted);
        }
        if Self::has_permission(role, permission_own) {
            return if requester_id == resource_owner_id {
                PermissionDecision::allow(PermissionReason::GrantedOwnResource)
            } else {
                PermissionDecision::deny(PermissionReason::NotResourceOwner)
            };
        }
        PermissionDecision::deny(PermissionReason::RoleLacksPermission)
    }
}
