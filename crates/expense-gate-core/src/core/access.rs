// crates/expense-gate-core/src/core/access.rs
// ============================================================================
// Module: Expense Gate Access Model
// Description: Roles, permissions, memberships, and resource references.
// Purpose: Define the closed role/permission matrix used by authorization.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Roles and permissions are closed enumerations. Each role maps to one
//! static, non-empty permission slice; nothing is derived from request
//! context. Ownership-scoped capabilities come in `-all` / `-own` pairs
//! described by [`ScopedCapability`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::SubjectId;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// Capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// View any expense in the tenant.
    ViewAllExpenses,
    /// View expenses the requester owns.
    ViewOwnExpenses,
    /// Create expenses.
    CreateExpenses,
    /// Edit any expense in the tenant.
    EditAllExpenses,
    /// Edit expenses the requester owns.
    EditOwnExpenses,
    /// Delete any expense in the tenant.
    DeleteAllExpenses,
    /// Delete expenses the requester owns.
    DeleteOwnExpenses,
    /// Approve submitted expenses.
    ApproveExpenses,
    /// View projects.
    ViewProjects,
    /// Create, edit, and archive projects.
    ManageProjects,
    /// View contractors.
    ViewContractors,
    /// Create, edit, and archive contractors.
    ManageContractors,
    /// View reports.
    ViewReports,
    /// Export reports.
    ExportReports,
    /// Invite, remove, and change roles of users.
    ManageUsers,
    /// Manage the tenant's subscription and payment details.
    ManageBilling,
    /// Edit company-wide settings.
    ManageCompanySettings,
}

impl Permission {
    /// Every permission.
    pub const ALL: [Self; 17] = [
        Self::ViewAllExpenses,
        Self::ViewOwnExpenses,
        Self::CreateExpenses,
        Self::EditAllExpenses,
        Self::EditOwnExpenses,
        Self::DeleteAllExpenses,
        Self::DeleteOwnExpenses,
        Self::ApproveExpenses,
        Self::ViewProjects,
        Self::ManageProjects,
        Self::ViewContractors,
        Self::ManageContractors,
        Self::ViewReports,
        Self::ExportReports,
        Self::ManageUsers,
        Self::ManageBilling,
        Self::ManageCompanySettings,
    ];

    /// Returns the stable capability token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViewAllExpenses => "view_all_expenses",
            Self::ViewOwnExpenses => "view_own_expenses",
            Self::CreateExpenses => "create_expenses",
            Self::EditAllExpenses => "edit_all_expenses",
            Self::EditOwnExpenses => "edit_own_expenses",
            Self::DeleteAllExpenses => "delete_all_expenses",
            Self::DeleteOwnExpenses => "delete_own_expenses",
            Self::ApproveExpenses => "approve_expenses",
            Self::ViewProjects => "view_projects",
            Self::ManageProjects => "manage_projects",
            Self::ViewContractors => "view_contractors",
            Self::ManageContractors => "manage_contractors",
            Self::ViewReports => "view_reports",
            Self::ExportReports => "export_reports",
            Self::ManageUsers => "manage_users",
            Self::ManageBilling => "manage_billing",
            Self::ManageCompanySettings => "manage_company_settings",
        }
    }

    /// Parses a capability token.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|permission| permission.as_str() == value.trim())
    }

    /// Returns the ownership-scoped capability this token belongs to, if any.
    #[must_use]
    pub const fn scoped(self) -> Option<ScopedCapability> {
        match self {
            Self::ViewAllExpenses | Self::ViewOwnExpenses => Some(ScopedCapability::ViewExpenses),
            Self::EditAllExpenses | Self::EditOwnExpenses => Some(ScopedCapability::EditExpenses),
            Self::DeleteAllExpenses | Self::DeleteOwnExpenses => {
                Some(ScopedCapability::DeleteExpenses)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability that exists in an `-all` and an `-own` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopedCapability {
    /// Viewing expenses.
    ViewExpenses,
    /// Editing expenses.
    EditExpenses,
    /// Deleting expenses.
    DeleteExpenses,
}

impl ScopedCapability {
    /// Tenant-wide variant.
    #[must_use]
    pub const fn all(self) -> Permission {
        match self {
            Self::ViewExpenses => Permission::ViewAllExpenses,
            Self::EditExpenses => Permission::EditAllExpenses,
            Self::DeleteExpenses => Permission::DeleteAllExpenses,
        }
    }

    /// Own-resource variant.
    #[must_use]
    pub const fn own(self) -> Permission {
        match self {
            Self::ViewExpenses => Permission::ViewOwnExpenses,
            Self::EditExpenses => Permission::EditOwnExpenses,
            Self::DeleteExpenses => Permission::DeleteOwnExpenses,
        }
    }
}

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Owner permissions.
const OWNER_PERMISSIONS: &[Permission] = &Permission::ALL;

/// Viewer permissions.
const VIEWER_PERMISSIONS: &[Permission] =
    &[Permission::ViewOwnExpenses, Permission::ViewProjects, Permission::ViewContractors];

/// Employee permissions.
const EMPLOYEE_PERMISSIONS: &[Permission] = &[
    Permission::ViewOwnExpenses,
    Permission::CreateExpenses,
    Permission::EditOwnExpenses,
    Permission::DeleteOwnExpenses,
    Permission::ViewProjects,
    Permission::ViewContractors,
];

/// Manager permissions.
const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::ViewAllExpenses,
    Permission::ViewOwnExpenses,
    Permission::CreateExpenses,
    Permission::EditAllExpenses,
    Permission::EditOwnExpenses,
    Permission::DeleteOwnExpenses,
    Permission::ApproveExpenses,
    Permission::ViewProjects,
    Permission::ManageProjects,
    Permission::ViewContractors,
    Permission::ManageContractors,
    Permission::ViewReports,
    Permission::ExportReports,
];

/// Admin permissions.
const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ViewAllExpenses,
    Permission::ViewOwnExpenses,
    Permission::CreateExpenses,
    Permission::EditAllExpenses,
    Permission::EditOwnExpenses,
    Permission::DeleteAllExpenses,
    Permission::DeleteOwnExpenses,
    Permission::ApproveExpenses,
    Permission::ViewProjects,
    Permission::ManageProjects,
    Permission::ViewContractors,
    Permission::ManageContractors,
    Permission::ViewReports,
    Permission::ExportReports,
    Permission::ManageUsers,
    Permission::ManageCompanySettings,
];

/// Tenant role, most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Tenant owner; holds every permission including billing.
    Owner,
    /// Administrator.
    Admin,
    /// Manager.
    Manager,
    /// Employee.
    Employee,
    /// Read-only member.
    Viewer,
}

impl Role {
    /// All roles, most to least privileged.
    pub const ALL: [Self; 5] = [Self::Owner, Self::Admin, Self::Manager, Self::Employee, Self::Viewer];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Viewer => "viewer",
        }
    }

    /// Parses a role label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value.trim())
    }

    /// Returns the static permission set for this role.
    #[must_use]
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Owner => OWNER_PERMISSIONS,
            Self::Admin => ADMIN_PERMISSIONS,
            Self::Manager => MANAGER_PERMISSIONS,
            Self::Employee => EMPLOYEE_PERMISSIONS,
            Self::Viewer => VIEWER_PERMISSIONS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Memberships
// ============================================================================

/// Membership lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Grants the role's permissions.
    Active,
    /// Soft-removed.
    Inactive,
    /// Invitation not yet accepted.
    Pending,
}

impl MembershipStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Association of a subject with a tenant and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Tenant the subject belongs to.
    pub tenant_id: TenantId,
    /// Member subject.
    pub subject_id: SubjectId,
    /// Assigned role.
    pub role: Role,
    /// Lifecycle status.
    pub status: MembershipStatus,
}

impl Membership {
    /// Returns true when the membership grants permissions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Ownership data of a tenant-owned business resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Subject that created the resource.
    pub owner_id: SubjectId,
    /// Tenant that owns the resource.
    pub tenant_id: TenantId,
}
