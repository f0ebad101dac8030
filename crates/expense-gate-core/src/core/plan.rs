// crates/expense-gate-core/src/core/plan.rs
// ============================================================================
// Module: Expense Gate Plans
// Description: Plan tiers, static plan limits, and quota counter keys.
// Purpose: Map a tenant's plan tier to the resource caps quota admission enforces.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Plan limits are static, versioned data. A limit is either unlimited
//! (wire form `-1`) or a non-negative cap. Each [`ResourceKind`] maps to one
//! limit and to a counter period: lifetime totals for users, projects, and
//! contractors; UTC calendar months for expenses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Plan Tiers
// ============================================================================

/// Version of the static plan limit table.
pub const PLAN_LIMITS_VERSION: u32 = 1;

/// Error returned when a plan tier string is not in the static table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown plan tier: {0}")]
pub struct UnknownPlanTier(pub String);

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Free tier; also the effective tier for tenants without a live subscription.
    Free,
    /// Starter tier.
    Starter,
    /// Professional tier.
    Professional,
    /// Enterprise tier.
    Enterprise,
}

impl PlanTier {
    /// All tiers, least to most capable.
    pub const ALL: [Self; 4] = [Self::Free, Self::Starter, Self::Professional, Self::Enterprise];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parses a tier label (trimmed, ASCII case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`UnknownPlanTier`] when the label is not in the static table.
    pub fn parse(value: &str) -> Result<Self, UnknownPlanTier> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownPlanTier(trimmed.to_string()))
    }

    /// Returns the static limits for this tier.
    #[must_use]
    pub const fn limits(self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                max_users: Limit::AtMost(1),
                max_projects: Limit::AtMost(3),
                max_contractors: Limit::AtMost(5),
                max_monthly_expenses: Limit::AtMost(50),
            },
            Self::Starter => PlanLimits {
                max_users: Limit::AtMost(5),
                max_projects: Limit::AtMost(10),
                max_contractors: Limit::AtMost(25),
                max_monthly_expenses: Limit::AtMost(500),
            },
            Self::Professional => PlanLimits {
                max_users: Limit::AtMost(25),
                max_projects: Limit::AtMost(100),
                max_contractors: Limit::AtMost(250),
                max_monthly_expenses: Limit::Unlimited,
            },
            Self::Enterprise => PlanLimits {
                max_users: Limit::Unlimited,
                max_projects: Limit::Unlimited,
                max_contractors: Limit::Unlimited,
                max_monthly_expenses: Limit::Unlimited,
            },
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Resource cap. Serialized as `-1` for unlimited, otherwise the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    /// No cap; admission never touches the counter.
    Unlimited,
    /// At most this many resources.
    AtMost(u64),
}

impl Limit {
    /// Wire value for [`Limit::Unlimited`].
    pub const UNLIMITED_WIRE: i64 = -1;

    /// Converts a wire value; negative values other than `-1` are rejected.
    #[must_use]
    pub fn from_wire(value: i64) -> Option<Self> {
        if value == Self::UNLIMITED_WIRE {
            return Some(Self::Unlimited);
        }
        u64::try_from(value).ok().map(Self::AtMost)
    }

    /// Returns the wire value.
    #[must_use]
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Unlimited => Self::UNLIMITED_WIRE,
            Self::AtMost(cap) => i64::try_from(cap).unwrap_or(i64::MAX),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::from_wire(raw).ok_or_else(|| {
            serde::de::Error::custom(format!("limit must be -1 or non-negative, got {raw}"))
        })
    }
}

/// Per-tier resource caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum active users.
    pub max_users: Limit,
    /// Maximum projects.
    pub max_projects: Limit,
    /// Maximum contractors.
    pub max_contractors: Limit,
    /// Maximum expenses created per calendar month.
    pub max_monthly_expenses: Limit,
}

impl PlanLimits {
    /// Returns the cap governing `kind`.
    #[must_use]
    pub const fn limit_for(&self, kind: ResourceKind) -> Limit {
        match kind {
            ResourceKind::Users => self.max_users,
            ResourceKind::Projects => self.max_projects,
            ResourceKind::Contractors => self.max_contractors,
            ResourceKind::MonthlyExpenses => self.max_monthly_expenses,
        }
    }
}

// ============================================================================
// SECTION: Resource Kinds
// ============================================================================

/// Quota-governed resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Tenant users (seats).
    Users,
    /// Projects.
    Projects,
    /// Contractors.
    Contractors,
    /// Expenses created in the current calendar month.
    MonthlyExpenses,
}

impl ResourceKind {
    /// All resource kinds.
    pub const ALL: [Self; 4] = [Self::Users, Self::Projects, Self::Contractors, Self::MonthlyExpenses];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::Contractors => "contractors",
            Self::MonthlyExpenses => "monthly_expenses",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
    }

    /// Returns the counter period containing `now` for this kind.
    #[must_use]
    pub fn period_at(self, now: Timestamp) -> String {
        match self {
            Self::MonthlyExpenses => {
                now.calendar_month().unwrap_or_else(|| LIFETIME_PERIOD.to_string())
            }
            Self::Users | Self::Projects | Self::Contractors => LIFETIME_PERIOD.to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Period label for counters that never roll over.
pub const LIFETIME_PERIOD: &str = "lifetime";

/// Durable quota counter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuotaKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Counted resource kind.
    pub kind: ResourceKind,
    /// Counter period (`lifetime` or `YYYY-MM`).
    pub period: String,
}

impl QuotaKey {
    /// Builds the key for `kind` in the period containing `now`.
    #[must_use]
    pub fn at(tenant_id: TenantId, kind: ResourceKind, now: Timestamp) -> Self {
        Self {
            tenant_id,
            kind,
            period: kind.period_at(now),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
