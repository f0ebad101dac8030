// crates/expense-gate-core/tests/quota_concurrency.rs
// ============================================================================
// Module: Quota Concurrency Tests
// Description: Exact admission counts under concurrent attempts.
// Purpose: Ensure the conditional increment never over-admits.
// Dependencies: expense-gate-core
// ============================================================================

//! ## Overview
//! Spawns racing threads against one counter and checks that exactly
//! `min(N, L)` attempts are admitted, plus the edge cases around zero and
//! unlimited caps.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use expense_gate_core::Admission;
use expense_gate_core::InMemoryGateStore;
use expense_gate_core::Limit;
use expense_gate_core::QuotaEnforcer;
use expense_gate_core::QuotaExceeded;
use expense_gate_core::QuotaStore;
use expense_gate_core::QuotaKey;
use expense_gate_core::ResourceKind;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2026-03-01T00:00:00Z.
const START: i64 = 1_772_323_200;

fn now() -> Timestamp {
    Timestamp::from_unix_secs(START)
}

fn race(enforcer: &QuotaEnforcer, attempts: usize, limit: u64) -> usize {
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let enforcer = enforcer.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                enforcer
                    .try_admit(&TenantId::new("tenant-1"), ResourceKind::Projects, Limit::AtMost(limit), now())
                    .unwrap()
                    .is_admitted()
            })
        })
        .collect();
    handles.into_iter().map(|handle| handle.join().unwrap()).filter(|admitted| *admitted).count()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn exactly_limit_admitted_when_attempts_equal_limit() {
    let enforcer = QuotaEnforcer::new(Arc::new(InMemoryGateStore::new()));
    assert_eq!(race(&enforcer, 100, 100), 100);
    assert_eq!(enforcer.usage(&TenantId::new("tenant-1"), ResourceKind::Projects, now()).unwrap(), 100);
}

#[test]
fn attempts_beyond_limit_are_rejected_exactly() {
    let store = InMemoryGateStore::new();
    let enforcer = QuotaEnforcer::new(Arc::new(store));
    assert_eq!(race(&enforcer, 64, 10), 10);
    let next = enforcer
        .try_admit(&TenantId::new("tenant-1"), ResourceKind::Projects, Limit::AtMost(10), now())
        .unwrap();
    let expected = QuotaExceeded {
        kind: ResourceKind::Projects,
        limit: 10,
        usage: 10,
    };
    assert_eq!(next, Admission::Rejected(expected));
}

#[test]
fn zero_limit_admits_nothing() {
    let enforcer = QuotaEnforcer::new(Arc::new(InMemoryGateStore::new()));
    assert_eq!(race(&enforcer, 8, 0), 0);
}

#[test]
fn unlimited_cap_never_touches_the_counter() {
    let store = InMemoryGateStore::new();
    let enforcer = QuotaEnforcer::new(Arc::new(store.clone()));
    let tenant = TenantId::new("tenant-1");
    for _ in 0..5 {
        let admission = enforcer.try_admit(&tenant, ResourceKind::Users, Limit::Unlimited, now()).unwrap();
        assert_eq!(admission, Admission::Unmetered);
    }
    let key = QuotaKey::at(tenant, ResourceKind::Users, now());
    assert_eq!(store.count(&key).unwrap(), 0);
}

#[test]
fn release_frees_capacity_and_saturates_at_zero() {
    let enforcer = QuotaEnforcer::new(Arc::new(InMemoryGateStore::new()));
    let tenant = TenantId::new("tenant-1");
    let limit = Limit::AtMost(1);
    assert!(enforcer.try_admit(&tenant, ResourceKind::Contractors, limit, now()).unwrap().is_admitted());
    assert!(!enforcer.try_admit(&tenant, ResourceKind::Contractors, limit, now()).unwrap().is_admitted());
    assert_eq!(enforcer.release(&tenant, ResourceKind::Contractors, now()).unwrap(), 0);
    assert_eq!(enforcer.release(&tenant, ResourceKind::Contractors, now()).unwrap(), 0);
    assert!(enforcer.try_admit(&tenant, ResourceKind::Contractors, limit, now()).unwrap().is_admitted());
}

#[test]
fn monthly_counters_reset_with_the_calendar_month() {
    let enforcer = QuotaEnforcer::new(Arc::new(InMemoryGateStore::new()));
    let tenant = TenantId::new("tenant-1");
    let limit = Limit::AtMost(1);
    let march = now();
    let april = Timestamp::parse_rfc3339("2026-04-01T00:00:00Z").unwrap();
    assert!(enforcer.try_admit(&tenant, ResourceKind::MonthlyExpenses, limit, march).unwrap().is_admitted());
    assert!(!enforcer.try_admit(&tenant, ResourceKind::MonthlyExpenses, limit, march).unwrap().is_admitted());
    assert!(enforcer.try_admit(&tenant, ResourceKind::MonthlyExpenses, limit, april).unwrap().is_admitted());
}

#[test]
fn tenants_do_not_share_counters() {
    let enforcer = QuotaEnforcer::new(Arc::new(InMemoryGateStore::new()));
    let limit = Limit::AtMost(1);
    for tenant in ["tenant-1", "tenant-2"] {
        let admission =
            enforcer.try_admit(&TenantId::new(tenant), ResourceKind::Projects, limit, now()).unwrap();
        assert!(admission.is_admitted(), "{tenant}");
    }
}
