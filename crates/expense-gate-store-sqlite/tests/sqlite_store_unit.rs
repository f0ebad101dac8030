// crates/expense-gate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Gate Store Unit Tests
// Description: Durability, integrity, and atomicity tests for the SQLite store.
// Purpose: Validate path safety, schema versioning, ledger atomicity, and
//          exact quota admission across connections.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks and schema version validation
//! - Membership and subscription persistence across reopen
//! - Webhook ledger idempotency and pruning
//! - Conditional quota increments under multi-connection contention
//! - Corrupt rows fail closed

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

use std::path::Path;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use expense_gate_core::CommitOutcome;
use expense_gate_core::EventId;
use expense_gate_core::IncrementOutcome;
use expense_gate_core::Membership;
use expense_gate_core::MembershipStatus;
use expense_gate_core::MembershipStore;
use expense_gate_core::PlanTier;
use expense_gate_core::QuotaKey;
use expense_gate_core::QuotaStore;
use expense_gate_core::ResourceKind;
use expense_gate_core::Role;
use expense_gate_core::StoreError;
use expense_gate_core::SubjectId;
use expense_gate_core::SubscriptionRecord;
use expense_gate_core::SubscriptionStatus;
use expense_gate_core::SubscriptionStore;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;
use expense_gate_core::TransitionDecision;
use expense_gate_core::TransitionRejection;
use expense_gate_core::WebhookEventRecord;
use expense_gate_store_sqlite::SqliteGateStore;
use expense_gate_store_sqlite::SqliteStoreConfig;
use expense_gate_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// 2026-03-01T00:00:00Z.
const START: i64 = 1_772_323_200;

fn open(path: &Path) -> SqliteGateStore {
    SqliteGateStore::new(&SqliteStoreConfig::new(path)).unwrap()
}

fn temp_store() -> (TempDir, SqliteGateStore) {
    let dir = TempDir::new().unwrap();
    let store = open(&dir.path().join("gate.sqlite"));
    (dir, store)
}

fn record(status: SubscriptionStatus, event: &str) -> SubscriptionRecord {
    SubscriptionRecord {
        tenant_id: TenantId::new("tenant-1"),
        plan_tier: PlanTier::Starter,
        status,
        provider_subscription_id: Some("sub_1".to_string()),
        provider_customer_id: Some("ctm_1".to_string()),
        current_period_end: Some(Timestamp::from_unix_secs(START + 86_400)),
        updated_at: Timestamp::from_unix_secs(START),
        last_event_id: Some(EventId::new(event)),
    }
}

fn ledger(event: &str, received_at: i64) -> WebhookEventRecord {
    WebhookEventRecord {
        event_id: EventId::new(event),
        received_at: Timestamp::from_unix_secs(received_at),
        event_type: "subscription.created".to_string(),
        processed: true,
    }
}

fn projects_key() -> QuotaKey {
    QuotaKey::at(TenantId::new("tenant-1"), ResourceKind::Projects, Timestamp::from_unix_secs(START))
}

// ============================================================================
// SECTION: Configuration and Schema
// ============================================================================

#[test]
fn rejects_directory_and_overlong_paths() {
    let dir = TempDir::new().unwrap();
    let err = SqliteGateStore::new(&SqliteStoreConfig::new(dir.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));

    let long = dir.path().join("a".repeat(300));
    let err = SqliteGateStore::new(&SqliteStoreConfig::new(long)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));

    let mut config = SqliteStoreConfig::new(dir.path().join("gate.sqlite"));
    config.busy_timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn unsupported_schema_version_fails_closed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.sqlite");
    drop(open(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99]).unwrap();
    drop(connection);
    let err = SqliteGateStore::new(&SqliteStoreConfig::new(&path)).err().unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir.path().join("nested/deeper/gate.sqlite"));
    store.readiness().unwrap();
}

// ============================================================================
// SECTION: Memberships and Subscriptions
// ============================================================================

#[test]
fn membership_round_trips_and_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.sqlite");
    let membership = Membership {
        tenant_id: TenantId::new("tenant-1"),
        subject_id: SubjectId::new("user-1"),
        role: Role::Manager,
        status: MembershipStatus::Active,
    };
    open(&path).upsert_membership(&membership).unwrap();
    let reopened = open(&path);
    assert_eq!(reopened.membership(&SubjectId::new("user-1")).unwrap(), Some(membership.clone()));

    let demoted = Membership {
        status: MembershipStatus::Inactive,
        ..membership
    };
    reopened.upsert_membership(&demoted).unwrap();
    assert_eq!(reopened.membership(&SubjectId::new("user-1")).unwrap(), Some(demoted));
    assert_eq!(reopened.membership(&SubjectId::new("nobody")).unwrap(), None);
}

#[test]
fn corrupt_membership_row_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.sqlite");
    let store = open(&path);
    let connection = Connection::open(&path).unwrap();
    connection
        .execute(
            "INSERT INTO memberships (subject_id, tenant_id, role, status) VALUES ('user-1', \
             'tenant-1', 'superuser', 'active')",
            [],
        )
        .unwrap();
    let err = store.membership(&SubjectId::new("user-1")).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn commit_writes_record_and_ledger_together() {
    let (_dir, store) = temp_store();
    let tenant = TenantId::new("tenant-1");
    let written = record(SubscriptionStatus::Trialing, "evt_1");
    let outcome = store
        .commit_event(&tenant, &ledger("evt_1", START), &|current| {
            assert!(current.is_none());
            TransitionDecision::Write(written.clone())
        })
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Written { record: written.clone() });
    assert_eq!(store.subscription(&tenant).unwrap(), Some(written.clone()));
    assert_eq!(store.webhook_event(&EventId::new("evt_1")).unwrap(), Some(ledger("evt_1", START)));

    let replay = store
        .commit_event(&tenant, &ledger("evt_1", START + 5), &|_| {
            TransitionDecision::Write(record(SubscriptionStatus::Canceled, "evt_1"))
        })
        .unwrap();
    assert_eq!(replay, CommitOutcome::Duplicate { current: Some(written) });
}

#[test]
fn skipped_events_are_ledgered_without_touching_the_record() {
    let (_dir, store) = temp_store();
    let tenant = TenantId::new("tenant-1");
    let outcome = store
        .commit_event(&tenant, &ledger("evt_9", START), &|_| TransitionDecision::Skip("no record".to_string()))
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Skipped { current: None, .. }));
    assert!(store.subscription(&tenant).unwrap().is_none());
    assert!(store.webhook_event(&EventId::new("evt_9")).unwrap().is_some());
}

#[test]
fn refused_transition_writes_neither_record_nor_ledger() {
    let (_dir, store) = temp_store();
    let tenant = TenantId::new("tenant-1");
    let refuse = |_: Option<&SubscriptionRecord>| {
        TransitionDecision::Reject(TransitionRejection::UnknownPlanTier("legacy_gold".to_string()))
    };
    let outcome = store.commit_event(&tenant, &ledger("evt_5", START), &refuse).unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Rejected {
            current: None,
            rejection: TransitionRejection::UnknownPlanTier("legacy_gold".to_string()),
        }
    );
    assert!(store.webhook_event(&EventId::new("evt_5")).unwrap().is_none());
    assert!(store.subscription(&tenant).unwrap().is_none());

    store
        .commit_event(&tenant, &ledger("evt_6", START), &|_| TransitionDecision::Skip("test".to_string()))
        .unwrap();
    let replay = store.commit_event(&tenant, &ledger("evt_6", START), &refuse).unwrap();
    assert_eq!(replay, CommitOutcome::Duplicate { current: None });
}

#[test]
fn rejected_commit_rolls_back_the_ledger_entry() {
    let (_dir, store) = temp_store();
    let mut foreign = record(SubscriptionStatus::Active, "evt_1");
    foreign.tenant_id = TenantId::new("tenant-2");
    let err = store
        .commit_event(&TenantId::new("tenant-1"), &ledger("evt_1", START), &|_| {
            TransitionDecision::Write(foreign.clone())
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(store.webhook_event(&EventId::new("evt_1")).unwrap().is_none());
    assert!(store.subscription(&TenantId::new("tenant-2")).unwrap().is_none());
}

#[test]
fn prune_removes_entries_older_than_cutoff() {
    let (_dir, store) = temp_store();
    let tenant = TenantId::new("tenant-1");
    for (event, at) in [("evt_1", START), ("evt_2", START + 100), ("evt_3", START + 200)] {
        store
            .commit_event(&tenant, &ledger(event, at), &|_| TransitionDecision::Skip("test".to_string()))
            .unwrap();
    }
    assert_eq!(store.prune_webhook_events(Timestamp::from_unix_secs(START + 100)).unwrap(), 1);
    assert!(store.webhook_event(&EventId::new("evt_1")).unwrap().is_none());
    assert!(store.webhook_event(&EventId::new("evt_2")).unwrap().is_some());
}

// ============================================================================
// SECTION: Quota Counters
// ============================================================================

#[test]
fn conditional_increment_stops_at_limit() {
    let (_dir, store) = temp_store();
    let key = projects_key();
    assert_eq!(store.try_increment(&key, 2).unwrap(), IncrementOutcome::Admitted { count: 1 });
    assert_eq!(store.try_increment(&key, 2).unwrap(), IncrementOutcome::Admitted { count: 2 });
    assert_eq!(store.try_increment(&key, 2).unwrap(), IncrementOutcome::AtLimit { count: 2 });
    assert_eq!(store.count(&key).unwrap(), 2);
}

#[test]
fn zero_limit_never_creates_a_counter() {
    let (_dir, store) = temp_store();
    let key = projects_key();
    assert_eq!(store.try_increment(&key, 0).unwrap(), IncrementOutcome::AtLimit { count: 0 });
    assert_eq!(store.count(&key).unwrap(), 0);
}

#[test]
fn decrement_saturates_at_zero() {
    let (_dir, store) = temp_store();
    let key = projects_key();
    assert_eq!(store.decrement(&key).unwrap(), 0);
    store.try_increment(&key, 5).unwrap();
    assert_eq!(store.decrement(&key).unwrap(), 0);
    assert_eq!(store.decrement(&key).unwrap(), 0);
}

#[test]
fn concurrent_connections_admit_exactly_the_limit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.sqlite");
    drop(open(&path));
    let workers = 8;
    let attempts_per_worker = 25;
    let limit = 100;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = open(&path);
                barrier.wait();
                (0..attempts_per_worker)
                    .filter(|_| {
                        matches!(
                            store.try_increment(&projects_key(), limit).unwrap(),
                            IncrementOutcome::Admitted { .. }
                        )
                    })
                    .count()
            })
        })
        .collect();
    let admitted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
    assert_eq!(admitted, 100);
    assert_eq!(open(&path).count(&projects_key()).unwrap(), 100);
}

#[test]
fn contention_beyond_the_limit_never_over_admits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.sqlite");
    drop(open(&path));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let store = open(&path);
                (0..10)
                    .filter(|_| {
                        matches!(store.try_increment(&projects_key(), 7).unwrap(), IncrementOutcome::Admitted { .. })
                    })
                    .count()
            })
        })
        .collect();
    let admitted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
    assert_eq!(admitted, 7);
}
