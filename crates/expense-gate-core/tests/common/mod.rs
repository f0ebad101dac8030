// crates/expense-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared clocks, signers, stores, and gate builders.
// Purpose: Provide reusable deterministic fixtures for access-core tests.
// Dependencies: expense-gate-core, ed25519-dalek, serde_json
// ============================================================================

//! ## Overview
//! Fixtures pin time to 2026-03-01T00:00:00Z and sign tokens with a fixed
//! Ed25519 key so every test is deterministic.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use ed25519_dalek::SigningKey;
use expense_gate_core::AccessGate;
use expense_gate_core::CommitOutcome;
use expense_gate_core::EnvironmentGuard;
use expense_gate_core::EnvironmentGuardConfig;
use expense_gate_core::EnvironmentSignals;
use expense_gate_core::EventId;
use expense_gate_core::IncrementOutcome;
use expense_gate_core::InMemoryGateStore;
use expense_gate_core::KeySet;
use expense_gate_core::ManualClock;
use expense_gate_core::Membership;
use expense_gate_core::MembershipStatus;
use expense_gate_core::MembershipStore;
use expense_gate_core::QuotaEnforcer;
use expense_gate_core::QuotaKey;
use expense_gate_core::QuotaStore;
use expense_gate_core::Role;
use expense_gate_core::SecurityEvent;
use expense_gate_core::SecurityEventSink;
use expense_gate_core::StoreError;
use expense_gate_core::SubjectId;
use expense_gate_core::SubscriptionRecord;
use expense_gate_core::SubscriptionStore;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;
use expense_gate_core::TokenClaims;
use expense_gate_core::TokenSigner;
use expense_gate_core::TokenVerifier;
use expense_gate_core::TokenVerifierConfig;
use expense_gate_core::WebhookEventRecord;
use expense_gate_core::WebhookSecret;
use expense_gate_core::interfaces::TransitionFn;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Time and Keys
// ============================================================================

/// 2026-03-01T00:00:00Z.
pub const START: i64 = 1_772_323_200;
/// Issuer used by fixture tokens.
pub const ISSUER: &str = "https://id.expense.test";
/// Audience used by fixture tokens.
pub const AUDIENCE: &str = "expense-api";
/// Key id used by fixture tokens.
pub const KID: &str = "test-key-1";
/// Shared webhook secret.
pub const WEBHOOK_SECRET: &[u8] = b"whsec_fixture";

/// Manual clock pinned to [`START`].
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_unix_secs(START)))
}

/// Fixture token signer.
pub fn signer() -> TokenSigner {
    TokenSigner::new(KID, SigningKey::from_bytes(&[7u8; 32]))
}

/// Key set trusting the fixture signer.
pub fn keys() -> KeySet {
    let mut keys = KeySet::new();
    keys.insert(KID, signer().verifying_key());
    keys
}

/// Verifier config bound to the fixture issuer and audience.
pub fn verifier_config() -> TokenVerifierConfig {
    TokenVerifierConfig {
        issuer: Some(ISSUER.to_string()),
        audience: Some(AUDIENCE.to_string()),
        ..TokenVerifierConfig::default()
    }
}

/// Verifier trusting the fixture signer.
pub fn verifier() -> TokenVerifier {
    TokenVerifier::new(verifier_config(), keys())
}

/// Claims with fixture issuer, audience, and email.
pub fn claims(sub: &str, iat: i64, exp: i64) -> TokenClaims {
    TokenClaims {
        sub: sub.to_string(),
        iat,
        exp,
        nbf: None,
        iss: Some(ISSUER.to_string()),
        aud: Some(AUDIENCE.to_string()),
        email: Some(format!("{sub}@example.test")),
    }
}

/// Token for `sub` issued at START and valid for one hour.
pub fn token_for(sub: &str) -> String {
    signer().sign(&claims(sub, START, START + 3_600)).unwrap()
}

// ============================================================================
// SECTION: Security Sink
// ============================================================================

/// Sink that keeps every event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    /// Recorded events.
    pub events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSink {
    /// Drains recorded events.
    pub fn take(&self) -> Vec<SecurityEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl SecurityEventSink for RecordingSink {
    fn record(&self, event: &SecurityEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Gate Fixture
// ============================================================================

/// Gate wired to in-memory stores.
pub struct GateFixture {
    /// Gate under test.
    pub gate: AccessGate,
    /// Backing store.
    pub store: InMemoryGateStore,
    /// Gate clock.
    pub clock: Arc<ManualClock>,
    /// Security event sink.
    pub sink: Arc<RecordingSink>,
}

/// Builds a gate with explicit environment signals and guard config.
pub fn gate_with(signals: EnvironmentSignals, guard: EnvironmentGuardConfig) -> GateFixture {
    let store = InMemoryGateStore::new();
    let clock = clock();
    let sink = Arc::new(RecordingSink::default());
    let environment = EnvironmentGuard::new(signals, guard, sink.clone());
    let gate = AccessGate::new(
        verifier(),
        environment,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        QuotaEnforcer::new(Arc::new(store.clone())),
        clock.clone(),
    );
    GateFixture {
        gate,
        store,
        clock,
        sink,
    }
}

/// Builds a gate for a plain non-production runtime.
pub fn gate() -> GateFixture {
    gate_with(EnvironmentSignals::default(), EnvironmentGuardConfig::default())
}

/// Adds an active membership.
pub fn add_member(store: &InMemoryGateStore, tenant: &str, subject: &str, role: Role) {
    store
        .upsert_membership(&Membership {
            tenant_id: TenantId::new(tenant),
            subject_id: SubjectId::new(subject),
            role,
            status: MembershipStatus::Active,
        })
        .unwrap();
}

// ============================================================================
// SECTION: Outage Store
// ============================================================================

/// In-memory store whose quota and subscription halves can be taken offline.
/// Memberships always answer so callers still authenticate.
#[derive(Clone, Default)]
pub struct OutageStore {
    /// State served while online.
    pub inner: InMemoryGateStore,
    /// Quota calls fail while set.
    quota_down: Arc<AtomicBool>,
    /// Subscription calls fail while set.
    subscriptions_down: Arc<AtomicBool>,
}

impl OutageStore {
    /// Takes quota counters offline or back online.
    pub fn set_quota_down(&self, down: bool) {
        self.quota_down.store(down, Ordering::SeqCst);
    }

    /// Takes subscription records and the ledger offline or back online.
    pub fn set_subscriptions_down(&self, down: bool) {
        self.subscriptions_down.store(down, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

impl MembershipStore for OutageStore {
    fn membership(&self, subject_id: &SubjectId) -> Result<Option<Membership>, StoreError> {
        self.inner.membership(subject_id)
    }

    fn upsert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        self.inner.upsert_membership(membership)
    }
}

impl SubscriptionStore for OutageStore {
    fn subscription(&self, tenant_id: &TenantId) -> Result<Option<SubscriptionRecord>, StoreError> {
        Self::check(&self.subscriptions_down)?;
        self.inner.subscription(tenant_id)
    }

    fn commit_event(
        &self,
        tenant_id: &TenantId,
        event: &WebhookEventRecord,
        decide: &TransitionFn<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        Self::check(&self.subscriptions_down)?;
        self.inner.commit_event(tenant_id, event, decide)
    }

    fn webhook_event(&self, event_id: &EventId) -> Result<Option<WebhookEventRecord>, StoreError> {
        Self::check(&self.subscriptions_down)?;
        self.inner.webhook_event(event_id)
    }

    fn prune_webhook_events(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Self::check(&self.subscriptions_down)?;
        self.inner.prune_webhook_events(cutoff)
    }
}

impl QuotaStore for OutageStore {
    fn try_increment(&self, key: &QuotaKey, limit: u64) -> Result<IncrementOutcome, StoreError> {
        Self::check(&self.quota_down)?;
        self.inner.try_increment(key, limit)
    }

    fn decrement(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        Self::check(&self.quota_down)?;
        self.inner.decrement(key)
    }

    fn count(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        Self::check(&self.quota_down)?;
        self.inner.count(key)
    }
}

/// Gate wired to an [`OutageStore`].
pub struct OutageFixture {
    /// Gate under test.
    pub gate: AccessGate,
    /// Switchable backing store.
    pub store: OutageStore,
}

/// Builds a gate over a switchable store in a plain non-production runtime.
pub fn outage_gate() -> OutageFixture {
    let store = OutageStore::default();
    let environment = EnvironmentGuard::new(
        EnvironmentSignals::default(),
        EnvironmentGuardConfig::default(),
        Arc::new(RecordingSink::default()),
    );
    let gate = AccessGate::new(
        verifier(),
        environment,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        QuotaEnforcer::new(Arc::new(store.clone())),
        clock(),
    );
    OutageFixture { gate, store }
}

// ============================================================================
// SECTION: Webhooks
// ============================================================================

/// Fixture webhook secret.
pub fn webhook_secret() -> WebhookSecret {
    WebhookSecret::new(WEBHOOK_SECRET)
}

/// Builds a subscription webhook body.
pub fn subscription_event(
    event_id: &str,
    event_type: &str,
    tenant: Option<&str>,
    tier: Option<&str>,
    subscription_id: &str,
    period_end: Option<&str>,
) -> Value {
    let mut custom_data = serde_json::Map::new();
    if let Some(tenant) = tenant {
        custom_data.insert("tenant_id".to_string(), json!(tenant));
    }
    if let Some(tier) = tier {
        custom_data.insert("plan_tier".to_string(), json!(tier));
    }
    let mut data = json!({
        "id": subscription_id,
        "customer_id": "ctm_01",
        "custom_data": custom_data,
    });
    if let Some(end) = period_end {
        data["current_billing_period"] = json!({ "ends_at": end });
    }
    json!({
        "event_id": event_id,
        "event_type": event_type,
        "occurred_at": "2026-03-01T00:00:00Z",
        "data": data,
    })
}
