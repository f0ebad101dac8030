// crates/expense-gate-server/tests/http_surface.rs
// ============================================================================
// Module: HTTP Surface Tests
// Description: End-to-end checks of webhook ingress and access query routes.
// Purpose: Ensure status mapping, idempotency, and audit output over real HTTP.
// Dependencies: expense-gate-server, expense-gate-config, reqwest, rusqlite, tokio, tempfile
// ============================================================================

//! ## Overview
//! Starts the axum router on an ephemeral port with a manual clock and drives
//! it with `reqwest`, then inspects the JSON-line audit file.

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

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use expense_gate_config::ExpenseGateConfig;
use expense_gate_core::Clock;
use expense_gate_core::EventId;
use expense_gate_core::EnvironmentSignals;
use expense_gate_core::ManualClock;
use expense_gate_core::Membership;
use expense_gate_core::MembershipStatus;
use expense_gate_core::Role;
use expense_gate_core::SubjectId;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;
use expense_gate_core::TokenClaims;
use expense_gate_core::TokenSigner;
use expense_gate_core::WebhookSecret;
use expense_gate_server::ExpenseGateServer;
use expense_gate_server::ServerInputs;
use expense_gate_server::StoreBackend;
use reqwest::StatusCode;
use rusqlite::Connection;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fixed test time (2026-03-01T00:00:00Z).
const START: i64 = 1_772_323_200;
/// Public key of the `[7u8; 32]` signing key.
const PUBLIC_KEY: &str = "6kpsY+KcUgq+9VB7Ey7F+ZVHdq6+vnuSQh7qaRRG0iw=";
/// Webhook secret shared with the fixture provider.
const SECRET: &str = "whsec_http_test";

/// Running server plus handles needed by assertions.
struct Harness {
    /// Base URL.
    base: String,
    /// HTTP client.
    client: reqwest::Client,
    /// Store backend for seeding memberships.
    backend: StoreBackend,
    /// Audit log path.
    audit_path: PathBuf,
    /// Keeps the temp dir alive.
    _dir: TempDir,
}

impl Harness {
    async fn start(extra: &str, signals: EnvironmentSignals) -> Self {
        let dir = TempDir::new().unwrap();
        let audit_path = dir.path().join("audit.log");
        let toml = format!(
            r#"
[server.audit]
sink = "file"
path = "{}"

[auth]
issuer = "https://id.expense.test"
audience = "expense-api"

[[auth.keys]]
kid = "test-key-1"
public_key = "{PUBLIC_KEY}"

{extra}
"#,
            audit_path.display()
        );
        let config = ExpenseGateConfig::from_toml_str(&toml).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::from_unix_secs(START)));
        let server = ExpenseGateServer::build(
            config,
            ServerInputs {
                signals,
                webhook_secret: WebhookSecret::new(SECRET),
                clock,
            },
        )
        .unwrap();
        let backend = server.backend().clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve_on(listener));
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            backend,
            audit_path,
            _dir: dir,
        }
    }

    async fn plain() -> Self {
        Self::start("", EnvironmentSignals::default()).await
    }

    fn add_member(&self, subject: &str, role: Role) {
        self.backend
            .memberships()
            .upsert_membership(&Membership {
                tenant_id: TenantId::new("tenant-1"),
                subject_id: SubjectId::new(subject),
                role,
                status: MembershipStatus::Active,
            })
            .unwrap();
    }

    async fn post_webhook(&self, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
        let raw = serde_json::to_vec(body).unwrap();
        let signature = signature.unwrap_or_else(|| {
            WebhookSecret::new(SECRET).signature_header(Timestamp::from_unix_secs(START), &raw)
        });
        let response = self
            .client
            .post(format!("{}/webhooks/billing", self.base))
            .header("billing-signature", signature)
            .body(raw)
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn post_api(&self, path: &str, subject: Option<&str>, body: &Value) -> (StatusCode, Value) {
        let mut request = self.client.post(format!("{}{path}", self.base)).json(body);
        if let Some(subject) = subject {
            request = request.bearer_auth(token_for(subject));
        }
        let response = request.send().await.unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn get_api(&self, path: &str, subject: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.get(format!("{}{path}", self.base));
        if let Some(subject) = subject {
            request = request.bearer_auth(token_for(subject));
        }
        let response = request.send().await.unwrap();
        (response.status(), response.json().await.unwrap())
    }

    fn audit_lines(&self) -> Vec<Value> {
        fs::read_to_string(&self.audit_path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn token_for(subject: &str) -> String {
    TokenSigner::new("test-key-1", SigningKey::from_bytes(&[7u8; 32]))
        .sign(&TokenClaims {
            sub: subject.to_string(),
            iat: START,
            exp: START + 3_600,
            nbf: None,
            iss: Some("https://id.expense.test".to_string()),
            aud: Some("expense-api".to_string()),
            email: None,
        })
        .unwrap()
}

fn subscription_event(event_id: &str, event_type: &str, tenant: Option<&str>, tier: &str) -> Value {
    let mut custom_data = json!({ "plan_tier": tier });
    if let Some(tenant) = tenant {
        custom_data["tenant_id"] = json!(tenant);
    }
    json!({
        "event_id": event_id,
        "event_type": event_type,
        "occurred_at": "2026-03-01T00:00:00Z",
        "data": {
            "id": "sub_01",
            "customer_id": "ctm_01",
            "custom_data": custom_data,
        },
    })
}

// ============================================================================
// SECTION: Health
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_ok_for_memory_store() {
    let harness = Harness::plain().await;
    let (status, body) = harness.get_api("/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ============================================================================
// SECTION: Webhooks
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn webhook_applies_once_and_acknowledges_duplicates() {
    let harness = Harness::plain().await;
    let event = subscription_event("evt_1", "subscription.created", Some("tenant-1"), "starter");
    let (status, body) = harness.post_webhook(&event, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["subscription_status"], "trialing");

    let (status, body) = harness.post_webhook(&event, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    harness.add_member("user-1", Role::Owner);
    let (status, view) = harness.get_api("/v1/subscription", Some("user-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "trialing");
    assert_eq!(view["effective_tier"], "starter");
    assert_eq!(view["limits"]["max_projects"], 10);

    let outcomes: Vec<Value> = harness
        .audit_lines()
        .into_iter()
        .filter(|line| line["event"] == "webhook_delivery")
        .map(|line| line["outcome"].clone())
        .collect();
    assert_eq!(outcomes, vec![json!("applied"), json!("duplicate")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn webhook_signature_failures_are_unauthorized() {
    let harness = Harness::plain().await;
    let event = subscription_event("evt_2", "subscription.created", Some("tenant-1"), "starter");
    let forged = WebhookSecret::new("wrong").signature_header(Timestamp::from_unix_secs(START), b"{}");
    let (status, body) = harness.post_webhook(&event, Some(forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["outcome"], "signature_rejected");
    assert!(body["detail"].is_null());

    let (status, _) = harness.post_webhook(&event, Some(String::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let raw = serde_json::to_vec(&event).unwrap();
    let stale = WebhookSecret::new(SECRET).signature_header(Timestamp::from_unix_secs(START - 301), &raw);
    let (status, _) = harness.post_webhook(&event, Some(stale)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    harness.add_member("user-1", Role::Owner);
    let (_, view) = harness.get_api("/v1/subscription", Some("user-1")).await;
    assert_eq!(view["status"], "none");
}

#[tokio::test(flavor = "multi_thread")]
async fn webhook_payload_problems_map_to_client_errors() {
    let harness = Harness::plain().await;
    let unknown_tier = subscription_event("evt_3", "subscription.created", Some("tenant-1"), "platinum");
    let (status, body) = harness.post_webhook(&unknown_tier, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], "unknown_plan_tier");

    let no_tenant = subscription_event("evt_4", "subscription.created", None, "starter");
    let (status, body) = harness.post_webhook(&no_tenant, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "dropped");

    let not_an_event = json!({ "hello": "world" });
    let (status, body) = harness.post_webhook(&not_an_event, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "malformed_payload");
}

#[tokio::test(flavor = "multi_thread")]
async fn locked_store_answers_unavailable_and_records_nothing() {
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("gate.sqlite");
    let store = format!("[store]\ntype = \"sqlite\"\npath = \"{}\"\nbusy_timeout_ms = 50\n", db.display());
    let harness = Harness::start(&store, EnvironmentSignals::default()).await;
    harness.add_member("user-1", Role::Owner);

    let writer = Connection::open(&db).unwrap();
    writer.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let event = subscription_event("evt_9", "subscription.created", Some("tenant-1"), "starter");
    let (status, body) = harness.post_webhook(&event, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "store_unavailable");
    assert!(body["detail"].is_null());

    let (status, body) =
        harness.post_api("/v1/quota/admit", Some("user-1"), &json!({ "resource_kind": "projects" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "unavailable");

    writer.execute_batch("ROLLBACK;").unwrap();
    let subscriptions = harness.backend.subscriptions();
    assert!(subscriptions.webhook_event(&EventId::new("evt_9")).unwrap().is_none());
    assert!(subscriptions.subscription(&TenantId::new("tenant-1")).unwrap().is_none());

    let (status, body) = harness.post_webhook(&event, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
}

// ============================================================================
// SECTION: Access Checks
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn access_check_reports_reason_and_status() {
    let harness = Harness::plain().await;
    harness.add_member("emp-1", Role::Employee);

    let own = json!({ "permission": "edit_own_expenses", "resource_owner_id": "emp-1" });
    let (status, body) = harness.post_api("/v1/access/check", Some("emp-1"), &own).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "allowed": true, "reason": "granted_own_resource" }));

    let theirs = json!({ "permission": "edit_own_expenses", "resource_owner_id": "emp-2" });
    let (status, body) = harness.post_api("/v1/access/check", Some("emp-1"), &theirs).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "not_resource_owner");

    let cross = json!({
        "permission": "view_own_expenses",
        "resource_owner_id": "emp-1",
        "resource_tenant_id": "tenant-2",
    });
    let (status, body) = harness.post_api("/v1/access/check", Some("emp-1"), &cross).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "cross_tenant");

    let billing = json!({ "permission": "manage_billing" });
    let (status, body) = harness.post_api("/v1/access/check", Some("emp-1"), &billing).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "role_lacks_permission");

    let unknown = json!({ "permission": "launch_rockets" });
    let (status, body) = harness.post_api("/v1/access/check", Some("emp-1"), &unknown).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthenticated_and_unknown_callers_are_denied() {
    let harness = Harness::plain().await;
    let request = json!({ "permission": "view_projects" });
    let (status, body) = harness.post_api("/v1/access/check", None, &request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, body) = harness.post_api("/v1/access/check", Some("stranger"), &request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "no_membership");

    let token = token_for("stranger");
    let content = fs::read_to_string(&harness.audit_path).unwrap();
    assert!(!content.contains(&token));
    let decisions: Vec<Value> =
        harness.audit_lines().into_iter().filter(|line| line["event"] == "access_decision").collect();
    assert_eq!(decisions.len(), 2);
    assert!(decisions[0]["token_fingerprint"].is_null());
    assert_eq!(decisions[1]["subject_id"], Value::Null);
    assert_eq!(decisions[1]["reason"], "no_membership");
    assert!(decisions[1]["token_fingerprint"].is_string());
}

// ============================================================================
// SECTION: Quota
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn quota_admission_stops_at_free_tier_cap() {
    let harness = Harness::plain().await;
    harness.add_member("owner-1", Role::Owner);
    let projects = json!({ "resource_kind": "projects" });
    for expected in 1..=3 {
        let (status, body) = harness.post_api("/v1/quota/admit", Some("owner-1"), &projects).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admitted"], true);
        assert_eq!(body["usage"], expected);
        assert_eq!(body["limit"], 3);
        assert_eq!(body["tier"], "free");
    }
    let (status, body) = harness.post_api("/v1/quota/admit", Some("owner-1"), &projects).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["admitted"], false);
    assert_eq!(body["reason"], "quota_exceeded");
    assert_eq!(body["usage"], 3);

    let (status, body) = harness.post_api("/v1/quota/release", Some("owner-1"), &projects).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage"], 2);

    let (status, _) =
        harness.post_api("/v1/quota/admit", Some("owner-1"), &json!({ "resource_kind": "widgets" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// SECTION: Environment Fallback
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn fallback_is_refused_in_production_and_audited() {
    let signals = EnvironmentSignals {
        environment_name: Some("production".to_string()),
        deployment_stage: None,
        region: None,
        local_development: true,
    };
    let harness = Harness::start("[environment.fallback]\nsubject_id = \"dev-user\"", signals).await;
    harness.add_member("dev-user", Role::Owner);
    let (status, body) = harness.get_api("/v1/subscription", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "environment_security");

    let security: Vec<Value> =
        harness.audit_lines().into_iter().filter(|line| line["event"] == "security_event").collect();
    assert_eq!(security.len(), 1);
    assert_eq!(security[0]["security"]["kind"], "AUTHENTICATION_BYPASS_ATTEMPT");
    assert_eq!(security[0]["security"]["severity"], "CRITICAL");
}

#[tokio::test(flavor = "multi_thread")]
async fn fallback_identity_serves_local_development() {
    let signals = EnvironmentSignals {
        environment_name: Some("development".to_string()),
        deployment_stage: None,
        region: None,
        local_development: true,
    };
    let harness = Harness::start("[environment.fallback]\nsubject_id = \"dev-user\"", signals).await;
    harness.add_member("dev-user", Role::Owner);
    let (status, view) = harness.get_api("/v1/subscription", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["tenant_id"], "tenant-1");

    let decisions: Vec<Value> =
        harness.audit_lines().into_iter().filter(|line| line["event"] == "access_decision").collect();
    assert_eq!(decisions.last().unwrap()["via_fallback"], true);
}
