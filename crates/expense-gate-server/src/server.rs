// crates/expense-gate-server/src/server.rs
// ============================================================================
// Module: Expense Gate HTTP Server
// Description: axum routes for billing webhooks and access queries.
// Purpose: Expose the access core over HTTP with fail-closed status mapping.
// Dependencies: expense-gate-core, expense-gate-config, expense-gate-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /webhooks/billing`: signature-verified subscription events.
//! - `POST /v1/access/check`: permission check for the bearer caller.
//! - `POST /v1/quota/admit` and `POST /v1/quota/release`: quota counters.
//! - `GET /v1/subscription`: subscription view for the caller's tenant.
//! - `GET /healthz`: store readiness.
//!
//! Handlers hand their store, gate, and audit work to
//! [`tokio::task::spawn_blocking`]; the stores and audit sinks are synchronous.
//!
//! Security posture: every body and header is untrusted. Denials carry a
//! stable label and never echo token material; store failures map to 503.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use expense_gate_config::ConfigError;
use expense_gate_config::ExpenseGateConfig;
use expense_gate_config::StoreConfig;
use expense_gate_core::AccessContext;
use expense_gate_core::AccessDenial;
use expense_gate_core::AccessGate;
use expense_gate_core::Admission;
use expense_gate_core::Clock;
use expense_gate_core::EnvironmentGuard;
use expense_gate_core::EnvironmentSignals;
use expense_gate_core::InMemoryGateStore;
use expense_gate_core::Limit;
use expense_gate_core::MembershipStore;
use expense_gate_core::Permission;
use expense_gate_core::PlanTier;
use expense_gate_core::QuotaEnforcer;
use expense_gate_core::QuotaStore;
use expense_gate_core::ResourceKind;
use expense_gate_core::ResourceRef;
use expense_gate_core::SubjectId;
use expense_gate_core::SubscriptionError;
use expense_gate_core::SubscriptionStateMachine;
use expense_gate_core::SubscriptionStatus;
use expense_gate_core::SubscriptionStore;
use expense_gate_core::SystemClock;
use expense_gate_core::TenantId;
use expense_gate_core::TokenVerifier;
use expense_gate_core::WebhookSecret;
use expense_gate_core::WebhookSignatureError;
use expense_gate_core::WebhookVerifier;
use expense_gate_core::runtime::parse_bearer_token;
use expense_gate_core::runtime::webhook::SIGNATURE_HEADER;
use expense_gate_store_sqlite::SqliteGateStore;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;

use crate::audit::AccessAuditEvent;
use crate::audit::AccessAuditParams;
use crate::audit::AuditSecuritySink;
use crate::audit::AuditSink;
use crate::audit::WebhookAuditEvent;
use crate::audit::WebhookAuditParams;
use crate::audit::build_audit_sink;
use crate::audit::token_fingerprint;

// ============================================================================
// SECTION: Store Backend
// ============================================================================

/// Store implementation selected by configuration.
#[derive(Clone)]
pub enum StoreBackend {
    /// Process-local store.
    Memory(InMemoryGateStore),
    /// `SQLite` store.
    Sqlite(SqliteGateStore),
}

impl StoreBackend {
    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Init`] when the `SQLite` store cannot be opened.
    pub fn from_config(config: &StoreConfig) -> Result<Self, ServerError> {
        match config {
            StoreConfig::Memory => Ok(Self::Memory(InMemoryGateStore::new())),
            StoreConfig::Sqlite(sqlite) => SqliteGateStore::new(sqlite)
                .map(Self::Sqlite)
                .map_err(|err| ServerError::Init(format!("sqlite store: {err}"))),
        }
    }

    /// Returns the membership store.
    #[must_use]
    pub fn memberships(&self) -> Arc<dyn MembershipStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Returns the subscription store.
    #[must_use]
    pub fn subscriptions(&self) -> Arc<dyn SubscriptionStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Returns the quota counter store.
    #[must_use]
    pub fn quota(&self) -> Arc<dyn QuotaStore> {
        match self {
            Self::Memory(store) => Arc::new(store.clone()),
            Self::Sqlite(store) => Arc::new(store.clone()),
        }
    }

    /// Checks store readiness.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when the store is not usable.
    pub fn readiness(&self) -> Result<(), String> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Sqlite(store) => store.readiness().map_err(|err| err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Process inputs captured once at startup.
pub struct ServerInputs {
    /// Environment classification signals.
    pub signals: EnvironmentSignals,
    /// Billing webhook secret.
    pub webhook_secret: WebhookSecret,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl ServerInputs {
    /// Captures signals and the webhook secret from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] when the webhook secret is unavailable.
    pub fn from_process(config: &ExpenseGateConfig) -> Result<Self, ServerError> {
        Ok(Self {
            signals: config.environment.capture_signals(),
            webhook_secret: config.webhook.resolve_secret()?,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Expense Gate HTTP server.
pub struct ExpenseGateServer {
    /// Validated configuration.
    config: ExpenseGateConfig,
    /// Store backend shared with handlers.
    backend: StoreBackend,
    /// Handler state.
    state: Arc<ServerState>,
}

impl ExpenseGateServer {
    /// Builds the server from configuration and captured process inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration, keys, stores, or the audit
    /// sink cannot be initialized.
    pub fn build(config: ExpenseGateConfig, inputs: ServerInputs) -> Result<Self, ServerError> {
        config.validate()?;
        let audit = build_audit_sink(&config.server.audit)
            .map_err(|err| ServerError::Init(format!("audit sink: {err}")))?;
        let backend = StoreBackend::from_config(&config.store)?;
        let tokens = TokenVerifier::new(config.auth.verifier_config(), config.auth.key_set()?);
        let environment = EnvironmentGuard::new(
            inputs.signals,
            config.environment.guard_config(),
            Arc::new(AuditSecuritySink::new(Arc::clone(&audit))),
        );
        let gate = AccessGate::new(
            tokens,
            environment,
            backend.memberships(),
            backend.subscriptions(),
            QuotaEnforcer::new(backend.quota()),
            inputs.clock,
        );
        let state = Arc::new(ServerState {
            gate,
            webhooks: WebhookVerifier::new(inputs.webhook_secret, config.webhook.verifier_config()),
            subscriptions: SubscriptionStateMachine::new(backend.subscriptions()),
            backend: backend.clone(),
            audit,
        });
        Ok(Self {
            config,
            backend,
            state,
        })
    }

    /// Returns the store backend.
    #[must_use]
    pub const fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/webhooks/billing",
                post(handle_billing_webhook)
                    .layer(DefaultBodyLimit::max(self.config.webhook.max_body_bytes)),
            )
            .route("/v1/access/check", post(handle_access_check))
            .route("/v1/quota/admit", post(handle_quota_admit))
            .route("/v1/quota/release", post(handle_quota_release))
            .route("/v1/subscription", get(handle_subscription))
            .route("/healthz", get(handle_health))
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.config.server.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {addr}: {err}")))?;
        self.serve_on(listener).await
    }

    /// Serves on an already-bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the server fails.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, self.router())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Shared handler state.
struct ServerState {
    /// Request-path access gate.
    gate: AccessGate,
    /// Billing webhook verifier.
    webhooks: WebhookVerifier,
    /// Subscription lifecycle.
    subscriptions: SubscriptionStateMachine,
    /// Store backend for readiness checks.
    backend: StoreBackend,
    /// Audit output.
    audit: Arc<dyn AuditSink>,
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable error label.
    error: &'static str,
    /// Human-readable detail.
    message: String,
}

/// `/webhooks/billing` response.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    /// Outcome label.
    outcome: &'static str,
    /// Provider event id.
    event_id: Option<String>,
    /// Subscription status after the event.
    subscription_status: Option<SubscriptionStatus>,
    /// Rejection detail for malformed deliveries.
    detail: Option<String>,
}

/// `/v1/access/check` request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessCheckRequest {
    /// Capability token.
    permission: String,
    /// Owner of the resource acted on.
    #[serde(default)]
    resource_owner_id: Option<String>,
    /// Tenant of the resource; defaults to the caller's tenant.
    #[serde(default)]
    resource_tenant_id: Option<String>,
}

/// `/v1/access/check` response.
#[derive(Debug, Serialize)]
struct AccessCheckResponse {
    /// Whether access is granted.
    allowed: bool,
    /// Decision reason label.
    reason: &'static str,
}

/// Quota route request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuotaRequest {
    /// Resource kind label.
    resource_kind: String,
}

/// `/v1/quota/admit` response.
#[derive(Debug, Serialize)]
struct QuotaAdmitResponse {
    /// Whether the creation may proceed.
    admitted: bool,
    /// Tier whose limits applied, when known.
    tier: Option<PlanTier>,
    /// Cap (`-1` for unlimited).
    limit: Limit,
    /// Usage after the decision; absent for unmetered admissions.
    usage: Option<u64>,
    /// Reason label.
    reason: &'static str,
}

/// `/v1/quota/release` response.
#[derive(Debug, Serialize)]
struct QuotaReleaseResponse {
    /// Usage after the release.
    usage: u64,
}

/// `/healthz` response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    /// `ok` or `unavailable`.
    status: &'static str,
}

// ============================================================================
// SECTION: Webhook Handling
// ============================================================================

/// Result of processing one webhook delivery.
struct WebhookReply {
    /// HTTP status.
    status: StatusCode,
    /// Outcome label.
    outcome: &'static str,
    /// Provider event id.
    event_id: Option<String>,
    /// Provider event type.
    event_type: Option<String>,
    /// Tenant named by the event.
    tenant_id: Option<String>,
    /// Subscription status after the event.
    subscription_status: Option<SubscriptionStatus>,
    /// Failure detail.
    detail: Option<String>,
}

impl WebhookReply {
    /// Reply for a delivery rejected before it was parsed.
    fn rejected(status: StatusCode, outcome: &'static str, detail: String) -> Self {
        Self {
            status,
            outcome,
            event_id: None,
            event_type: None,
            tenant_id: None,
            subscription_status: None,
            detail: Some(detail),
        }
    }

    /// Detail safe to return to the caller.
    fn public_detail(&self) -> Option<String> {
        let hidden = self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::SERVICE_UNAVAILABLE;
        if hidden { None } else { self.detail.clone() }
    }
}

impl ServerState {
    /// Verifies and applies one billing webhook delivery.
    fn process_webhook(&self, signature: &str, body: &[u8]) -> WebhookReply {
        let event = match self.webhooks.verify(body, signature, self.gate.clock()) {
            Ok(event) => event,
            Err(err) => {
                let (status, outcome) = match &err {
                    WebhookSignatureError::MalformedHeader(_)
                    | WebhookSignatureError::SignatureMismatch
                    | WebhookSignatureError::Stale { .. } => (StatusCode::UNAUTHORIZED, "signature_rejected"),
                    WebhookSignatureError::BodyTooLarge { .. } => {
                        (StatusCode::PAYLOAD_TOO_LARGE, "body_too_large")
                    }
                    WebhookSignatureError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "malformed_payload"),
                };
                return WebhookReply::rejected(status, outcome, err.to_string());
            }
        };

        let mut reply = WebhookReply {
            status: StatusCode::OK,
            outcome: "applied",
            event_id: Some(event.event_id.to_string()),
            event_type: Some(event.event_type.clone()),
            tenant_id: event.tenant_id().map(str::to_string),
            subscription_status: None,
            detail: None,
        };
        match self.subscriptions.apply(&event) {
            Ok(outcome) => {
                reply.outcome = outcome.label();
                reply.subscription_status = outcome.record().map(|record| record.status);
            }
            Err(err @ SubscriptionError::MissingTenantContext { .. }) => {
                reply.outcome = "dropped";
                reply.detail = Some(err.to_string());
            }
            Err(err @ SubscriptionError::UnknownPlanTier { .. }) => {
                reply.status = StatusCode::UNPROCESSABLE_ENTITY;
                reply.outcome = "unknown_plan_tier";
                reply.detail = Some(err.to_string());
            }
            Err(err @ SubscriptionError::MissingPlanTier { .. }) => {
                reply.status = StatusCode::UNPROCESSABLE_ENTITY;
                reply.outcome = "missing_plan_tier";
                reply.detail = Some(err.to_string());
            }
            Err(SubscriptionError::Store(err)) => {
                reply.status = StatusCode::SERVICE_UNAVAILABLE;
                reply.outcome = "store_unavailable";
                reply.detail = Some(err.to_string());
            }
        }
        reply
    }
}

/// Handles `POST /webhooks/billing`.
async fn handle_billing_webhook(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_blocking("billing webhook", move || billing_webhook(&state, &headers, &body)).await
}

/// Processes and audits one billing webhook delivery.
fn billing_webhook(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok()).unwrap_or_default();
    let reply = state.process_webhook(signature, body);
    let response = WebhookResponse {
        outcome: reply.outcome,
        event_id: reply.event_id.clone(),
        subscription_status: reply.subscription_status,
        detail: reply.public_detail(),
    };
    state.audit.record_webhook(&WebhookAuditEvent::new(WebhookAuditParams {
        event_id: reply.event_id,
        event_type: reply.event_type,
        tenant_id: reply.tenant_id,
        outcome: reply.outcome,
        status: reply.status.as_u16(),
        detail: reply.detail,
        body: body.to_vec(),
    }));
    (reply.status, Json(response)).into_response()
}

// ============================================================================
// SECTION: Access Handling
// ============================================================================

/// Per-request audit context.
struct RequestAudit {
    /// Route label.
    route: &'static str,
    /// Presented token fingerprint.
    token_fingerprint: Option<String>,
    /// Authenticated subject.
    subject_id: Option<String>,
    /// Resolved tenant.
    tenant_id: Option<String>,
    /// Fallback identity used.
    via_fallback: bool,
}

impl RequestAudit {
    /// Starts an audit context for `route`.
    fn new(route: &'static str, headers: &HeaderMap) -> Self {
        Self {
            route,
            token_fingerprint: parse_bearer_token(authorization(headers)).ok().map(token_fingerprint),
            subject_id: None,
            tenant_id: None,
            via_fallback: false,
        }
    }

    /// Records the authenticated caller.
    fn identify(&mut self, ctx: &AccessContext) {
        self.subject_id = Some(ctx.principal.subject_id.to_string());
        self.tenant_id = Some(ctx.tenant_id().to_string());
        self.via_fallback = ctx.via_fallback;
    }

    /// Emits the access audit record.
    fn finish(self, sink: &dyn AuditSink, allowed: bool, reason: &str, status: StatusCode) {
        sink.record_access(&AccessAuditEvent::new(AccessAuditParams {
            route: self.route,
            subject_id: self.subject_id,
            tenant_id: self.tenant_id,
            allowed,
            reason: reason.to_string(),
            status: status.as_u16(),
            token_fingerprint: self.token_fingerprint,
            via_fallback: self.via_fallback,
        }));
    }
}

impl ServerState {
    /// Authenticates the caller and records identity on the audit context.
    fn authenticate(&self, headers: &HeaderMap, audit: &mut RequestAudit) -> Result<AccessContext, AccessDenial> {
        let ctx = self.gate.authenticate(authorization(headers))?;
        audit.identify(&ctx);
        Ok(ctx)
    }

    /// Converts a denial into a response and audits it.
    fn deny(&self, audit: RequestAudit, denial: &AccessDenial) -> Response {
        let status = StatusCode::from_u16(denial.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match denial {
            AccessDenial::Unavailable(_) => "access core unavailable".to_string(),
            other => other.to_string(),
        };
        audit.finish(self.audit.as_ref(), false, denial.label(), status);
        (
            status,
            Json(ErrorBody {
                error: denial.label(),
                message,
            }),
        )
            .into_response()
    }

    /// Rejects a malformed request body.
    fn bad_request(&self, audit: RequestAudit, message: String) -> Response {
        audit.finish(self.audit.as_ref(), false, "invalid_request", StatusCode::BAD_REQUEST);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request",
                message,
            }),
        )
            .into_response()
    }
}

/// Handles `POST /v1/access/check`.
async fn handle_access_check(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_blocking("access check", move || access_check(&state, &headers, &body)).await
}

/// Runs the `POST /v1/access/check` route.
fn access_check(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> Response {
    let mut audit = RequestAudit::new("access_check", headers);
    let ctx = match state.authenticate(headers, &mut audit) {
        Ok(ctx) => ctx,
        Err(denial) => return state.deny(audit, &denial),
    };
    let request: AccessCheckRequest = match parse_json(body) {
        Ok(request) => request,
        Err(message) => return state.bad_request(audit, message),
    };
    let Some(permission) = Permission::parse(&request.permission) else {
        return state.bad_request(audit, format!("unknown permission: {}", request.permission));
    };
    let resource = request.resource_owner_id.map(|owner| ResourceRef {
        owner_id: SubjectId::new(owner),
        tenant_id: request.resource_tenant_id.map_or_else(|| ctx.tenant_id().clone(), TenantId::new),
    });
    let (status, allowed, reason) = match state.gate.check_permission(&ctx, permission, resource.as_ref()) {
        Ok(reason) => (StatusCode::OK, true, reason),
        Err(AccessDenial::PermissionDenied(reason)) => (StatusCode::FORBIDDEN, false, reason),
        Err(denial) => return state.deny(audit, &denial),
    };
    audit.finish(state.audit.as_ref(), allowed, reason.as_str(), status);
    (
        status,
        Json(AccessCheckResponse {
            allowed,
            reason: reason.as_str(),
        }),
    )
        .into_response()
}

/// Handles `POST /v1/quota/admit`.
async fn handle_quota_admit(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_blocking("quota admit", move || quota_admit(&state, &headers, &body)).await
}

/// Runs the `POST /v1/quota/admit` route.
fn quota_admit(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> Response {
    let mut audit = RequestAudit::new("quota_admit", headers);
    let ctx = match state.authenticate(headers, &mut audit) {
        Ok(ctx) => ctx,
        Err(denial) => return state.deny(audit, &denial),
    };
    let kind = match parse_resource_kind(body) {
        Ok(kind) => kind,
        Err(message) => return state.bad_request(audit, message),
    };
    let response = match state.gate.try_admit(&ctx, kind) {
        Ok(admission) => {
            let (usage, reason) = match admission.admission {
                Admission::Admitted { usage } => (Some(usage), "admitted"),
                Admission::Unmetered => (None, "unmetered"),
                Admission::Rejected(exceeded) => (Some(exceeded.usage), "quota_exceeded"),
            };
            QuotaAdmitResponse {
                admitted: admission.admission.is_admitted(),
                tier: Some(admission.tier),
                limit: admission.limit,
                usage,
                reason,
            }
        }
        Err(AccessDenial::QuotaExceeded(exceeded)) => QuotaAdmitResponse {
            admitted: false,
            tier: state.gate.effective_tier(ctx.tenant_id()).ok(),
            limit: Limit::AtMost(exceeded.limit),
            usage: Some(exceeded.usage),
            reason: "quota_exceeded",
        },
        Err(denial) => return state.deny(audit, &denial),
    };
    audit.finish(state.audit.as_ref(), response.admitted, response.reason, StatusCode::OK);
    (StatusCode::OK, Json(response)).into_response()
}

/// Handles `POST /v1/quota/release`.
async fn handle_quota_release(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_blocking("quota release", move || quota_release(&state, &headers, &body)).await
}

/// Runs the `POST /v1/quota/release` route.
fn quota_release(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> Response {
    let mut audit = RequestAudit::new("quota_release", headers);
    let ctx = match state.authenticate(headers, &mut audit) {
        Ok(ctx) => ctx,
        Err(denial) => return state.deny(audit, &denial),
    };
    let kind = match parse_resource_kind(body) {
        Ok(kind) => kind,
        Err(message) => return state.bad_request(audit, message),
    };
    match state.gate.release(&ctx, kind) {
        Ok(usage) => {
            audit.finish(state.audit.as_ref(), true, "released", StatusCode::OK);
            (StatusCode::OK, Json(QuotaReleaseResponse { usage })).into_response()
        }
        Err(denial) => state.deny(audit, &denial),
    }
}

/// Handles `GET /v1/subscription`.
async fn handle_subscription(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    run_blocking("subscription", move || subscription(&state, &headers)).await
}

/// Runs the `GET /v1/subscription` route.
fn subscription(state: &ServerState, headers: &HeaderMap) -> Response {
    let mut audit = RequestAudit::new("subscription", headers);
    let ctx = match state.authenticate(headers, &mut audit) {
        Ok(ctx) => ctx,
        Err(denial) => return state.deny(audit, &denial),
    };
    match state.gate.subscription_status(ctx.tenant_id()) {
        Ok(view) => {
            audit.finish(state.audit.as_ref(), true, "granted", StatusCode::OK);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(denial) => state.deny(audit, &denial),
    }
}

/// Handles `GET /healthz`.
async fn handle_health(State(state): State<Arc<ServerState>>) -> Response {
    run_blocking("health", move || match state.backend.readiness() {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response(),
        Err(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "unavailable" })).into_response()
        }
    })
    .await
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs synchronous route work on the blocking pool.
async fn run_blocking<F>(route: &'static str, work: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.unwrap_or_else(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "internal_error",
                message: format!("{route} join failed: {err}"),
            }),
        )
            .into_response()
    })
}

/// Returns the `Authorization` header value.
fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

/// Parses a JSON request body.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|err| format!("invalid request body: {err}"))
}

/// Parses a quota request body into a resource kind.
fn parse_resource_kind(body: &[u8]) -> Result<ResourceKind, String> {
    let request: QuotaRequest = parse_json(body)?;
    ResourceKind::parse(&request.resource_kind)
        .ok_or_else(|| format!("unknown resource kind: {}", request.resource_kind))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
