// crates/expense-gate-server/src/audit.rs
// ============================================================================
// Module: Expense Gate Audit Logging
// Description: Structured audit events for webhook ingress and access decisions.
// Purpose: Emit redacted JSON-line audit records without a logging framework.
// Dependencies: expense-gate-core, expense-gate-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Three record families flow through an [`AuditSink`]: webhook deliveries,
//! access decisions, and the core's [`SecurityEvent`]s. Records are
//! serialized as one JSON object per line. Bearer tokens and webhook bodies
//! are never written; SHA-256 fingerprints stand in for them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use expense_gate_config::AuditConfig;
use expense_gate_config::AuditSinkKind;
use expense_gate_core::SecurityEvent;
use expense_gate_core::SecurityEventSink;
use expense_gate_core::sha256_hex;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hex characters kept from a token digest.
const FINGERPRINT_HEX_CHARS: usize = 16;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Billing webhook delivery record.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Provider event id, once the body was authenticated and parsed.
    pub event_id: Option<String>,
    /// Provider event type.
    pub event_type: Option<String>,
    /// Tenant named by the event.
    pub tenant_id: Option<String>,
    /// Outcome label (`applied`, `duplicate`, `ignored`, `dropped`, or an error kind).
    pub outcome: &'static str,
    /// HTTP status returned to the provider.
    pub status: u16,
    /// Failure detail, when rejected.
    pub detail: Option<String>,
    /// Raw body size in bytes.
    pub body_bytes: usize,
    /// SHA-256 of the raw body.
    pub body_sha256: String,
}

/// Inputs required to construct a webhook audit event.
pub struct WebhookAuditParams {
    /// Provider event id.
    pub event_id: Option<String>,
    /// Provider event type.
    pub event_type: Option<String>,
    /// Tenant named by the event.
    pub tenant_id: Option<String>,
    /// Outcome label.
    pub outcome: &'static str,
    /// HTTP status.
    pub status: u16,
    /// Failure detail.
    pub detail: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl WebhookAuditEvent {
    /// Creates a webhook audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: WebhookAuditParams) -> Self {
        Self {
            event: "webhook_delivery",
            timestamp_ms: now_ms(),
            event_id: params.event_id,
            event_type: params.event_type,
            tenant_id: params.tenant_id,
            outcome: params.outcome,
            status: params.status,
            detail: params.detail,
            body_bytes: params.body.len(),
            body_sha256: sha256_hex(&params.body),
        }
    }
}

/// Access decision record.
#[derive(Debug, Clone, Serialize)]
pub struct AccessAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Route label.
    pub route: &'static str,
    /// Caller subject, once authenticated.
    pub subject_id: Option<String>,
    /// Caller tenant, once resolved.
    pub tenant_id: Option<String>,
    /// Whether the request was allowed.
    pub allowed: bool,
    /// Decision reason label.
    pub reason: String,
    /// HTTP status returned.
    pub status: u16,
    /// Fingerprint of the presented bearer token.
    pub token_fingerprint: Option<String>,
    /// True when the local-development fallback identity was used.
    pub via_fallback: bool,
}

/// Inputs required to construct an access audit event.
pub struct AccessAuditParams {
    /// Route label.
    pub route: &'static str,
    /// Caller subject.
    pub subject_id: Option<String>,
    /// Caller tenant.
    pub tenant_id: Option<String>,
    /// Whether the request was allowed.
    pub allowed: bool,
    /// Decision reason label.
    pub reason: String,
    /// HTTP status.
    pub status: u16,
    /// Token fingerprint.
    pub token_fingerprint: Option<String>,
    /// Fallback identity used.
    pub via_fallback: bool,
}

impl AccessAuditEvent {
    /// Creates an access audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: AccessAuditParams) -> Self {
        Self {
            event: "access_decision",
            timestamp_ms: now_ms(),
            route: params.route,
            subject_id: params.subject_id,
            tenant_id: params.tenant_id,
            allowed: params.allowed,
            reason: params.reason,
            status: params.status,
            token_fingerprint: params.token_fingerprint,
            via_fallback: params.via_fallback,
        }
    }
}

/// Security event envelope.
#[derive(Debug, Serialize)]
struct SecurityAuditRecord<'a> {
    /// Event identifier.
    event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    timestamp_ms: u128,
    /// Core security event.
    security: &'a SecurityEvent,
}

impl<'a> SecurityAuditRecord<'a> {
    /// Wraps a security event.
    fn new(security: &'a SecurityEvent) -> Self {
        Self {
            event: "security_event",
            timestamp_ms: now_ms(),
            security,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for server events.
pub trait AuditSink: Send + Sync {
    /// Records a webhook delivery.
    fn record_webhook(&self, event: &WebhookAuditEvent);

    /// Records an access decision.
    fn record_access(&self, event: &AccessAuditEvent);

    /// Records a core security event.
    fn record_security(&self, event: &SecurityEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one record.
    fn emit(record: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(record) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_webhook(&self, event: &WebhookAuditEvent) {
        Self::emit(event);
    }

    fn record_access(&self, event: &AccessAuditEvent) {
        Self::emit(event);
    }

    fn record_security(&self, event: &SecurityEvent) {
        Self::emit(&SecurityAuditRecord::new(event));
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one record and flushes.
    fn emit(&self, record: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(record)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_webhook(&self, event: &WebhookAuditEvent) {
        self.emit(event);
    }

    fn record_access(&self, event: &AccessAuditEvent) {
        self.emit(event);
    }

    fn record_security(&self, event: &SecurityEvent) {
        self.emit(&SecurityAuditRecord::new(event));
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_webhook(&self, _event: &WebhookAuditEvent) {}

    fn record_access(&self, _event: &AccessAuditEvent) {}

    fn record_security(&self, _event: &SecurityEvent) {}
}

/// Routes core security events into an [`AuditSink`].
pub struct AuditSecuritySink {
    /// Destination sink.
    sink: Arc<dyn AuditSink>,
}

impl AuditSecuritySink {
    /// Wraps `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl SecurityEventSink for AuditSecuritySink {
    fn record(&self, event: &SecurityEvent) {
        self.sink.record_security(event);
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns an error when the file sink cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    Ok(match (config.sink, config.path.as_deref()) {
        (AuditSinkKind::Stderr, _) => Arc::new(StderrAuditSink),
        (AuditSinkKind::File, Some(path)) => Arc::new(FileAuditSink::new(path)?),
        (AuditSinkKind::File, None) => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "file audit sink requires a path"));
        }
        (AuditSinkKind::None, _) => Arc::new(NoopAuditSink),
    })
}

/// Returns a short SHA-256 fingerprint of a bearer token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let mut digest = sha256_hex(token.as_bytes());
    digest.truncate(FINGERPRINT_HEX_CHARS);
    digest
}

/// Milliseconds since the unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use std::fs;

    use expense_gate_core::EnvironmentSignals;
    use expense_gate_core::SecurityEventKind;
    use expense_gate_core::Severity;
    use expense_gate_core::Timestamp;
    use serde_json::Value;

    use super::*;

    #[test]
    fn fingerprint_is_stable_and_short() {
        let first = token_fingerprint("a.b.c");
        assert_eq!(first.len(), FINGERPRINT_HEX_CHARS);
        assert_eq!(first, token_fingerprint("a.b.c"));
        assert_ne!(first, token_fingerprint("a.b.d"));
    }

    #[test]
    fn file_sink_appends_one_json_object_per_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let sink = build_audit_sink(&AuditConfig {
            sink: AuditSinkKind::File,
            path: Some(path.clone()),
        })
        .unwrap();
        sink.record_webhook(&WebhookAuditEvent::new(WebhookAuditParams {
            event_id: Some("evt_1".to_string()),
            event_type: Some("subscription.created".to_string()),
            tenant_id: Some("tenant-1".to_string()),
            outcome: "applied",
            status: 200,
            detail: None,
            body: b"{\"secret\":true}".to_vec(),
        }));
        AuditSecuritySink::new(Arc::clone(&sink)).record(&SecurityEvent {
            kind: SecurityEventKind::AuthenticationBypassAttempt,
            severity: Severity::Critical,
            timestamp: Timestamp::from_unix_secs(1),
            message: "refused".to_string(),
            signals: EnvironmentSignals::default(),
            production_reasons: vec!["environment_name".to_string()],
            subject: None,
        });

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "webhook_delivery");
        assert_eq!(lines[0]["body_bytes"], 15);
        assert!(!content.contains("\"secret\""));
        assert_eq!(lines[1]["event"], "security_event");
        assert_eq!(lines[1]["security"]["kind"], "AUTHENTICATION_BYPASS_ATTEMPT");
    }
}
