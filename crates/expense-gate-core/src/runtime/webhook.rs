// crates/expense-gate-core/src/runtime/webhook.rs
// ============================================================================
// Module: Expense Gate Webhook Verifier
// Description: Timestamped HMAC-SHA256 verification of billing webhooks.
// Purpose: Authenticate billing deliveries and parse them into typed events.
// Dependencies: hmac, sha2, subtle, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The signature header has the form `ts=<unix-seconds>;h1=<hex>` and may
//! carry several `h1` values during secret rotation. The expected digest is
//! HMAC-SHA256 over `"{ts}:{raw_body}"`. Every candidate is compared in
//! constant time and the comparisons are folded without early exit.
//!
//! A matching digest is still rejected when `ts` lies outside the replay
//! tolerance window in either direction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use subtle::Choice;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::Clock;
use crate::core::EventId;
use crate::core::Timestamp;
use crate::core::hashing::hex_decode;
use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "billing-signature";
/// Default replay tolerance.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;
/// Default maximum body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;
/// Maximum signature header length.
const MAX_SIGNATURE_HEADER_BYTES: usize = 1024;
/// Maximum `h1` candidates per header.
const MAX_SIGNATURE_CANDIDATES: usize = 8;

/// HMAC-SHA256.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Webhook rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookSignatureError {
    /// Signature header missing or unparseable.
    #[error("malformed signature header: {0}")]
    MalformedHeader(String),
    /// No candidate digest matched.
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    /// Timestamp outside the replay tolerance.
    #[error("webhook timestamp {timestamp} outside tolerance at {now}")]
    Stale {
        /// Header timestamp.
        timestamp: i64,
        /// Verifier time.
        now: i64,
    },
    /// Body exceeds the size limit.
    #[error("webhook body of {size} bytes exceeds {max}")]
    BodyTooLarge {
        /// Body size.
        size: usize,
        /// Configured limit.
        max: usize,
    },
    /// Signature valid but the body is not a billing event.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookSignatureError {
    /// Returns true when the delivery failed authentication (HTTP 401).
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        !matches!(self, Self::MalformedPayload(_) | Self::BodyTooLarge { .. })
    }
}

// ============================================================================
// SECTION: Secret
// ============================================================================

/// Shared webhook signing secret. Debug output is redacted.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    /// Wraps secret bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Computes the raw digest for `timestamp` and `body`.
    fn digest(&self, timestamp: i64, body: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length, so construction cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.0) else {
            return Vec::new();
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b":");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    /// Builds a signature header for `body` at `timestamp`.
    #[must_use]
    pub fn signature_header(&self, timestamp: Timestamp, body: &[u8]) -> String {
        let ts = timestamp.as_unix_secs();
        format!("ts={ts};h1={}", hex_encode(&self.digest(ts, body)))
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

// ============================================================================
// SECTION: Header Parsing
// ============================================================================

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Signed timestamp.
    pub timestamp: i64,
    /// Candidate digests.
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `ts=<secs>;h1=<hex>[;h1=<hex>...]`. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookSignatureError::MalformedHeader`] on any structural problem.
    pub fn parse(header: &str) -> Result<Self, WebhookSignatureError> {
        let malformed = |message: &str| WebhookSignatureError::MalformedHeader(message.to_string());
        if header.len() > MAX_SIGNATURE_HEADER_BYTES {
            return Err(malformed("header too long"));
        }
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| malformed("expected key=value"))?;
            match key.trim() {
                "ts" => {
                    if timestamp.is_some() {
                        return Err(malformed("duplicate ts"));
                    }
                    let parsed = value.trim().parse::<i64>().map_err(|_| malformed("ts is not an integer"))?;
                    timestamp = Some(parsed);
                }
                "h1" => {
                    if signatures.len() == MAX_SIGNATURE_CANDIDATES {
                        return Err(malformed("too many h1 values"));
                    }
                    signatures.push(hex_decode(value.trim()).ok_or_else(|| malformed("h1 is not hex"))?);
                }
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or_else(|| malformed("missing ts"))?;
        if signatures.is_empty() {
            return Err(malformed("missing h1"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Closed set of billing event kinds the state machine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    /// Subscription created.
    Created,
    /// Trial started.
    TrialStarted,
    /// Subscription activated.
    Activated,
    /// Charge succeeded.
    PaymentSucceeded,
    /// Charge failed.
    PaymentFailed,
    /// Plan or period changed.
    Updated,
    /// Subscription canceled.
    Canceled,
    /// Anything else; applied as a logged no-op.
    Unknown(String),
}

impl BillingEventKind {
    /// Maps a provider event type string.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "subscription.created" => Self::Created,
            "subscription.trialing" => Self::TrialStarted,
            "subscription.activated" => Self::Activated,
            "transaction.completed" => Self::PaymentSucceeded,
            "transaction.payment_failed" | "subscription.past_due" => Self::PaymentFailed,
            "subscription.updated" => Self::Updated,
            "subscription.canceled" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Tenant linkage the application attaches to provider objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomData {
    /// Tenant the subscription belongs to.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Plan tier label.
    #[serde(default)]
    pub plan_tier: Option<String>,
}

/// Billing period bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// Period start (RFC 3339).
    #[serde(default)]
    pub starts_at: Option<String>,
    /// Period end (RFC 3339).
    #[serde(default)]
    pub ends_at: Option<String>,
}

/// Provider object carried by the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEventData {
    /// Object id (subscription id for `subscription.*`, transaction id otherwise).
    #[serde(default)]
    pub id: Option<String>,
    /// Subscription id on transaction objects.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Provider customer id.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Provider status label.
    #[serde(default)]
    pub status: Option<String>,
    /// Application metadata.
    #[serde(default)]
    pub custom_data: CustomData,
    /// Current billing period.
    #[serde(default)]
    pub current_billing_period: Option<BillingPeriod>,
}

/// Webhook envelope.
#[derive(Debug, Deserialize)]
struct BillingEnvelope {
    /// Provider event id.
    event_id: String,
    /// Provider event type.
    event_type: String,
    /// Occurrence time (RFC 3339).
    #[serde(default)]
    occurred_at: Option<String>,
    /// Event object.
    #[serde(default)]
    data: BillingEventData,
}

/// Authenticated, parsed billing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedEvent {
    /// Provider event id.
    pub event_id: EventId,
    /// Provider event type string.
    pub event_type: String,
    /// Mapped kind.
    pub kind: BillingEventKind,
    /// Occurrence time, when supplied.
    pub occurred_at: Option<Timestamp>,
    /// Verification time.
    pub received_at: Timestamp,
    /// Event object.
    pub data: BillingEventData,
}

impl VerifiedEvent {
    /// Returns the provider subscription id the event refers to.
    #[must_use]
    pub fn provider_subscription_id(&self) -> Option<&str> {
        self.data.subscription_id.as_deref().or_else(|| {
            if self.event_type.starts_with("subscription.") { self.data.id.as_deref() } else { None }
        })
    }

    /// Returns the end of the current billing period, when present and valid.
    #[must_use]
    pub fn current_period_end(&self) -> Option<Timestamp> {
        self.data
            .current_billing_period
            .as_ref()
            .and_then(|period| period.ends_at.as_deref())
            .and_then(Timestamp::parse_rfc3339)
    }

    /// Returns the non-empty tenant id from custom data.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.data.custom_data.tenant_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verifier configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookVerifierConfig {
    /// Replay tolerance in seconds.
    pub tolerance_secs: u64,
    /// Maximum body size.
    pub max_body_bytes: usize,
}

impl Default for WebhookVerifierConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Billing webhook verifier.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    /// Shared secret.
    secret: WebhookSecret,
    /// Verification settings.
    config: WebhookVerifierConfig,
}

impl WebhookVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(secret: WebhookSecret, config: WebhookVerifierConfig) -> Self {
        Self { secret, config }
    }

    /// Verifies a delivery and parses its payload.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookSignatureError`] on size, header, signature, replay,
    /// or payload failures.
    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        clock: &dyn Clock,
    ) -> Result<VerifiedEvent, WebhookSignatureError> {
        if raw_body.len() > self.config.max_body_bytes {
            return Err(WebhookSignatureError::BodyTooLarge {
                size: raw_body.len(),
                max: self.config.max_body_bytes,
            });
        }
        let header = SignatureHeader::parse(signature_header)?;
        let expected = self.secret.digest(header.timestamp, raw_body);
        let matched = header
            .signatures
            .iter()
            .fold(Choice::from(0), |acc, candidate| acc | expected.as_slice().ct_eq(candidate.as_slice()));
        if !bool::from(matched) {
            return Err(WebhookSignatureError::SignatureMismatch);
        }

        let now = clock.now();
        let tolerance = i64::try_from(self.config.tolerance_secs).unwrap_or(i64::MAX);
        let drift = now.as_unix_secs().saturating_sub(header.timestamp);
        if drift.saturating_abs() > tolerance {
            return Err(WebhookSignatureError::Stale {
                timestamp: header.timestamp,
                now: now.as_unix_secs(),
            });
        }

        let envelope: BillingEnvelope = serde_json::from_slice(raw_body)
            .map_err(|err| WebhookSignatureError::MalformedPayload(err.to_string()))?;
        if envelope.event_id.trim().is_empty() {
            return Err(WebhookSignatureError::MalformedPayload("empty event_id".to_string()));
        }
        Ok(VerifiedEvent {
            event_id: EventId::new(envelope.event_id),
            kind: BillingEventKind::from_event_type(&envelope.event_type),
            event_type: envelope.event_type,
            occurred_at: envelope.occurred_at.as_deref().and_then(Timestamp::parse_rfc3339),
            received_at: now,
            data: envelope.data,
        })
    }
}
