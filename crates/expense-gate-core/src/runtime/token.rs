// crates/expense-gate-core/src/runtime/token.rs
// ============================================================================
// Module: Expense Gate Token Verifier
// Description: Ed25519 compact-JWS bearer token verification.
// Purpose: Turn a bearer credential into a verified principal or a typed failure.
// Dependencies: base64, ed25519-dalek, jsonwebtoken, serde, thiserror
// ============================================================================

//! ## Overview
//! Tokens are compact JWS strings signed with Ed25519 (`alg = "EdDSA"`) and
//! decoded with `jsonwebtoken`. The header `kid` selects a key from a static
//! [`KeySet`] loaded at startup.
//!
//! `jsonwebtoken` owns structure and signature checks; its own time checks
//! are disabled so each time-bound failure keeps a distinct kind.
//! Checks run in a fixed order: structure, signature, issuer and audience,
//! future-issued `iat` (with clock skew), `nbf`, `exp`, and finally the
//! freshness ceiling (`now - iat > max_token_age`), which bounds a leaked
//! token's lifetime regardless of the issuer's `exp`.
//!
//! Verification is pure. Logging is the caller's concern.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Clock;
use crate::core::SubjectId;
use crate::core::TenantId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Only supported JWS algorithm.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::EdDSA;
/// Default tolerated clock drift between issuer and verifier.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;
/// Default freshness ceiling.
pub const DEFAULT_MAX_TOKEN_AGE_SECS: u64 = 12 * 60 * 60;
/// Maximum accepted token length.
pub const MAX_TOKEN_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// Structurally invalid or missing token.
    Malformed,
    /// Unknown key, bad signature, or issuer/audience mismatch.
    BadSignature,
    /// Past `exp`.
    Expired,
    /// Issued in the future or before `nbf`.
    NotYetValid,
    /// Older than the freshness ceiling.
    TooOld,
}

impl AuthErrorKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::TooOld => "too_old",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AuthError {
    /// Failure category.
    pub kind: AuthErrorKind,
    /// Diagnostic detail; never contains token material.
    pub message: String,
}

impl AuthError {
    /// Creates an auth error.
    #[must_use]
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`AuthErrorKind::Malformed`].
    fn malformed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Malformed, message)
    }
}

/// Public key decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ed25519 public key: {0}")]
pub struct InvalidPublicKey(pub String);

// ============================================================================
// SECTION: Key Set
// ============================================================================

/// Issuer verification keys by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    /// Keys by `kid`.
    keys: BTreeMap<String, VerifyingKey>,
}

impl KeySet {
    /// Creates an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a key.
    pub fn insert(&mut self, kid: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(kid.into(), key);
    }

    /// Returns the key for `kid`.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&VerifyingKey> {
        self.keys.get(kid)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when no keys are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decodes a standard-base64 Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPublicKey`] on bad encoding, length, or curve point.
    pub fn parse_public_key(encoded: &str) -> Result<VerifyingKey, InvalidPublicKey> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| InvalidPublicKey(format!("base64: {err}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|raw: Vec<u8>| InvalidPublicKey(format!("expected 32 bytes, got {}", raw.len())))?;
        VerifyingKey::from_bytes(&bytes).map_err(|err| InvalidPublicKey(err.to_string()))
    }
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier.
    pub sub: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Not-before (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Subject email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Verified caller identity for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Subject identifier.
    pub subject_id: SubjectId,
    /// Token issued-at.
    pub issued_at: Timestamp,
    /// Token expiry.
    pub expires_at: Timestamp,
    /// Tenant, once resolved through the membership store.
    pub tenant_id: Option<TenantId>,
    /// Subject email, when present in the token.
    pub email: Option<String>,
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Token verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenVerifierConfig {
    /// Required `iss` claim, when set.
    pub issuer: Option<String>,
    /// Required `aud` claim, when set.
    pub audience: Option<String>,
    /// Tolerated clock drift for future-issued tokens.
    pub clock_skew_secs: u64,
    /// Freshness ceiling measured from `iat`.
    pub max_token_age_secs: u64,
}

impl Default for TokenVerifierConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            max_token_age_secs: DEFAULT_MAX_TOKEN_AGE_SECS,
        }
    }
}

/// Bearer token verifier.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    /// Verification settings.
    config: TokenVerifierConfig,
    /// Issuer keys.
    keys: KeySet,
}

impl TokenVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(config: TokenVerifierConfig, keys: KeySet) -> Self {
        Self { config, keys }
    }

    /// Verifies `raw_token` at the clock's current instant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] with a specific [`AuthErrorKind`] on rejection.
    pub fn verify(&self, raw_token: &str, clock: &dyn Clock) -> Result<Principal, AuthError> {
        let claims = self.verify_signature(raw_token)?;
        self.check_claims(&claims, clock.now())?;
        Ok(Principal {
            subject_id: SubjectId::new(claims.sub),
            issued_at: Timestamp::from_unix_secs(claims.iat),
            expires_at: Timestamp::from_unix_secs(claims.exp),
            tenant_id: None,
            email: claims.email,
        })
    }

    /// Parses the token and verifies its signature, returning the claims.
    fn verify_signature(&self, raw_token: &str) -> Result<TokenClaims, AuthError> {
        if raw_token.is_empty() {
            return Err(AuthError::malformed("empty token"));
        }
        if raw_token.len() > MAX_TOKEN_BYTES {
            return Err(AuthError::malformed("token exceeds size limit"));
        }
        if raw_token.split('.').count() != 3 {
            return Err(AuthError::malformed("token must have three segments"));
        }

        let header = jsonwebtoken::decode_header(raw_token)
            .map_err(|_| AuthError::malformed("header is not valid"))?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(AuthError::malformed(format!("unsupported alg {:?}", header.alg)));
        }
        let kid = header.kid.ok_or_else(|| AuthError::malformed("missing kid"))?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| AuthError::new(AuthErrorKind::BadSignature, "unknown kid"))?;
        let decoding_key = DecodingKey::from_ed_components(&URL_SAFE_NO_PAD.encode(key.as_bytes()))
            .map_err(|_| AuthError::new(AuthErrorKind::BadSignature, "unusable key"))?;

        let claims = jsonwebtoken::decode::<TokenClaims>(raw_token, &decoding_key, &structural_validation())
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => {
                    AuthError::new(AuthErrorKind::BadSignature, "signature mismatch")
                }
                _ => AuthError::malformed(format!("claims rejected: {err}")),
            })?
            .claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::malformed("empty sub claim"));
        }
        Ok(claims)
    }

    /// Applies issuer, audience, and time-bound checks.
    fn check_claims(&self, claims: &TokenClaims, now: Timestamp) -> Result<(), AuthError> {
        if let Some(issuer) = &self.config.issuer
            && claims.iss.as_deref() != Some(issuer.as_str())
        {
            return Err(AuthError::new(AuthErrorKind::BadSignature, "issuer mismatch"));
        }
        if let Some(audience) = &self.config.audience
            && claims.aud.as_deref() != Some(audience.as_str())
        {
            return Err(AuthError::new(AuthErrorKind::BadSignature, "audience mismatch"));
        }

        let now = now.as_unix_secs();
        let skew = i64::try_from(self.config.clock_skew_secs).unwrap_or(i64::MAX);
        let max_age = i64::try_from(self.config.max_token_age_secs).unwrap_or(i64::MAX);
        if now < claims.iat.saturating_sub(skew) {
            return Err(AuthError::new(AuthErrorKind::NotYetValid, "issued in the future"));
        }
        if let Some(nbf) = claims.nbf
            && now < nbf
        {
            return Err(AuthError::new(AuthErrorKind::NotYetValid, "before nbf"));
        }
        if now > claims.exp {
            return Err(AuthError::new(AuthErrorKind::Expired, "token expired"));
        }
        if now.saturating_sub(claims.iat) > max_age {
            return Err(AuthError::new(AuthErrorKind::TooOld, "token exceeds maximum age"));
        }
        Ok(())
    }
}

/// Signature-only validation; time and issuer checks run after decoding.
fn structural_validation() -> Validation {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

// ============================================================================
// SECTION: Signer
// ============================================================================

/// Issues tokens in the format [`TokenVerifier`] accepts.
///
/// Used by tests and the development CLI; production tokens come from the
/// identity provider.
pub struct TokenSigner {
    /// Key id placed in the header.
    kid: String,
    /// Signing key.
    key: SigningKey,
}

impl TokenSigner {
    /// Creates a signer.
    #[must_use]
    pub fn new(kid: impl Into<String>, key: SigningKey) -> Self {
        Self {
            kid: kid.into(),
            key,
        }
    }

    /// Returns the public half of the signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Returns the key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signs `claims` into a compact token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the claims cannot be serialized.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let der = self.key.to_pkcs8_der().map_err(|err| AuthError::malformed(err.to_string()))?;
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
        let mut header = Header::new(TOKEN_ALGORITHM);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &encoding_key).map_err(|err| AuthError::malformed(err.to_string()))
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").field("kid", &self.kid).finish_non_exhaustive()
    }
}
