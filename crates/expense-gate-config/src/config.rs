// crates/expense-gate-config/src/config.rs
// ============================================================================
// Module: Expense Gate Configuration
// Description: Configuration loading and validation for Expense Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: expense-gate-core, expense-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Secrets never live in the
//! file: the webhook secret is read from a named environment variable and
//! token keys are public keys only.
//!
//! Environment classification inputs are captured into one
//! [`EnvironmentSignals`] value by [`EnvironmentConfig::capture_signals`] and
//! passed down explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use expense_gate_core::EnvironmentGuardConfig;
use expense_gate_core::EnvironmentSignals;
use expense_gate_core::FallbackIdentity;
use expense_gate_core::KeySet;
use expense_gate_core::SubjectId;
use expense_gate_core::Timestamp;
use expense_gate_core::TokenVerifierConfig;
use expense_gate_core::WebhookSecret;
use expense_gate_core::WebhookVerifierConfig;
use expense_gate_core::runtime::environment::DEFAULT_FALLBACK_TTL_SECS;
use expense_gate_core::runtime::token::DEFAULT_CLOCK_SKEW_SECS;
use expense_gate_core::runtime::token::DEFAULT_MAX_TOKEN_AGE_SECS;
use expense_gate_core::runtime::webhook::DEFAULT_MAX_BODY_BYTES;
use expense_gate_core::runtime::webhook::DEFAULT_TOLERANCE_SECS;
use expense_gate_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "expense-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "EXPENSE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default server bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Maximum accepted request body limit.
const MAX_BODY_LIMIT_BYTES: usize = 1024 * 1024;
/// Maximum number of trusted token keys.
pub const MAX_AUTH_KEYS: usize = 16;
/// Maximum key identifier length.
const MAX_KID_LENGTH: usize = 128;
/// Maximum tolerated clock skew.
const MAX_CLOCK_SKEW_SECS: u64 = 300;
/// Maximum webhook replay tolerance.
const MAX_WEBHOOK_TOLERANCE_SECS: u64 = 3_600;
/// Default webhook ledger retention (30 days).
const DEFAULT_LEDGER_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;
/// Maximum fallback principal lifetime.
const MAX_FALLBACK_TTL_SECS: u64 = 24 * 60 * 60;
/// Maximum environment variable name length.
const MAX_ENV_VAR_NAME_LENGTH: usize = 128;
/// Default environment-name signal variable.
const DEFAULT_ENVIRONMENT_VAR: &str = "EXPENSE_GATE_ENVIRONMENT";
/// Default deployment-stage signal variable.
const DEFAULT_STAGE_VAR: &str = "EXPENSE_GATE_STAGE";
/// Default region signal variable.
const DEFAULT_REGION_VAR: &str = "EXPENSE_GATE_REGION";
/// Default local-development override variable.
const DEFAULT_LOCAL_DEV_VAR: &str = "EXPENSE_GATE_LOCAL_DEV";
/// Default webhook secret variable.
const DEFAULT_WEBHOOK_SECRET_VAR: &str = "EXPENSE_GATE_WEBHOOK_SECRET";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Expense Gate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpenseGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Bearer token verification configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Environment classification and fallback configuration.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Billing webhook configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Durable store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ExpenseGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.environment.validate()?;
        self.webhook.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("server.audit.path is required for the file sink".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => validate_path(path),
            (_, Some(_)) => {
                Err(ConfigError::Invalid("server.audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (`host:port`).
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size for API routes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Audit output.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_LIMIT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_LIMIT_BYTES}"
            )));
        }
        self.audit.validate()
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// One trusted token signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    /// Key identifier matched against the token header `kid`.
    pub kid: String,
    /// Base64 Ed25519 public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// File containing the base64 Ed25519 public key.
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
}

impl KeyConfig {
    /// Returns the encoded public key, reading the key file when configured.
    fn encoded_key(&self) -> Result<String, ConfigError> {
        match (&self.public_key, &self.public_key_file) {
            (Some(inline), None) => Ok(inline.trim().to_string()),
            (None, Some(path)) => {
                validate_path(path)?;
                let content = fs::read_to_string(path)
                    .map_err(|err| ConfigError::Io(format!("auth key {}: {err}", self.kid)))?;
                Ok(content.trim().to_string())
            }
            _ => Err(ConfigError::Invalid(format!(
                "auth key {} must set exactly one of public_key or public_key_file",
                self.kid
            ))),
        }
    }
}

/// Bearer token verification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Required `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Required `aud` claim.
    #[serde(default)]
    pub audience: Option<String>,
    /// Tolerated clock drift for future-issued tokens.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
    /// Freshness ceiling measured from `iat`.
    #[serde(default = "default_max_token_age_secs")]
    pub max_token_age_secs: u64,
    /// Trusted signing keys.
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            clock_skew_secs: default_clock_skew_secs(),
            max_token_age_secs: default_max_token_age_secs(),
            keys: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Builds the verifier configuration.
    #[must_use]
    pub fn verifier_config(&self) -> TokenVerifierConfig {
        TokenVerifierConfig {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            clock_skew_secs: self.clock_skew_secs,
            max_token_age_secs: self.max_token_age_secs,
        }
    }

    /// Decodes every configured key into a [`KeySet`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a key file cannot be read or a key is not
    /// a valid Ed25519 public key.
    pub fn key_set(&self) -> Result<KeySet, ConfigError> {
        let mut keys = KeySet::new();
        for key in &self.keys {
            let encoded = key.encoded_key()?;
            let verifying = KeySet::parse_public_key(&encoded)
                .map_err(|err| ConfigError::Invalid(format!("auth key {}: {err}", key.kid)))?;
            keys.insert(key.kid.clone(), verifying);
        }
        Ok(keys)
    }

    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_token_age_secs == 0 {
            return Err(ConfigError::Invalid("auth.max_token_age_secs must be greater than zero".to_string()));
        }
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.clock_skew_secs must be at most {MAX_CLOCK_SKEW_SECS}"
            )));
        }
        for (field, value) in [("auth.issuer", &self.issuer), ("auth.audience", &self.audience)] {
            if value.as_ref().is_some_and(|value| value.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{field} must be non-empty when set")));
            }
        }
        if self.keys.is_empty() {
            return Err(ConfigError::Invalid("auth.keys must contain at least one key".to_string()));
        }
        if self.keys.len() > MAX_AUTH_KEYS {
            return Err(ConfigError::Invalid(format!("auth.keys exceeds max of {MAX_AUTH_KEYS}")));
        }
        let mut seen = BTreeSet::new();
        for key in &self.keys {
            let kid = key.kid.trim();
            if kid.is_empty() || kid.len() > MAX_KID_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "auth key kid must be 1..={MAX_KID_LENGTH} characters"
                )));
            }
            if !seen.insert(kid) {
                return Err(ConfigError::Invalid(format!("duplicate auth key kid: {kid}")));
            }
        }
        self.key_set()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Local-development fallback identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    /// Subject the fallback principal acts as.
    pub subject_id: String,
    /// Optional email.
    #[serde(default)]
    pub email: Option<String>,
    /// Lifetime of issued fallback principals.
    #[serde(default = "default_fallback_ttl_secs")]
    pub ttl_secs: u64,
}

/// Environment classification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Variable holding the environment name.
    #[serde(default = "default_environment_var")]
    pub environment_var: String,
    /// Variable holding the deployment stage.
    #[serde(default = "default_stage_var")]
    pub stage_var: String,
    /// Variable holding the deployment region.
    #[serde(default = "default_region_var")]
    pub region_var: String,
    /// Variable holding the local-development override flag.
    #[serde(default = "default_local_dev_var")]
    pub local_dev_var: String,
    /// Region that identifies production deployments.
    #[serde(default)]
    pub production_region: Option<String>,
    /// Optional local-development fallback identity.
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment_var: default_environment_var(),
            stage_var: default_stage_var(),
            region_var: default_region_var(),
            local_dev_var: default_local_dev_var(),
            production_region: None,
            fallback: None,
        }
    }
}

impl EnvironmentConfig {
    /// Captures signals from the process environment.
    #[must_use]
    pub fn capture_signals(&self) -> EnvironmentSignals {
        self.capture_signals_with(|name| env::var(name).ok())
    }

    /// Captures signals through `lookup`.
    #[must_use]
    pub fn capture_signals_with(&self, lookup: impl Fn(&str) -> Option<String>) -> EnvironmentSignals {
        let non_empty = |name: &str| lookup(name).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        EnvironmentSignals {
            environment_name: non_empty(&self.environment_var),
            deployment_stage: non_empty(&self.stage_var),
            region: non_empty(&self.region_var),
            local_development: non_empty(&self.local_dev_var).is_some_and(|value| parse_flag(&value)),
        }
    }

    /// Builds the guard configuration.
    #[must_use]
    pub fn guard_config(&self) -> EnvironmentGuardConfig {
        EnvironmentGuardConfig {
            production_region: self.production_region.clone(),
            fallback: self.fallback.as_ref().map(|fallback| FallbackIdentity {
                subject_id: SubjectId::new(fallback.subject_id.trim()),
                email: fallback.email.clone(),
                ttl_secs: fallback.ttl_secs,
            }),
        }
    }

    /// Validates environment configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("environment.environment_var", &self.environment_var),
            ("environment.stage_var", &self.stage_var),
            ("environment.region_var", &self.region_var),
            ("environment.local_dev_var", &self.local_dev_var),
        ] {
            validate_env_var_name(field, value)?;
        }
        if self.production_region.as_ref().is_some_and(|region| region.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "environment.production_region must be non-empty when set".to_string(),
            ));
        }
        if let Some(fallback) = &self.fallback {
            if fallback.subject_id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "environment.fallback.subject_id must be non-empty".to_string(),
                ));
            }
            if fallback.ttl_secs == 0 || fallback.ttl_secs > MAX_FALLBACK_TTL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "environment.fallback.ttl_secs must be between 1 and {MAX_FALLBACK_TTL_SECS}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Webhook
// ============================================================================

/// Billing webhook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Variable holding the shared webhook secret.
    #[serde(default = "default_webhook_secret_var")]
    pub secret_env: String,
    /// Replay tolerance in seconds.
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
    /// Maximum webhook body size.
    #[serde(default = "default_webhook_max_body_bytes")]
    pub max_body_bytes: usize,
    /// How long ledger entries are kept before pruning.
    #[serde(default = "default_ledger_retention_secs")]
    pub ledger_retention_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret_env: default_webhook_secret_var(),
            tolerance_secs: default_tolerance_secs(),
            max_body_bytes: default_webhook_max_body_bytes(),
            ledger_retention_secs: default_ledger_retention_secs(),
        }
    }
}

impl WebhookConfig {
    /// Builds the verifier configuration.
    #[must_use]
    pub const fn verifier_config(&self) -> WebhookVerifierConfig {
        WebhookVerifierConfig {
            tolerance_secs: self.tolerance_secs,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Reads the webhook secret from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or empty.
    pub fn resolve_secret(&self) -> Result<WebhookSecret, ConfigError> {
        self.resolve_secret_with(|name| env::var(name).ok())
    }

    /// Reads the webhook secret through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or empty.
    pub fn resolve_secret_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<WebhookSecret, ConfigError> {
        let secret = lookup(&self.secret_env).unwrap_or_default();
        if secret.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "webhook secret variable {} is unset or empty",
                self.secret_env
            )));
        }
        Ok(WebhookSecret::new(secret.trim().as_bytes()))
    }

    /// Returns the ledger pruning cutoff relative to `now`.
    #[must_use]
    pub fn ledger_cutoff(&self, now: Timestamp) -> Timestamp {
        now.minus_secs(i64::try_from(self.ledger_retention_secs).unwrap_or(i64::MAX))
    }

    /// Validates webhook configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_env_var_name("webhook.secret_env", &self.secret_env)?;
        if self.tolerance_secs == 0 || self.tolerance_secs > MAX_WEBHOOK_TOLERANCE_SECS {
            return Err(ConfigError::Invalid(format!(
                "webhook.tolerance_secs must be between 1 and {MAX_WEBHOOK_TOLERANCE_SECS}"
            )));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_LIMIT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "webhook.max_body_bytes must be between 1 and {MAX_BODY_LIMIT_BYTES}"
            )));
        }
        if self.ledger_retention_secs < self.tolerance_secs {
            return Err(ConfigError::Invalid(
                "webhook.ledger_retention_secs must cover the replay tolerance".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable store selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (tests and local development only).
    #[default]
    Memory,
    /// `SQLite` store.
    Sqlite(SqliteStoreConfig),
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Memory => Ok(()),
            Self::Sqlite(config) => {
                validate_path(&config.path)?;
                config.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates an environment variable name.
fn validate_env_var_name(field: &str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ENV_VAR_NAME_LENGTH
        && value.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{field} must be a valid environment variable name")))
    }
}

/// Parses a boolean flag value.
fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Returns the default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Returns the default API body limit.
const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Returns the default clock skew.
const fn default_clock_skew_secs() -> u64 {
    DEFAULT_CLOCK_SKEW_SECS
}

/// Returns the default token age ceiling.
const fn default_max_token_age_secs() -> u64 {
    DEFAULT_MAX_TOKEN_AGE_SECS
}

/// Returns the default fallback lifetime.
const fn default_fallback_ttl_secs() -> u64 {
    DEFAULT_FALLBACK_TTL_SECS
}

/// Returns the default environment-name variable.
fn default_environment_var() -> String {
    DEFAULT_ENVIRONMENT_VAR.to_string()
}

/// Returns the default deployment-stage variable.
fn default_stage_var() -> String {
    DEFAULT_STAGE_VAR.to_string()
}

/// Returns the default region variable.
fn default_region_var() -> String {
    DEFAULT_REGION_VAR.to_string()
}

/// Returns the default local-development variable.
fn default_local_dev_var() -> String {
    DEFAULT_LOCAL_DEV_VAR.to_string()
}

/// Returns the default webhook secret variable.
fn default_webhook_secret_var() -> String {
    DEFAULT_WEBHOOK_SECRET_VAR.to_string()
}

/// Returns the default webhook replay tolerance.
const fn default_tolerance_secs() -> u64 {
    DEFAULT_TOLERANCE_SECS
}

/// Returns the default webhook body limit.
const fn default_webhook_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Returns the default ledger retention.
const fn default_ledger_retention_secs() -> u64 {
    DEFAULT_LEDGER_RETENTION_SECS
}
