// crates/expense-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Gate Store
// Description: Durable membership, subscription, ledger, and quota store.
// Purpose: Back every access-core store interface with one SQLite database.
// Dependencies: expense-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteGateStore`] implements [`MembershipStore`], [`SubscriptionStore`],
//! and [`QuotaStore`] over a single `SQLite` file. Every mutation runs inside
//! a `BEGIN IMMEDIATE` transaction so concurrent writers (threads or
//! processes) serialize on the database lock rather than on process memory.
//!
//! Quota admission is one conditional upsert: the row is incremented only
//! when its stored count is below the limit, and the affected-row count
//! decides admission. Busy or locked databases surface as
//! [`StoreError::Unavailable`] so callers deny rather than guess.
//!
//! Database contents are untrusted; rows that fail to parse are reported as
//! corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use expense_gate_core::CommitOutcome;
use expense_gate_core::EventId;
use expense_gate_core::IncrementOutcome;
use expense_gate_core::Membership;
use expense_gate_core::MembershipStatus;
use expense_gate_core::MembershipStore;
use expense_gate_core::PlanTier;
use expense_gate_core::QuotaKey;
use expense_gate_core::QuotaStore;
use expense_gate_core::Role;
use expense_gate_core::StoreError;
use expense_gate_core::SubjectId;
use expense_gate_core::SubscriptionRecord;
use expense_gate_core::SubscriptionStatus;
use expense_gate_core::SubscriptionStore;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;
use expense_gate_core::TransitionDecision;
use expense_gate_core::WebhookEventRecord;
use expense_gate_core::interfaces::TransitionFn;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` gate store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` bounds how long a writer waits for the database lock
///   before the operation is reported as unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates path limits and the busy timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is violated.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid("busy_timeout_ms must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database was busy or locked past the busy timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Stored row failed to parse.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy(error.to_string()),
            _ => Self::Db(error.to_string()),
        }
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Unavailable(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed gate store.
///
/// # Invariants
/// - Connection access within one process is serialized through a mutex.
/// - Cross-process writers serialize on `BEGIN IMMEDIATE`.
#[derive(Clone)]
pub struct SqliteGateStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGateStore {
    /// Opens (or creates) the store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or the schema version is unsupported.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Runs `work` inside an immediate transaction and commits on success.
    fn with_immediate<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Memberships
// ============================================================================

impl MembershipStore for SqliteGateStore {
    fn membership(&self, subject_id: &SubjectId) -> Result<Option<Membership>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT tenant_id, role, status FROM memberships WHERE subject_id = ?1",
                params![subject_id.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        drop(guard);
        let Some((tenant_id, role, status)) = row else {
            return Ok(None);
        };
        let role = Role::parse(&role)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown role for {subject_id}: {role}")))?;
        let status = MembershipStatus::parse(&status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown membership status for {subject_id}: {status}"))
        })?;
        Ok(Some(Membership {
            tenant_id: TenantId::new(tenant_id),
            subject_id: subject_id.clone(),
            role,
            status,
        }))
    }

    fn upsert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        self.with_immediate(|tx| {
            tx.execute(
                "INSERT INTO memberships (subject_id, tenant_id, role, status) VALUES (?1, ?2, ?3, \
                 ?4) ON CONFLICT(subject_id) DO UPDATE SET tenant_id = excluded.tenant_id, role = \
                 excluded.role, status = excluded.status",
                params![
                    membership.subject_id.as_str(),
                    membership.tenant_id.as_str(),
                    membership.role.as_str(),
                    membership.status.as_str()
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Subscriptions
// ============================================================================

impl SubscriptionStore for SqliteGateStore {
    fn subscription(&self, tenant_id: &TenantId) -> Result<Option<SubscriptionRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(fetch_subscription(&guard, tenant_id)?)
    }

    fn commit_event(
        &self,
        tenant_id: &TenantId,
        event: &WebhookEventRecord,
        decide: &TransitionFn<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let outcome = self.with_immediate(|tx| {
            let current = fetch_subscription(tx, tenant_id)?;
            let seen: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM webhook_events WHERE event_id = ?1",
                    params![event.event_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if seen.is_some() {
                return Ok(CommitOutcome::Duplicate { current });
            }
            let outcome = match decide(current.as_ref()) {
                TransitionDecision::Write(record) => {
                    if &record.tenant_id != tenant_id {
                        return Err(SqliteStoreError::Invalid(
                            "record tenant does not match event tenant".to_string(),
                        ));
                    }
                    write_subscription(tx, &record)?;
                    CommitOutcome::Written { record }
                }
                TransitionDecision::Skip(reason) => CommitOutcome::Skipped { current, reason },
                TransitionDecision::Reject(rejection) => {
                    return Ok(CommitOutcome::Rejected { current, rejection });
                }
            };
            tx.execute(
                "INSERT INTO webhook_events (event_id, received_at, event_type, processed) VALUES \
                 (?1, ?2, ?3, ?4)",
                params![
                    event.event_id.as_str(),
                    event.received_at.as_unix_secs(),
                    event.event_type.as_str(),
                    event.processed
                ],
            )?;
            Ok(outcome)
        })?;
        Ok(outcome)
    }

    fn webhook_event(&self, event_id: &EventId) -> Result<Option<WebhookEventRecord>, StoreError> {
        let guard = self.lock()?;
        let record = guard
            .query_row(
                "SELECT received_at, event_type, processed FROM webhook_events WHERE event_id = ?1",
                params![event_id.as_str()],
                |row| {
                    Ok(WebhookEventRecord {
                        event_id: event_id.clone(),
                        received_at: Timestamp::from_unix_secs(row.get(0)?),
                        event_type: row.get(1)?,
                        processed: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        Ok(record)
    }

    fn prune_webhook_events(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let removed = self.with_immediate(|tx| {
            Ok(tx.execute(
                "DELETE FROM webhook_events WHERE received_at < ?1",
                params![cutoff.as_unix_secs()],
            )?)
        })?;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// SECTION: Quota Counters
// ============================================================================

impl QuotaStore for SqliteGateStore {
    fn try_increment(&self, key: &QuotaKey, limit: u64) -> Result<IncrementOutcome, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let outcome = self.with_immediate(|tx| {
            if limit == 0 {
                return Ok(IncrementOutcome::AtLimit {
                    count: fetch_count(tx, key)?,
                });
            }
            let changed = tx.execute(
                "INSERT INTO quota_counters (tenant_id, kind, period, count) VALUES (?1, ?2, ?3, \
                 1) ON CONFLICT(tenant_id, kind, period) DO UPDATE SET count = \
                 quota_counters.count + 1 WHERE quota_counters.count < ?4",
                params![key.tenant_id.as_str(), key.kind.as_str(), key.period.as_str(), limit],
            )?;
            let count = fetch_count(tx, key)?;
            if changed == 1 {
                Ok(IncrementOutcome::Admitted { count })
            } else {
                Ok(IncrementOutcome::AtLimit { count })
            }
        })?;
        Ok(outcome)
    }

    fn decrement(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        let count = self.with_immediate(|tx| {
            tx.execute(
                "UPDATE quota_counters SET count = count - 1 WHERE tenant_id = ?1 AND kind = ?2 AND \
                 period = ?3 AND count > 0",
                params![key.tenant_id.as_str(), key.kind.as_str(), key.period.as_str()],
            )?;
            fetch_count(tx, key)
        })?;
        Ok(count)
    }

    fn count(&self, key: &QuotaKey) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        Ok(fetch_count(&guard, key)?)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Raw subscription row before validation.
struct SubscriptionRow {
    /// Plan tier label.
    plan_tier: String,
    /// Status label.
    status: String,
    /// Provider subscription id.
    provider_subscription_id: Option<String>,
    /// Provider customer id.
    provider_customer_id: Option<String>,
    /// Period end (unix seconds).
    current_period_end: Option<i64>,
    /// Last update (unix seconds).
    updated_at: i64,
    /// Last applied event id.
    last_event_id: Option<String>,
}

/// Loads and validates the subscription row for `tenant_id`.
fn fetch_subscription(
    connection: &Connection,
    tenant_id: &TenantId,
) -> Result<Option<SubscriptionRecord>, SqliteStoreError> {
    let row = connection
        .query_row(
            "SELECT plan_tier, status, provider_subscription_id, provider_customer_id, \
             current_period_end, updated_at, last_event_id FROM subscriptions WHERE tenant_id = ?1",
            params![tenant_id.as_str()],
            |row| {
                Ok(SubscriptionRow {
                    plan_tier: row.get(0)?,
                    status: row.get(1)?,
                    provider_subscription_id: row.get(2)?,
                    provider_customer_id: row.get(3)?,
                    current_period_end: row.get(4)?,
                    updated_at: row.get(5)?,
                    last_event_id: row.get(6)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    let plan_tier = PlanTier::parse(&row.plan_tier)
        .map_err(|err| SqliteStoreError::Corrupt(format!("subscription for {tenant_id}: {err}")))?;
    let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("unknown subscription status for {tenant_id}: {}", row.status))
    })?;
    Ok(Some(SubscriptionRecord {
        tenant_id: tenant_id.clone(),
        plan_tier,
        status,
        provider_subscription_id: row.provider_subscription_id,
        provider_customer_id: row.provider_customer_id,
        current_period_end: row.current_period_end.map(Timestamp::from_unix_secs),
        updated_at: Timestamp::from_unix_secs(row.updated_at),
        last_event_id: row.last_event_id.map(EventId::new),
    }))
}

/// Inserts or replaces a subscription row.
fn write_subscription(tx: &Transaction<'_>, record: &SubscriptionRecord) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO subscriptions (tenant_id, plan_tier, status, provider_subscription_id, \
         provider_customer_id, current_period_end, updated_at, last_event_id) VALUES (?1, ?2, ?3, \
         ?4, ?5, ?6, ?7, ?8) ON CONFLICT(tenant_id) DO UPDATE SET plan_tier = excluded.plan_tier, \
         status = excluded.status, provider_subscription_id = excluded.provider_subscription_id, \
         provider_customer_id = excluded.provider_customer_id, current_period_end = \
         excluded.current_period_end, updated_at = excluded.updated_at, last_event_id = \
         excluded.last_event_id",
        params![
            record.tenant_id.as_str(),
            record.plan_tier.as_str(),
            record.status.as_str(),
            record.provider_subscription_id.as_deref(),
            record.provider_customer_id.as_deref(),
            record.current_period_end.map(Timestamp::as_unix_secs),
            record.updated_at.as_unix_secs(),
            record.last_event_id.as_ref().map(EventId::as_str)
        ],
    )?;
    Ok(())
}

/// Reads a quota counter (zero when absent).
fn fetch_count(connection: &Connection, key: &QuotaKey) -> Result<u64, SqliteStoreError> {
    let count: Option<i64> = connection
        .query_row(
            "SELECT count FROM quota_counters WHERE tenant_id = ?1 AND kind = ?2 AND period = ?3",
            params![key.tenant_id.as_str(), key.kind.as_str(), key.period.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let count = count.unwrap_or(0);
    u64::try_from(count)
        .map_err(|_| SqliteStoreError::Corrupt(format!("negative quota counter for {}", key.tenant_id)))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(SqliteStoreError::Invalid("store path contains an overlong component".to_string()));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    connection.execute_batch(&format!(
        "PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        config.journal_mode.pragma_value(),
        config.sync_mode.pragma_value()
    ))?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> =
        tx.query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0)).optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS memberships (
                    subject_id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    status TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_memberships_tenant ON memberships (tenant_id);
                CREATE TABLE IF NOT EXISTS subscriptions (
                    tenant_id TEXT PRIMARY KEY,
                    plan_tier TEXT NOT NULL,
                    status TEXT NOT NULL,
                    provider_subscription_id TEXT,
                    provider_customer_id TEXT,
                    current_period_end INTEGER,
                    updated_at INTEGER NOT NULL,
                    last_event_id TEXT
                );
                CREATE TABLE IF NOT EXISTS webhook_events (
                    event_id TEXT PRIMARY KEY,
                    received_at INTEGER NOT NULL,
                    event_type TEXT NOT NULL,
                    processed INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_webhook_events_received
                    ON webhook_events (received_at);
                CREATE TABLE IF NOT EXISTS quota_counters (
                    tenant_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    period TEXT NOT NULL,
                    count INTEGER NOT NULL CHECK (count >= 0),
                    PRIMARY KEY (tenant_id, kind, period)
                );",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit()?;
    Ok(())
}
