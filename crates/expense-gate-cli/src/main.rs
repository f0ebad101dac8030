// crates/expense-gate-cli/src/main.rs
// ============================================================================
// Module: Expense Gate CLI Entry Point
// Description: Command-line launcher and operator tooling for Expense Gate.
// Purpose: Serve the HTTP surface and manage keys, tokens, and stored state.
// Dependencies: clap, expense-gate-config, expense-gate-core, expense-gate-server
// ============================================================================

//! ## Overview
//! The `expense-gate` binary starts the access-control server and carries the
//! small set of operator commands that go with it:
//!
//! - `serve` loads configuration, captures environment signals once, and runs
//!   the HTTP surface until the listener fails.
//! - `config validate` parses and validates a configuration file.
//! - `keys generate` emits a fresh Ed25519 key pair for token signing.
//! - `token sign` issues development bearer tokens.
//! - `membership set` writes a membership into the SQLite store.
//! - `ledger prune` drops webhook ledger entries past the retention window.
//!
//! Security posture: inputs are untrusted; key files are size-limited and
//! signing keys are never echoed unless generated by this process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ed25519_dalek::SigningKey;
use expense_gate_config::ExpenseGateConfig;
use expense_gate_config::StoreConfig;
use expense_gate_core::Clock;
use expense_gate_core::Membership;
use expense_gate_core::MembershipStatus;
use expense_gate_core::MembershipStore;
use expense_gate_core::Role;
use expense_gate_core::SubjectId;
use expense_gate_core::SubscriptionStateMachine;
use expense_gate_core::SystemClock;
use expense_gate_core::TenantId;
use expense_gate_core::Timestamp;
use expense_gate_core::TokenClaims;
use expense_gate_core::TokenSigner;
use expense_gate_server::ExpenseGateServer;
use expense_gate_server::ServerInputs;
use expense_gate_server::StoreBackend;
use expense_gate_store_sqlite::SqliteGateStore;
use expense_gate_store_sqlite::SqliteStoreConfig;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a signing key file.
const MAX_SIGNING_KEY_BYTES: usize = 4 * 1024;
/// Default lifetime of a development token.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3_600;
/// Longest lifetime `token sign` will issue.
const MAX_TOKEN_TTL_SECS: u64 = 7 * 24 * 3_600;

// ============================================================================
// SECTION: CLI Arguments
// ============================================================================

/// Expense Gate command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "expense-gate",
    about = "Access control and subscription enforcement for Expense Gate",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Signing key utilities.
    Keys {
        /// Selected keys subcommand.
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Development token utilities.
    Token {
        /// Selected token subcommand.
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Membership maintenance.
    Membership {
        /// Selected membership subcommand.
        #[command(subcommand)]
        command: MembershipCommand,
    },
    /// Webhook ledger maintenance.
    Ledger {
        /// Selected ledger subcommand.
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to expense-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to expense-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Keys subcommands.
#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Generate an Ed25519 signing key pair.
    Generate(KeysGenerateCommand),
}

/// Arguments for `keys generate`.
#[derive(Args, Debug)]
struct KeysGenerateCommand {
    /// Write the base64 private key to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    private_key_out: Option<PathBuf>,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Sign a development bearer token.
    Sign(TokenSignCommand),
}

/// Arguments for `token sign`.
#[derive(Args, Debug)]
struct TokenSignCommand {
    /// Signing key file (raw 32 bytes or base64).
    #[arg(long, value_name = "PATH")]
    key: PathBuf,
    /// Key id placed in the token header.
    #[arg(long)]
    kid: String,
    /// Subject identifier.
    #[arg(long)]
    sub: String,
    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    ttl_secs: u64,
    /// Issuer claim.
    #[arg(long)]
    issuer: Option<String>,
    /// Audience claim.
    #[arg(long)]
    audience: Option<String>,
    /// Email claim.
    #[arg(long)]
    email: Option<String>,
}

/// Membership subcommands.
#[derive(Subcommand, Debug)]
enum MembershipCommand {
    /// Insert or replace a membership.
    Set(MembershipSetCommand),
}

/// Arguments for `membership set`.
#[derive(Args, Debug)]
struct MembershipSetCommand {
    /// Config file whose SQLite store is used.
    #[arg(long, value_name = "PATH", conflicts_with = "db")]
    config: Option<PathBuf>,
    /// SQLite database path, bypassing config.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Tenant identifier.
    #[arg(long)]
    tenant: String,
    /// Subject identifier.
    #[arg(long)]
    subject: String,
    /// Role label.
    #[arg(long, value_parser = parse_role)]
    role: Role,
    /// Membership status label.
    #[arg(long, value_parser = parse_membership_status, default_value = "active")]
    status: MembershipStatus,
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Remove ledger entries older than the retention window.
    Prune(LedgerPruneCommand),
}

/// Arguments for `ledger prune`.
#[derive(Args, Debug)]
struct LedgerPruneCommand {
    /// Optional config file path (defaults to expense-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a printable message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// I/O failure.
    Io(std::io::Error),
    /// File exceeds the limit.
    TooLarge {
        /// Observed size.
        size: u64,
        /// Permitted size.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments and dispatches the selected command.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(&command).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
        Commands::Keys {
            command,
        } => match command {
            KeysCommand::Generate(command) => command_keys_generate(&command),
        },
        Commands::Token {
            command,
        } => match command {
            TokenCommand::Sign(command) => command_token_sign(&command),
        },
        Commands::Membership {
            command,
        } => match command {
            MembershipCommand::Set(command) => command_membership_set(&command),
        },
        Commands::Ledger {
            command,
        } => match command {
            LedgerCommand::Prune(command) => command_ledger_prune(&command),
        },
    }
}

// ============================================================================
// SECTION: Serve and Config Commands
// ============================================================================

/// Executes `serve`.
async fn command_serve(command: &ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let inputs = ServerInputs::from_process(&config)
        .map_err(|err| CliError::new(format!("failed to capture server inputs: {err}")))?;
    let bind = config.server.bind.clone();
    let server = ExpenseGateServer::build(config, inputs)
        .map_err(|err| CliError::new(format!("failed to initialize server: {err}")))?;
    write_stderr_line(&format!("expense-gate: listening on {bind}"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = load_config(command.config.as_deref())?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<ExpenseGateConfig> {
    ExpenseGateConfig::load(path).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

// ============================================================================
// SECTION: Key and Token Commands
// ============================================================================

/// Executes `keys generate`.
fn command_keys_generate(command: &KeysGenerateCommand) -> CliResult<ExitCode> {
    let key = generate_signing_key();
    let private_key = BASE64.encode(key.to_bytes());
    let public_key = BASE64.encode(key.verifying_key().to_bytes());
    match &command.private_key_out {
        Some(path) => {
            write_new_file(path, format!("{private_key}\n").as_bytes())?;
            write_stdout_line(&format!("private_key_file = \"{}\"", path.display()))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        None => {
            write_stdout_line(&format!("private_key = \"{private_key}\""))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    write_stdout_line(&format!("public_key = \"{public_key}\""))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Generates a signing key from the operating system RNG.
fn generate_signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    SigningKey::from_bytes(&seed)
}

/// Executes `token sign`.
fn command_token_sign(command: &TokenSignCommand) -> CliResult<ExitCode> {
    let key = load_signing_key(&command.key)?;
    let token = sign_development_token(key, command, SystemClock.now())?;
    write_stdout_line(&token).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds claims for `command` and signs them at `now`.
fn sign_development_token(key: SigningKey, command: &TokenSignCommand, now: Timestamp) -> CliResult<String> {
    if command.sub.trim().is_empty() {
        return Err(CliError::new("token subject must be non-empty".to_string()));
    }
    if command.kid.trim().is_empty() {
        return Err(CliError::new("token kid must be non-empty".to_string()));
    }
    if command.ttl_secs == 0 || command.ttl_secs > MAX_TOKEN_TTL_SECS {
        return Err(CliError::new(format!("token ttl must be between 1 and {MAX_TOKEN_TTL_SECS} seconds")));
    }
    let ttl = i64::try_from(command.ttl_secs)
        .map_err(|_| CliError::new("token ttl out of range".to_string()))?;
    let claims = TokenClaims {
        sub: command.sub.clone(),
        iat: now.as_unix_secs(),
        exp: now.plus_secs(ttl).as_unix_secs(),
        nbf: None,
        iss: command.issuer.clone(),
        aud: command.audience.clone(),
        email: command.email.clone(),
    };
    TokenSigner::new(command.kid.clone(), key)
        .sign(&claims)
        .map_err(|err| CliError::new(format!("failed to sign token: {err}")))
}

/// Loads a signing key from disk.
fn load_signing_key(path: &Path) -> CliResult<SigningKey> {
    let bytes = read_bytes_with_limit(path, MAX_SIGNING_KEY_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read signing key {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "signing key {} is too large ({size} bytes, limit {limit})",
            path.display()
        )),
    })?;
    if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
        return Ok(SigningKey::from_bytes(&key));
    }
    let invalid = || CliError::new("signing key must be 32 raw bytes or base64".to_string());
    let text = std::str::from_utf8(&bytes).map_err(|_| invalid())?;
    let decoded = BASE64.decode(text.trim().as_bytes()).map_err(|_| invalid())?;
    let key = <[u8; 32]>::try_from(decoded.as_slice()).map_err(|_| invalid())?;
    Ok(SigningKey::from_bytes(&key))
}

// ============================================================================
// SECTION: Store Commands
// ============================================================================

/// Executes `membership set`.
fn command_membership_set(command: &MembershipSetCommand) -> CliResult<ExitCode> {
    let store = open_membership_store(command.config.as_deref(), command.db.as_deref())?;
    let membership = build_membership(command)?;
    store
        .upsert_membership(&membership)
        .map_err(|err| CliError::new(format!("failed to write membership: {err}")))?;
    write_stdout_line(&format!(
        "membership set: tenant={} subject={} role={} status={}",
        membership.tenant_id,
        membership.subject_id,
        membership.role,
        membership.status.as_str()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates identifiers and assembles a membership record.
fn build_membership(command: &MembershipSetCommand) -> CliResult<Membership> {
    let tenant = command.tenant.trim();
    let subject = command.subject.trim();
    if tenant.is_empty() || subject.is_empty() {
        return Err(CliError::new("tenant and subject must be non-empty".to_string()));
    }
    Ok(Membership {
        tenant_id: TenantId::new(tenant),
        subject_id: SubjectId::new(subject),
        role: command.role,
        status: command.status,
    })
}

/// Opens the SQLite store named by `--db` or by the config file.
fn open_membership_store(config: Option<&Path>, db: Option<&Path>) -> CliResult<SqliteGateStore> {
    let store_config = match db {
        Some(path) => SqliteStoreConfig::new(path),
        None => match load_config(config)?.store {
            StoreConfig::Sqlite(store) => store,
            StoreConfig::Memory => {
                return Err(CliError::new(
                    "membership set requires a sqlite store; pass --db or configure [store]".to_string(),
                ));
            }
        },
    };
    SqliteGateStore::new(&store_config)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

/// Executes `ledger prune`.
fn command_ledger_prune(command: &LedgerPruneCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let removed = prune_ledger(&config, SystemClock.now())?;
    write_stdout_line(&format!("ledger entries removed: {removed}"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Removes ledger entries recorded before the configured retention window.
fn prune_ledger(config: &ExpenseGateConfig, now: Timestamp) -> CliResult<u64> {
    if config.store == StoreConfig::Memory {
        return Err(CliError::new("ledger prune requires a sqlite store".to_string()));
    }
    let backend = StoreBackend::from_config(&config.store)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
    let machine = SubscriptionStateMachine::new(backend.subscriptions());
    machine
        .prune_ledger(config.webhook.ledger_cutoff(now))
        .map_err(|err| CliError::new(format!("failed to prune ledger: {err}")))
}

// ============================================================================
// SECTION: Argument Parsers
// ============================================================================

/// Parses a role label for clap.
fn parse_role(value: &str) -> Result<Role, String> {
    Role::parse(value).ok_or_else(|| {
        let labels: Vec<&str> = Role::ALL.iter().map(|role| role.as_str()).collect();
        format!("unknown role {value:?} (expected one of {})", labels.join(", "))
    })
}

/// Parses a membership status label for clap.
fn parse_membership_status(value: &str) -> Result<MembershipStatus, String> {
    MembershipStatus::parse(value)
        .ok_or_else(|| format!("unknown status {value:?} (expected active, inactive, or pending)"))
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Reads a file, failing when it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Writes a new file, refusing to overwrite an existing one.
fn write_new_file(path: &Path, bytes: &[u8]) -> CliResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|err| CliError::new(format!("failed to create {}: {err}", path.display())))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|err| CliError::new(format!("failed to write {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
