// crates/cortex-trust-cli/src/main.rs
// ============================================================================
// Module: Cortex Trust CLI Entry Point
// Description: Thin wrapper exposing trust-status and trust-grant.
// Purpose: Let an interactive operator read the trust report and grant
//          category overrides without going through the agent hook surface.
// Dependencies: clap, cortex-trust-core, cortex-trust-engine, cortex-trust-store
// ============================================================================

//! ## Overview
//! This binary is deliberately thin: all real logic lives in
//! `cortex-trust-engine`. The session identifier that gates
//! [`cortex_trust_engine::override_manager::OverrideManager::set_override`]
//! comes from the `CORTEX_SESSION_ID` environment variable the runtime sets
//! for an interactive operator session, never from a CLI flag — a flag would
//! let a non-interactive caller simply claim to be interactive.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use cortex_trust_core::Category;
use cortex_trust_core::OverrideType;
use cortex_trust_core::Timestamp;
use cortex_trust_core::TrustStore;
use cortex_trust_engine::override_manager::OverrideError;
use cortex_trust_engine::override_manager::OverrideManager;
use cortex_trust_engine::reporter::Reporter;
use cortex_trust_store::SqliteStoreConfig;
use cortex_trust_store::SqliteTrustStore;
use thiserror::Error;

const SESSION_ENV_VAR: &str = "CORTEX_SESSION_ID";
const DEFAULT_DB_PATH: &str = "cortex-trust.sqlite3";

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "cortex-trust", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Path to the trust store database file.
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current trust-state report.
    Status,
    /// Print the trailing-7-day rollup.
    Weekly,
    /// Grant or revoke a category override.
    Grant(GrantArgs),
    /// Deactivate every active override.
    RevokeAll,
    /// List every currently active override.
    ListActive,
}

/// Arguments for the `grant` command.
#[derive(Args, Debug)]
struct GrantArgs {
    /// Category to override (e.g. `deploy`, `write_file`).
    category: String,
    /// Human-readable justification.
    reason: String,
    /// Revoke (force-block) rather than grant (force-allow).
    #[arg(long)]
    revoke: bool,
    /// Override lifetime, e.g. `30m`, `2h`, `1d`. Omit for no expiry.
    #[arg(long, value_name = "DURATION")]
    expires: Option<String>,
}

/// CLI-level error with an associated exit code.
#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Argument(String),
    #[error("caller is not interactive: {0}")]
    NonInteractive(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::Argument(_) => ExitCode::from(1),
            Self::NonInteractive(_) => ExitCode::from(2),
            Self::StoreUnavailable(_) => ExitCode::from(3),
        }
    }
}

impl From<cortex_trust_core::StoreError> for CliError {
    fn from(err: cortex_trust_core::StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<cortex_trust_store::SqliteStoreError> for CliError {
    fn from(err: cortex_trust_store::SqliteStoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<OverrideError> for CliError {
    fn from(err: OverrideError) -> Self {
        match err {
            OverrideError::NonInteractiveCaller(session) => Self::NonInteractive(session),
            OverrideError::MalformedDuration(raw) => Self::Argument(format!("malformed --expires value: {raw}")),
            OverrideError::Store(store_err) => Self::from(store_err),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = write_stderr_line(&err.to_string());
            err.exit_code()
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    let store: Arc<dyn TrustStore> = Arc::new(SqliteTrustStore::open(&SqliteStoreConfig::file(&db_path))?);

    match cli.command {
        Commands::Status => command_status(&store),
        Commands::Weekly => command_weekly(&store),
        Commands::Grant(args) => command_grant(&store, args),
        Commands::RevokeAll => command_revoke_all(&store),
        Commands::ListActive => command_list_active(&store),
    }
}

fn command_status(store: &Arc<dyn TrustStore>) -> CliResult<()> {
    let reporter = Reporter::new(store.clone(), cortex_trust_engine::config::TrustConfig::default());
    let report = reporter.report()?;
    write_stdout_line(&Reporter::render_text(&report)).map_err(output_error)
}

fn command_weekly(store: &Arc<dyn TrustStore>) -> CliResult<()> {
    let reporter = Reporter::new(store.clone(), cortex_trust_engine::config::TrustConfig::default());
    let summary = reporter.weekly_summary(Timestamp::now())?;
    write_stdout_line(&Reporter::render_weekly_text(&summary)).map_err(output_error)
}

fn command_grant(store: &Arc<dyn TrustStore>, args: GrantArgs) -> CliResult<()> {
    let category = Category::from_str(&args.category).ok_or_else(|| CliError::Argument(format!("unknown category: {}", args.category)))?;
    let session_id = std::env::var(SESSION_ENV_VAR).map_err(|_| CliError::NonInteractive(format!("{SESSION_ENV_VAR} is not set")))?;
    let override_type = if args.revoke { OverrideType::Revoked } else { OverrideType::Granted };

    let manager = OverrideManager::new(store.clone());
    let trust_override = manager.set_override(category, override_type, &args.reason, &session_id, args.expires.as_deref())?;
    write_stdout_line(&format!("{} {} for {} (granted_by={})", override_type.as_str(), trust_override.override_id, category.as_str(), trust_override.granted_by))
        .map_err(output_error)
}

fn command_revoke_all(store: &Arc<dyn TrustStore>) -> CliResult<()> {
    let manager = OverrideManager::new(store.clone());
    let revoked = manager.revoke_all()?;
    write_stdout_line(&format!("revoked {revoked} override(s)")).map_err(output_error)
}

fn command_list_active(store: &Arc<dyn TrustStore>) -> CliResult<()> {
    let manager = OverrideManager::new(store.clone());
    let active = manager.list_active()?;
    if active.is_empty() {
        return write_stdout_line("no active overrides").map_err(output_error);
    }
    for over in active {
        write_stdout_line(&format!("{}: {} by {}", over.category.as_str(), over.override_type.as_str(), over.granted_by)).map_err(output_error)?;
    }
    Ok(())
}

fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

fn output_error(err: std::io::Error) -> CliError {
    CliError::StoreUnavailable(format!("failed writing output: {err}"))
}
