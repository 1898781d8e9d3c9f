//! Move every stored secret from the legacy global key to per-tenant DEKs.
//!
//! Prints a JSON report on stdout and exits non-zero when any row failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tenant_vault::config::DEFAULT_DEK_CACHE_CAPACITY;
use tenant_vault::{
    MigrationMode, MigrationReport, Migrator, SecretStore, SqliteBackend, VaultConfig, VaultError,
};

#[derive(Parser)]
#[command(
    name = "vault-migrate",
    about = "Migrate secrets from the legacy global key to per-tenant envelope encryption"
)]
struct Args {
    /// SQLite database holding tenant_keys and tenant_secrets.
    #[arg(long, env = "VAULT_DATABASE_PATH")]
    database: PathBuf,

    /// Master key-encryption key (64 hex characters).
    #[arg(long, env = "VAULT_KEK", hide_env_values = true)]
    kek: String,

    /// Legacy global key the existing values were encrypted with.
    #[arg(long, env = "VAULT_LEGACY_KEY", hide_env_values = true)]
    legacy_key: String,

    /// Report what would be migrated without writing anything.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "VAULT_DEK_CACHE_CAPACITY", default_value_t = DEFAULT_DEK_CACHE_CAPACITY)]
    cache_capacity: usize,
}

async fn run(args: Args) -> Result<MigrationReport, VaultError> {
    if !args.database.exists() {
        return Err(VaultError::Configuration(format!(
            "database not found: {}",
            args.database.display()
        )));
    }

    let config = VaultConfig::default()
        .with_kek(args.kek)
        .with_legacy_key(args.legacy_key)
        .with_dek_cache_capacity(args.cache_capacity)
        .with_database_path(args.database.clone());

    // No initialize(): the schema must already exist, preflight checks it.
    let backend = Arc::new(SqliteBackend::open(&args.database)?);
    let store = SecretStore::open(&config, backend)?;
    let migrator = Migrator::new(&store, config.legacy_key()?);

    let mode = if args.dry_run {
        MigrationMode::DryRun
    } else {
        MigrationMode::Commit
    };
    info!(database = %args.database.display(), ?mode, "running migration");
    migrator.run(mode).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let report = match run(args).await {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "migration aborted");
            return ExitCode::FAILURE;
        }
    };

    for line in report.errors() {
        error!("{line}");
    }

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(error = %err, "failed to serialize report");
            return ExitCode::FAILURE;
        }
    }

    if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
