//! CLI module for the detailbook command-line interface.
//!
//! Provides subcommands next to the server itself:
//! - `serve` - Run the HTTP API (default when no subcommand is given)
//! - `migrate up|down|status` - Manage the database schema
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::{self, MigrationReport, PgMigrationStore, MIGRATIONS};

/// Secrets shorter than this are rejected in production
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "detailbook")]
#[command(author, version, about = "Booking backend for a car detailing studio", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "detailbook.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Skip startup self-checks (for development only)
    #[arg(long)]
    pub skip_checks: bool,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// True when the process should run the HTTP server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Database schema migrations
    #[command(subcommand)]
    Migrate(MigrateCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Migrate subcommands
#[derive(Subcommand, Debug)]
pub enum MigrateCommands {
    /// Apply pending migrations
    Up {
        /// Stop at this version instead of the latest
        #[arg(long)]
        target: Option<i64>,
    },
    /// Revert migrations down to a version (0 reverts everything)
    Down {
        #[arg(long)]
        target: i64,
    },
    /// Show the current and latest schema versions
    Status,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Run a non-server CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Migrate(MigrateCommands::Up { target })) => {
            cmd_migrate_up(config, *target).await
        }
        Some(Commands::Migrate(MigrateCommands::Down { target })) => {
            cmd_migrate_down(config, *target).await
        }
        Some(Commands::Migrate(MigrateCommands::Status)) => cmd_migrate_status(config).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli, config),
        // The server is started from main.rs
        Some(Commands::Serve) | None => Ok(()),
    }
}

fn print_report(action: &str, report: &MigrationReport) {
    if report.migrations_run == 0 {
        println!("[OK] Nothing to {}; schema is at version {}", action, report.current_version);
        return;
    }

    println!(
        "[OK] {} {} migration(s): {:?}",
        capitalize(action),
        report.migrations_run,
        report.applied
    );
    println!("Schema is now at version {}", report.current_version);
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn cmd_migrate_up(config: &Config, target: Option<i64>) -> Result<()> {
    let pool = db::connect(&config.database).await?;
    let store = PgMigrationStore::new(&pool);

    let report = db::run_migrations(&store, MIGRATIONS, target)
        .await
        .context("Migration failed")?;
    print_report("apply", &report);

    pool.close().await;
    Ok(())
}

async fn cmd_migrate_down(config: &Config, target: i64) -> Result<()> {
    let pool = db::connect(&config.database).await?;
    let store = PgMigrationStore::new(&pool);

    let report = db::rollback_migrations(&store, MIGRATIONS, target)
        .await
        .context("Rollback failed")?;
    print_report("revert", &report);

    pool.close().await;
    Ok(())
}

async fn cmd_migrate_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.database).await?;
    let store = PgMigrationStore::new(&pool);

    let status = db::migration_status(&store, MIGRATIONS).await?;
    println!("Current version: {}", status.current_version);
    println!("Latest version:  {}", status.latest_version);

    if status.is_up_to_date() {
        println!("[OK] Schema is up to date");
    } else {
        println!();
        println!("Pending migrations:");
        for pending in &status.pending {
            println!("  {:03} {}", pending.version, pending.name);
        }
    }

    pool.close().await;
    Ok(())
}

/// Hide the password part of a database URL
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:****{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

fn cmd_config_check(cli: &Cli, config: &Config) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[--] Configuration file not found, using defaults and environment");
    } else {
        println!("[OK] Configuration file is valid!");
    }

    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!("  Environment:  {}", config.server.environment);
    println!();
    println!("Database:");
    println!("  URL:          {}", redact_url(&config.database.url));
    println!(
        "  Pool:         {}..{} connections",
        config.database.min_connections, config.database.max_connections
    );
    println!("  Migrate:      {}", on_off(config.database.migrate_on_start));
    println!();
    println!("Security:");
    println!("  Rate Limiting: {}", on_off(config.rate_limit.enabled));
    println!("  CORS Origin:  {}", config.cors.origin);
    println!("  JWT Lifetime: {}", config.auth.jwt_expires_in);

    let mut warnings = Vec::new();
    if config.auth.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
        warnings.push(format!(
            "JWT_SECRET is shorter than {} characters",
            MIN_JWT_SECRET_LENGTH
        ));
    }
    if crate::auth::parse_expires_in(&config.auth.jwt_expires_in).is_none() {
        warnings.push(format!(
            "JWT_EXPIRES_IN '{}' is not a valid duration",
            config.auth.jwt_expires_in
        ));
    }
    if config.server.is_production() && config.cors.allows_any() {
        warnings.push("CORS allows any origin in production".to_string());
    }

    println!();
    if warnings.is_empty() {
        println!("[OK] No problems found");
    } else {
        for warning in &warnings {
            println!("[!!] {}", warning);
        }
    }

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "Enabled"
    } else {
        "Disabled"
    }
}
