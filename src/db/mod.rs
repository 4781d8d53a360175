pub mod migrations;
mod models;

pub use migrations::{
    latest_version, migration_status, rollback_migrations, run_migrations, MigrationError,
    MigrationReport, MigrationStatus, PgMigrationStore, MIGRATIONS,
};
pub use models::*;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    PgConnectOptions::from_str(&config.url).with_context(|| "Invalid DATABASE_URL")
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let statement_timeout = format!("SET statement_timeout = {}", config.statement_timeout_ms);

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .after_connect(move |conn, _meta| {
            let statement_timeout = statement_timeout.clone();
            Box::pin(async move {
                conn.execute(statement_timeout.as_str()).await?;
                Ok(())
            })
        })
}

/// Open the connection pool without touching the schema.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
    info!(
        min = config.min_connections,
        max = config.max_connections,
        "Connecting to database"
    );

    pool_options(config)
        .connect_with(connect_options(config)?)
        .await
        .with_context(|| "Failed to connect to PostgreSQL")
}

/// Connect to PostgreSQL and optionally bring the schema up to date.
pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = connect(config).await?;

    if config.migrate_on_start {
        let store = PgMigrationStore::new(&pool);
        run_migrations(&store, MIGRATIONS, None).await?;
    }

    info!("Database initialized successfully");
    Ok(pool)
}

/// Build a pool without opening any connection until first use.
pub fn connect_lazy(config: &DatabaseConfig) -> Result<DbPool> {
    Ok(pool_options(config).connect_lazy_with(connect_options(config)?))
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
