//! Versioned SQL migrations.
//!
//! Migrations are an ordered list of `up`/`down` SQL blocks. The applied
//! version is tracked in `schema_migrations`, one row per version; the
//! current version is the highest row (0 when the table is empty).

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users",
        up: include_str!("../../migrations/001_users.up.sql"),
        down: include_str!("../../migrations/001_users.down.sql"),
    },
    Migration {
        version: 2,
        name: "service_catalog",
        up: include_str!("../../migrations/002_service_catalog.up.sql"),
        down: include_str!("../../migrations/002_service_catalog.down.sql"),
    },
    Migration {
        version: 3,
        name: "vehicles",
        up: include_str!("../../migrations/003_vehicles.up.sql"),
        down: include_str!("../../migrations/003_vehicles.down.sql"),
    },
    Migration {
        version: 4,
        name: "bookings",
        up: include_str!("../../migrations/004_bookings.up.sql"),
        down: include_str!("../../migrations/004_bookings.down.sql"),
    },
    Migration {
        version: 5,
        name: "seed_catalog",
        up: include_str!("../../migrations/005_seed_catalog.up.sql"),
        down: include_str!("../../migrations/005_seed_catalog.down.sql"),
    },
];

pub fn latest_version(migrations: &[Migration]) -> i64 {
    migrations.last().map(|m| m.version).unwrap_or(0)
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration list is out of order: expected version {expected}, found {found}")]
    OutOfOrder { expected: i64, found: i64 },
    #[error("Target version {target} is outside 0..={latest}")]
    InvalidTarget { target: i64, latest: i64 },
    #[error("Database is at version {current}, newer than the latest known migration {latest}")]
    UnknownVersion { current: i64, latest: i64 },
    #[error("Migration {version} ({name}) failed: {source}")]
    Failed {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Storage for migration state and SQL execution.
///
/// `apply` and `revert` must record the marker change together with the
/// SQL itself so a crash cannot leave a migration applied but unrecorded.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn ensure_schema_table(&self) -> Result<(), sqlx::Error>;
    async fn current_version(&self) -> Result<i64, sqlx::Error>;
    async fn apply(&self, migration: &Migration) -> Result<(), sqlx::Error>;
    async fn revert(&self, migration: &Migration) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrations_run: usize,
    pub current_version: i64,
    /// Versions applied (or reverted), in execution order
    pub applied: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub latest_version: i64,
    pub pending: Vec<PendingMigration>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.current_version == self.latest_version
    }
}

/// Versions must be exactly 1..=n with no gaps or duplicates.
pub fn validate_migrations(migrations: &[Migration]) -> Result<(), MigrationError> {
    for (index, migration) in migrations.iter().enumerate() {
        let expected = index as i64 + 1;
        if migration.version != expected {
            return Err(MigrationError::OutOfOrder {
                expected,
                found: migration.version,
            });
        }
    }
    Ok(())
}

async fn checked_current_version(
    store: &dyn MigrationStore,
    migrations: &[Migration],
) -> Result<i64, MigrationError> {
    validate_migrations(migrations)?;
    store.ensure_schema_table().await?;

    let current = store.current_version().await?;
    let latest = latest_version(migrations);
    if current > latest {
        return Err(MigrationError::UnknownVersion { current, latest });
    }
    Ok(current)
}

/// Apply every migration in `(current, target]` in ascending order.
///
/// `target` defaults to the latest migration. A target at or below the
/// current version does nothing.
pub async fn run_migrations(
    store: &dyn MigrationStore,
    migrations: &[Migration],
    target: Option<i64>,
) -> Result<MigrationReport, MigrationError> {
    let current = checked_current_version(store, migrations).await?;
    let latest = latest_version(migrations);
    let target = target.unwrap_or(latest);
    if target < 0 || target > latest {
        return Err(MigrationError::InvalidTarget { target, latest });
    }

    let mut versions = Vec::new();
    for migration in migrations
        .iter()
        .filter(|m| m.version > current && m.version <= target)
    {
        info!(version = migration.version, name = migration.name, "Applying migration");
        store
            .apply(migration)
            .await
            .map_err(|source| MigrationError::Failed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        versions.push(migration.version);
    }

    let current_version = versions.last().copied().unwrap_or(current);
    if versions.is_empty() {
        info!(version = current_version, "Schema is up to date");
    } else {
        info!(
            applied = versions.len(),
            version = current_version,
            "Migrations completed"
        );
    }

    Ok(MigrationReport {
        migrations_run: versions.len(),
        current_version,
        applied: versions,
    })
}

/// Revert every migration in `(target, current]` in descending order.
/// A target at or above the current version does nothing.
pub async fn rollback_migrations(
    store: &dyn MigrationStore,
    migrations: &[Migration],
    target: i64,
) -> Result<MigrationReport, MigrationError> {
    let current = checked_current_version(store, migrations).await?;
    if target < 0 {
        return Err(MigrationError::InvalidTarget {
            target,
            latest: latest_version(migrations),
        });
    }

    let mut versions = Vec::new();
    for migration in migrations
        .iter()
        .rev()
        .filter(|m| m.version > target && m.version <= current)
    {
        info!(version = migration.version, name = migration.name, "Reverting migration");
        store
            .revert(migration)
            .await
            .map_err(|source| MigrationError::Failed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        versions.push(migration.version);
    }

    let current_version = if versions.is_empty() {
        current
    } else {
        target
    };

    Ok(MigrationReport {
        migrations_run: versions.len(),
        current_version,
        applied: versions,
    })
}

pub async fn migration_status(
    store: &dyn MigrationStore,
    migrations: &[Migration],
) -> Result<MigrationStatus, MigrationError> {
    let current = checked_current_version(store, migrations).await?;

    Ok(MigrationStatus {
        current_version: current,
        latest_version: latest_version(migrations),
        pending: migrations
            .iter()
            .filter(|m| m.version > current)
            .map(|m| PendingMigration {
                version: m.version,
                name: m.name,
            })
            .collect(),
    })
}

/// PostgreSQL-backed store. Each migration runs in its own transaction
/// together with its `schema_migrations` row.
pub struct PgMigrationStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PgMigrationStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationStore for PgMigrationStore<'_> {
    async fn ensure_schema_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn current_version(&self) -> Result<i64, sqlx::Error> {
        let (version,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
                .fetch_one(self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }

    async fn apply(&self, migration: &Migration) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::Executor::execute(&mut *tx, migration.up).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    async fn revert(&self, migration: &Migration) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::Executor::execute(&mut *tx, migration.down).await?;
        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    /// Records executed SQL and keeps the marker rows in memory
    #[derive(Default)]
    struct MemoryStore {
        applied: Mutex<BTreeMap<i64, &'static str>>,
        executed: Mutex<Vec<String>>,
        fail_on: Option<i64>,
    }

    #[async_trait]
    impl MigrationStore for MemoryStore {
        async fn ensure_schema_table(&self) -> Result<(), sqlx::Error> {
            Ok(())
        }

        async fn current_version(&self) -> Result<i64, sqlx::Error> {
            Ok(self.applied.lock().unwrap().keys().next_back().copied().unwrap_or(0))
        }

        async fn apply(&self, migration: &Migration) -> Result<(), sqlx::Error> {
            if self.fail_on == Some(migration.version) {
                return Err(sqlx::Error::Protocol("syntax error".into()));
            }
            self.executed.lock().unwrap().push(migration.up.to_string());
            self.applied.lock().unwrap().insert(migration.version, migration.name);
            Ok(())
        }

        async fn revert(&self, migration: &Migration) -> Result<(), sqlx::Error> {
            self.executed.lock().unwrap().push(migration.down.to_string());
            self.applied.lock().unwrap().remove(&migration.version);
            Ok(())
        }
    }

    const FIXTURE: &[Migration] = &[
        Migration { version: 1, name: "one", up: "up 1", down: "down 1" },
        Migration { version: 2, name: "two", up: "up 2", down: "down 2" },
        Migration { version: 3, name: "three", up: "up 3", down: "down 3" },
    ];

    #[test]
    fn test_builtin_migrations_are_sequential() {
        assert!(validate_migrations(MIGRATIONS).is_ok());
        assert_eq!(latest_version(MIGRATIONS), MIGRATIONS.len() as i64);
        for migration in MIGRATIONS {
            assert!(!migration.up.trim().is_empty(), "{} has no up SQL", migration.name);
            assert!(!migration.down.trim().is_empty(), "{} has no down SQL", migration.name);
        }
    }

    #[test]
    fn test_validate_rejects_gaps_and_disorder() {
        let gap = [FIXTURE[0], FIXTURE[2]];
        assert!(matches!(
            validate_migrations(&gap),
            Err(MigrationError::OutOfOrder { expected: 2, found: 3 })
        ));

        let reversed = [FIXTURE[1], FIXTURE[0]];
        assert!(validate_migrations(&reversed).is_err());
    }

    #[tokio::test]
    async fn test_run_from_empty_reaches_latest() {
        let store = MemoryStore::default();
        let report = run_migrations(&store, MIGRATIONS, None).await.unwrap();

        assert_eq!(report.current_version, MIGRATIONS.len() as i64);
        assert_eq!(report.migrations_run, MIGRATIONS.len());
        assert_eq!(store.current_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let store = MemoryStore::default();
        run_migrations(&store, FIXTURE, None).await.unwrap();

        let again = assert_ok!(run_migrations(&store, FIXTURE, None).await);
        assert_eq!(again.migrations_run, 0);
        assert_eq!(again.current_version, 3);
        assert_eq!(store.executed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_run_to_target_in_order() {
        let store = MemoryStore::default();
        let report = run_migrations(&store, FIXTURE, Some(2)).await.unwrap();
        assert_eq!(report.applied, vec![1, 2]);
        assert_eq!(report.current_version, 2);

        let rest = run_migrations(&store, FIXTURE, None).await.unwrap();
        assert_eq!(rest.applied, vec![3]);
        assert_eq!(*store.executed.lock().unwrap(), vec!["up 1", "up 2", "up 3"]);
    }

    #[tokio::test]
    async fn test_target_beyond_latest_is_rejected() {
        let store = MemoryStore::default();
        let err = assert_err!(run_migrations(&store, FIXTURE, Some(9)).await);
        assert!(matches!(err, MigrationError::InvalidTarget { target: 9, latest: 3 }));
        assert!(store.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_descending() {
        let store = MemoryStore::default();
        run_migrations(&store, FIXTURE, None).await.unwrap();

        let report = rollback_migrations(&store, FIXTURE, 1).await.unwrap();
        assert_eq!(report.applied, vec![3, 2]);
        assert_eq!(report.current_version, 1);
        assert_eq!(store.current_version().await.unwrap(), 1);
        assert_eq!(
            store.executed.lock().unwrap()[3..].to_vec(),
            vec!["down 3".to_string(), "down 2".to_string()]
        );

        let noop = rollback_migrations(&store, FIXTURE, 1).await.unwrap();
        assert_eq!(noop.migrations_run, 0);

        let all = rollback_migrations(&store, FIXTURE, 0).await.unwrap();
        assert_eq!(all.applied, vec![1]);
        assert_eq!(all.current_version, 0);
    }

    #[tokio::test]
    async fn test_rollback_target_above_current_is_noop() {
        let store = MemoryStore::default();
        run_migrations(&store, FIXTURE, Some(2)).await.unwrap();

        let report = assert_ok!(rollback_migrations(&store, FIXTURE, 9).await);
        assert_eq!(report.migrations_run, 0);
        assert_eq!(report.current_version, 2);

        assert_err!(rollback_migrations(&store, FIXTURE, -1).await);
        assert_eq!(store.current_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_and_keeps_earlier_versions() {
        let store = MemoryStore {
            fail_on: Some(2),
            ..Default::default()
        };

        let err = run_migrations(&store, FIXTURE, None).await.unwrap_err();
        assert!(matches!(err, MigrationError::Failed { version: 2, .. }));
        assert_eq!(store.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_database_newer_than_binary() {
        let store = MemoryStore::default();
        store.applied.lock().unwrap().insert(7, "future");

        let err = migration_status(&store, FIXTURE).await.unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion { current: 7, latest: 3 }));
    }

    #[tokio::test]
    async fn test_status_lists_pending() {
        let store = MemoryStore::default();
        run_migrations(&store, FIXTURE, Some(1)).await.unwrap();

        let status = migration_status(&store, FIXTURE).await.unwrap();
        assert_eq!(status.current_version, 1);
        assert_eq!(status.latest_version, 3);
        assert_eq!(
            status.pending.iter().map(|p| p.version).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(!status.is_up_to_date());

        run_migrations(&store, FIXTURE, None).await.unwrap();
        assert!(migration_status(&store, FIXTURE).await.unwrap().is_up_to_date());
    }
}
