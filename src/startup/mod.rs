//! Startup self-checks run before the server accepts requests:
//! database connectivity, schema version and JWT secret strength.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cli::MIN_JWT_SECRET_LENGTH;
use crate::config::Config;
use crate::db::{migration_status, MigrationStatus, PgMigrationStore, MIGRATIONS};
use crate::DbPool;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// A failed critical check aborts startup
    pub critical: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub all_passed: bool,
    pub summary: String,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks.iter().filter(|c| c.critical).all(|c| c.passed);
        let all_passed = checks.iter().all(|c| c.passed);
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();
        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} warnings)",
                passed,
                total,
                total - passed
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
        }
    }

    pub fn failed_critical(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.critical && !c.passed)
    }
}

/// Run all startup self-checks
pub async fn run_startup_checks(config: &Config, db: &DbPool) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let checks = vec![
        check_database_connectivity(db).await,
        check_database_schema(db).await,
        check_jwt_secret(config),
    ];

    let report = StartupCheckReport::new(checks);

    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, message = %check.message, "Startup check PASSED");
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

async fn check_database_connectivity(db: &DbPool) -> CheckResult {
    match crate::db::ping(db).await {
        Ok(()) => CheckResult::pass("database_connectivity", "Database connection successful"),
        Err(e) => CheckResult::fail("database_connectivity", "Failed to connect to database", true)
            .with_details(e.to_string()),
    }
}

async fn check_database_schema(db: &DbPool) -> CheckResult {
    let store = PgMigrationStore::new(db);
    match migration_status(&store, MIGRATIONS).await {
        Ok(status) => schema_check_result(&status),
        Err(e) => CheckResult::fail("database_schema", "Failed to read schema version", true)
            .with_details(e.to_string()),
    }
}

fn schema_check_result(status: &MigrationStatus) -> CheckResult {
    if status.is_up_to_date() {
        CheckResult::pass(
            "database_schema",
            format!("Schema is at version {}", status.current_version),
        )
    } else {
        let pending: Vec<String> = status
            .pending
            .iter()
            .map(|m| format!("{:03}_{}", m.version, m.name))
            .collect();
        CheckResult::fail(
            "database_schema",
            format!(
                "Schema is at version {}, expected {}",
                status.current_version, status.latest_version
            ),
            true,
        )
        .with_details(format!(
            "Pending: {}. Run `detailbook migrate up`.",
            pending.join(", ")
        ))
    }
}

fn check_jwt_secret(config: &Config) -> CheckResult {
    let length = config.auth.jwt_secret.len();
    if length >= MIN_JWT_SECRET_LENGTH {
        return CheckResult::pass("jwt_secret", "JWT secret length is sufficient");
    }

    CheckResult::fail(
        "jwt_secret",
        format!(
            "JWT secret is {} characters, at least {} required",
            length, MIN_JWT_SECRET_LENGTH
        ),
        config.server.is_production(),
    )
    .with_details("Set JWT_SECRET to a long random value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::PendingMigration;

    #[test]
    fn test_report_summary() {
        let report = StartupCheckReport::new(vec![
            CheckResult::pass("a", "ok"),
            CheckResult::fail("b", "meh", false),
        ]);
        assert!(report.all_critical_passed);
        assert!(!report.all_passed);
        assert_eq!(report.summary, "1/2 checks passed (1 warnings)");

        let report = StartupCheckReport::new(vec![CheckResult::fail("c", "bad", true)]);
        assert!(!report.all_critical_passed);
        assert_eq!(report.failed_critical().count(), 1);
    }

    #[test]
    fn test_short_jwt_secret_is_critical_only_in_production() {
        let mut config = Config::default();
        config.auth.jwt_secret = "short".to_string();

        let check = check_jwt_secret(&config);
        assert!(!check.passed);
        assert!(!check.critical);

        config.server.environment = "production".to_string();
        assert!(check_jwt_secret(&config).critical);

        config.auth.jwt_secret = "x".repeat(MIN_JWT_SECRET_LENGTH);
        assert!(check_jwt_secret(&config).passed);
    }

    #[test]
    fn test_schema_behind_is_critical() {
        let status = MigrationStatus {
            current_version: 3,
            latest_version: 5,
            pending: vec![
                PendingMigration {
                    version: 4,
                    name: "bookings",
                },
                PendingMigration {
                    version: 5,
                    name: "seed_catalog",
                },
            ],
        };

        let check = schema_check_result(&status);
        assert!(!check.passed);
        assert!(check.critical);
        assert!(check.details.unwrap().contains("004_bookings, 005_seed_catalog"));
    }
}
