use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use detailbook::cli::{self, Cli};
use detailbook::config::Config;
use detailbook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.is_serve() {
        return cli::run_command(&cli, &config).await;
    }

    serve(&cli, config).await
}

async fn serve(cli: &Cli, config: Config) -> Result<()> {
    tracing::info!(
        environment = %config.server.environment,
        "Starting detailbook v{}",
        env!("CARGO_PKG_VERSION")
    );

    detailbook::api::set_expose_internal_errors(!config.server.is_production());

    let db = detailbook::db::init(&config.database).await?;

    if cli.skip_checks {
        tracing::warn!("Startup checks skipped");
    } else {
        let report = detailbook::startup::run_startup_checks(&config, &db).await;
        if !report.all_critical_passed {
            let failed: Vec<&str> = report.failed_critical().map(|c| c.name.as_str()).collect();
            anyhow::bail!("Critical startup checks failed: {}", failed.join(", "));
        }
    }

    let state = Arc::new(AppState::new(config.clone(), db.clone()));
    state.spawn_background_tasks();

    let app = detailbook::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
