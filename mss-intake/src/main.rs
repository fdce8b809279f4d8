//! mss-intake - Submission Intake Microservice
//!
//! Hands out placeholder record ids for speaking-assessment submissions so a
//! later scoring result has a stable record to attach to. At most one pending
//! placeholder exists per (tenant, student, question), no matter how many
//! concurrent requests or service instances race for it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mss_common::config::{self, RootFolderInitializer, RootFolderResolver};
use mss_common::db::{self, settings};
use mss_common::EventBus;
use mss_intake::admission::{spawn_sweeper, PlaceholderService, SqliteAdmissionStore, SweeperConfig};
use mss_intake::AppState;

/// Command-line arguments for mss-intake
#[derive(Parser, Debug)]
#[command(name = "mss-intake")]
#[command(about = "Submission intake microservice for MySpeakingScore")]
#[command(version)]
struct Args {
    /// Root folder holding mss.db (overrides environment and config file)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on (overrides config file and database setting)
    #[arg(short, long, env = "MSS_INTAKE_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Log filter directive, e.g. "info" or "mss_intake=debug,tower_http=debug"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = config::load_default_toml_config();

    // RUST_LOG wins, then --log-level, then [logging] level
    let default_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting mss-intake (Submission Intake) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Resolve root folder
    let root_folder = RootFolderResolver::new("intake")
        .with_cli_arg(args.root_folder.clone())
        .with_toml_config(toml_config.clone())
        .resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    // Step 4: Runtime settings
    let max_retry_wait_ms =
        settings::get_setting_u64(&pool, settings::INTAKE_MAX_RETRY_WAIT_MS, 5000).await?;
    let abandon_after_secs =
        settings::get_setting_u64(&pool, settings::PLACEHOLDER_ABANDON_AFTER_SECS, 3600).await?;
    let sweep_interval_secs =
        settings::get_setting_u64(&pool, settings::PLACEHOLDER_SWEEP_INTERVAL_SECS, 300).await?;
    let event_bus_capacity =
        settings::get_setting_u64(&pool, settings::EVENT_BUS_CAPACITY, 256).await?;

    let bind_addr = match args.bind_addr.or(toml_config.intake.bind_addr) {
        Some(addr) => addr,
        None => settings::get_setting(&pool, settings::INTAKE_BIND_ADDR)
            .await?
            .unwrap_or_else(|| config::DEFAULT_BIND_ADDR.to_string()),
    };

    // Step 5: Admission service and background sweeper
    let event_bus = EventBus::new(usize::try_from(event_bus_capacity).unwrap_or(usize::MAX));
    let store = Arc::new(SqliteAdmissionStore::new(pool.clone()));
    let service = Arc::new(PlaceholderService::new(store, event_bus));
    info!("Placeholder admission service initialized");

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        Arc::clone(&service),
        SweeperConfig::from_secs(sweep_interval_secs, abandon_after_secs),
        shutdown.clone(),
    );

    // Step 6: Serve
    let app = mss_intake::build_router(AppState::new(service, max_retry_wait_ms));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!("Sweeper task failed: {}", e);
        }
    }
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
