use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app;
use crate::auth::AuthService;
use crate::cfg;
use crate::core;
use crate::db::{self, MemoryStore, SqliteStore, Store, StoreError};
use crate::services::gateway::{GatewayError, GraphApiGateway};

/// Application-level error type
#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigLoadingFailed(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    DatabaseOperationFailed(#[from] StoreError),

    #[error("Migration error: {0}")]
    MigrationFailed(#[from] app::MigrationError),

    #[error("CLI error: {0}")]
    CliOperationFailed(#[from] app::CliError),

    #[error("Gateway client error: {0}")]
    GatewayInitFailed(#[from] GatewayError),

    #[error("Network address parsing error: {0}")]
    AddressParsingFailed(#[from] std::net::AddrParseError),

    #[error("Server error: {0}")]
    ServerStartingFailed(#[from] std::io::Error),
}

/// Opens the configured store, migrating SQLite first when asked to.
pub async fn open_store(settings: &cfg::DatabaseSettings) -> Result<Arc<dyn Store>, AppError> {
    match settings.backend {
        cfg::StoreBackend::Sqlite => {
            let pool = db::create_db_pool(settings).await?;
            if settings.run_migrations_on_startup {
                app::run_migrations(&pool).await?;
            }
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        cfg::StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn run() {
    if let Err(e) = run_app().await {
        eprintln!("❌ {e}\n");

        let mut source = e.source();
        while let Some(err) = source {
            eprintln!("Caused by: {err}");
            source = err.source();
        }

        std::process::exit(1);
    }
}

async fn run_app() -> Result<(), AppError> {
    let cli = app::Cli::parse();
    let settings = cfg::AppSettings::new()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&settings.server.log_directives))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(command) = cli.command {
        app::run_command(command, settings).await?;
        return Ok(());
    }

    let store = open_store(&settings.database).await?;
    let gateway = Arc::new(GraphApiGateway::new(&settings.gateway)?);
    let context = core::Context::new(store, gateway, settings.clone());
    spawn_session_sweep(context.auth.clone(), settings.auth.session_sweep_interval_secs);

    let server_address = settings.get_server_address();
    let address = server_address.parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    let router = app::create_router(context);
    tracing::info!("🚀 starting server");
    tracing::info!("   app_env: {}", cfg::AppSettings::get_app_run_env());
    tracing::info!("   cfg_dir: {}", cfg::AppSettings::get_config_full_path());
    tracing::info!("   logging: {}", settings.server.log_directives);
    tracing::info!("   storage: {:?}", settings.database.backend);
    tracing::info!("   address: http://{server_address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically deletes expired sessions. Lookups check expiry on their own,
/// so this only keeps the table small.
fn spawn_session_sweep(auth: AuthService, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match auth.sweep_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Expired sessions swept"),
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    });
}

/// Tokio signal handler that will wait for a user to press CTRL+C.
/// We use this in our `Server` method `with_graceful_shutdown`.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, shutting down gracefully"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
