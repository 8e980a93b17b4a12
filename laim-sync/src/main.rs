//! laim-sync - Device reconciliation service
//!
//! Hosts the sync trigger API and the interval trigger on top of the
//! reconciliation engine in the `laim_sync` library.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use laim_common::config::{load_or_default, resolve_config_path};
use laim_sync::config::SyncConfig;
use laim_sync::db::{SqliteInventoryStore, SqliteJobHistoryStore};
use laim_sync::models::SourceKind;
use laim_sync::services::Reconciler;
use laim_sync::sources::{LibrenmsClient, NetdiscoClient, SourceClient};
use laim_sync::workflow::{spawn_interval_trigger, SyncEngine, SyncService};
use laim_sync::{build_router, AppState};

/// Running jobs scanned for restart recovery
const RECOVERY_SCAN_LIMIT: usize = 50;

/// Command-line arguments for laim-sync
#[derive(Parser, Debug)]
#[command(name = "laim-sync")]
#[command(about = "Device reconciliation service for LAIM")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LAIM_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "LAIM_SYNC_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), "LAIM_CONFIG", "laim-sync");
    let toml_config = load_or_default(config_path.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "laim_sync={level},laim_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting laim-sync v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let sync_config = SyncConfig::from_toml(&toml_config).context("Invalid sync configuration")?;
    if sync_config.sources.is_empty() {
        warn!("No source configured; sync runs will be rejected");
    }

    info!("Database: {}", toml_config.database_path.display());
    let pool = laim_common::db::init_database(&toml_config.database_path)
        .await
        .context("Failed to initialize database")?;

    let mut engine = SyncEngine::new(
        Arc::new(SqliteInventoryStore::new(pool.clone())),
        Arc::new(SqliteJobHistoryStore::new(pool)),
        Reconciler::new(sync_config.priority.clone()),
        sync_config.classifier.clone(),
    )
    .with_max_record_errors_logged(sync_config.max_record_errors_logged);

    for source in &sync_config.sources {
        let client: Arc<dyn SourceClient> = match source.kind {
            SourceKind::Netdisco => Arc::new(NetdiscoClient::new(&source.transport)?),
            SourceKind::Librenms => Arc::new(LibrenmsClient::new(&source.transport)?),
        };
        engine = engine.with_source(client, source.credentials.clone());
    }

    let service = SyncService::new(engine);
    match service.recover_interrupted(RECOVERY_SCAN_LIMIT).await {
        Ok(0) => {}
        Ok(n) => warn!("Closed {} sync job(s) interrupted by the previous shutdown", n),
        Err(e) => error!("Failed to recover interrupted sync jobs: {}", e),
    }

    let shutdown = CancellationToken::new();
    let trigger = if sync_config.trigger.enabled {
        Some(spawn_interval_trigger(
            service.clone(),
            sync_config.trigger.interval,
            shutdown.clone(),
        ))
    } else {
        info!("Interval trigger disabled");
        None
    };

    let app = build_router(AppState::new(service.clone()));

    let port = args.port.unwrap_or(toml_config.port);
    let addr: SocketAddr = format!("{}:{}", toml_config.bind_address, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", toml_config.bind_address, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the timer first so no run starts while the active one winds down
    shutdown.cancel();
    if let Some(trigger) = trigger {
        if let Err(e) = trigger.await {
            warn!("Interval trigger task failed: {}", e);
        }
    }
    service.shutdown().await;

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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
