//! farmerbot
//!
//! Keeps a farm's nodes powered to match its load and hands out nodes to
//! workloads. Serves the control API and runs the reconciliation loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use farmerbot::{
    agent::{RmbNodeAgent, TwinCache},
    api,
    chain::HttpChainClient,
    config::{self, StoreKind},
    db::{Database, MemoryStore, Store},
    document,
    managers::{FarmManager, Fleet, NodeManager, PowerManager},
    scheduler::{NodeRefresher, ReconcileWorker},
    state::AppState,
};
use farmerbot_reconcile::SystemClock;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to FARMERBOT_LOG_LEVEL.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting farmerbot");
    info!(listen_addr = %config.listen_addr, store = ?config.store, "Configuration loaded");

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Postgres => {
            let db = match Database::connect(&config.database).await {
                Ok(db) => db,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };
            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                db.run_migrations().await?;
            }
            Arc::new(db.store())
        }
    };

    if let Some(path) = &config.config_path {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let document = document::parse_config(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(
            farm_id = %document.farm.id,
            nodes = document.nodes.len(),
            "Seeding state from configuration document"
        );
        store.save_config(&document).await?;
    } else if let Err(e) = store.get_farm().await {
        warn!(error = %e, "No configuration document and no stored farm; define one through the API");
    }

    let chain = Arc::new(HttpChainClient::new(&config.chain_url, config.agent_timeout)?);
    let twins = Arc::new(TwinCache::new(chain.clone()));
    let agent = Arc::new(RmbNodeAgent::new(twins, config.agent_timeout)?);

    let fleet = Fleet::new(store, chain, Arc::new(SystemClock));
    let root = info_span!("farmerbot");

    let farms = FarmManager::new(fleet.clone(), info_span!(parent: &root, "farm_manager"));
    let nodes = NodeManager::new(fleet.clone(), info_span!(parent: &root, "node_manager"));
    let power = PowerManager::new(fleet.clone(), info_span!(parent: &root, "power_manager"));

    let refresher = NodeRefresher::new(
        fleet.clone(),
        agent,
        info_span!(parent: &root, "node_refresher"),
    )
    .with_concurrency(config.refresh_concurrency);
    let worker = ReconcileWorker::new(
        refresher,
        power.clone(),
        config.reconcile_interval,
        info_span!(parent: &root, "reconcile_worker"),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(&fleet, farms, nodes, power);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for the reconcile worker to shut down...");
    if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(10), worker_handle).await {
        warn!(error = %e, "Reconcile worker did not shut down in time");
    }

    info!("farmerbot shutdown complete");
    Ok(())
}
