//! peerbook-enricher - Peer identity enrichment service
//!
//! **Module Identity:**
//! - Name: peerbook-enricher
//! - Port: 5780 (configurable)
//!
//! Tracks peer addresses, resolves their ENS name, Loopring name and
//! Loopring account id in the background and stores the results in SQLite.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use peerbook_common::config::{load_config, resolve_config_path, TerminationPolicy, TomlConfig};
use peerbook_common::db::init_database;
use peerbook_common::logging::init_tracing;
use tokio::signal;
use tracing::{error, info};

use peerbook_enricher::batcher::{PeerStore, PersistenceBatcher};
use peerbook_enricher::config::{enrich_settings, resolve_api_key, worker_settings};
use peerbook_enricher::db::SqlitePeerStore;
use peerbook_enricher::gateway::{EnsClient, Enricher, LoopringClient};
use peerbook_enricher::registry::{LookupKey, PeerField, Registry};
use peerbook_enricher::reload::load_registry;
use peerbook_enricher::worker::EnrichmentWorker;
use peerbook_enricher::AppState;

/// Command-line arguments for peerbook-enricher
#[derive(Parser, Debug)]
#[command(name = "peerbook-enricher")]
#[command(about = "Peer identity enrichment service")]
#[command(version)]
struct Args {
    /// Configuration file (overrides PEERBOOK_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the enrichment worker and the HTTP API until Ctrl+C
    Serve,
    /// Enrich the stored backlog, flush and exit
    Drain,
    /// Look up a stored peer by address, name or account id
    Lookup {
        key: String,
        /// record, address, primary_name, secondary_name or account_id
        #[arg(short, long, default_value = "record")]
        field: PeerField,
    },
    /// Forward lookup against the external services
    Resolve {
        #[command(subcommand)]
        target: ResolveTarget,
    },
}

#[derive(Subcommand, Debug)]
enum ResolveTarget {
    /// ENS name -> address
    Name { name: String },
    /// Loopring account id -> owner address
    Account { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let source = resolve_config_path(args.config.as_deref());
    let config = load_config(&source).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("Starting peerbook-enricher v{}", env!("CARGO_PKG_VERSION"));
    info!(?source, "Configuration loaded");

    match args.command {
        Command::Serve => serve(&config).await,
        Command::Drain => drain(&config).await,
        Command::Lookup { key, field } => lookup(&config, &key, field).await,
        Command::Resolve { target } => resolve(&config, target).await,
    }
}

async fn open_store(config: &TomlConfig) -> Result<Arc<SqlitePeerStore>> {
    info!("Database: {}", config.database_path.display());
    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    Ok(Arc::new(SqlitePeerStore::new(pool)))
}

/// Reload the registry; a storage failure leaves it empty
async fn reload_or_empty(store: &SqlitePeerStore, config: &TomlConfig) -> Arc<Registry> {
    match load_registry(store, config.worker.queue_capacity).await {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to reload peers, starting with an empty registry");
            Arc::new(Registry::new(config.worker.queue_capacity))
        }
    }
}

fn build_enricher(config: &TomlConfig) -> Result<Arc<Enricher>> {
    let timeout = config.worker.call_timeout();

    let ens = EnsClient::new(config.ens.rpc_url.as_str(), timeout)
        .context("Failed to create ENS client")?;
    let loopring = LoopringClient::new(
        config.account_directory.base_url.as_str(),
        resolve_api_key(config),
        config.account_directory.requests_per_second,
        timeout,
    )
    .context("Failed to create Loopring client")?;

    Ok(Arc::new(Enricher::new(
        Arc::new(ens),
        Arc::new(loopring),
        enrich_settings(config),
    )))
}

fn build_worker(
    config: &TomlConfig,
    registry: Arc<Registry>,
    store: Arc<SqlitePeerStore>,
    termination: TerminationPolicy,
) -> Result<EnrichmentWorker> {
    let store: Arc<dyn PeerStore> = store;
    let batcher = PersistenceBatcher::new(store, config.worker.max_flush_attempts);
    let mut settings = worker_settings(config);
    settings.termination = termination;

    Ok(EnrichmentWorker::new(
        registry,
        build_enricher(config)?,
        batcher,
        settings,
    ))
}

async fn serve(config: &TomlConfig) -> Result<()> {
    let store = open_store(config).await?;
    let registry = reload_or_empty(&store, config).await;

    let worker = build_worker(config, registry.clone(), store, config.worker.termination)?
        .spawn(tokio::runtime::Handle::current())
        .context("Failed to start enrichment worker")?;

    let app = peerbook_enricher::build_router(AppState::new(registry));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let report = tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .context("Worker shutdown task failed")??;
    info!(?report, "Server shutdown complete");
    Ok(())
}

async fn drain(config: &TomlConfig) -> Result<()> {
    let store = open_store(config).await?;
    let registry = reload_or_empty(&store, config).await;

    let worker = build_worker(config, registry, store, TerminationPolicy::UntilDrained)?
        .spawn(tokio::runtime::Handle::current())
        .context("Failed to start enrichment worker")?;

    let report = tokio::task::spawn_blocking(move || worker.join())
        .await
        .context("Worker task failed")??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn lookup(config: &TomlConfig, key: &str, field: PeerField) -> Result<()> {
    let store = open_store(config).await?;
    let registry = load_registry(store.as_ref(), config.worker.queue_capacity)
        .await
        .context("Failed to load peers")?;

    let key = match key.parse::<i64>() {
        Ok(id) => LookupKey::AccountId(id),
        Err(_) => LookupKey::from(key),
    };

    match registry.get(&key, field) {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => anyhow::bail!("No peer matches {:?}", key),
    }
}

async fn resolve(config: &TomlConfig, target: ResolveTarget) -> Result<()> {
    let enricher = build_enricher(config)?;
    let address = match target {
        ResolveTarget::Name { name } => enricher.address_for_name(&name).await,
        ResolveTarget::Account { id } => enricher.address_for_account_id(id).await,
    };
    println!("{}", address);
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
                error!("Failed to install signal handler: {}", e);
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
