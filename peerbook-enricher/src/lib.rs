//! peerbook-enricher library interface
//!
//! Keeps an in-memory registry of peer addresses seen on chain, enriches each
//! new address with its ENS name, Loopring name and Loopring account id on a
//! background worker thread, and persists the results to SQLite in batches.

pub mod api;
pub mod batcher;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod registry;
pub mod reload;
pub mod worker;

pub use crate::batcher::{FlushOutcome, PeerStore, PersistenceBatcher};
pub use crate::error::{ApiError, ApiResult};
pub use crate::registry::{FieldValue, LookupKey, PeerField, Registry};
pub use crate::worker::{EnrichmentWorker, WorkerHandle, WorkerReport, WorkerSettings};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            startup_time: Utc::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::peer_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
