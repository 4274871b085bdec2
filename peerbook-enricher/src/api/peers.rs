//! Peer lookup and ingestion endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::registry::{FieldValue, LookupKey, PeerField};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    /// `record` (default), `address`, `primary_name`, `secondary_name` or `account_id`
    pub field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddPeersRequest {
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddPeersResponse {
    /// Addresses that were not already registered
    pub added: usize,
}

/// Numeric keys are account ids; anything else is an address or a name
fn parse_key(key: &str) -> LookupKey {
    match key.parse::<i64>() {
        Ok(id) => LookupKey::AccountId(id),
        Err(_) => LookupKey::from(key),
    }
}

/// GET /peers/:key
pub async fn get_peer(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Json<FieldValue>> {
    let field = match params.field.as_deref() {
        Some(field) => field.parse::<PeerField>().map_err(ApiError::BadRequest)?,
        None => PeerField::default(),
    };

    state
        .registry
        .get(&parse_key(&key), field)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No peer matches '{}'", key)))
}

/// POST /peers
///
/// Ingestion may block on queue backpressure, so it runs off the async
/// executor.
pub async fn add_peers(
    State(state): State<AppState>,
    Json(request): Json<AddPeersRequest>,
) -> ApiResult<Json<AddPeersResponse>> {
    let registry = state.registry.clone();
    let added = tokio::task::spawn_blocking(move || registry.add_all(request.addresses))
        .await
        .map_err(|e| ApiError::Internal(format!("Ingestion task failed: {}", e)))?;

    Ok(Json(AddPeersResponse { added }))
}

/// Build peer routes
pub fn peer_routes() -> Router<AppState> {
    Router::new()
        .route("/peers", post(add_peers))
        .route("/peers/:key", get(get_peer))
}
