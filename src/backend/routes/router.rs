/**
 * Router Configuration
 *
 * This module assembles the HTTP surface of the server: one websocket
 * upgrade path for collaboration traffic and a health check.
 *
 * # Routes
 *
 * - `GET /health` - liveness and open document count
 * - `GET {COLLAB_PATH}/{document_name}` - collaboration websocket
 * - anything else - 404 with the JSON error body
 */

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::backend::collab::{handle_collab_upgrade, CollabGateway};
use crate::backend::error::CollabError;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
///
/// # Arguments
///
/// * `app_state` - services shared by every handler
pub fn create_router(app_state: AppState) -> Router<()> {
    let collab_route = format!("{}/{{document_name}}", app_state.config.collab_path);

    Router::new()
        .route("/health", get(health))
        .route(&collab_route, get(handle_collab_upgrade))
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}

/// Health check (GET /health)
async fn health(State(gateway): State<CollabGateway>) -> Json<Value> {
    let open = gateway.open_documents().await.len();
    Json(json!({ "status": "ok", "openDocuments": open }))
}

async fn not_found() -> CollabError {
    CollabError::not_found("Route not found")
}
