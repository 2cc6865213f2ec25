/**
 * Application State Management
 *
 * This module defines the application state structure and implements
 * the necessary `FromRef` traits for Axum state extraction.
 *
 * # Architecture
 *
 * `AppState` holds the long-lived services of the server:
 * - The connection gateway (open documents and their peers)
 * - The authentication guard used before every upgrade
 * - The mark editor for server-side mark edits
 * - The broadcast signal sink, when selected, so adapters can subscribe
 * - The optional database pool
 *
 * Every field is cheap to clone; handlers extract only what they use.
 */

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::backend::auth::AuthenticationGuard;
use crate::backend::collab::{CollabGateway, MarkEditor};
use crate::backend::server::config::CollabConfig;
use crate::backend::signals::broadcast::BroadcastSignalSink;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CollabConfig>,
    pub gateway: CollabGateway,
    pub guard: AuthenticationGuard,
    pub mark_editor: MarkEditor,
    /// Present when `SIGNAL_SINK=broadcast`
    pub signals: Option<BroadcastSignalSink>,
    pub db_pool: Option<PgPool>,
}

impl FromRef<AppState> for CollabGateway {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

impl FromRef<AppState> for AuthenticationGuard {
    fn from_ref(state: &AppState) -> Self {
        state.guard.clone()
    }
}

impl FromRef<AppState> for MarkEditor {
    fn from_ref(state: &AppState) -> Self {
        state.mark_editor.clone()
    }
}
