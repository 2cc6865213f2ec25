/**
 * Server Initialization
 *
 * This module wires the services together and builds the router.
 *
 * # Initialization Process
 *
 * 1. Open the database pool if `DATABASE_URL` is set
 * 2. Pick the stores: PostgreSQL with a pool, in-memory without
 * 3. Pick the signal sink
 * 4. Build coordinator, history scheduler, contributor tracker, gateway,
 *    guard and mark editor
 * 5. Create the router
 *
 * Running without a database is meant for development: pages, users and
 * roles live in memory and start empty.
 */

use std::sync::Arc;

use axum::Router;

use crate::backend::access::{AccessControl, MemoryDirectory, PgAccessControl};
use crate::backend::auth::{AuthenticationGuard, TokenVerifier};
use crate::backend::collab::{CollabGateway, FlushTiming, MarkEditor};
use crate::backend::contributors::ContributorTracker;
use crate::backend::error::CollabError;
use crate::backend::history::HistoryScheduler;
use crate::backend::persistence::{MemoryPageStore, PageStore, PersistenceCoordinator, PgPageStore};
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_database, CollabConfig, SignalSinkKind};
use crate::backend::server::state::AppState;
use crate::backend::signals::broadcast::BroadcastSignalSink;
use crate::backend::signals::{NoopSignalSink, SignalSink};

/// Create and configure the Axum application
///
/// # Returns
///
/// The router and the state behind it. The state is handed back so the
/// caller can flush open documents on shutdown and subscribe to signals.
///
/// # Errors
///
/// Fails when a configured database cannot be reached.
pub async fn create_app(config: CollabConfig) -> Result<(Router, AppState), CollabError> {
    tracing::info!("[Server] Initializing collaboration server");

    let db_pool = load_database(config.database_url.as_deref()).await?;

    let (pages, access): (Arc<dyn PageStore>, Arc<dyn AccessControl>) = match &db_pool {
        Some(pool) => (
            Arc::new(PgPageStore::new(pool.clone())),
            Arc::new(PgAccessControl::new(pool.clone())),
        ),
        None => {
            tracing::warn!("[Server] No database configured, using in-memory stores");
            (Arc::new(MemoryPageStore::new()), Arc::new(MemoryDirectory::new()))
        }
    };

    let (signals, sink): (Option<BroadcastSignalSink>, Arc<dyn SignalSink>) = match config.signal_sink {
        SignalSinkKind::Broadcast => {
            let broadcast = BroadcastSignalSink::new();
            (Some(broadcast.clone()), Arc::new(broadcast))
        }
        SignalSinkKind::Disabled => (None, Arc::new(NoopSignalSink)),
    };

    let state = build_state(config, pages, access, sink, signals, db_pool);
    let app = create_router(state.clone());

    tracing::info!("[Server] Router configured at {}", state.config.collab_path);
    Ok((app, state))
}

/// Assemble the application state from explicit stores
///
/// Used by `create_app` and by tests that need to seed the stores.
pub fn build_state(
    config: CollabConfig,
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessControl>,
    sink: Arc<dyn SignalSink>,
    signals: Option<BroadcastSignalSink>,
    db_pool: Option<sqlx::PgPool>,
) -> AppState {
    let coordinator = PersistenceCoordinator::new(pages.clone(), sink, config.history);
    let history = HistoryScheduler::new(pages.clone(), config.history.interval);
    let gateway = CollabGateway::new(
        coordinator,
        ContributorTracker::new(),
        history,
        FlushTiming {
            quiet: config.debounce,
            ceiling: config.max_debounce,
        },
    );
    let guard = AuthenticationGuard::new(TokenVerifier::new(&config.jwt_secret), access, pages);
    let mark_editor = MarkEditor::new(gateway.clone());

    AppState {
        config: Arc::new(config),
        gateway,
        guard,
        mark_editor,
        signals,
        db_pool,
    }
}
