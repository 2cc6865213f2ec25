/**
 * collabdoc Server Entry Point
 *
 * Loads configuration, starts the Axum server and flushes every open
 * document before exiting on Ctrl-C.
 */

#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use collabdoc::backend::server::{create_app, CollabConfig};

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("[Startup] Server initialization started");

    let config = CollabConfig::from_env()?;
    let port = config.server_port;
    let (app, state) = create_app(config).await?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Startup] Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[Shutdown] Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("[Shutdown] Signal received, draining connections");
        })
        .await?;

    state.gateway.flush_all().await;
    tracing::info!("[Shutdown] Open documents flushed");

    Ok(())
}

#[cfg(not(feature = "ssr"))]
fn main() {
    eprintln!("Server requires the 'ssr' feature to be enabled.");
    eprintln!("Run with: cargo run --bin collabdoc-server --features ssr");
    std::process::exit(1);
}
