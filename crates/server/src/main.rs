//! HTTP + WebSocket Server
//!
//! Serves the REST API and frame stream for fluid simulations.

use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=debug,orchestrator=info,fluid_kernel=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fluid simulation server");

    // Get port from environment or default to 3000
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    // Set up paths
    let configs_dir = std::env::var("FLUID_CONFIGS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("configs"));
    let frontend_dist = PathBuf::from("frontend/dist");

    if !configs_dir.exists() {
        std::fs::create_dir_all(&configs_dir)?;
    }

    let state = Arc::new(AppState::new(configs_dir, port));
    let app = server::router(state);

    // Add static file serving if frontend dist exists
    let app = if frontend_dist.exists() {
        tracing::info!("Serving frontend from {:?}", frontend_dist);
        app.fallback_service(ServeDir::new(frontend_dist))
    } else {
        tracing::warn!("Frontend dist directory not found at {:?}", frontend_dist);
        app
    };

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
