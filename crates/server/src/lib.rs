//! HTTP + WebSocket surface for the fluid simulation
//!
//! REST endpoints create, inspect, pause, resume and delete simulations
//! built from JSON configs; a WebSocket per simulation streams binary
//! post-step frames (see [`protocol`]).

#![warn(missing_docs)]

pub mod api;
pub mod protocol;
pub mod state;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

pub use state::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/configs", get(api::list_configs))
        .route("/configs/:name", get(api::get_config))
        .route("/simulations", post(api::create_simulation))
        .route(
            "/simulations/:id",
            get(api::get_simulation).delete(api::delete_simulation),
        )
        .route("/simulations/:id/pause", post(api::pause_simulation))
        .route("/simulations/:id/resume", post(api::resume_simulation));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_router)
        .route("/ws/simulation/:id", get(ws::ws_simulation_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

async fn health_handler() -> &'static str {
    "OK"
}
