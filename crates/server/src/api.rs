//! REST API endpoints for simulation management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use orchestrator::{RunnerState, SceneConfig, SetupError, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Handler error: status code plus a human-readable message
pub type ApiError = (StatusCode, String);

// ---------------------------------------------------------------------------
// Request/Response Types
// ---------------------------------------------------------------------------

/// Request body for creating a simulation
#[derive(Debug, Deserialize)]
pub struct CreateSimulationRequest {
    /// Configuration name: file stem under the configs directory
    pub config: String,
}

/// Response for simulation creation
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSimulationResponse {
    /// Unique simulation ID
    pub simulation_id: String,
    /// Current status
    pub status: String,
    /// WebSocket URL for connecting to this simulation
    pub ws_url: String,
    /// Total particle count
    pub particle_count: usize,
    /// Backend executing the kernels
    pub backend: String,
}

/// Configuration file metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Name to pass to `POST /api/simulations`
    pub file: String,
    /// Human-readable name from the file
    pub name: String,
    /// Particle count
    pub particle_count: usize,
    /// Requested backend
    pub backend: String,
    /// Scene kind ("static" or "orbiting")
    pub scene: String,
}

/// List of available configurations
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigListResponse {
    /// Available configurations
    pub configs: Vec<ConfigInfo>,
}

/// Simulation status response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationStatusResponse {
    /// Simulation ID
    pub simulation_id: String,
    /// Current status
    pub status: String,
    /// Steps completed
    pub step: u64,
    /// Current simulation time (seconds)
    pub sim_time: f64,
    /// Particle count
    pub particle_count: usize,
    /// Backend executing the kernels
    pub backend: String,
    /// Non-finite force evaluations zeroed so far
    pub unstable_total: u64,
    /// Colliders discarded for exceeding capacity so far
    pub colliders_dropped_total: u64,
    /// Failure message when status is "error"
    pub error: Option<String>,
}

/// Generic status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Status string
    pub status: String,
}

/// Lowercase name of a runner state as used in JSON responses
pub fn state_name(state: RunnerState) -> &'static str {
    match state {
        RunnerState::Created => "created",
        RunnerState::Running => "running",
        RunnerState::Paused => "paused",
        RunnerState::Finished => "finished",
        RunnerState::Error => "error",
    }
}

fn not_found(id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Simulation '{}' not found", id))
}

// ---------------------------------------------------------------------------
// API Handlers
// ---------------------------------------------------------------------------

/// GET /api/configs - List available configuration files
pub async fn list_configs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfigListResponse>, ApiError> {
    let entries = std::fs::read_dir(&state.configs_dir).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read configs directory: {}", e),
        )
    })?;

    let mut configs = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let path = entry.path();

        // Only process .json files
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let Some(file) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        match SimulationConfig::load(&path) {
            Ok(config) => {
                let scene = match config.scene {
                    SceneConfig::Static { .. } => "static",
                    SceneConfig::Orbiting { .. } => "orbiting",
                };
                configs.push(ConfigInfo {
                    file: file.to_string(),
                    name: config.name.clone(),
                    particle_count: config.fluid.particle_count(),
                    backend: format!("{:?}", config.backend),
                    scene: scene.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {:?}: {}", path, e);
            }
        }
    }

    configs.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(Json(ConfigListResponse { configs }))
}

/// GET /api/configs/{name} - Get raw configuration JSON
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config_path = state.config_path(&name);

    if !config_path.exists() {
        return Err((StatusCode::NOT_FOUND, format!("Configuration '{}' not found", name)));
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to read config: {}", e))
    })?;

    let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to parse config: {}", e))
    })?;

    Ok(Json(json))
}

/// POST /api/simulations - Create a new simulation
///
/// The runner is created paused in `Created`; it starts when a WebSocket
/// client connects.
pub async fn create_simulation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSimulationRequest>,
) -> Result<Json<CreateSimulationResponse>, ApiError> {
    let config_path = state.config_path(&req.config);

    if !config_path.exists() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Configuration '{}' not found", req.config),
        ));
    }

    let config = SimulationConfig::load(&config_path)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid configuration: {}", e)))?;

    // Backend setup may block on device creation
    let runner = tokio::task::spawn_blocking(move || orchestrator::build_runner(&config))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            let code = match e {
                SetupError::Config(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, format!("Failed to create simulation: {}", e))
        })?;

    let sim_id = uuid::Uuid::new_v4().to_string();
    let particle_count = runner.particle_count();
    let backend = runner.backend_name().to_string();
    let status = state_name(runner.state()).to_string();

    state.simulations().insert(sim_id.clone(), runner);
    tracing::info!("Created simulation {} ({} particles)", sim_id, particle_count);

    let ws_url = format!("ws://localhost:{}/ws/simulation/{}", state.port, sim_id);

    Ok(Json(CreateSimulationResponse {
        simulation_id: sim_id,
        status,
        ws_url,
        particle_count,
        backend,
    }))
}

/// GET /api/simulations/{id} - Get simulation status
pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SimulationStatusResponse>, ApiError> {
    let simulations = state.simulations();
    let runner = simulations.get(&id).ok_or_else(|| not_found(&id))?;
    let status = runner.status();

    Ok(Json(SimulationStatusResponse {
        simulation_id: id,
        status: state_name(status.state).to_string(),
        step: status.step,
        sim_time: status.sim_time,
        particle_count: status.particle_count,
        backend: status.backend.to_string(),
        unstable_total: status.unstable_total,
        colliders_dropped_total: status.colliders_dropped_total,
        error: status.error_message,
    }))
}

/// POST /api/simulations/{id}/pause - Pause simulation
pub async fn pause_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let simulations = state.simulations();
    let runner = simulations.get(&id).ok_or_else(|| not_found(&id))?;

    runner.pause();

    Ok(Json(StatusResponse {
        status: state_name(runner.state()).to_string(),
    }))
}

/// POST /api/simulations/{id}/resume - Resume simulation
pub async fn resume_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let simulations = state.simulations();
    let runner = simulations.get(&id).ok_or_else(|| not_found(&id))?;

    runner.resume();

    Ok(Json(StatusResponse {
        status: state_name(runner.state()).to_string(),
    }))
}

/// DELETE /api/simulations/{id} - Stop and discard a simulation
pub async fn delete_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let runner = state.simulations().remove(&id).ok_or_else(|| not_found(&id))?;
    runner.stop();
    tracing::info!("Deleted simulation {}", id);

    Ok(Json(StatusResponse {
        status: state_name(runner.state()).to_string(),
    }))
}
