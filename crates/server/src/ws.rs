//! WebSocket endpoint for real-time simulation streaming
//!
//! The runner steps on its own thread; this endpoint only polls the latest
//! published snapshot and forwards it when the step number changes. A slow
//! client therefore skips frames instead of queueing them.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use orchestrator::RunnerState;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};

use crate::protocol::{self, Command};
use crate::state::AppState;

/// Frame poll period (~60 FPS)
const FRAME_PERIOD: Duration = Duration::from_millis(16);

// ---------------------------------------------------------------------------
// WebSocket Handler
// ---------------------------------------------------------------------------

/// WebSocket upgrade handler for /ws/simulation/{id}
pub async fn ws_simulation_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let exists = state.simulations().contains_key(&id);
    if !exists {
        return (axum::http::StatusCode::NOT_FOUND, "Simulation not found").into_response();
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, state, id))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, sim_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // Per-connection diagnostics state
    let mut diagnostics_enabled = false;

    // Send SimInfo and start the runner
    let sim_info = {
        let sims = state.simulations();
        let Some(runner) = sims.get(&sim_id) else {
            tracing::error!("Simulation {} not found", sim_id);
            return;
        };
        runner.start();
        protocol::encode_sim_info(runner.params(), runner.backend_name())
    };

    if let Err(e) = sender.send(Message::Binary(sim_info)).await {
        tracing::error!("Failed to send SimInfo: {}", e);
        return;
    }

    let mut frame_timer = interval(FRAME_PERIOD);
    let mut last_step = None;
    let mut last_state = RunnerState::Running;
    let mut last_send = Instant::now();

    loop {
        tokio::select! {
            _ = frame_timer.tick() => {
                // Collect everything under one short lock
                let polled = {
                    let sims = state.simulations();
                    sims.get(&sim_id).map(|runner| (runner.snapshot(), runner.status()))
                };
                let Some((snapshot, status)) = polled else {
                    tracing::info!("Simulation {} removed, closing stream", sim_id);
                    break;
                };

                if let Some(frame) = snapshot.filter(|f| Some(f.step) != last_step) {
                    last_step = Some(frame.step);
                    let frame_time_ms = last_send.elapsed().as_secs_f32() * 1000.0;
                    last_send = Instant::now();

                    if let Err(e) = sender.send(Message::Binary(protocol::encode_frame(&frame))).await {
                        tracing::error!("Failed to send frame: {}", e);
                        break;
                    }

                    if diagnostics_enabled {
                        let diag = protocol::encode_diagnostics(&status, Some(&*frame), frame_time_ms);
                        if let Err(e) = sender.send(Message::Binary(diag)).await {
                            tracing::error!("Failed to send diagnostics: {}", e);
                            break;
                        }
                    }
                }

                // Report terminal transitions once
                if status.state != last_state
                    && matches!(status.state, RunnerState::Finished | RunnerState::Error)
                {
                    let message = status
                        .error_message
                        .unwrap_or_else(|| "Simulation finished".to_string());
                    let msg = protocol::encode_sim_status(status.state, &message);
                    if let Err(e) = sender.send(Message::Binary(msg)).await {
                        tracing::error!("Failed to send status: {}", e);
                        break;
                    }
                }
                last_state = status.state;
            }

            // Receive commands from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if let Err(e) = handle_client_command(&state, &sim_id, &data, &mut sender, &mut diagnostics_enabled).await {
                            tracing::error!("Error handling command: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("WebSocket closed for simulation {}", sim_id);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Pause simulation when client disconnects
    if let Some(runner) = state.simulations().get(&sim_id) {
        runner.pause();
    }
}

// ---------------------------------------------------------------------------
// Client Command Handling
// ---------------------------------------------------------------------------

/// Handle incoming command from client
async fn handle_client_command(
    state: &Arc<AppState>,
    sim_id: &str,
    data: &[u8],
    sender: &mut SplitSink<WebSocket, Message>,
    diagnostics_enabled: &mut bool,
) -> Result<(), String> {
    let command = protocol::parse_command(data).map_err(|e| e.to_string())?;

    // Diagnostics toggles are per connection and need no reply
    match command {
        Command::EnableDiagnostics => {
            *diagnostics_enabled = true;
            tracing::info!("Diagnostics enabled for simulation {}", sim_id);
            return Ok(());
        }
        Command::DisableDiagnostics => {
            *diagnostics_enabled = false;
            tracing::info!("Diagnostics disabled for simulation {}", sim_id);
            return Ok(());
        }
        Command::Pause | Command::Resume => {}
    }

    let status_msg = {
        let sims = state.simulations();
        let runner = sims
            .get(sim_id)
            .ok_or_else(|| "Simulation not found".to_string())?;

        let text = if command == Command::Pause {
            runner.pause();
            "Simulation paused"
        } else {
            runner.resume();
            "Simulation resumed"
        };
        protocol::encode_sim_status(runner.state(), text)
    };

    sender
        .send(Message::Binary(status_msg))
        .await
        .map_err(|e| format!("Failed to send status: {}", e))?;

    Ok(())
}
