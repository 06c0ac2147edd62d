//! REST handler tests
//!
//! Calls the axum handlers directly against a temporary configs directory.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use server::api::{self, CreateSimulationRequest};
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SMALL_CONFIG: &str = r#"{
    "name": "Small test box",
    "fluid": { "grid_dims": [4, 4, 4], "workgroup_size": 64 },
    "backend": "Cpu",
    "scene": { "kind": "orbiting", "sphere_count": 2 },
    "max_steps": 5
}"#;

fn configs_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fluid-server-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("small.json"), SMALL_CONFIG).unwrap();
    std::fs::write(dir.join("broken.json"), "{ not json").unwrap();
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
    dir
}

fn app_state(test: &str) -> Arc<AppState> {
    Arc::new(AppState::new(configs_dir(test), 3000))
}

async fn create(state: &Arc<AppState>, config: &str) -> Result<api::CreateSimulationResponse, (StatusCode, String)> {
    api::create_simulation(
        State(Arc::clone(state)),
        Json(CreateSimulationRequest {
            config: config.to_string(),
        }),
    )
    .await
    .map(|Json(r)| r)
}

#[tokio::test]
async fn test_list_configs_skips_invalid_files() {
    let state = app_state("list");
    let Json(list) = api::list_configs(State(state)).await.unwrap();

    assert_eq!(list.configs.len(), 1);
    let info = &list.configs[0];
    assert_eq!(info.file, "small");
    assert_eq!(info.name, "Small test box");
    assert_eq!(info.particle_count, 64);
    assert_eq!(info.backend, "Cpu");
    assert_eq!(info.scene, "orbiting");
}

#[tokio::test]
async fn test_get_config() {
    let state = app_state("get");
    let Json(json) = api::get_config(State(Arc::clone(&state)), Path("small".to_string()))
        .await
        .unwrap();
    assert_eq!(json["name"], "Small test box");

    let err = api::get_config(State(Arc::clone(&state)), Path("missing".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    // Traversal components are stripped
    let err = api::get_config(State(state), Path("../small".to_string()))
        .await
        .err();
    assert!(err.is_none());
}

#[tokio::test]
async fn test_create_and_control_simulation() {
    let state = app_state("lifecycle");
    let created = create(&state, "small").await.unwrap();

    assert_eq!(created.status, "created");
    assert_eq!(created.particle_count, 64);
    assert_eq!(created.backend, "cpu");
    assert!(created.ws_url.ends_with(&created.simulation_id));

    let id = created.simulation_id.clone();
    let Json(status) = api::get_simulation(State(Arc::clone(&state)), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(status.status, "created");
    assert_eq!(status.step, 0);

    // Pause is ignored before the runner starts
    let Json(paused) = api::pause_simulation(State(Arc::clone(&state)), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(paused.status, "created");

    // Start it the way a stream connection does and let it finish
    state.simulations().get(&id).unwrap().start();
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let Json(status) = api::get_simulation(State(Arc::clone(&state)), Path(id.clone()))
            .await
            .unwrap();
        if status.status == "finished" || Instant::now() > deadline {
            assert_eq!(status.status, "finished");
            assert_eq!(status.step, 5);
            assert!(status.error.is_none());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let Json(deleted) = api::delete_simulation(State(Arc::clone(&state)), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(deleted.status, "finished");

    let err = api::get_simulation(State(state), Path(id)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_errors() {
    let state = app_state("errors");

    let err = create(&state, "missing").await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    let err = create(&state, "broken").await.unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_simulation() {
    let state = app_state("unknown");
    for result in [
        api::pause_simulation(State(Arc::clone(&state)), Path("nope".to_string())).await,
        api::resume_simulation(State(Arc::clone(&state)), Path("nope".to_string())).await,
        api::delete_simulation(State(Arc::clone(&state)), Path("nope".to_string())).await,
    ] {
        assert_eq!(result.unwrap_err().0, StatusCode::NOT_FOUND);
    }
}
