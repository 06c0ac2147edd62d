//! Orchestration Layer
//!
//! This crate turns a JSON configuration into a running fluid simulation:
//! - Configuration loading and validation
//! - Scene collectors producing per-step collider snapshots
//! - Compute backend selection (CPU, GPU, or auto-detect)
//! - A background runner with lifecycle management and snapshot publication

#![warn(missing_docs)]

pub mod config;
pub mod runner;
pub mod scene;

pub use config::{BackendType, ConfigLoadError, SceneConfig, SimulationConfig};
pub use runner::{FrameSnapshot, RunLimits, RunnerState, RunnerStatus, SimulationRunner};
pub use scene::{OrbitingScene, SceneCollector, StaticScene};

use fluid_kernel::{BackendError, ComputeBackend, CpuBackend, SimError, Simulation};
use std::path::Path;
use thiserror::Error;

/// Errors raised while assembling a simulation
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    /// The requested backend is not available
    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    /// The simulation rejected its parameters or failed to initialize
    #[error(transparent)]
    Simulation(#[from] SimError),

    /// GPU requested but the crate was built without the `gpu` feature
    #[error("GPU backend requested but the 'gpu' feature is not enabled")]
    GpuFeatureDisabled,
}

/// Create a complete simulation from a configuration file
///
/// This function performs the full setup pipeline:
/// 1. Load and validate the configuration
/// 2. Create the compute backend
/// 3. Build the simulation and spawn the particle lattice
/// 4. Wrap it in a `SimulationRunner` for lifecycle management
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/default.json")?;
/// runner.start();
/// // ... query status, pause, resume, read snapshots
/// # Ok::<(), orchestrator::SetupError>(())
/// ```
pub fn create_simulation(config_path: impl AsRef<Path>) -> Result<SimulationRunner, SetupError> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    build_runner(&config)
}

/// Build a runner from an already validated configuration
pub fn build_runner(config: &SimulationConfig) -> Result<SimulationRunner, SetupError> {
    let backend = create_backend(config.backend)?;
    let mut simulation = Simulation::new(config.fluid.clone(), backend)?;
    simulation.initialize()?;
    tracing::info!(
        "Simulation '{}' ready: {} particles on {}",
        config.name,
        config.fluid.particle_count(),
        simulation.backend_name()
    );

    let runner = SimulationRunner::new(
        simulation,
        scene::from_config(&config.scene),
        RunLimits {
            max_steps: config.max_steps,
            max_time: config.max_time,
        },
        config.snapshot_interval,
    );
    Ok(runner)
}

// ===========================================================================
// Backend selection helper
// ===========================================================================

/// Create a compute backend for the configured type.
///
/// For `Auto`, attempts GPU first and falls back to CPU if unavailable.
/// For `Gpu`, fails if no adapter can be opened.
/// For `Cpu`, always returns the rayon backend.
pub fn create_backend(backend: BackendType) -> Result<Box<dyn ComputeBackend>, SetupError> {
    match backend {
        BackendType::Cpu => {
            tracing::info!("Creating CPU compute backend...");
            Ok(Box::new(CpuBackend::new()))
        }
        #[cfg(feature = "gpu")]
        BackendType::Gpu => {
            tracing::info!("Creating GPU compute backend...");
            Ok(Box::new(fluid_kernel::GpuBackend::new()?))
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Gpu => Err(SetupError::GpuFeatureDisabled),
        #[cfg(feature = "gpu")]
        BackendType::Auto => {
            tracing::info!("Auto-detecting backend...");
            match fluid_kernel::GpuBackend::new() {
                Ok(gpu) => Ok(Box::new(gpu)),
                Err(e) => {
                    tracing::warn!("GPU init failed ({e}), falling back to CPU");
                    Ok(Box::new(CpuBackend::new()))
                }
            }
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Auto => {
            tracing::info!("GPU feature not enabled, using CPU backend");
            Ok(Box::new(CpuBackend::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_always_available() {
        let backend = create_backend(BackendType::Cpu).unwrap();
        assert_eq!(backend.name(), "cpu");
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_without_feature() {
        assert!(matches!(
            create_backend(BackendType::Gpu),
            Err(SetupError::GpuFeatureDisabled)
        ));
        assert_eq!(create_backend(BackendType::Auto).unwrap().name(), "cpu");
    }

    #[test]
    fn test_build_runner_from_config() {
        let mut config = SimulationConfig::new("unit");
        config.fluid.grid_dims = [4, 4, 4];
        config.fluid.workgroup_size = 64;
        config.max_steps = Some(3);

        let runner = build_runner(&config).unwrap();
        assert_eq!(runner.particle_count(), 64);
        assert_eq!(runner.state(), RunnerState::Created);
        runner.start();
        runner.join().unwrap();
    }
}
