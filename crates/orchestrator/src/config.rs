//! Configuration parsing and validation for fluid simulations
//!
//! A configuration file is a JSON document naming the run, the fluid
//! parameters (every field optional, falling back to the kernel defaults),
//! the compute backend and the collider scene.

use fluid_kernel::{CapsuleCollider, ConfigError, FluidParams, SphereCollider};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// Fluid and pipeline parameters
    #[serde(default)]
    pub fluid: FluidParams,
    /// Which compute backend executes the kernels
    #[serde(default)]
    pub backend: BackendType,
    /// Collider producer fed to the simulation once per step
    #[serde(default)]
    pub scene: SceneConfig,
    /// Stop after this many steps
    pub max_steps: Option<u64>,
    /// Stop after this much simulated time (seconds)
    pub max_time: Option<f64>,
    /// Publish a particle snapshot every this many steps
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,
}

/// Compute backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// rayon thread pool
    #[default]
    Cpu,
    /// wgpu compute shaders (requires the `gpu` feature)
    Gpu,
    /// GPU when an adapter is available, otherwise CPU
    Auto,
}

/// Collider scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneConfig {
    /// Fixed colliders that never move
    Static {
        /// Sphere colliders, in priority order
        #[serde(default)]
        spheres: Vec<SphereCollider>,
        /// Optional capsule
        #[serde(default)]
        capsule: Option<CapsuleCollider>,
    },
    /// Spheres circling the vertical box axis and a capsule sweeping along x
    Orbiting {
        /// Number of orbiting spheres
        #[serde(default = "default_sphere_count")]
        sphere_count: usize,
        /// Radius of each sphere
        #[serde(default = "default_sphere_radius")]
        sphere_radius: f32,
        /// Distance from the vertical axis to each sphere center
        #[serde(default = "default_orbit_radius")]
        orbit_radius: f32,
        /// Orbit angular speed (rad/s)
        #[serde(default = "default_angular_speed")]
        angular_speed: f32,
        /// Height of the orbit plane
        #[serde(default)]
        orbit_height: f32,
        /// Capsule radius; zero disables the capsule
        #[serde(default = "default_capsule_radius")]
        capsule_radius: f32,
        /// Half the distance between the capsule endpoints
        #[serde(default = "default_capsule_half_height")]
        capsule_half_height: f32,
        /// Peak x offset of the capsule sweep
        #[serde(default = "default_sweep_amplitude")]
        sweep_amplitude: f32,
        /// Sweep angular frequency (rad/s)
        #[serde(default = "default_sweep_speed")]
        sweep_speed: f32,
    },
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::Static {
            spheres: Vec::new(),
            capsule: None,
        }
    }
}

/// Errors raised while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Fluid parameters were rejected by the kernel
    #[error("invalid fluid parameters: {0}")]
    Fluid(#[from] ConfigError),

    /// Run limits or scene description are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// Default values
fn default_snapshot_interval() -> u64 {
    1
}

fn default_sphere_count() -> usize {
    3
}

fn default_sphere_radius() -> f32 {
    0.6
}

fn default_orbit_radius() -> f32 {
    3.0
}

fn default_angular_speed() -> f32 {
    0.8
}

fn default_capsule_radius() -> f32 {
    0.5
}

fn default_capsule_half_height() -> f32 {
    1.0
}

fn default_sweep_amplitude() -> f32 {
    4.0
}

fn default_sweep_speed() -> f32 {
    0.5
}

impl SimulationConfig {
    /// Configuration with default fluid parameters and an empty static scene
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fluid: FluidParams::default(),
            backend: BackendType::default(),
            scene: SceneConfig::default(),
            max_steps: None,
            max_time: None,
            snapshot_interval: default_snapshot_interval(),
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigLoadError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.fluid.validate()?;

        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err(ConfigLoadError::Invalid(
                    "max_steps must be at least 1".to_string(),
                ));
            }
        }

        if let Some(max_time) = self.max_time {
            if !(max_time > 0.0) {
                return Err(ConfigLoadError::Invalid(
                    "max_time must be positive".to_string(),
                ));
            }
        }

        if self.snapshot_interval == 0 {
            return Err(ConfigLoadError::Invalid(
                "snapshot_interval must be at least 1".to_string(),
            ));
        }

        self.validate_scene()
    }

    fn validate_scene(&self) -> Result<(), ConfigLoadError> {
        match &self.scene {
            SceneConfig::Static { spheres, capsule } => {
                if spheres.iter().any(|s| !(s.radius > 0.0)) {
                    return Err(ConfigLoadError::Invalid(
                        "sphere collider radius must be positive".to_string(),
                    ));
                }
                if let Some(c) = capsule {
                    if !(c.radius > 0.0) {
                        return Err(ConfigLoadError::Invalid(
                            "capsule radius must be positive".to_string(),
                        ));
                    }
                }
            }
            SceneConfig::Orbiting {
                sphere_radius,
                capsule_radius,
                capsule_half_height,
                ..
            } => {
                if !(*sphere_radius > 0.0) {
                    return Err(ConfigLoadError::Invalid(
                        "sphere_radius must be positive".to_string(),
                    ));
                }
                if *capsule_radius < 0.0 || *capsule_half_height < 0.0 {
                    return Err(ConfigLoadError::Invalid(
                        "capsule dimensions must be non-negative".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
