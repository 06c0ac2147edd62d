//! Simulation parameters, defaults and construction-time validation.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::smoothing::SmoothingKernels;

/// Equation-of-state strategy used by the density and force stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PressureModel {
    /// `p = k (ρ - ρ0)`, negative pressure allowed.
    #[default]
    IdealGas,
    /// Ideal-gas pressure plus a short-range near-pressure term that keeps
    /// particles from clumping.
    TargetDensity {
        /// Scale applied to near density to obtain near pressure.
        near_pressure_multiplier: f32,
    },
}

impl PressureModel {
    /// Near-pressure multiplier, zero for the plain ideal-gas model.
    pub fn near_multiplier(&self) -> f32 {
        match *self {
            PressureModel::IdealGas => 0.0,
            PressureModel::TargetDensity { near_pressure_multiplier } => near_pressure_multiplier,
        }
    }
}

/// Full parameter set of one simulation instance.
///
/// `grid_dims`, `workgroup_size` and `pad_sort_to_pow2` shape the particle
/// buffers and are fixed at construction. Everything else may be swapped
/// between steps through [`Simulation::update_params`](crate::Simulation::update_params).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidParams {
    /// Spawn lattice dimensions `(nx, ny, nz)`; N = nx·ny·nz.
    #[serde(default = "default_grid_dims")]
    pub grid_dims: [u32; 3],
    /// Particle radius; lattice spacing is twice this.
    #[serde(default = "default_particle_radius")]
    pub particle_radius: f32,
    /// Jitter radius at spawn, as a fraction of the particle radius.
    #[serde(default = "default_spawn_jitter")]
    pub spawn_jitter: f32,
    /// Lattice origin.
    #[serde(default = "default_spawn_center")]
    pub spawn_center: [f32; 3],
    /// Full extents of the origin-centered box.
    #[serde(default = "default_box_size")]
    pub box_size: [f32; 3],
    /// Mass of every particle.
    #[serde(default = "default_particle_mass")]
    pub particle_mass: f32,
    /// Gas constant `k` of the equation of state.
    #[serde(default = "default_gas_constant")]
    pub gas_constant: f32,
    /// Resting density `ρ0`; also the density floor.
    #[serde(default = "default_resting_density")]
    pub resting_density: f32,
    /// Viscosity coefficient.
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    /// Velocity factor applied on a wall hit, in `[-1, 0]`.
    #[serde(default = "default_bound_damping")]
    pub bound_damping: f32,
    /// Fixed timestep (seconds).
    #[serde(default = "default_timestep")]
    pub timestep: f32,
    /// Smoothing radius, also the hash cell size.
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    /// Gravitational acceleration.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    /// Repulsion per unit penetration depth for collider contacts.
    #[serde(default = "default_collider_stiffness")]
    pub collider_stiffness: f32,
    /// Maximum number of sphere colliders accepted per step.
    #[serde(default = "default_max_colliders")]
    pub max_colliders: usize,
    /// Lanes per workgroup.
    #[serde(default = "default_workgroup_size")]
    pub workgroup_size: u32,
    /// Pad the sort buffer to the next power of two instead of rejecting N.
    #[serde(default)]
    pub pad_sort_to_pow2: bool,
    /// Equation of state.
    #[serde(default)]
    pub pressure_model: PressureModel,
    /// Seed of the spawn jitter.
    #[serde(default)]
    pub seed: u64,
}

// Default values
fn default_grid_dims() -> [u32; 3] {
    [16, 16, 16]
}

fn default_particle_radius() -> f32 {
    0.1
}

fn default_spawn_jitter() -> f32 {
    0.2
}

fn default_spawn_center() -> [f32; 3] {
    [-1.6, -1.6, -1.6]
}

fn default_box_size() -> [f32; 3] {
    [15.0, 15.0, 15.0]
}

fn default_particle_mass() -> f32 {
    1.0
}

fn default_gas_constant() -> f32 {
    2.0
}

fn default_resting_density() -> f32 {
    1.0
}

fn default_viscosity() -> f32 {
    0.003
}

fn default_bound_damping() -> f32 {
    -0.3
}

fn default_timestep() -> f32 {
    0.007
}

fn default_smoothing_radius() -> f32 {
    0.25
}

fn default_gravity() -> [f32; 3] {
    [0.0, -9.81, 0.0]
}

fn default_collider_stiffness() -> f32 {
    200.0
}

fn default_max_colliders() -> usize {
    10
}

fn default_workgroup_size() -> u32 {
    256
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            grid_dims: default_grid_dims(),
            particle_radius: default_particle_radius(),
            spawn_jitter: default_spawn_jitter(),
            spawn_center: default_spawn_center(),
            box_size: default_box_size(),
            particle_mass: default_particle_mass(),
            gas_constant: default_gas_constant(),
            resting_density: default_resting_density(),
            viscosity: default_viscosity(),
            bound_damping: default_bound_damping(),
            timestep: default_timestep(),
            smoothing_radius: default_smoothing_radius(),
            gravity: default_gravity(),
            collider_stiffness: default_collider_stiffness(),
            max_colliders: default_max_colliders(),
            workgroup_size: default_workgroup_size(),
            pad_sort_to_pow2: false,
            pressure_model: PressureModel::default(),
            seed: 0,
        }
    }
}

impl FluidParams {
    /// Number of particles N, saturating at `usize::MAX` for grids whose
    /// product overflows. [`validate`](Self::validate) rejects those.
    pub fn particle_count(&self) -> usize {
        self.checked_particle_count().unwrap_or(usize::MAX)
    }

    fn checked_particle_count(&self) -> Option<usize> {
        self.grid_dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    /// Length of the hash/sort buffer: N, or N rounded up to a power of two
    /// when padding is enabled.
    pub fn sort_len(&self) -> usize {
        let n = self.particle_count();
        if self.pad_sort_to_pow2 {
            n.next_power_of_two()
        } else {
            n
        }
    }

    /// Half extents of the box.
    pub fn half_extents(&self) -> Vec3 {
        Vec3::from(self.box_size) * 0.5
    }

    /// Gravity as a vector.
    pub fn gravity_vec(&self) -> Vec3 {
        Vec3::from(self.gravity)
    }

    /// Kernel constants derived from the smoothing radius.
    pub fn kernels(&self) -> SmoothingKernels {
        SmoothingKernels::new(self.smoothing_radius)
    }

    /// Check every constraint the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_dims.iter().any(|&d| d == 0) {
            return Err(ConfigError::EmptyGrid(self.grid_dims));
        }
        let n = self
            .checked_particle_count()
            .ok_or(ConfigError::TooManyParticles(usize::MAX))?;
        if n >= u32::MAX as usize / 2 {
            return Err(ConfigError::TooManyParticles(n));
        }

        let wg = self.workgroup_size;
        if wg == 0 || !wg.is_power_of_two() {
            return Err(ConfigError::InvalidWorkgroupSize(wg));
        }
        if n % wg as usize != 0 {
            return Err(ConfigError::NotWorkgroupMultiple {
                count: n,
                workgroup_size: wg,
            });
        }
        if !n.is_power_of_two() && !self.pad_sort_to_pow2 {
            return Err(ConfigError::NotPowerOfTwo(n));
        }

        if !(self.smoothing_radius.is_finite() && self.smoothing_radius > 0.0) {
            return Err(ConfigError::NonPositiveSmoothingRadius(self.smoothing_radius));
        }
        if self.max_colliders == 0 {
            return Err(ConfigError::ZeroColliderCapacity);
        }

        for (name, value) in [
            ("particle_radius", self.particle_radius),
            ("particle_mass", self.particle_mass),
            ("resting_density", self.resting_density),
            ("timestep", self.timestep),
            ("box_size.x", self.box_size[0]),
            ("box_size.y", self.box_size[1]),
            ("box_size.z", self.box_size[2]),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(name));
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        for (name, value) in [
            ("spawn_jitter", self.spawn_jitter),
            ("gas_constant", self.gas_constant),
            ("viscosity", self.viscosity),
            ("collider_stiffness", self.collider_stiffness),
            ("near_pressure_multiplier", self.pressure_model.near_multiplier()),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(name));
            }
            if value < 0.0 {
                return Err(ConfigError::Negative { name, value });
            }
        }

        if !self.gravity.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::NonFinite("gravity"));
        }
        if !self.spawn_center.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::NonFinite("spawn_center"));
        }
        if !(-1.0..=0.0).contains(&self.bound_damping) {
            return Err(ConfigError::BoundDampingOutOfRange(self.bound_damping));
        }

        Ok(())
    }

    /// Reject a runtime update that would change buffer layout.
    pub(crate) fn check_same_layout(&self, next: &FluidParams) -> Result<(), ConfigError> {
        let pairs = [
            ("particle count", self.particle_count() as u64, next.particle_count() as u64),
            ("sort length", self.sort_len() as u64, next.sort_len() as u64),
            ("workgroup_size", self.workgroup_size as u64, next.workgroup_size as u64),
        ];
        for (name, old, new) in pairs {
            if old != new {
                return Err(ConfigError::LayoutChanged { name, old, new });
            }
        }
        Ok(())
    }
}
