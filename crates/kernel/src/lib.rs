//! Spatial-hash SPH fluid kernel
//!
//! A 3D particle fluid advanced in fixed steps by a data-parallel pipeline:
//! hash every particle into a cell table, bitonic-sort the `(hash, id)`
//! pairs, record where each cell's run starts, then compute density and
//! pressure, net force and integration from 27-cell neighbor scans.
//!
//! # Modules
//! - [`params`] -- `FluidParams`, pressure models, validation.
//! - [`smoothing`] -- kernel functions and their precomputed constants.
//! - [`particle`] / [`spawn`] -- particle storage and the jittered spawn lattice.
//! - [`hash`], [`sort`], [`offsets`], [`neighbor`] -- the spatial acceleration structure.
//! - [`density`], [`force`], [`integrate`], [`collider`] -- per-particle physics lanes.
//! - [`backend`] -- the `ComputeBackend` seam and the per-step dispatch plan.
//! - [`cpu`] -- rayon thread-pool backend; [`gpu`] -- wgpu backend (feature `gpu`).
//! - [`simulation`] -- the `Simulation` lifecycle object.

#![warn(missing_docs)]

pub mod backend;
pub mod collider;
pub mod cpu;
pub mod density;
pub mod error;
pub mod force;
pub mod hash;
pub mod integrate;
pub mod neighbor;
pub mod offsets;
pub mod params;
pub mod particle;
pub mod simulation;
pub mod smoothing;
pub mod sort;
pub mod spawn;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use backend::{step_plan, ComputeBackend, Dispatch, KernelId};
pub use collider::{CapsuleCollider, ColliderSet, ColliderSnapshot, SphereCollider};
pub use cpu::CpuBackend;
pub use error::{BackendError, ConfigError, SimError, SortError};
pub use hash::HashEntry;
pub use neighbor::NeighborTable;
pub use params::{FluidParams, PressureModel};
pub use particle::ParticleStore;
pub use simulation::{Simulation, StepReport};
pub use smoothing::SmoothingKernels;

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, GpuBackend};
