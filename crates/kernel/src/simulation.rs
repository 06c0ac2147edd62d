//! The simulation object: owns a backend, runs the per-step dispatch plan and
//! manages the initialize/step/dispose lifecycle.

use tracing::{debug, info, warn};

use crate::backend::{spatial_plan, step_plan, ComputeBackend};
use crate::collider::{ColliderSet, ColliderSnapshot};
use crate::cpu::CpuBackend;
use crate::error::{ConfigError, SimError};
use crate::neighbor::NeighborTable;
use crate::params::FluidParams;
use crate::particle::ParticleStore;
use crate::smoothing::SmoothingKernels;
use crate::spawn::spawn_lattice;

/// Summary of one completed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Steps completed so far, this one included.
    pub step: u64,
    /// Simulation time after the step.
    pub sim_time: f64,
    /// Particles whose force was non-finite and was replaced by zero.
    pub unstable_particles: u32,
    /// Sphere colliders beyond capacity that were ignored.
    pub colliders_dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Disposed,
}

/// One SPH simulation instance.
///
/// Independent instances share nothing, so several may run side by side.
pub struct Simulation {
    params: FluidParams,
    kernels: SmoothingKernels,
    backend: Box<dyn ComputeBackend>,
    colliders: ColliderSet,
    /// Host copy of the particle buffers, refreshed lazily.
    snapshot: ParticleStore,
    snapshot_stale: bool,
    step_count: u64,
    sim_time: f64,
    lifecycle: Lifecycle,
}

impl Simulation {
    /// Validate `params` and configure `backend` for them. Buffers are
    /// allocated but hold no particles until [`initialize`](Self::initialize).
    pub fn new(params: FluidParams, mut backend: Box<dyn ComputeBackend>) -> Result<Self, SimError> {
        params.validate()?;
        let kernels = params.kernels();
        backend.configure(&params, &kernels)?;
        info!(
            backend = backend.name(),
            particles = params.particle_count(),
            sort_len = params.sort_len(),
            "simulation created"
        );
        Ok(Self {
            colliders: ColliderSet::with_capacity(params.max_colliders),
            snapshot: ParticleStore::zeroed(params.particle_count()),
            snapshot_stale: false,
            kernels,
            backend,
            params,
            step_count: 0,
            sim_time: 0.0,
            lifecycle: Lifecycle::Created,
        })
    }

    /// Simulation on the thread-pool backend.
    pub fn cpu(params: FluidParams) -> Result<Self, SimError> {
        Self::new(params, Box::new(CpuBackend::new()))
    }

    fn ensure_alive(&self) -> Result<(), SimError> {
        if self.lifecycle == Lifecycle::Disposed {
            return Err(SimError::Disposed);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), SimError> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created => Err(SimError::NotInitialized),
            Lifecycle::Disposed => Err(SimError::Disposed),
        }
    }

    /// Spawn the jittered lattice from `params.seed` and upload it. Resets
    /// step count and time; may be called again to restart.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.ensure_alive()?;
        let store = spawn_lattice(&self.params, self.params.seed);
        self.load(store)
    }

    /// Start from caller-supplied particles instead of the spawn lattice.
    pub fn initialize_with(&mut self, particles: ParticleStore) -> Result<(), SimError> {
        self.ensure_alive()?;
        let expected = self.params.particle_count();
        if particles.len() != expected {
            return Err(ConfigError::ParticleCountMismatch {
                expected,
                actual: particles.len(),
            }
            .into());
        }
        self.load(particles)
    }

    fn load(&mut self, store: ParticleStore) -> Result<(), SimError> {
        self.backend.upload_particles(&store)?;
        self.colliders.replace(&ColliderSnapshot::default());
        self.backend.upload_colliders(&self.colliders)?;
        // Discard any count left over from a previous run
        self.backend.take_unstable_count()?;
        self.snapshot = store;
        self.snapshot_stale = false;
        self.step_count = 0;
        self.sim_time = 0.0;
        self.lifecycle = Lifecycle::Ready;
        debug!(particles = self.snapshot.len(), "particles uploaded");
        Ok(())
    }

    /// Advance one fixed timestep with the given collider set.
    ///
    /// On error the step counter and simulation time are unchanged.
    pub fn step(&mut self, colliders: &ColliderSnapshot) -> Result<StepReport, SimError> {
        self.ensure_ready()?;

        let dropped = self.colliders.replace(colliders);
        if dropped > 0 {
            warn!(
                dropped,
                capacity = self.colliders.capacity(),
                "collider set exceeds capacity, ignoring the rest"
            );
        }
        self.backend.upload_colliders(&self.colliders)?;

        for d in step_plan(&self.params) {
            self.backend.dispatch(d.kernel, d.group_count)?;
        }
        self.snapshot_stale = true;

        let unstable = self.backend.take_unstable_count()?;
        if unstable > 0 {
            warn!(step = self.step_count + 1, unstable, "non-finite forces zeroed");
        }

        self.step_count += 1;
        self.sim_time += f64::from(self.params.timestep);
        Ok(StepReport {
            step: self.step_count,
            sim_time: self.sim_time,
            unstable_particles: unstable,
            colliders_dropped: dropped,
        })
    }

    /// Run `n` steps with a fixed collider set; returns the last report.
    pub fn run(&mut self, n: u64, colliders: &ColliderSnapshot) -> Result<Option<StepReport>, SimError> {
        let mut last = None;
        for _ in 0..n {
            last = Some(self.step(colliders)?);
        }
        Ok(last)
    }

    /// Current particle state, downloaded from the backend if a step ran
    /// since the last read.
    pub fn particles(&mut self) -> Result<&ParticleStore, SimError> {
        self.ensure_ready()?;
        if self.snapshot_stale {
            self.backend.download_particles(&mut self.snapshot)?;
            self.snapshot_stale = false;
        }
        Ok(&self.snapshot)
    }

    /// Swap runtime parameters between steps.
    ///
    /// Buffer-shaping parameters (grid dimensions, workgroup size, sort
    /// padding) must match the current ones. Particle state carries over,
    /// including across a change of collider capacity.
    pub fn update_params(&mut self, params: FluidParams) -> Result<(), SimError> {
        self.ensure_alive()?;
        params.validate()?;
        self.params.check_same_layout(&params)?;
        let kernels = params.kernels();
        self.backend.configure(&params, &kernels)?;
        self.colliders.set_capacity(params.max_colliders);
        if self.lifecycle == Lifecycle::Ready {
            self.backend.upload_colliders(&self.colliders)?;
        }
        self.kernels = kernels;
        self.params = params;
        debug!("parameters updated");
        Ok(())
    }

    /// Rebuild the spatial structure for the current positions and download it.
    ///
    /// Leaves particle state untouched; intended for inspection and tests.
    pub fn build_neighbor_table(&mut self) -> Result<NeighborTable, SimError> {
        self.ensure_ready()?;
        for d in spatial_plan(&self.params) {
            self.backend.dispatch(d.kernel, d.group_count)?;
        }
        Ok(NeighborTable {
            sorted: self.backend.download_sorted_entries()?,
            offsets: self.backend.download_offsets()?,
            cell_size: self.kernels.radius,
        })
    }

    /// Release backend buffers. Every later call fails with
    /// [`SimError::Disposed`]; disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.backend.release();
        self.snapshot = ParticleStore::new();
        self.lifecycle = Lifecycle::Disposed;
        info!(steps = self.step_count, "simulation disposed");
    }

    /// Active parameters.
    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Kernel constants for the active smoothing radius.
    pub fn kernels(&self) -> &SmoothingKernels {
        &self.kernels
    }

    /// Steps completed since initialization.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulation time since initialization.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.dispose();
    }
}
