//! Execution backends: the seam between the pipeline and the hardware it runs on.
//!
//! A backend owns the particle buffers and the step-scoped derived buffers
//! (hash entries, offset table). The [`Simulation`](crate::Simulation) drives
//! it with one [`ComputeBackend::dispatch`] per stage; every dispatch finishes
//! all of its lanes before returning, which is the barrier between stages.

use crate::collider::ColliderSet;
use crate::error::BackendError;
use crate::hash::HashEntry;
use crate::params::FluidParams;
use crate::particle::ParticleStore;
use crate::smoothing::SmoothingKernels;
use crate::sort::bitonic_passes;

/// A named kernel of the step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    /// Write one `(hash, id)` entry per sort lane.
    HashParticles,
    /// One pass of the bitonic network.
    BitonicSort {
        /// Merge width
        dim: u32,
        /// Compare distance
        block: u32,
    },
    /// Reset the offset table to the empty sentinel.
    ClearOffsets,
    /// Record the first sorted position of every occupied hash.
    CellOffsets,
    /// Density and pressure per particle.
    DensityPressure,
    /// Net force per particle.
    ComputeForces,
    /// Velocity/position update and wall handling.
    Integrate,
}

impl KernelId {
    /// Short name used in logs and GPU labels.
    pub fn name(&self) -> &'static str {
        match self {
            KernelId::HashParticles => "hash_particles",
            KernelId::BitonicSort { .. } => "bitonic_sort",
            KernelId::ClearOffsets => "clear_offsets",
            KernelId::CellOffsets => "cell_offsets",
            KernelId::DensityPressure => "density_pressure",
            KernelId::ComputeForces => "compute_forces",
            KernelId::Integrate => "integrate",
        }
    }

    /// Number of lanes the kernel covers: sort lanes or particle lanes.
    pub fn lane_count(&self, params: &FluidParams) -> usize {
        match self {
            KernelId::HashParticles | KernelId::BitonicSort { .. } | KernelId::CellOffsets => params.sort_len(),
            KernelId::ClearOffsets
            | KernelId::DensityPressure
            | KernelId::ComputeForces
            | KernelId::Integrate => params.particle_count(),
        }
    }
}

/// One entry of a step's dispatch plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Kernel to run
    pub kernel: KernelId,
    /// Workgroups to launch
    pub group_count: u32,
}

/// Ordered dispatches of a full step.
///
/// Hash, every sort pass, clear, offsets, density, forces, integrate.
pub fn step_plan(params: &FluidParams) -> Vec<Dispatch> {
    let mut plan = spatial_plan(params);
    for kernel in [KernelId::DensityPressure, KernelId::ComputeForces, KernelId::Integrate] {
        plan.push(Dispatch {
            kernel,
            group_count: group_count(kernel, params),
        });
    }
    plan
}

/// The dispatches that rebuild the neighbor structure only.
pub fn spatial_plan(params: &FluidParams) -> Vec<Dispatch> {
    let mut kernels = vec![KernelId::HashParticles];
    kernels.extend(
        bitonic_passes(params.sort_len())
            .into_iter()
            .map(|(dim, block)| KernelId::BitonicSort { dim, block }),
    );
    kernels.push(KernelId::ClearOffsets);
    kernels.push(KernelId::CellOffsets);
    kernels
        .into_iter()
        .map(|kernel| Dispatch {
            kernel,
            group_count: group_count(kernel, params),
        })
        .collect()
}

/// Workgroups needed to cover every lane of `kernel`.
pub fn group_count(kernel: KernelId, params: &FluidParams) -> u32 {
    let wg = params.workgroup_size as usize;
    kernel.lane_count(params).div_ceil(wg) as u32
}

/// A parallel executor of the pipeline's kernels.
pub trait ComputeBackend: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Set parameters and kernel constants.
    ///
    /// The first call allocates buffers sized for `params`. Later calls with
    /// the same particle count keep buffer contents.
    fn configure(&mut self, params: &FluidParams, kernels: &SmoothingKernels) -> Result<(), BackendError>;

    /// Replace the particle buffers.
    fn upload_particles(&mut self, particles: &ParticleStore) -> Result<(), BackendError>;

    /// Replace the collider buffer.
    fn upload_colliders(&mut self, colliders: &ColliderSet) -> Result<(), BackendError>;

    /// Run `kernel` over `group_count · workgroup_size` lanes and wait for it.
    fn dispatch(&mut self, kernel: KernelId, group_count: u32) -> Result<(), BackendError>;

    /// Copy the particle buffers into `out`.
    fn download_particles(&mut self, out: &mut ParticleStore) -> Result<(), BackendError>;

    /// Copy the sort buffer.
    fn download_sorted_entries(&mut self) -> Result<Vec<HashEntry>, BackendError>;

    /// Copy the offset table.
    fn download_offsets(&mut self) -> Result<Vec<u32>, BackendError>;

    /// Number of particles whose force was non-finite since the last call; resets it.
    fn take_unstable_count(&mut self) -> Result<u32, BackendError>;

    /// Free every buffer. The backend must be configured again before reuse.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dims: [u32; 3], wg: u32) -> FluidParams {
        FluidParams {
            grid_dims: dims,
            workgroup_size: wg,
            ..Default::default()
        }
    }

    #[test]
    fn plan_orders_stages() {
        let p = params([4, 4, 4], 16);
        let plan = step_plan(&p);
        assert_eq!(plan[0].kernel, KernelId::HashParticles);
        // 64 entries: 6·7/2 sort passes
        let sorts = plan
            .iter()
            .filter(|d| matches!(d.kernel, KernelId::BitonicSort { .. }))
            .count();
        assert_eq!(sorts, 21);
        let tail: Vec<KernelId> = plan[plan.len() - 5..].iter().map(|d| d.kernel).collect();
        assert_eq!(
            tail,
            vec![
                KernelId::ClearOffsets,
                KernelId::CellOffsets,
                KernelId::DensityPressure,
                KernelId::ComputeForces,
                KernelId::Integrate,
            ]
        );
        assert!(plan.iter().all(|d| d.group_count == 4));
    }

    #[test]
    fn padded_sort_uses_more_groups() {
        let mut p = params([3, 4, 8], 32);
        p.pad_sort_to_pow2 = true;
        assert_eq!(group_count(KernelId::HashParticles, &p), 4);
        assert_eq!(group_count(KernelId::CellOffsets, &p), 4);
        assert_eq!(group_count(KernelId::DensityPressure, &p), 3);
        assert_eq!(group_count(KernelId::ClearOffsets, &p), 3);
    }

    #[test]
    fn spatial_plan_is_prefix_of_step_plan() {
        let p = params([2, 2, 2], 8);
        let spatial = spatial_plan(&p);
        let full = step_plan(&p);
        assert_eq!(&full[..spatial.len()], spatial.as_slice());
        assert_eq!(full.len(), spatial.len() + 3);
    }
}
