//! Thread-pool backend: every kernel is a rayon parallel-for over workgroup
//! chunks of its output slots.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use crate::backend::{ComputeBackend, KernelId};
use crate::collider::ColliderSet;
use crate::density::density_lane;
use crate::error::BackendError;
use crate::force::{force_lane, ForceInputs};
use crate::hash::{hash_lane, HashEntry};
use crate::integrate::integrate_lane;
use crate::neighbor::CellLookup;
use crate::offsets::{offset_lane, EMPTY_CELL};
use crate::params::FluidParams;
use crate::particle::ParticleStore;
use crate::smoothing::SmoothingKernels;
use crate::sort::bitonic_lane;

/// Reference CPU implementation of [`ComputeBackend`].
///
/// A dispatch of `g` groups runs lanes `0..g·workgroup_size` (clamped to the
/// buffer length) on the global rayon pool and returns once all finished.
pub struct CpuBackend {
    params: FluidParams,
    kernels: SmoothingKernels,
    particles: ParticleStore,
    /// Sort buffer; the current network state after each pass.
    entries: Vec<HashEntry>,
    /// Second sort buffer written by each pass, then swapped in.
    scratch: Vec<HashEntry>,
    offsets: Vec<AtomicU32>,
    colliders: ColliderSet,
    unstable: u32,
    configured: bool,
}

impl CpuBackend {
    /// Create an unconfigured backend.
    pub fn new() -> Self {
        let params = FluidParams::default();
        Self {
            kernels: params.kernels(),
            colliders: ColliderSet::with_capacity(params.max_colliders),
            params,
            particles: ParticleStore::new(),
            entries: Vec::new(),
            scratch: Vec::new(),
            offsets: Vec::new(),
            unstable: 0,
            configured: false,
        }
    }

    fn workgroup(&self) -> usize {
        self.params.workgroup_size as usize
    }

    fn run_hash(&mut self, groups: usize) {
        let wg = self.workgroup();
        let positions = &self.particles.position;
        let cell_size = self.kernels.radius;
        self.entries
            .par_chunks_mut(wg)
            .take(groups)
            .enumerate()
            .for_each(|(g, chunk)| {
                for (k, out) in chunk.iter_mut().enumerate() {
                    *out = hash_lane(g * wg + k, positions, cell_size);
                }
            });
    }

    fn run_bitonic(&mut self, dim: u32, block: u32, groups: usize) {
        let wg = self.workgroup();
        let covered = groups * wg;
        let src = &self.entries;
        self.scratch
            .par_chunks_mut(wg)
            .enumerate()
            .for_each(|(g, chunk)| {
                for (k, out) in chunk.iter_mut().enumerate() {
                    let lane = g * wg + k;
                    *out = if lane < covered {
                        bitonic_lane(src, lane, dim as usize, block as usize)
                    } else {
                        src[lane]
                    };
                }
            });
        std::mem::swap(&mut self.entries, &mut self.scratch);
    }

    fn run_clear_offsets(&mut self, groups: usize) {
        let wg = self.workgroup();
        self.offsets.par_chunks(wg).take(groups).for_each(|chunk| {
            for slot in chunk {
                slot.store(EMPTY_CELL, Ordering::Relaxed);
            }
        });
    }

    fn run_cell_offsets(&mut self, groups: usize) {
        let wg = self.workgroup();
        let sorted = &self.entries;
        let offsets = &self.offsets;
        (0..groups).into_par_iter().for_each(|g| {
            let end = ((g + 1) * wg).min(sorted.len());
            for lane in g * wg..end {
                if let Some((hash, start)) = offset_lane(sorted, lane) {
                    // Each occupied hash has exactly one run start, so each slot has one writer.
                    offsets[hash as usize].store(start, Ordering::Relaxed);
                }
            }
        });
    }

    fn run_density(&mut self, groups: usize) {
        let wg = self.workgroup();
        let params = &self.params;
        let kernels = &self.kernels;
        let lookup = CellLookup::new(&self.entries, self.offsets.as_slice(), kernels.radius, params.particle_count() as u32);
        let ParticleStore {
            position,
            density,
            pressure,
            near_density,
            ..
        } = &mut self.particles;
        let positions: &[Vec3] = position;

        density
            .par_chunks_mut(wg)
            .zip(pressure.par_chunks_mut(wg))
            .zip(near_density.par_chunks_mut(wg))
            .take(groups)
            .enumerate()
            .for_each(|(g, ((rho, p), near))| {
                for k in 0..rho.len() {
                    let s = density_lane(g * wg + k, positions, &lookup, kernels, params);
                    rho[k] = s.density;
                    p[k] = s.pressure;
                    near[k] = s.near_density;
                }
            });
    }

    fn run_forces(&mut self, groups: usize) {
        let wg = self.workgroup();
        let params = &self.params;
        let kernels = &self.kernels;
        let colliders = &self.colliders;
        let lookup = CellLookup::new(&self.entries, self.offsets.as_slice(), kernels.radius, params.particle_count() as u32);
        let ParticleStore {
            position,
            velocity,
            force,
            density,
            pressure,
            near_density,
        } = &mut self.particles;
        let fields = ForceInputs {
            position,
            velocity,
            density,
            pressure,
            near_density,
        };
        let unstable = AtomicU32::new(0);

        force
            .par_chunks_mut(wg)
            .take(groups)
            .enumerate()
            .for_each(|(g, chunk)| {
                for (k, out) in chunk.iter_mut().enumerate() {
                    let s = force_lane(g * wg + k, &fields, &lookup, kernels, params, colliders);
                    if s.unstable {
                        unstable.fetch_add(1, Ordering::Relaxed);
                    }
                    *out = s.force;
                }
            });

        self.unstable += unstable.into_inner();
    }

    fn run_integrate(&mut self, groups: usize) {
        let wg = self.workgroup();
        let params = &self.params;
        let ParticleStore {
            position,
            velocity,
            force,
            ..
        } = &mut self.particles;

        position
            .par_chunks_mut(wg)
            .zip(velocity.par_chunks_mut(wg))
            .zip(force.par_chunks(wg))
            .take(groups)
            .for_each(|((x, v), f)| {
                for k in 0..x.len() {
                    integrate_lane(&mut x[k], &mut v[k], f[k], params);
                }
            });
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn configure(&mut self, params: &FluidParams, kernels: &SmoothingKernels) -> Result<(), BackendError> {
        let n = params.particle_count();
        let sort_len = params.sort_len();
        if !self.configured || self.particles.len() != n {
            self.particles = ParticleStore::zeroed(n);
        }
        if self.entries.len() != sort_len {
            self.entries = (0..sort_len as u32).map(HashEntry::padding).collect();
            self.scratch = self.entries.clone();
        }
        if self.offsets.len() != n {
            self.offsets = (0..n).map(|_| AtomicU32::new(EMPTY_CELL)).collect();
        }
        self.colliders.set_capacity(params.max_colliders);
        self.params = params.clone();
        self.kernels = *kernels;
        self.configured = true;
        Ok(())
    }

    fn upload_particles(&mut self, particles: &ParticleStore) -> Result<(), BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        if particles.len() != self.particles.len() {
            return Err(BackendError::SizeMismatch {
                buffer: "particles",
                expected: self.particles.len(),
                actual: particles.len(),
            });
        }
        self.particles.clone_from(particles);
        Ok(())
    }

    fn upload_colliders(&mut self, colliders: &ColliderSet) -> Result<(), BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        self.colliders.clone_from(colliders);
        self.colliders.set_capacity(self.params.max_colliders);
        Ok(())
    }

    fn dispatch(&mut self, kernel: KernelId, group_count: u32) -> Result<(), BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        let groups = group_count as usize;
        match kernel {
            KernelId::HashParticles => self.run_hash(groups),
            KernelId::BitonicSort { dim, block } => self.run_bitonic(dim, block, groups),
            KernelId::ClearOffsets => self.run_clear_offsets(groups),
            KernelId::CellOffsets => self.run_cell_offsets(groups),
            KernelId::DensityPressure => self.run_density(groups),
            KernelId::ComputeForces => self.run_forces(groups),
            KernelId::Integrate => self.run_integrate(groups),
        }
        Ok(())
    }

    fn download_particles(&mut self, out: &mut ParticleStore) -> Result<(), BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        out.clone_from(&self.particles);
        Ok(())
    }

    fn download_sorted_entries(&mut self) -> Result<Vec<HashEntry>, BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        Ok(self.entries.clone())
    }

    fn download_offsets(&mut self) -> Result<Vec<u32>, BackendError> {
        if !self.configured {
            return Err(BackendError::NotConfigured);
        }
        Ok(self.offsets.iter().map(|o| o.load(Ordering::Relaxed)).collect())
    }

    fn take_unstable_count(&mut self) -> Result<u32, BackendError> {
        Ok(std::mem::take(&mut self.unstable))
    }

    fn release(&mut self) {
        self.particles = ParticleStore::new();
        self.entries = Vec::new();
        self.scratch = Vec::new();
        self.offsets = Vec::new();
        self.configured = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::spatial_plan;
    use crate::offsets::build_offsets;

    fn params() -> FluidParams {
        FluidParams {
            grid_dims: [4, 4, 4],
            workgroup_size: 16,
            smoothing_radius: 0.5,
            ..Default::default()
        }
    }

    fn configured(params: &FluidParams) -> CpuBackend {
        let mut b = CpuBackend::new();
        b.configure(params, &params.kernels()).unwrap();
        b
    }

    fn scattered(n: usize) -> ParticleStore {
        ParticleStore::from_positions(
            (0..n)
                .map(|i| {
                    let f = i as f32;
                    Vec3::new((f * 0.37).sin() * 2.0, (f * 0.11).cos() * 2.0, (f * 0.73).sin())
                })
                .collect(),
        )
    }

    #[test]
    fn dispatch_before_configure_fails() {
        let mut b = CpuBackend::new();
        assert!(matches!(
            b.dispatch(KernelId::HashParticles, 1),
            Err(BackendError::NotConfigured)
        ));
    }

    #[test]
    fn upload_size_checked() {
        let p = params();
        let mut b = configured(&p);
        let err = b.upload_particles(&ParticleStore::zeroed(3)).unwrap_err();
        assert!(matches!(err, BackendError::SizeMismatch { expected: 64, actual: 3, .. }));
    }

    #[test]
    fn spatial_dispatches_match_host_build() {
        let p = params();
        let mut b = configured(&p);
        let store = scattered(64);
        b.upload_particles(&store).unwrap();
        for d in spatial_plan(&p) {
            b.dispatch(d.kernel, d.group_count).unwrap();
        }
        let sorted = b.download_sorted_entries().unwrap();
        let mut expected: Vec<HashEntry> = (0..64).map(|i| hash_lane(i, &store.position, 0.5)).collect();
        expected.sort();
        assert_eq!(sorted, expected);
        assert_eq!(b.download_offsets().unwrap(), build_offsets(&expected, 64));
    }

    #[test]
    fn partial_dispatch_leaves_rest_untouched() {
        let p = params();
        let mut b = configured(&p);
        b.upload_particles(&ParticleStore::zeroed(64)).unwrap();
        // One group of 16 lanes
        b.dispatch(KernelId::HashParticles, 1).unwrap();
        let entries = b.download_sorted_entries().unwrap();
        assert!(entries[..16].iter().all(|e| !e.is_padding()));
        assert!(entries[16..].iter().all(|e| e.is_padding()));
    }

    #[test]
    fn release_requires_reconfigure() {
        let p = params();
        let mut b = configured(&p);
        b.release();
        assert!(b.download_offsets().is_err());
        b.configure(&p, &p.kernels()).unwrap();
        assert_eq!(b.download_offsets().unwrap().len(), 64);
    }
}
