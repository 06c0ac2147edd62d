//! Initial particle placement: a regular lattice with bounded random jitter.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::params::FluidParams;
use crate::particle::ParticleStore;

/// Uniformly distributed point on the unit sphere.
fn on_unit_sphere<R: Rng>(rng: &mut R) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let phi: f32 = rng.gen_range(0.0..TAU);
    let ring = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(ring * phi.cos(), ring * phi.sin(), z)
}

/// Place `nx · ny · nz` particles on a lattice of spacing `2 · particle_radius`
/// starting at `spawn_center`, each offset by a random unit-sphere direction
/// scaled by `particle_radius · spawn_jitter`.
///
/// Ids follow the loop order x, y, z (z varies fastest). The same seed always
/// yields the same store.
pub fn spawn_lattice(params: &FluidParams, seed: u64) -> ParticleStore {
    let [nx, ny, nz] = params.grid_dims;
    let spacing = params.particle_radius * 2.0;
    let jitter = params.particle_radius * params.spawn_jitter;
    let origin = Vec3::from(params.spawn_center);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = ParticleStore::new();
    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                let lattice = Vec3::new(x as f32, y as f32, z as f32) * spacing;
                let offset = on_unit_sphere(&mut rng) * jitter;
                store.push(origin + lattice + offset);
            }
        }
    }

    tracing::debug!(
        "Spawned {} particles on a {}x{}x{} lattice (spacing {:.3})",
        store.len(),
        nx,
        ny,
        nz,
        spacing
    );
    store
}
