//! Brute-force reference computations shared by the integration tests.

#![allow(dead_code)]

use fluid_kernel::{FluidParams, PressureModel, SmoothingKernels};
use glam::Vec3;

/// Every `j` with `|p_i - p_j| <= radius`, self included, in ascending order.
pub fn brute_neighbors(i: usize, positions: &[Vec3], radius: f32) -> Vec<usize> {
    let r2 = radius * radius;
    (0..positions.len())
        .filter(|&j| (positions[i] - positions[j]).length_squared() <= r2)
        .collect()
}

/// Density of every particle by an all-pairs sum, floored at the resting density.
pub fn brute_density(positions: &[Vec3], params: &FluidParams) -> Vec<f32> {
    let k = SmoothingKernels::new(params.smoothing_radius);
    (0..positions.len())
        .map(|i| {
            let rho: f32 = brute_neighbors(i, positions, k.radius)
                .into_iter()
                .map(|j| params.particle_mass * k.density((positions[i] - positions[j]).length_squared()))
                .sum();
            rho.max(params.resting_density)
        })
        .collect()
}

/// Small valid parameter set for `n = dims.0 · dims.1 · dims.2` particles.
pub fn small_params(dims: [u32; 3], workgroup_size: u32) -> FluidParams {
    FluidParams {
        grid_dims: dims,
        workgroup_size,
        pressure_model: PressureModel::IdealGas,
        ..Default::default()
    }
}

/// `|a - b| <= tol · max(|a|, |b|, 1)`.
pub fn close(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0)
}
