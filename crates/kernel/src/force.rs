//! Net force per particle: pressure, viscosity, gravity and collider repulsion.

use glam::Vec3;

use crate::collider::ColliderSet;
use crate::neighbor::CellLookup;
use crate::offsets::OffsetTable;
use crate::params::FluidParams;
use crate::smoothing::SmoothingKernels;

/// Pairs closer than this use a fixed separation axis instead of `Δx / d`.
pub const COINCIDENT_EPS: f32 = 1.0e-6;

/// Read-only particle fields the force stage consumes.
#[derive(Clone, Copy)]
pub struct ForceInputs<'a> {
    /// Positions
    pub position: &'a [Vec3],
    /// Velocities
    pub velocity: &'a [Vec3],
    /// Densities from this step's density pass
    pub density: &'a [f32],
    /// Pressures from this step's density pass
    pub pressure: &'a [f32],
    /// Near densities from this step's density pass
    pub near_density: &'a [f32],
}

/// Output of one force lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSample {
    /// Net force, zero if the computation was unstable
    pub force: Vec3,
    /// The raw sum was NaN or infinite
    pub unstable: bool,
}

/// Unit vector from `j` towards `i`.
///
/// Coincident pairs separate along the X axis, with the sign picked by id so
/// the two particles get opposite directions.
#[inline]
pub fn separation_dir(i: usize, j: usize, delta: Vec3, dist: f32) -> Vec3 {
    if dist > COINCIDENT_EPS {
        delta / dist
    } else if i < j {
        Vec3::NEG_X
    } else {
        Vec3::X
    }
}

/// Accumulate the net force on particle `i`. Overwrites, never adds to, the
/// previous step's value.
pub fn force_lane<O: OffsetTable + ?Sized>(
    i: usize,
    fields: &ForceInputs<'_>,
    lookup: &CellLookup<'_, O>,
    kernels: &SmoothingKernels,
    params: &FluidParams,
    colliders: &ColliderSet,
) -> ForceSample {
    let mass = params.particle_mass;
    let near_mult = params.pressure_model.near_multiplier();
    let p_i = fields.pressure[i];
    let v_i = fields.velocity[i];
    let near_p_i = near_mult * fields.near_density[i];

    let mut pressure_force = Vec3::ZERO;
    let mut viscous_force = Vec3::ZERO;

    lookup.for_each_neighbor(i, fields.position, kernels.radius, |j, delta, dist| {
        if j == i {
            return;
        }
        let dir = separation_dir(i, j, delta, dist);
        let grad = kernels.spiky_gradient(dist);
        let rho_j = fields.density[j];

        // Symmetric pressure term
        let shared = (p_i + fields.pressure[j]) / (2.0 * rho_j);
        pressure_force += dir * (-mass * shared * grad);

        if near_mult > 0.0 {
            let near_rho_j = fields.near_density[j];
            if near_rho_j > 0.0 {
                let near_p_j = near_mult * near_rho_j;
                let near_shared = (near_p_i + near_p_j) / (2.0 * near_rho_j);
                pressure_force += dir * (-mass * near_shared * grad);
            }
        }

        viscous_force += (fields.velocity[j] - v_i) * (params.viscosity * mass / rho_j * kernels.viscosity_laplacian(dist));
    });

    let gravity = params.gravity_vec() * mass;
    let contact = colliders.repulsion(fields.position[i], params.particle_radius, params.collider_stiffness);

    let force = pressure_force + viscous_force + gravity + contact;
    if force.is_finite() {
        ForceSample { force, unstable: false }
    } else {
        ForceSample { force: Vec3::ZERO, unstable: true }
    }
}
