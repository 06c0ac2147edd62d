//! Density summation and equation of state.

use glam::Vec3;

use crate::neighbor::CellLookup;
use crate::offsets::OffsetTable;
use crate::params::{FluidParams, PressureModel};
use crate::smoothing::SmoothingKernels;

/// Output of one density lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensitySample {
    /// Density, at least the resting density
    pub density: f32,
    /// Pressure from the equation of state
    pub pressure: f32,
    /// Near density (target-density model only)
    pub near_density: f32,
}

/// Ideal-gas equation of state: `p = k (ρ - ρ0)`.
///
/// Not clamped; a negative value pulls neighbors together.
#[inline]
pub fn ideal_gas_pressure(density: f32, gas_constant: f32, resting_density: f32) -> f32 {
    gas_constant * (density - resting_density)
}

/// Sum kernel-weighted mass over the neighbors of particle `i` (itself
/// included) and derive its pressure.
pub fn density_lane<O: OffsetTable + ?Sized>(
    i: usize,
    positions: &[Vec3],
    lookup: &CellLookup<'_, O>,
    kernels: &SmoothingKernels,
    params: &FluidParams,
) -> DensitySample {
    let mass = params.particle_mass;
    let track_near = matches!(params.pressure_model, PressureModel::TargetDensity { .. });

    let mut density = 0.0_f32;
    let mut near_density = 0.0_f32;
    lookup.for_each_neighbor(i, positions, kernels.radius, |_, _, dist| {
        density += mass * kernels.density(dist * dist);
        if track_near {
            near_density += mass * kernels.near_density(dist);
        }
    });

    let density = density.max(params.resting_density);
    DensitySample {
        density,
        pressure: ideal_gas_pressure(density, params.gas_constant, params.resting_density),
        near_density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborTable;

    fn params(r: f32) -> FluidParams {
        FluidParams {
            grid_dims: [2, 1, 1],
            workgroup_size: 1,
            smoothing_radius: r,
            resting_density: 0.5,
            gas_constant: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn isolated_particle_gets_self_contribution() {
        let p = params(1.0);
        let k = p.kernels();
        let pos = [Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)];
        let t = NeighborTable::build(&pos, 1.0, 2).unwrap();
        let s = density_lane(0, &pos, &t.lookup(), &k, &p);
        let w0 = k.density(0.0);
        assert!((s.density - w0).abs() < 1e-5);
        assert!((s.pressure - 3.0 * (w0 - 0.5)).abs() < 1e-4);
        assert_eq!(s.near_density, 0.0);
    }

    #[test]
    fn floor_at_resting_density() {
        let mut p = params(1.0);
        p.resting_density = 100.0;
        let k = p.kernels();
        let pos = [Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)];
        let t = NeighborTable::build(&pos, 1.0, 2).unwrap();
        let s = density_lane(0, &pos, &t.lookup(), &k, &p);
        assert_eq!(s.density, 100.0);
        assert_eq!(s.pressure, 0.0);
    }

    #[test]
    fn neighbor_increases_density() {
        let p = params(1.0);
        let k = p.kernels();
        let pos = [Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0)];
        let t = NeighborTable::build(&pos, 1.0, 2).unwrap();
        let s = density_lane(0, &pos, &t.lookup(), &k, &p);
        let expected = k.density(0.0) + k.density(0.25);
        assert!((s.density - expected).abs() < 1e-5);
    }

    #[test]
    fn target_density_tracks_near_density() {
        let mut p = params(1.0);
        p.pressure_model = PressureModel::TargetDensity { near_pressure_multiplier: 1.0 };
        let k = p.kernels();
        let pos = [Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0)];
        let t = NeighborTable::build(&pos, 1.0, 2).unwrap();
        let s = density_lane(1, &pos, &t.lookup(), &k, &p);
        let expected = k.near_density(0.0) + k.near_density(0.5);
        assert!((s.near_density - expected).abs() < 1e-4);
    }
}
