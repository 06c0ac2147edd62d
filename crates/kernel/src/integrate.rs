//! Semi-implicit Euler integration with damped reflection off the box walls.

use glam::Vec3;

use crate::params::FluidParams;

/// Inward offset applied when clamping a particle back onto a wall.
pub const WALL_EPS: f32 = 1.0e-4;

/// Advance one particle by `dt`.
///
/// `v += F / m · dt`, then `x += v · dt`. Per axis, a particle that ends up
/// beyond the half extent is clamped just inside the wall and that velocity
/// component is multiplied by `bound_damping`.
#[inline]
pub fn integrate_lane(position: &mut Vec3, velocity: &mut Vec3, force: Vec3, params: &FluidParams) {
    let dt = params.timestep;
    *velocity += force / params.particle_mass * dt;
    *position += *velocity * dt;

    let half = params.half_extents();
    for axis in 0..3 {
        let limit = half[axis];
        if position[axis] > limit {
            position[axis] = limit - WALL_EPS;
            velocity[axis] *= params.bound_damping;
        } else if position[axis] < -limit {
            position[axis] = -limit + WALL_EPS;
            velocity[axis] *= params.bound_damping;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FluidParams {
        FluidParams {
            grid_dims: [1, 1, 1],
            workgroup_size: 1,
            timestep: 0.01,
            box_size: [2.0, 2.0, 2.0],
            bound_damping: -0.5,
            ..Default::default()
        }
    }

    #[test]
    fn free_fall_step() {
        let p = params();
        let mut x = Vec3::ZERO;
        let mut v = Vec3::ZERO;
        integrate_lane(&mut x, &mut v, Vec3::new(0.0, -9.8, 0.0), &p);
        assert!((v.y + 0.098).abs() < 1e-6);
        assert!((x.y + 0.00098).abs() < 1e-7);
    }

    #[test]
    fn force_scaled_by_mass() {
        let mut p = params();
        p.particle_mass = 4.0;
        let mut x = Vec3::ZERO;
        let mut v = Vec3::ZERO;
        integrate_lane(&mut x, &mut v, Vec3::new(8.0, 0.0, 0.0), &p);
        assert!((v.x - 0.02).abs() < 1e-7);
    }

    #[test]
    fn wall_hit_reflects_and_damps() {
        let p = params();
        let mut x = Vec3::new(1.0, 0.0, 0.0);
        let mut v = Vec3::new(3.0, 0.0, 0.0);
        integrate_lane(&mut x, &mut v, Vec3::ZERO, &p);
        assert_eq!(v.x, -1.5);
        assert!(x.x < 1.0 && x.x > 1.0 - 2.0 * WALL_EPS);
    }

    #[test]
    fn negative_wall() {
        let p = params();
        let mut x = Vec3::new(0.0, 0.0, -0.999);
        let mut v = Vec3::new(0.0, 0.0, -1.0);
        integrate_lane(&mut x, &mut v, Vec3::ZERO, &p);
        assert_eq!(v.z, 0.5);
        assert!(x.z > -1.0);
    }

    #[test]
    fn interior_motion_untouched() {
        let p = params();
        let mut x = Vec3::new(0.2, 0.3, 0.4);
        let mut v = Vec3::new(1.0, -1.0, 0.5);
        integrate_lane(&mut x, &mut v, Vec3::ZERO, &p);
        assert_eq!(v, Vec3::new(1.0, -1.0, 0.5));
        assert!((x - Vec3::new(0.21, 0.29, 0.405)).length() < 1e-6);
    }
}
