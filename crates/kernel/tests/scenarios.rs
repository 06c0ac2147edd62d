//! End-to-end single- and two-particle scenarios with known outcomes.

mod common;

use common::small_params;
use fluid_kernel::{ColliderSnapshot, FluidParams, ParticleStore, Simulation, SphereCollider};
use glam::Vec3;

fn single(params: FluidParams, at: Vec3, velocity: Vec3) -> Simulation {
    let mut sim = Simulation::cpu(params).unwrap();
    let mut store = ParticleStore::from_positions(vec![at]);
    store.velocity[0] = velocity;
    sim.initialize_with(store).unwrap();
    sim
}

fn one_particle() -> FluidParams {
    let mut p = small_params([1, 1, 1], 1);
    p.timestep = 0.01;
    p.gravity = [0.0, -9.8, 0.0];
    p
}

#[test]
fn free_fall_single_step() {
    let mut sim = single(one_particle(), Vec3::ZERO, Vec3::ZERO);
    sim.step(&ColliderSnapshot::default()).unwrap();
    let p = sim.particles().unwrap();
    assert!((p.velocity[0].y + 0.098).abs() < 1e-6, "vy = {}", p.velocity[0].y);
    assert!((p.position[0].y + 0.00098).abs() < 1e-7, "y = {}", p.position[0].y);
    assert_eq!(p.position[0].x, 0.0);
    assert_eq!(p.position[0].z, 0.0);
}

#[test]
fn floor_bounce_reverses_and_damps() {
    let mut params = one_particle();
    params.box_size = [2.0, 2.0, 2.0];
    params.bound_damping = -0.5;
    let mut sim = single(params, Vec3::new(0.0, -0.995, 0.0), Vec3::new(0.0, -1.0, 0.0));
    sim.step(&ColliderSnapshot::default()).unwrap();
    let p = sim.particles().unwrap();
    // v = -1 - 0.098 before the wall, then scaled by -0.5
    assert!((p.velocity[0].y - 0.549).abs() < 1e-5);
    assert!(p.position[0].y > -1.0 && p.position[0].y < -0.999);
}

#[test]
fn particles_stay_in_box() {
    let mut params = small_params([4, 4, 4], 16);
    params.box_size = [1.0, 1.0, 1.0];
    params.spawn_center = [-0.35, -0.35, -0.35];
    let mut sim = Simulation::cpu(params).unwrap();
    sim.initialize().unwrap();
    sim.run(200, &ColliderSnapshot::default()).unwrap();
    let p = sim.particles().unwrap();
    assert!(!p.has_non_finite());
    for x in &p.position {
        assert!(x.abs().max_element() <= 0.5, "escaped: {x}");
    }
}

#[test]
fn coincident_pair_is_pushed_apart_symmetrically() {
    let mut params = small_params([2, 1, 1], 2);
    params.gravity = [0.0; 3];
    let mut sim = Simulation::cpu(params).unwrap();
    sim.initialize_with(ParticleStore::from_positions(vec![Vec3::splat(0.3); 2]))
        .unwrap();
    let report = sim.step(&ColliderSnapshot::default()).unwrap();
    assert_eq!(report.unstable_particles, 0);

    let p = sim.particles().unwrap();
    for k in 0..2 {
        assert!(p.density[k] > 0.0, "density {k}: {}", p.density[k]);
        assert!(p.pressure[k].is_finite(), "pressure {k}: {}", p.pressure[k]);
    }
    assert_eq!(p.force[0], -p.force[1]);
    assert!(p.force[0].x < 0.0);
    assert_eq!(p.force[0].y, 0.0);
    assert!(p.position[0].x < p.position[1].x);
    assert!(!p.has_non_finite());
}

#[test]
fn sphere_pushes_particle_outward() {
    let mut params = one_particle();
    params.gravity = [0.0; 3];
    params.timestep = 0.007;
    let sphere = ColliderSnapshot {
        spheres: vec![SphereCollider { center: Vec3::ZERO, radius: 1.0 }],
        capsule: None,
    };
    let mut sim = single(params, Vec3::new(0.0, 0.95, 0.0), Vec3::ZERO);

    let mut last = 0.95;
    for _ in 0..30 {
        sim.step(&sphere).unwrap();
        let d = sim.particles().unwrap().position[0].length();
        assert!(d >= last, "moved inward: {d} < {last}");
        last = d;
    }
    assert!(last > 0.95);
}

#[test]
fn default_lattice_stays_finite() {
    let mut sim = Simulation::cpu(small_params([8, 8, 8], 64)).unwrap();
    sim.initialize().unwrap();
    let mut unstable = 0;
    for _ in 0..100 {
        unstable += sim.step(&ColliderSnapshot::default()).unwrap().unstable_particles;
    }
    assert_eq!(unstable, 0);
    assert!(!sim.particles().unwrap().has_non_finite());
    assert!((sim.sim_time() - 0.7).abs() < 1e-6);
}

#[test]
fn particle_on_face_moving_out_is_reflected() {
    let mut params = one_particle();
    params.gravity = [0.0; 3];
    params.box_size = [2.0, 2.0, 2.0];
    params.bound_damping = -0.3;
    let mut sim = single(params, Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
    sim.step(&ColliderSnapshot::default()).unwrap();
    let p = sim.particles().unwrap();
    assert!((p.velocity[0].x + 0.6).abs() < 1e-6);
    assert!(p.position[0].x < 1.0);
}
