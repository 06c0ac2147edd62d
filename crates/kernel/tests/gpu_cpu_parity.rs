//! GPU vs CPU parity.
//!
//! Runs the same spawn lattice on both backends and compares the spatial
//! structure exactly and particle state within float tolerance.
//!
//! Gated behind `#[cfg(feature = "gpu")]`; skips when no adapter is present.

#![cfg(feature = "gpu")]

mod common;

use common::{close, small_params};
use fluid_kernel::{gpu_available, ColliderSnapshot, GpuBackend, Simulation, SphereCollider};
use glam::Vec3;

fn pair() -> Option<(Simulation, Simulation)> {
    if !gpu_available() {
        eprintln!("no GPU adapter, skipping");
        return None;
    }
    let params = small_params([8, 8, 8], 64);
    let gpu = Simulation::new(params.clone(), Box::new(GpuBackend::new().ok()?)).ok()?;
    let cpu = Simulation::cpu(params).ok()?;
    Some((cpu, gpu))
}

#[test]
fn spatial_structure_is_identical() {
    let Some((mut cpu, mut gpu)) = pair() else { return };
    cpu.initialize().unwrap();
    gpu.initialize().unwrap();
    assert_eq!(cpu.build_neighbor_table().unwrap(), gpu.build_neighbor_table().unwrap());
}

#[test]
fn one_step_matches() {
    let Some((mut cpu, mut gpu)) = pair() else { return };
    cpu.initialize().unwrap();
    gpu.initialize().unwrap();
    let colliders = ColliderSnapshot {
        spheres: vec![SphereCollider { center: Vec3::new(-1.0, -1.2, -1.0), radius: 0.3 }],
        capsule: None,
    };
    cpu.step(&colliders).unwrap();
    gpu.step(&colliders).unwrap();

    let a = cpu.particles().unwrap().clone();
    let b = gpu.particles().unwrap();
    for i in 0..a.len() {
        assert!(close(a.density[i], b.density[i], 1e-4), "density {i}: {} vs {}", a.density[i], b.density[i]);
        assert!((a.position[i] - b.position[i]).length() < 1e-4, "position {i}");
        assert!((a.velocity[i] - b.velocity[i]).length() < 1e-3, "velocity {i}");
    }
}

#[test]
fn short_run_stays_close() {
    let Some((mut cpu, mut gpu)) = pair() else { return };
    cpu.initialize().unwrap();
    gpu.initialize().unwrap();
    cpu.run(10, &ColliderSnapshot::default()).unwrap();
    gpu.run(10, &ColliderSnapshot::default()).unwrap();

    let a = cpu.particles().unwrap().clone();
    let b = gpu.particles().unwrap();
    let max_err = a
        .position
        .iter()
        .zip(&b.position)
        .map(|(p, q)| (*p - *q).length())
        .fold(0.0f32, f32::max);
    assert!(max_err < 1e-2, "max position error {max_err}");
}

#[test]
fn collider_capacity_change_mid_run_matches() {
    let Some((mut cpu, mut gpu)) = pair() else { return };
    cpu.initialize().unwrap();
    gpu.initialize().unwrap();
    cpu.run(3, &ColliderSnapshot::default()).unwrap();
    gpu.run(3, &ColliderSnapshot::default()).unwrap();

    let mut params = cpu.params().clone();
    params.max_colliders += 4;
    cpu.update_params(params.clone()).unwrap();
    gpu.update_params(params).unwrap();

    let colliders = ColliderSnapshot {
        spheres: vec![SphereCollider { center: Vec3::new(-1.0, -1.2, -1.0), radius: 0.3 }],
        capsule: None,
    };
    cpu.step(&colliders).unwrap();
    gpu.step(&colliders).unwrap();

    let a = cpu.particles().unwrap().clone();
    let b = gpu.particles().unwrap();
    for i in 0..a.len() {
        assert!((a.position[i] - b.position[i]).length() < 1e-3, "position {i}");
        assert!(close(a.density[i], b.density[i], 1e-3), "density {i}: {} vs {}", a.density[i], b.density[i]);
    }
}
