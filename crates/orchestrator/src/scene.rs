//! Scene collectors
//!
//! A collector stands in for the host scene: once per step it reports the
//! colliders currently in the box. The runner hands the snapshot to
//! [`Simulation::step`](fluid_kernel::Simulation::step) by value, so the
//! collector is free to rebuild it from scratch every call.

use crate::config::SceneConfig;
use fluid_kernel::{CapsuleCollider, ColliderSnapshot, SphereCollider};
use glam::Vec3;
use std::f32::consts::TAU;

/// Producer of per-step collider snapshots
pub trait SceneCollector: Send {
    /// Colliders present at simulated time `sim_time` (seconds)
    fn collect(&mut self, sim_time: f64) -> ColliderSnapshot;
}

/// Build the collector described by a scene configuration
pub fn from_config(scene: &SceneConfig) -> Box<dyn SceneCollector> {
    match scene {
        SceneConfig::Static { spheres, capsule } => Box::new(StaticScene::new(ColliderSnapshot {
            spheres: spheres.clone(),
            capsule: *capsule,
        })),
        SceneConfig::Orbiting {
            sphere_count,
            sphere_radius,
            orbit_radius,
            angular_speed,
            orbit_height,
            capsule_radius,
            capsule_half_height,
            sweep_amplitude,
            sweep_speed,
        } => Box::new(OrbitingScene {
            sphere_count: *sphere_count,
            sphere_radius: *sphere_radius,
            orbit_radius: *orbit_radius,
            angular_speed: *angular_speed,
            orbit_height: *orbit_height,
            capsule_radius: *capsule_radius,
            capsule_half_height: *capsule_half_height,
            sweep_amplitude: *sweep_amplitude,
            sweep_speed: *sweep_speed,
        }),
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// Fixed collider list, returned unchanged every step
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    snapshot: ColliderSnapshot,
}

impl StaticScene {
    /// Scene that always reports `snapshot`
    pub fn new(snapshot: ColliderSnapshot) -> Self {
        Self { snapshot }
    }

    /// Scene with no colliders
    pub fn empty() -> Self {
        Self::default()
    }
}

impl SceneCollector for StaticScene {
    fn collect(&mut self, _sim_time: f64) -> ColliderSnapshot {
        self.snapshot.clone()
    }
}

// ---------------------------------------------------------------------------
// Orbiting
// ---------------------------------------------------------------------------

/// Spheres evenly spaced on a horizontal circle around the y axis, rotating
/// at a constant rate, plus an upright capsule oscillating along x.
#[derive(Debug, Clone)]
pub struct OrbitingScene {
    /// Number of spheres
    pub sphere_count: usize,
    /// Sphere radius
    pub sphere_radius: f32,
    /// Orbit circle radius
    pub orbit_radius: f32,
    /// Orbit angular speed (rad/s)
    pub angular_speed: f32,
    /// y coordinate of the orbit plane
    pub orbit_height: f32,
    /// Capsule radius; zero disables the capsule
    pub capsule_radius: f32,
    /// Half the endpoint separation
    pub capsule_half_height: f32,
    /// Peak x offset of the sweep
    pub sweep_amplitude: f32,
    /// Sweep angular frequency (rad/s)
    pub sweep_speed: f32,
}

impl SceneCollector for OrbitingScene {
    fn collect(&mut self, sim_time: f64) -> ColliderSnapshot {
        let t = sim_time as f32;
        let phase = self.angular_speed * t;
        let spheres = (0..self.sphere_count)
            .map(|i| {
                let angle = phase + TAU * i as f32 / self.sphere_count as f32;
                SphereCollider {
                    center: Vec3::new(
                        self.orbit_radius * angle.cos(),
                        self.orbit_height,
                        self.orbit_radius * angle.sin(),
                    ),
                    radius: self.sphere_radius,
                }
            })
            .collect();

        let capsule = (self.capsule_radius > 0.0).then(|| {
            let x = self.sweep_amplitude * (self.sweep_speed * t).sin();
            CapsuleCollider::upright(
                Vec3::new(x, self.orbit_height, 0.0),
                self.capsule_half_height,
                self.capsule_radius,
            )
        });

        ColliderSnapshot { spheres, capsule }
    }
}
