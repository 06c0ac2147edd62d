//! Sphere and capsule obstacles supplied by the scene each step.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Normal used when a particle sits exactly at a collider's center or axis.
const DEGENERATE_NORMAL: Vec3 = Vec3::Y;

/// Below this distance the contact normal is undefined.
const NORMAL_EPS: f32 = 1.0e-6;

/// Static or moving sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCollider {
    /// Center
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

/// Capsule: a segment swept by a sphere. Models the controllable body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleCollider {
    /// First segment endpoint
    pub a: Vec3,
    /// Second segment endpoint
    pub b: Vec3,
    /// Radius
    pub radius: f32,
}

/// Contact between a particle and a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Outward unit normal at the contact.
    pub normal: Vec3,
    /// Penetration depth, always positive.
    pub depth: f32,
}

fn contact_from(delta: Vec3, reach: f32) -> Option<Contact> {
    let dist = delta.length();
    if dist >= reach {
        return None;
    }
    let normal = if dist > NORMAL_EPS { delta / dist } else { DEGENERATE_NORMAL };
    Some(Contact {
        normal,
        depth: reach - dist,
    })
}

impl SphereCollider {
    /// Contact with a particle of radius `particle_radius` at `p`, if any.
    pub fn contact(&self, p: Vec3, particle_radius: f32) -> Option<Contact> {
        contact_from(p - self.center, self.radius + particle_radius)
    }
}

impl CapsuleCollider {
    /// Upright capsule around a body at `center`: endpoints `center ± half_height · Y`.
    pub fn upright(center: Vec3, half_height: f32, radius: f32) -> Self {
        Self {
            a: center + Vec3::Y * half_height,
            b: center - Vec3::Y * half_height,
            radius,
        }
    }

    /// Closest point to `p` on the segment `a..b`.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let ab = self.b - self.a;
        let len_sq = ab.length_squared();
        if len_sq <= f32::EPSILON {
            return self.a;
        }
        let t = ((p - self.a).dot(ab) / len_sq).clamp(0.0, 1.0);
        self.a + ab * t
    }

    /// Contact with a particle of radius `particle_radius` at `p`, if any.
    pub fn contact(&self, p: Vec3, particle_radius: f32) -> Option<Contact> {
        contact_from(p - self.closest_point(p), self.radius + particle_radius)
    }
}

/// Collider list as delivered by a scene producer, before capping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColliderSnapshot {
    /// Sphere colliders in priority order
    #[serde(default)]
    pub spheres: Vec<SphereCollider>,
    /// Dynamic body, if present this step
    #[serde(default)]
    pub capsule: Option<CapsuleCollider>,
}

/// Capacity-bounded collider set read by the force stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderSet {
    spheres: Vec<SphereCollider>,
    capsule: Option<CapsuleCollider>,
    capacity: usize,
}

impl ColliderSet {
    /// Empty set holding at most `capacity` spheres.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            spheres: Vec::with_capacity(capacity),
            capsule: None,
            capacity,
        }
    }

    /// Replace the whole set with `snapshot`, keeping the first `capacity`
    /// spheres. Returns the number of spheres dropped.
    pub fn replace(&mut self, snapshot: &ColliderSnapshot) -> usize {
        let kept = snapshot.spheres.len().min(self.capacity);
        self.spheres.clear();
        self.spheres.extend_from_slice(&snapshot.spheres[..kept]);
        self.capsule = snapshot.capsule;
        snapshot.spheres.len() - kept
    }

    /// Change the sphere capacity, truncating if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.spheres.truncate(capacity);
    }

    /// Active spheres.
    pub fn spheres(&self) -> &[SphereCollider] {
        &self.spheres
    }

    /// Active capsule.
    pub fn capsule(&self) -> Option<&CapsuleCollider> {
        self.capsule.as_ref()
    }

    /// Maximum number of spheres.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of penetration repulsions on a particle at `p`.
    pub fn repulsion(&self, p: Vec3, particle_radius: f32, stiffness: f32) -> Vec3 {
        let mut force = Vec3::ZERO;
        for sphere in &self.spheres {
            if let Some(c) = sphere.contact(p, particle_radius) {
                force += c.normal * (stiffness * c.depth);
            }
        }
        if let Some(capsule) = &self.capsule {
            if let Some(c) = capsule.contact(p, particle_radius) {
                force += c.normal * (stiffness * c.depth);
            }
        }
        force
    }
}
