//! Particle storage using struct-of-arrays layout.
//!
//! A particle's identity is its slot index. The store is never reordered;
//! only the per-step hash entries are sorted.

use glam::Vec3;

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same particle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleStore {
    // ---- Kinematics ----
    /// Positions
    pub position: Vec<Vec3>,
    /// Velocities
    pub velocity: Vec<Vec3>,
    /// Net force accumulated by the last force pass
    pub force: Vec<Vec3>,

    // ---- Scalar fields ----
    /// Density, floored at the resting density
    pub density: Vec<f32>,
    /// Pressure from the equation of state (may be negative)
    pub pressure: Vec<f32>,
    /// Near density; zero unless the target-density pressure model is active
    pub near_density: Vec<f32>,
}

impl ParticleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `n` particles at the origin with all fields zeroed.
    pub fn zeroed(n: usize) -> Self {
        Self {
            position: vec![Vec3::ZERO; n],
            velocity: vec![Vec3::ZERO; n],
            force: vec![Vec3::ZERO; n],
            density: vec![0.0; n],
            pressure: vec![0.0; n],
            near_density: vec![0.0; n],
        }
    }

    /// Create particles at rest at the given positions.
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        let n = positions.len();
        let mut store = Self::zeroed(n);
        store.position = positions;
        store
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Append a particle at rest.
    pub fn push(&mut self, position: Vec3) {
        self.position.push(position);
        self.velocity.push(Vec3::ZERO);
        self.force.push(Vec3::ZERO);
        self.density.push(0.0);
        self.pressure.push(0.0);
        self.near_density.push(0.0);
    }

    /// Resize every array to `n`, zero-filling new slots.
    pub fn resize(&mut self, n: usize) {
        self.position.resize(n, Vec3::ZERO);
        self.velocity.resize(n, Vec3::ZERO);
        self.force.resize(n, Vec3::ZERO);
        self.density.resize(n, 0.0);
        self.pressure.resize(n, 0.0);
        self.near_density.resize(n, 0.0);
    }

    /// `true` if any position, velocity or density is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        self.position.iter().chain(self.velocity.iter()).any(|v| !v.is_finite())
            || self.density.iter().any(|d| !d.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store() {
        let ps = ParticleStore::new();
        assert_eq!(ps.len(), 0);
        assert!(ps.is_empty());
    }

    #[test]
    fn push_and_len() {
        let mut ps = ParticleStore::new();
        ps.push(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(ps.len(), 1);
        assert!(!ps.is_empty());
        assert_eq!(ps.position[0], Vec3::new(1.0, 2.0, 3.0));
        // Velocity, force and scalars start at zero
        assert_eq!(ps.velocity[0], Vec3::ZERO);
        assert_eq!(ps.force[0], Vec3::ZERO);
        assert_eq!(ps.density[0], 0.0);
        assert_eq!(ps.pressure[0], 0.0);
    }

    #[test]
    fn from_positions_keeps_arrays_parallel() {
        let ps = ParticleStore::from_positions(vec![Vec3::X, Vec3::Y, Vec3::Z]);
        assert_eq!(ps.len(), 3);
        assert_eq!(ps.velocity.len(), 3);
        assert_eq!(ps.near_density.len(), 3);
        assert_eq!(ps.position[2], Vec3::Z);
    }

    #[test]
    fn non_finite_detection() {
        let mut ps = ParticleStore::zeroed(2);
        assert!(!ps.has_non_finite());
        ps.velocity[1].y = f32::NAN;
        assert!(ps.has_non_finite());
    }
}
