//! Compact-support smoothing kernels and their precomputed normalization.
//!
//! All kernels share the support radius `r` (equal to the hash cell size):
//!
//! - density:        `W(d)      = (r² - d²)³ / V(r)`, `V(r) = π r⁸ / 4`
//! - pressure:       `∇W(d)     = -45 / (π r⁶) · (r - d)²`
//! - viscosity:      `∇²W(d)    =  45 / (π r⁶) · (r - d)`
//! - near density:   `W_near(d) =  15 / (π r⁶) · (r - d)³`
//!
//! Each evaluates to zero outside the support.

use std::f32::consts::PI;

/// Kernel constants derived from the smoothing radius.
///
/// Rebuilt whenever the radius changes; never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingKernels {
    /// Support radius `r`.
    pub radius: f32,
    /// `r²`, the squared cutoff used by neighbor tests.
    pub radius_sq: f32,
    /// Normalization volume `V(r)` of the density kernel.
    pub poly6_volume: f32,
    /// Coefficient of the spiky gradient, `-45 / (π r⁶)`.
    pub spiky_grad: f32,
    /// Coefficient of the viscosity Laplacian, `45 / (π r⁶)`.
    pub visc_laplacian: f32,
    /// Coefficient of the near-density kernel, `15 / (π r⁶)`.
    pub near_norm: f32,
}

impl SmoothingKernels {
    /// Precompute kernel constants for support radius `radius`.
    pub fn new(radius: f32) -> Self {
        let r2 = radius * radius;
        let r6 = r2 * r2 * r2;
        let r8 = r6 * r2;
        Self {
            radius,
            radius_sq: r2,
            poly6_volume: PI * r8 / 4.0,
            spiky_grad: -45.0 / (PI * r6),
            visc_laplacian: 45.0 / (PI * r6),
            near_norm: 15.0 / (PI * r6),
        }
    }

    /// Density kernel evaluated at squared distance `dist_sq`.
    #[inline]
    pub fn density(&self, dist_sq: f32) -> f32 {
        if dist_sq > self.radius_sq {
            return 0.0;
        }
        let v = self.radius_sq - dist_sq;
        v * v * v / self.poly6_volume
    }

    /// Radial derivative of the spiky kernel at distance `dist`. Non-positive.
    #[inline]
    pub fn spiky_gradient(&self, dist: f32) -> f32 {
        if dist > self.radius {
            return 0.0;
        }
        let v = self.radius - dist;
        self.spiky_grad * v * v
    }

    /// Laplacian of the viscosity kernel at distance `dist`. Non-negative.
    #[inline]
    pub fn viscosity_laplacian(&self, dist: f32) -> f32 {
        if dist > self.radius {
            return 0.0;
        }
        self.visc_laplacian * (self.radius - dist)
    }

    /// Near-density kernel at distance `dist`.
    #[inline]
    pub fn near_density(&self, dist: f32) -> f32 {
        if dist > self.radius {
            return 0.0;
        }
        let v = self.radius - dist;
        self.near_norm * v * v * v
    }
}
