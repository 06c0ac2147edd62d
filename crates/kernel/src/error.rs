//! Error types for construction-time validation, sorting and backend execution.

use thiserror::Error;

/// A parameter set the pipeline refuses to run with.
///
/// Raised by [`FluidParams::validate`](crate::FluidParams::validate) and by
/// [`Simulation::new`](crate::Simulation::new); a simulation never starts with
/// an invalid configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// One of the lattice dimensions is zero.
    #[error("grid dimensions must be non-zero, got {0:?}")]
    EmptyGrid([u32; 3]),

    /// The particle count does not fit the 32-bit index space used by the hash table.
    #[error("particle count {0} exceeds the 32-bit index range")]
    TooManyParticles(usize),

    /// Workgroup size is zero or not a power of two.
    #[error("workgroup size must be a non-zero power of two, got {0}")]
    InvalidWorkgroupSize(u32),

    /// Particle count is not a whole number of workgroups.
    #[error("particle count {count} is not a multiple of workgroup size {workgroup_size}")]
    NotWorkgroupMultiple {
        /// Particle count N.
        count: usize,
        /// Configured workgroup size.
        workgroup_size: u32,
    },

    /// Particle count is not a power of two and sort padding is disabled.
    #[error("particle count {0} is not a power of two (enable pad_sort_to_pow2 to pad the sort buffer)")]
    NotPowerOfTwo(usize),

    /// Smoothing radius is zero, negative or non-finite.
    #[error("smoothing radius must be positive, got {0}")]
    NonPositiveSmoothingRadius(f32),

    /// Collider capacity is zero.
    #[error("collider capacity must be at least 1")]
    ZeroColliderCapacity,

    /// A strictly positive quantity was zero or negative.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A quantity that must be non-negative was negative.
    #[error("{name} must be non-negative, got {value}")]
    Negative {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A parameter holds NaN or infinity.
    #[error("{0} must be finite")]
    NonFinite(&'static str),

    /// Bound damping outside `[-1, 0]`.
    #[error("bound damping must lie in [-1, 0], got {0}")]
    BoundDampingOutOfRange(f32),

    /// A runtime parameter update tried to change a buffer-shaping parameter.
    #[error("{name} cannot change after construction ({old} -> {new})")]
    LayoutChanged {
        /// Parameter name.
        name: &'static str,
        /// Value the simulation was built with.
        old: u64,
        /// Requested value.
        new: u64,
    },

    /// A caller-supplied particle store has the wrong length.
    #[error("particle store holds {actual} particles, expected {expected}")]
    ParticleCountMismatch {
        /// Configured particle count.
        expected: usize,
        /// Supplied store length.
        actual: usize,
    },
}

/// Precondition failure of the bitonic sorting network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SortError {
    /// Input length is not a power of two.
    #[error("bitonic sort requires a power-of-two length, got {0}")]
    NotPowerOfTwo(usize),
}

/// Failure inside a compute backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend was asked to run before `configure` was called.
    #[error("backend has not been configured")]
    NotConfigured,

    /// An upload did not match the configured buffer size.
    #[error("{buffer} upload holds {actual} elements, expected {expected}")]
    SizeMismatch {
        /// Buffer name.
        buffer: &'static str,
        /// Configured element count.
        expected: usize,
        /// Supplied element count.
        actual: usize,
    },

    /// No GPU adapter could be found.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The GPU device could not be created.
    #[error("failed to create device: {0}")]
    DeviceRequest(String),

    /// Mapping a staging buffer for readback failed.
    #[error("buffer readback failed: {0}")]
    Readback(String),
}

/// Errors surfaced by [`Simulation`](crate::Simulation).
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backend failure; the step in flight did not advance simulation time.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// `step` or a readback was called before `initialize`.
    #[error("simulation has not been initialized")]
    NotInitialized,

    /// The simulation was disposed and its buffers released.
    #[error("simulation has been disposed")]
    Disposed,
}
