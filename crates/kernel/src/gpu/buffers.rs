//! GPU buffer layouts and host <-> device transfer.
//!
//! Particles live in one interleaved storage buffer of [`GpuParticle`]; the
//! hash entries, offset table, collider list and unstable counter each get
//! their own buffer. Readback copies into a MAP_READ staging buffer and blocks
//! on `map_async`.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::collider::ColliderSet;
use crate::error::BackendError;
use crate::hash::HashEntry;
use crate::offsets::EMPTY_CELL;
use crate::params::{FluidParams, PressureModel};
use crate::particle::ParticleStore;
use crate::smoothing::SmoothingKernels;

/// Uniform parameter block. Must match `Params` in `shaders/common.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GpuParams {
    pub n_particles: u32,
    pub sort_len: u32,
    pub workgroup_size: u32,
    pub dim: u32,
    pub block: u32,
    pub n_spheres: u32,
    pub has_capsule: u32,
    pub pressure_model: u32,
    pub smoothing_radius: f32,
    pub radius_sq: f32,
    pub poly6_volume: f32,
    pub spiky_grad: f32,
    pub visc_laplacian: f32,
    pub near_norm: f32,
    pub near_multiplier: f32,
    pub particle_mass: f32,
    pub gas_constant: f32,
    pub resting_density: f32,
    pub viscosity: f32,
    pub bound_damping: f32,
    pub timestep: f32,
    pub particle_radius: f32,
    pub collider_stiffness: f32,
    pub _pad0: f32,
    pub gravity_x: f32,
    pub gravity_y: f32,
    pub gravity_z: f32,
    pub _pad1: f32,
    pub half_x: f32,
    pub half_y: f32,
    pub half_z: f32,
    pub _pad2: f32,
}

impl GpuParams {
    /// Pack parameters and kernel constants. Sort pass and collider counts start at zero.
    pub fn new(params: &FluidParams, kernels: &SmoothingKernels) -> Self {
        let half = params.half_extents();
        Self {
            n_particles: params.particle_count() as u32,
            sort_len: params.sort_len() as u32,
            workgroup_size: params.workgroup_size,
            dim: 0,
            block: 0,
            n_spheres: 0,
            has_capsule: 0,
            pressure_model: match params.pressure_model {
                PressureModel::IdealGas => 0,
                PressureModel::TargetDensity { .. } => 1,
            },
            smoothing_radius: kernels.radius,
            radius_sq: kernels.radius_sq,
            poly6_volume: kernels.poly6_volume,
            spiky_grad: kernels.spiky_grad,
            visc_laplacian: kernels.visc_laplacian,
            near_norm: kernels.near_norm,
            near_multiplier: params.pressure_model.near_multiplier(),
            particle_mass: params.particle_mass,
            gas_constant: params.gas_constant,
            resting_density: params.resting_density,
            viscosity: params.viscosity,
            bound_damping: params.bound_damping,
            timestep: params.timestep,
            particle_radius: params.particle_radius,
            collider_stiffness: params.collider_stiffness,
            _pad0: 0.0,
            gravity_x: params.gravity[0],
            gravity_y: params.gravity[1],
            gravity_z: params.gravity[2],
            _pad1: 0.0,
            half_x: half.x,
            half_y: half.y,
            half_z: half.z,
            _pad2: 0.0,
        }
    }
}

/// One particle as laid out on the device. Matches `Particle` in WGSL
/// (`vec3<f32>` is 16-byte aligned, the trailing scalar fills the gap).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable)]
pub struct GpuParticle {
    pub position: [f32; 3],
    pub density: f32,
    pub velocity: [f32; 3],
    pub pressure: f32,
    pub force: [f32; 3],
    pub near_density: f32,
}

/// Interleave a particle store for upload.
pub fn pack_particles(store: &ParticleStore) -> Vec<GpuParticle> {
    (0..store.len())
        .map(|i| GpuParticle {
            position: store.position[i].to_array(),
            density: store.density[i],
            velocity: store.velocity[i].to_array(),
            pressure: store.pressure[i],
            force: store.force[i].to_array(),
            near_density: store.near_density[i],
        })
        .collect()
}

/// Split downloaded particles back into `out`, resizing it if needed.
pub fn unpack_particles(data: &[GpuParticle], out: &mut ParticleStore) {
    out.resize(data.len());
    for (i, p) in data.iter().enumerate() {
        out.position[i] = Vec3::from(p.position);
        out.velocity[i] = Vec3::from(p.velocity);
        out.force[i] = Vec3::from(p.force);
        out.density[i] = p.density;
        out.pressure[i] = p.pressure;
        out.near_density[i] = p.near_density;
    }
}

/// Collider buffer contents: slots 0 and 1 hold the capsule endpoints (radius
/// in `w` of slot 0), spheres follow as `(center, radius)`.
pub fn pack_colliders(set: &ColliderSet) -> Vec<[f32; 4]> {
    let mut out = vec![[0.0; 4]; 2];
    if let Some(c) = set.capsule() {
        out[0] = [c.a.x, c.a.y, c.a.z, c.radius];
        out[1] = [c.b.x, c.b.y, c.b.z, c.radius];
    }
    out.extend(set.spheres().iter().map(|s| [s.center.x, s.center.y, s.center.z, s.radius]));
    out
}

/// Number of `vec4` slots of the collider buffer for a given sphere capacity.
pub fn collider_slots(capacity: usize) -> usize {
    capacity + 2
}

/// Every device buffer of one configured backend.
pub struct GpuBuffers {
    pub params: wgpu::Buffer,
    pub particles: wgpu::Buffer,
    pub entries: wgpu::Buffer,
    pub offsets: wgpu::Buffer,
    pub colliders: wgpu::Buffer,
    pub unstable: wgpu::Buffer,

    pub staging_particles: wgpu::Buffer,
    pub staging_entries: wgpu::Buffer,
    pub staging_offsets: wgpu::Buffer,
    pub staging_unstable: wgpu::Buffer,

    pub n_particles: usize,
    pub sort_len: usize,
    pub collider_capacity: usize,
}

/// Minimum buffer size (wgpu requires non-zero buffers).
const MIN_BUF_SIZE: u64 = 16;

fn storage_usage() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

/// Storage buffer initialized from `data`.
fn create_storage_buf<T: Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    if data.is_empty() {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: MIN_BUF_SIZE,
            usage: storage_usage(),
            mapped_at_creation: false,
        })
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: storage_usage(),
        })
    }
}

/// Create a staging (MAP_READ) buffer for readback.
fn create_staging_buf(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(MIN_BUF_SIZE),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn byte_len<T>(count: usize) -> u64 {
    (count * std::mem::size_of::<T>()) as u64
}

impl GpuBuffers {
    /// Allocate zeroed particle buffers, padding sort entries and an empty offset table.
    pub fn new(device: &wgpu::Device, params: &FluidParams, uniform: &GpuParams) -> Self {
        let n = params.particle_count();
        let sort_len = params.sort_len();
        let capacity = params.max_colliders;

        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fluid_params"),
            contents: bytemuck::bytes_of(uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let padding: Vec<HashEntry> = (0..sort_len as u32).map(HashEntry::padding).collect();

        Self {
            params: params_buf,
            particles: create_storage_buf(device, "particles", &vec![GpuParticle::default(); n]),
            entries: create_storage_buf(device, "hash_entries", &padding),
            offsets: create_storage_buf(device, "cell_offsets", &vec![EMPTY_CELL; n]),
            colliders: create_storage_buf(device, "colliders", &vec![[0.0f32; 4]; collider_slots(capacity)]),
            unstable: create_storage_buf(device, "unstable_count", &[0u32]),
            staging_particles: create_staging_buf(device, "staging_particles", byte_len::<GpuParticle>(n)),
            staging_entries: create_staging_buf(device, "staging_entries", byte_len::<HashEntry>(sort_len)),
            staging_offsets: create_staging_buf(device, "staging_offsets", byte_len::<u32>(n)),
            staging_unstable: create_staging_buf(device, "staging_unstable", byte_len::<u32>(1)),
            n_particles: n,
            sort_len,
            collider_capacity: capacity,
        }
    }

    /// Whether the particle, entry and offset buffers fit `params` without reallocation.
    pub fn holds_particles(&self, params: &FluidParams) -> bool {
        self.n_particles == params.particle_count() && self.sort_len == params.sort_len()
    }

    /// Replace the collider buffer with an empty one of a new sphere capacity.
    /// Particle state is untouched; the bind group must be rebuilt.
    pub fn resize_colliders(&mut self, device: &wgpu::Device, capacity: usize) {
        self.colliders = create_storage_buf(device, "colliders", &vec![[0.0f32; 4]; collider_slots(capacity)]);
        self.collider_capacity = capacity;
    }

    pub fn write_params(&self, queue: &wgpu::Queue, uniform: &GpuParams) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(uniform));
    }

    pub fn write_particles(&self, queue: &wgpu::Queue, store: &ParticleStore) {
        queue.write_buffer(&self.particles, 0, bytemuck::cast_slice(&pack_particles(store)));
    }

    pub fn write_colliders(&self, queue: &wgpu::Queue, set: &ColliderSet) {
        queue.write_buffer(&self.colliders, 0, bytemuck::cast_slice(&pack_colliders(set)));
    }

    pub fn reset_unstable(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.unstable, 0, bytemuck::bytes_of(&0u32));
    }

    pub fn read_particles(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<GpuParticle>, BackendError> {
        copy_and_read(device, queue, &self.particles, &self.staging_particles, self.n_particles)
    }

    pub fn read_entries(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<HashEntry>, BackendError> {
        copy_and_read(device, queue, &self.entries, &self.staging_entries, self.sort_len)
    }

    pub fn read_offsets(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u32>, BackendError> {
        copy_and_read(device, queue, &self.offsets, &self.staging_offsets, self.n_particles)
    }

    pub fn read_unstable(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<u32, BackendError> {
        let v: Vec<u32> = copy_and_read(device, queue, &self.unstable, &self.staging_unstable, 1)?;
        Ok(v.first().copied().unwrap_or(0))
    }
}

/// Copy `count` elements of `src` into `staging` and read them back.
fn copy_and_read<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, BackendError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback"),
    });
    encoder.copy_buffer_to_buffer(src, 0, staging, 0, byte_len::<T>(count));
    queue.submit(std::iter::once(encoder.finish()));
    read_mapped(device, staging, count)
}

/// Block on mapping a staging buffer and read `count` elements.
fn read_mapped<T: Pod>(device: &wgpu::Device, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<T>, BackendError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| BackendError::Readback(e.to_string()))?
        .map_err(|e| BackendError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data)[..count].to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collider::{CapsuleCollider, ColliderSnapshot, SphereCollider};

    #[test]
    fn layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<GpuParams>(), 128);
        assert_eq!(std::mem::size_of::<GpuParticle>(), 48);
        assert_eq!(std::mem::size_of::<HashEntry>(), 8);
    }

    #[test]
    fn particle_packing_preserves_fields() {
        let mut store = ParticleStore::from_positions(vec![Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO]);
        store.velocity[0] = Vec3::new(-1.0, 0.5, 0.0);
        store.density[1] = 7.0;
        let packed = pack_particles(&store);
        assert_eq!(packed[0].position, [1.0, 2.0, 3.0]);
        let mut back = ParticleStore::new();
        unpack_particles(&packed, &mut back);
        assert_eq!(back, store);
    }

    #[test]
    fn collider_slots_put_capsule_first() {
        let mut set = ColliderSet::with_capacity(3);
        set.replace(&ColliderSnapshot {
            spheres: vec![SphereCollider { center: Vec3::X, radius: 0.5 }],
            capsule: Some(CapsuleCollider::upright(Vec3::ZERO, 1.0, 0.25)),
        });
        let packed = pack_colliders(&set);
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[0], [0.0, 1.0, 0.0, 0.25]);
        assert_eq!(packed[1], [0.0, -1.0, 0.0, 0.25]);
        assert_eq!(packed[2], [1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn params_encode_pressure_model() {
        let mut p = FluidParams::default();
        assert_eq!(GpuParams::new(&p, &p.kernels()).pressure_model, 0);
        p.pressure_model = PressureModel::TargetDensity { near_pressure_multiplier: 2.0 };
        let g = GpuParams::new(&p, &p.kernels());
        assert_eq!(g.pressure_model, 1);
        assert_eq!(g.near_multiplier, 2.0);
        assert_eq!(g.half_x, 7.5);
    }
}
