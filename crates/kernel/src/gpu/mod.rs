//! GPU (Vulkan/Metal/DX12 via wgpu) implementation of [`ComputeBackend`].
//!
//! # Architecture
//! - Every kernel is one WGSL entry point. All pipelines share a single bind
//!   group:
//!   - 0: parameter uniform
//!   - 1: interleaved particles (rw)
//!   - 2: hash entries (rw)
//!   - 3: cell offsets (rw)
//!   - 4: colliders (read)
//!   - 5: unstable-force counter (atomic)
//! - Each dispatch writes the uniform (sort passes carry their own
//!   `dim`/`block`), submits one compute pass and waits on the device, so the
//!   next dispatch sees all of its writes.
//! - Particle data stays resident between steps; readback only on demand.
//!
//! The bitonic pass runs in place: the lower lane of each pair swaps both
//! slots. This produces the same buffer as the double-buffered CPU pass.

pub mod buffers;

use tracing::{debug, info};

use buffers::{GpuBuffers, GpuParams};

use crate::backend::{ComputeBackend, KernelId};
use crate::collider::ColliderSet;
use crate::error::BackendError;
use crate::hash::HashEntry;
use crate::params::FluidParams;
use crate::particle::ParticleStore;
use crate::smoothing::SmoothingKernels;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

/// Check whether any GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// Compute pipelines for one workgroup size.
struct Pipelines {
    workgroup_size: u32,
    hash_particles: wgpu::ComputePipeline,
    bitonic_sort: wgpu::ComputePipeline,
    clear_offsets: wgpu::ComputePipeline,
    cell_offsets: wgpu::ComputePipeline,
    density: wgpu::ComputePipeline,
    forces: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
}

impl Pipelines {
    fn get(&self, kernel: KernelId) -> &wgpu::ComputePipeline {
        match kernel {
            KernelId::HashParticles => &self.hash_particles,
            KernelId::BitonicSort { .. } => &self.bitonic_sort,
            KernelId::ClearOffsets => &self.clear_offsets,
            KernelId::CellOffsets => &self.cell_offsets,
            KernelId::DensityPressure => &self.density,
            KernelId::ComputeForces => &self.forces,
            KernelId::Integrate => &self.integrate,
        }
    }
}

/// Buffers plus their bind group; rebuilt together on reallocation.
struct Resources {
    bufs: GpuBuffers,
    bind_group: wgpu::BindGroup,
}

/// wgpu compute backend.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Option<Pipelines>,
    resources: Option<Resources>,
    uniform: GpuParams,
}

impl GpuBackend {
    /// Acquire an adapter and device.
    ///
    /// Returns [`BackendError::NoAdapter`] when no GPU is present, so callers
    /// can fall back to the CPU backend.
    pub fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(BackendError::NoAdapter)?;

        info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fluid_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| BackendError::DeviceRequest(e.to_string()))?;

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fluid_bgl"),
            entries: &[
                bgl_uniform(0),    // params
                bgl_storage_rw(1), // particles
                bgl_storage_rw(2), // hash entries
                bgl_storage_rw(3), // cell offsets
                bgl_storage_ro(4), // colliders
                bgl_storage_rw(5), // unstable counter
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fluid_pl"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let defaults = FluidParams::default();
        Ok(Self {
            uniform: GpuParams::new(&defaults, &defaults.kernels()),
            device,
            queue,
            bgl,
            pipeline_layout,
            pipelines: None,
            resources: None,
        })
    }

    fn shader(&self, label: &str, body: &str, workgroup_size: u32) -> wgpu::ShaderModule {
        let wg_str = format!("@workgroup_size({})", workgroup_size);
        let src = format!("{COMMON_WGSL}\n{body}").replace("@workgroup_size(256)", &wg_str);
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(src.into()),
        })
    }

    fn pipeline(&self, module: &wgpu::ShaderModule, entry_point: &str) -> wgpu::ComputePipeline {
        self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&self.pipeline_layout),
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    fn build_pipelines(&self, workgroup_size: u32) -> Pipelines {
        let spatial = self.shader("spatial_hash", include_str!("shaders/spatial_hash.wgsl"), workgroup_size);
        let density = self.shader("density", include_str!("shaders/density.wgsl"), workgroup_size);
        let forces = self.shader("forces", include_str!("shaders/forces.wgsl"), workgroup_size);
        let integrate = self.shader("integrate", include_str!("shaders/integrate.wgsl"), workgroup_size);
        Pipelines {
            workgroup_size,
            hash_particles: self.pipeline(&spatial, "hash_particles"),
            bitonic_sort: self.pipeline(&spatial, "bitonic_sort"),
            clear_offsets: self.pipeline(&spatial, "clear_offsets"),
            cell_offsets: self.pipeline(&spatial, "cell_offsets"),
            density: self.pipeline(&density, "compute_density"),
            forces: self.pipeline(&forces, "compute_forces"),
            integrate: self.pipeline(&integrate, "integrate"),
        }
    }

    fn build_resources(&self, params: &FluidParams) -> Resources {
        let bufs = GpuBuffers::new(&self.device, params, &self.uniform);
        let bind_group = self.bind_group(&bufs);
        Resources { bufs, bind_group }
    }

    fn bind_group(&self, bufs: &GpuBuffers) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fluid_bg"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: bufs.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: bufs.particles.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: bufs.entries.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: bufs.offsets.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: bufs.colliders.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: bufs.unstable.as_entire_binding() },
            ],
        })
    }

    fn resources(&self) -> Result<&Resources, BackendError> {
        self.resources.as_ref().ok_or(BackendError::NotConfigured)
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn configure(&mut self, params: &FluidParams, kernels: &SmoothingKernels) -> Result<(), BackendError> {
        let (n_spheres, has_capsule) = (self.uniform.n_spheres, self.uniform.has_capsule);
        self.uniform = GpuParams::new(params, kernels);

        let rebuild_pipelines = self
            .pipelines
            .as_ref()
            .map_or(true, |p| p.workgroup_size != params.workgroup_size);
        if rebuild_pipelines {
            debug!(workgroup_size = params.workgroup_size, "compiling compute pipelines");
            self.pipelines = Some(self.build_pipelines(params.workgroup_size));
        }

        match self.resources.take() {
            Some(mut res) if res.bufs.holds_particles(params) => {
                if res.bufs.collider_capacity == params.max_colliders {
                    // The colliders uploaded last step stay valid
                    self.uniform.n_spheres = n_spheres;
                    self.uniform.has_capsule = has_capsule;
                } else {
                    // Particle buffers survive; colliders wait for the next upload
                    debug!(capacity = params.max_colliders, "resizing collider buffer");
                    res.bufs.resize_colliders(&self.device, params.max_colliders);
                    res.bind_group = self.bind_group(&res.bufs);
                }
                self.resources = Some(res);
            }
            _ => self.resources = Some(self.build_resources(params)),
        }
        let res = self.resources()?;
        res.bufs.write_params(&self.queue, &self.uniform);
        Ok(())
    }

    fn upload_particles(&mut self, particles: &ParticleStore) -> Result<(), BackendError> {
        let res = self.resources()?;
        if particles.len() != res.bufs.n_particles {
            return Err(BackendError::SizeMismatch {
                buffer: "particles",
                expected: res.bufs.n_particles,
                actual: particles.len(),
            });
        }
        res.bufs.write_particles(&self.queue, particles);
        Ok(())
    }

    fn upload_colliders(&mut self, colliders: &ColliderSet) -> Result<(), BackendError> {
        let res = self.resources()?;
        let capacity = res.bufs.collider_capacity;
        let mut set = colliders.clone();
        set.set_capacity(capacity);
        res.bufs.write_colliders(&self.queue, &set);
        self.uniform.n_spheres = set.spheres().len() as u32;
        self.uniform.has_capsule = u32::from(set.capsule().is_some());
        Ok(())
    }

    fn dispatch(&mut self, kernel: KernelId, group_count: u32) -> Result<(), BackendError> {
        let res = self.resources.as_ref().ok_or(BackendError::NotConfigured)?;
        let pipelines = self.pipelines.as_ref().ok_or(BackendError::NotConfigured)?;

        if let KernelId::BitonicSort { dim, block } = kernel {
            self.uniform.dim = dim;
            self.uniform.block = block;
        }
        res.bufs.write_params(&self.queue, &self.uniform);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.name()),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipelines.get(kernel));
            pass.set_bind_group(0, &res.bind_group, &[]);
            pass.dispatch_workgroups(group_count, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn download_particles(&mut self, out: &mut ParticleStore) -> Result<(), BackendError> {
        let res = self.resources()?;
        let data = res.bufs.read_particles(&self.device, &self.queue)?;
        buffers::unpack_particles(&data, out);
        Ok(())
    }

    fn download_sorted_entries(&mut self) -> Result<Vec<HashEntry>, BackendError> {
        let res = self.resources()?;
        res.bufs.read_entries(&self.device, &self.queue)
    }

    fn download_offsets(&mut self) -> Result<Vec<u32>, BackendError> {
        let res = self.resources()?;
        res.bufs.read_offsets(&self.device, &self.queue)
    }

    fn take_unstable_count(&mut self) -> Result<u32, BackendError> {
        let res = self.resources()?;
        let count = res.bufs.read_unstable(&self.device, &self.queue)?;
        res.bufs.reset_unstable(&self.queue);
        Ok(count)
    }

    fn release(&mut self) {
        self.resources = None;
    }
}

// ---- Bind group layout entry helpers ----

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
