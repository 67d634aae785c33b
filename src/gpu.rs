use wgpu::util::DeviceExt;
use bytemuck::{Pod, Zeroable};
use log::info;
use crate::error::{EngineError, Result};
use crate::lattice::{D2Q9, Fields};
use crate::Float;

/// Uniform block shared by all compute passes. Layout must match the
/// `Params` struct in the WGSL shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuParams {
    pub nx: u32,
    pub ny: u32,
    /// 0 = BGK, 1 = TRT
    pub model: u32,
    pub num_targets: u32,
    pub tau_plus: f32,
    pub tau_minus: f32,
    pub target_density: f32,
    pub _pad: f32,
}

/// One host-evaluated initializer target, scattered on-device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VelocityTarget {
    pub index: u32,
    pub _pad: u32,
    pub velocity: [f32; 2],
}

/// Accelerator backend: field tensors live in device storage buffers and each
/// pipeline phase is a compute pass. Phases are encoded in fixed order per
/// step; a submission-level wait at the end of `step` gives the orchestrator
/// the same fully-joined semantics as the host loops.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,

    initializer_pipeline: wgpu::ComputePipeline,
    stream_pipeline: wgpu::ComputePipeline,
    boundary_pipeline: wgpu::ComputePipeline,
    collide_pipeline: wgpu::ComputePipeline,
    macroscopic_pipeline: wgpu::ComputePipeline,

    f_buffer: wgpu::Buffer,
    f_tmp_buffer: wgpu::Buffer,
    density_buffer: wgpu::Buffer,
    velocity_buffer: wgpu::Buffer,
    targets_buffer: wgpu::Buffer,

    bind_group: wgpu::BindGroup,

    num_nodes: u32,
}

impl GpuContext {
    /// Acquire a device and build the buffers and pipelines for a lattice of
    /// the given shape. `normals` holds the per-node inward normal (zero for
    /// nodes that are not open boundaries); `max_targets` sizes the
    /// initializer target buffer.
    pub fn new(
        fields: &Fields,
        normals: &[i32],
        params: GpuParams,
        max_targets: usize,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| EngineError::AcceleratorUnavailable(format!("no adapter: {e}")))?;

        let adapter_info = adapter.get_info();
        info!(
            "GPU Adapter Selected: {} ({:?}, {:?}, {:?})",
            adapter_info.name, adapter_info.vendor, adapter_info.device_type, adapter_info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            label: None,
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| EngineError::AcceleratorUnavailable(format!("no device: {e}")))?;

        let num_nodes = fields.num_nodes() as u32;
        let f_size = (fields.f.len() * std::mem::size_of::<Float>()) as wgpu::BufferAddress;
        let scalar_size =
            (fields.density.len() * std::mem::size_of::<Float>()) as wgpu::BufferAddress;
        let vector_size =
            (fields.velocity.len() * std::mem::size_of::<Float>()) as wgpu::BufferAddress;

        let f_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distribution Buffer"),
            size: f_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let f_tmp_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Distribution Scratch Buffer"),
            size: f_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let density_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Density Buffer"),
            size: scalar_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let velocity_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Velocity Buffer"),
            size: vector_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let node_types: Vec<u32> = fields.node_type.iter().map(|t| *t as u32).collect();
        let node_type_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Type Buffer"),
            contents: bytemuck::cast_slice(&node_types),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let obstacle_weight_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Obstacle Weight Buffer"),
            contents: bytemuck::cast_slice(&fields.obstacle_weight),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let normals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Boundary Normal Buffer"),
            contents: bytemuck::cast_slice(normals),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let targets_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Velocity Target Buffer"),
            size: (max_targets.max(1) * std::mem::size_of::<VelocityTarget>())
                as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Params Buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LBM Bind Group Layout"),
            entries: &[
                storage_entry(0, true),  // f (streaming source)
                storage_entry(1, false), // f_tmp (in-place phases)
                storage_entry(2, false), // density
                storage_entry(3, false), // velocity
                storage_entry(4, true),  // node_type
                storage_entry(5, true),  // obstacle_weight
                storage_entry(6, true),  // normals
                storage_entry(7, true),  // targets
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LBM Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: f_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: f_tmp_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: density_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: velocity_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: node_type_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: obstacle_weight_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: 6, resource: normals_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: targets_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 8, resource: params_buffer.as_entire_binding() },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("LBM Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, source: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let initializer_pipeline =
            make_pipeline("Initializer Pipeline", include_str!("shaders/initializer.wgsl"));
        let stream_pipeline = make_pipeline("Stream Pipeline", include_str!("shaders/stream.wgsl"));
        let boundary_pipeline =
            make_pipeline("Boundary Pipeline", include_str!("shaders/boundary.wgsl"));
        let collide_pipeline =
            make_pipeline("Collide Pipeline", include_str!("shaders/collide.wgsl"));
        let macroscopic_pipeline =
            make_pipeline("Macroscopic Pipeline", include_str!("shaders/macroscopic.wgsl"));

        Ok(Self {
            device,
            queue,
            initializer_pipeline,
            stream_pipeline,
            boundary_pipeline,
            collide_pipeline,
            macroscopic_pipeline,
            f_buffer,
            f_tmp_buffer,
            density_buffer,
            velocity_buffer,
            targets_buffer,
            bind_group,
            num_nodes,
        })
    }

    pub fn upload_fields(&self, fields: &Fields) {
        self.queue
            .write_buffer(&self.f_buffer, 0, bytemuck::cast_slice(&fields.f));
        self.queue
            .write_buffer(&self.density_buffer, 0, bytemuck::cast_slice(&fields.density));
        self.queue
            .write_buffer(&self.velocity_buffer, 0, bytemuck::cast_slice(&fields.velocity));
    }

    /// Encode and run one full timestep: target scatter, streaming, boundary
    /// fixups, collision, macroscopic recompute, then copy the scratch
    /// distributions back to the primary buffer.
    pub fn step(&self, targets: &[VelocityTarget]) {
        if !targets.is_empty() {
            self.queue
                .write_buffer(&self.targets_buffer, 0, bytemuck::cast_slice(targets));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("LBM Step Encoder"),
            });

        let node_groups = self.num_nodes.div_ceil(64);
        let target_groups = (targets.len() as u32).div_ceil(64);

        let phases: [(&wgpu::ComputePipeline, u32, &str); 5] = [
            (&self.initializer_pipeline, target_groups, "Initializer Pass"),
            (&self.stream_pipeline, node_groups, "Stream Pass"),
            (&self.boundary_pipeline, node_groups, "Boundary Pass"),
            (&self.collide_pipeline, node_groups, "Collide Pass"),
            (&self.macroscopic_pipeline, node_groups, "Macroscopic Pass"),
        ];

        for (pipeline, groups, label) in phases {
            if groups == 0 {
                continue;
            }
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(groups, 1, 1);
        }

        encoder.copy_buffer_to_buffer(
            &self.f_tmp_buffer,
            0,
            &self.f_buffer,
            0,
            self.f_buffer.size(),
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::MaintainBase::Wait);
    }

    /// Read the distribution, density and velocity tensors back to the host.
    pub fn read_fields(&self, fields: &mut Fields) -> Result<()> {
        fields.f = self.read_buffer(&self.f_buffer)?;
        fields.density = self.read_buffer(&self.density_buffer)?;
        fields.velocity = self.read_buffer(&self.velocity_buffer)?;
        debug_assert_eq!(fields.f.len(), fields.num_nodes() * D2Q9::Q);
        Ok(())
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer) -> Result<Vec<Float>> {
        let size = buffer.size();
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Copy Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::MaintainBase::Wait);

        pollster::block_on(receiver)
            .map_err(|_| EngineError::AcceleratorUnavailable("readback channel closed".into()))?
            .map_err(|e| {
                EngineError::AcceleratorUnavailable(format!("buffer map failed: {e:?}"))
            })?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<Float> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();
        Ok(result)
    }
}
