//! wgpu compute backend.
//!
//! Grids are storage buffers of `vec2<f32>`. The step runs as a compute
//! pipeline, presentation as a render pipeline drawing one full-surface
//! triangle. All work for a frame is recorded into one command encoder.

use crate::compute::{
    BackendError, ComputeBackend, FRAGMENT_ENTRY_POINT, ProgramLibrary, STEP_ENTRY_POINT,
    StepUniforms, VERTEX_ENTRY_POINT, ViewUniforms, WORKGROUP_EXTENT, WorkgroupCount,
};
use crate::schema::Cell;

/// Format of the offscreen target used by headless backends.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Storage-buffer grid on the device.
#[derive(Debug)]
pub struct GpuGrid {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl GpuGrid {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug)]
pub struct GpuStepProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug)]
pub struct GpuPresentProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    view_buffer: wgpu::Buffer,
}

/// An acquired image to draw into.
#[derive(Debug)]
pub struct GpuTarget {
    view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

enum PresentTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

impl PresentTarget {
    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Surface { config, .. } => config.format,
            Self::Offscreen { texture } => texture.format(),
        }
    }
}

/// Compute backend on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: PresentTarget,
}

impl WgpuBackend {
    /// Present into a window surface supplied by the caller.
    pub fn with_surface(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        surface.configure(&device, &config);
        Self {
            device,
            queue,
            target: PresentTarget::Surface { surface, config },
        }
    }

    /// Present into an offscreen texture on a caller-supplied device.
    pub fn offscreen(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let texture = create_offscreen_texture(&device, width, height);
        Self {
            device,
            queue,
            target: PresentTarget::Offscreen { texture },
        }
    }

    /// Create a device of its own and present offscreen.
    pub async fn headless(width: u32, height: u32) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| BackendError::NoAdapter)?;

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gray-Scott GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        log::info!("using adapter {:?}", adapter.get_info().name);
        Ok(Self::offscreen(device, queue, width, height))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Resize the presentation target. Zero extents are raised to 1.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        match &mut self.target {
            PresentTarget::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            PresentTarget::Offscreen { texture } => {
                *texture = create_offscreen_texture(&self.device, width, height);
            }
        }
    }

    /// Run `create` with validation and out-of-memory errors captured, so a
    /// rejected resource comes back as an error instead of reaching the
    /// device's uncaptured-error handler.
    fn capture<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        let out_of_memory = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        // Scopes pop innermost first.
        let validation_error = pollster::block_on(validation.pop());
        let memory_error = pollster::block_on(out_of_memory.pop());
        (value, validation_error.or(memory_error))
    }

    fn allocate_buffer(&self, descriptor: &wgpu::BufferDescriptor<'_>) -> Result<wgpu::Buffer, BackendError> {
        match self.capture(|device| device.create_buffer(descriptor)) {
            (buffer, None) => Ok(buffer),
            (_, Some(error)) => Err(BackendError::AllocationFailed {
                label: descriptor.label.unwrap_or("buffer").to_string(),
                message: error.to_string(),
            }),
        }
    }

    /// Largest grid allocation the device accepts.
    fn grid_byte_limit(&self) -> u64 {
        let limits = self.device.limits();
        (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
    }
}

impl ComputeBackend for WgpuBackend {
    type Grid = GpuGrid;
    type Uniforms = wgpu::Buffer;
    type StepProgram = GpuStepProgram;
    type PresentProgram = GpuPresentProgram;
    type Target = GpuTarget;
    type Frame = wgpu::CommandEncoder;

    fn workgroup_extent(&self) -> u32 {
        WORKGROUP_EXTENT
    }

    fn max_workgroups_per_dimension(&self) -> u32 {
        self.device.limits().max_compute_workgroups_per_dimension
    }

    fn load_step_program(
        &mut self,
        library: &ProgramLibrary,
    ) -> Result<GpuStepProgram, BackendError> {
        library.require_step()?;

        // The kernel is compiled with a fixed 16x16 workgroup.
        let limits = self.device.limits();
        let extent = WORKGROUP_EXTENT;
        if limits.max_compute_workgroup_size_x < extent
            || limits.max_compute_workgroup_size_y < extent
            || limits.max_compute_invocations_per_workgroup < extent * extent
        {
            return Err(BackendError::WorkgroupUnsupported {
                extent,
                max_invocations: limits.max_compute_invocations_per_workgroup,
            });
        }

        let (program, error) = self.capture(|device| {
            let module = shader_module(device, library);
            let bind_group_layout = create_step_bind_group_layout(device);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Step Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                ..Default::default()
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Step Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(STEP_ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            });
            GpuStepProgram {
                pipeline,
                bind_group_layout,
            }
        });

        match error {
            None => Ok(program),
            Some(error) => Err(BackendError::PipelineCreation {
                program: "step",
                message: error.to_string(),
            }),
        }
    }

    fn load_present_program(
        &mut self,
        library: &ProgramLibrary,
        view: &ViewUniforms,
    ) -> Result<GpuPresentProgram, BackendError> {
        library.require_present()?;

        let format = self.target.format();
        let ((pipeline, bind_group_layout), error) = self.capture(|device| {
            let module = shader_module(device, library);
            let bind_group_layout = create_present_bind_group_layout(device);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Present Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                ..Default::default()
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Present Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(VERTEX_ENTRY_POINT),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(FRAGMENT_ENTRY_POINT),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
            (pipeline, bind_group_layout)
        });
        if let Some(error) = error {
            return Err(BackendError::PipelineCreation {
                program: "present",
                message: error.to_string(),
            });
        }

        let view_buffer = self.allocate_buffer(&wgpu::BufferDescriptor {
            label: Some("View Uniforms"),
            size: std::mem::size_of::<ViewUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })?;
        self.queue
            .write_buffer(&view_buffer, 0, bytemuck::bytes_of(view));

        Ok(GpuPresentProgram {
            pipeline,
            bind_group_layout,
            view_buffer,
        })
    }

    fn create_grid(&mut self, label: &str, width: u32, height: u32) -> Result<GpuGrid, BackendError> {
        let bytes = width as u64 * height as u64 * std::mem::size_of::<Cell>() as u64;
        let limit = self.grid_byte_limit();
        if bytes > limit {
            return Err(BackendError::GridTooLarge {
                width,
                height,
                bytes,
                limit,
            });
        }

        let buffer = self.allocate_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })?;
        Ok(GpuGrid {
            buffer,
            width,
            height,
        })
    }

    fn write_grid(&mut self, grid: &GpuGrid, cells: &[Cell]) -> Result<(), BackendError> {
        if cells.len() != grid.cell_count() {
            return Err(BackendError::GridSizeMismatch {
                expected: grid.cell_count(),
                actual: cells.len(),
            });
        }
        self.queue
            .write_buffer(&grid.buffer, 0, bytemuck::cast_slice(cells));
        Ok(())
    }

    /// Synchronous readback through a staging buffer (native only).
    fn read_grid(&mut self, grid: &GpuGrid) -> Result<Vec<Cell>, BackendError> {
        let size = grid.buffer.size();
        let staging_buffer = self.allocate_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Grid Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&grid.buffer, 0, &staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        rx.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;

        let cells = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, Cell>(&data).to_vec()
        };
        staging_buffer.unmap();
        Ok(cells)
    }

    fn create_uniforms(&mut self, uniforms: &StepUniforms) -> Result<wgpu::Buffer, BackendError> {
        let buffer = self.allocate_buffer(&wgpu::BufferDescriptor {
            label: Some("Step Uniforms"),
            size: std::mem::size_of::<StepUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })?;
        self.queue
            .write_buffer(&buffer, 0, bytemuck::bytes_of(uniforms));
        Ok(buffer)
    }

    fn acquire_target(&mut self) -> Option<GpuTarget> {
        match &self.target {
            PresentTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(surface_texture) => {
                    let view = surface_texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    Some(GpuTarget {
                        view,
                        surface_texture: Some(surface_texture),
                    })
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::debug!("surface lost or outdated, reconfiguring");
                    surface.configure(&self.device, config);
                    None
                }
                Err(e) => {
                    log::log!(skipped_frame_level(&e), "no surface texture this frame: {e}");
                    None
                }
            },
            PresentTarget::Offscreen { texture } => Some(GpuTarget {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                surface_texture: None,
            }),
        }
    }

    fn begin_frame(&mut self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
    }

    fn encode_step(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        program: &GpuStepProgram,
        read: &GpuGrid,
        write: &GpuGrid,
        uniforms: &wgpu::Buffer,
        workgroups: WorkgroupCount,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Step Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: read.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: write.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Step Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups.x, workgroups.y, 1);
    }

    fn encode_present(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        program: &GpuPresentProgram,
        source: &GpuGrid,
        target: &GpuTarget,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Present Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: source.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: program.view_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn submit(&mut self, encoder: wgpu::CommandEncoder, target: Option<GpuTarget>) {
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(surface_texture) = target.and_then(|target| target.surface_texture) {
            surface_texture.present();
        }
    }
}

/// Log level for a frame skipped because no surface texture was available.
/// Running out of memory is reported as an error; a timeout is routine.
fn skipped_frame_level(error: &wgpu::SurfaceError) -> log::Level {
    match error {
        wgpu::SurfaceError::OutOfMemory => log::Level::Error,
        _ => log::Level::Debug,
    }
}

fn shader_module(device: &wgpu::Device, library: &ProgramLibrary) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(library.label()),
        source: wgpu::ShaderSource::Wgsl(library.source().into()),
    })
}

fn create_offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn create_step_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Step Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn create_present_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Present Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}
