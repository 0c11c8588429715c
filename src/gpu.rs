//! Windowed GPU simulation
//!
//! `GpuLifeRenderer` runs the frame driver with a GPU compute stage and a
//! surface render stage that share one device, queue, and pair of cell
//! buffers. Both stages submit on the same queue, so the render of a step
//! always observes that step's finished compute.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, Buffer,
    BufferUsages, CommandEncoderDescriptor, Device, FragmentState, Instance, LoadOp,
    MultisampleState, Operations, PipelineLayoutDescriptor, PrimitiveState, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderStages, StoreOp, Surface, SurfaceConfiguration, TextureUsages, TextureViewDescriptor,
    VertexState,
    util::{BufferInitDescriptor, DeviceExt},
};
use winit::window::Window;

use crate::{
    config::LifeConfig,
    sim::{
        BufferId, ComputeStage, FrameDriver, Grid, RenderStage,
        clock::{RateMeter, TickClock},
        gpucompute::{GpuCompute, request_device, storage_entry, uniform_layout},
    },
    util::{Color, now_ms},
};

/// Two triangles covering most of a cell, leaving a gap between cells.
const CELL_VERTICES: [[f32; 2]; 6] = [
    [-0.8, -0.8],
    [0.8, -0.8],
    [0.8, 0.8],
    [-0.8, -0.8],
    [0.8, 0.8],
    [-0.8, 0.8],
];

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct RenderUniforms {
    grid: [u32; 2],
    _pad: [u32; 2],
    alive_color: [f32; 4],
}

/// Integrated GPU context for simulation and rendering
pub struct GpuLifeRenderer {
    #[allow(dead_code)]
    instance: Instance, // Keep instance alive for the lifetime of the renderer
    window: Arc<Window>,
    driver: FrameDriver<GpuCompute, SurfaceRender>,
    clock: TickClock,
    meter: RateMeter,
}

/// Render stage drawing one instanced quad per cell into the window surface.
pub struct SurfaceRender {
    device: Arc<Device>,
    queue: Arc<Queue>,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    render_pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    /// Indexed by buffer: `[A, B]`
    cells_bind_groups: [BindGroup; 2],
    uniforms_bind_group: BindGroup,
    cell_count: u32,
    clear_color: wgpu::Color,
}

impl GpuLifeRenderer {
    /// Create the device, both stages, and the initial generation.
    pub async fn new(window: Arc<Window>, config: &LifeConfig) -> anyhow::Result<Self> {
        let state = config.initial_state()?;
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());

        // Create surface first to find compatible adapter
        let surface = instance.create_surface(window.clone())?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let compute = GpuCompute::new(device.clone(), queue.clone(), &state);
        let render = SurfaceRender::new(
            device,
            queue,
            surface,
            surface_config,
            [compute.buffer(BufferId::A), compute.buffer(BufferId::B)],
            state.grid(),
            config.alive_color,
            config.background_color,
        );
        log::info!(
            "GPU simulation ready: {}x{} cells, tick rate {:?}",
            config.width,
            config.height,
            config.tick_rate
        );

        Ok(Self {
            instance,
            window,
            driver: FrameDriver::new(compute, render),
            clock: TickClock::new(config.tick_rate),
            meter: RateMeter::default(),
        })
    }

    /// Request a redraw of the window
    /// Call this after rendering to keep the animation loop going
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Handle one host frame: step if running and a tick is due, otherwise
    /// redraw the latest generation.
    pub fn frame(&mut self, running: bool) -> Result<(), wgpu::SurfaceError> {
        let now = now_ms();
        let due = running && self.clock.due(now);
        if let Some((rate, ticks, secs)) = self.meter.record(now, due as u32) {
            log::info!(
                "Actual tick rate: {rate:.1} ticks/sec (target: {:?}), {ticks} ticks in {secs:.1}s",
                self.clock.tick_rate()
            );
        }
        if due {
            self.driver.step()
        } else {
            self.driver.redraw()
        }
    }

    /// Render the current generation without advancing
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.driver.redraw()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.driver.render_stage_mut().configure(width, height);
    }

    /// Reconfigure the surface at its current size, after it was lost.
    pub fn reconfigure(&mut self) {
        let size = self.window.inner_size();
        self.resize(size.width, size.height);
    }

    pub fn dimensions(&self) -> (usize, usize) {
        let grid = self.driver.compute().grid();
        (grid.width(), grid.height())
    }

    pub fn steps(&self) -> u64 {
        self.driver.step_count()
    }
}

impl SurfaceRender {
    #[allow(clippy::too_many_arguments)]
    fn new(
        device: Arc<Device>,
        queue: Arc<Queue>,
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        cell_buffers: [&Buffer; 2],
        grid: Grid,
        alive: Color,
        background: Color,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("./rendering/cells.wgsl"));

        // Cells bind group layout for rendering (read-only access)
        let cells_bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("render cells bind group layout"),
            entries: &[storage_entry(0, ShaderStages::VERTEX, true)],
        });
        let cells_bind_group = |buffer: &Buffer, label| {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some(label),
                layout: &cells_bind_group_layout,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };
        let cells_bind_groups = [
            cells_bind_group(cell_buffers[0], "render cells bind group (A)"),
            cells_bind_group(cell_buffers[1], "render cells bind group (B)"),
        ];

        let uniforms_layout = uniform_layout(
            &device,
            "render uniforms bind group layout",
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        );
        let uniforms = RenderUniforms {
            grid: [grid.width() as u32, grid.height() as u32],
            _pad: [0; 2],
            alive_color: alive.as_f32(),
        };
        let uniforms_buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("render uniforms buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: BufferUsages::UNIFORM,
        });
        let uniforms_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("render uniforms bind group"),
            layout: &uniforms_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: uniforms_buffer.as_entire_binding(),
            }],
        });

        let vertex_buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("cell vertices"),
            contents: bytemuck::cast_slice(&CELL_VERTICES),
            usage: BufferUsages::VERTEX,
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("render pipeline layout"),
            bind_group_layouts: &[&cells_bind_group_layout, &uniforms_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("cell render pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        Self {
            device,
            queue,
            surface,
            surface_config,
            render_pipeline,
            vertex_buffer,
            cells_bind_groups,
            uniforms_bind_group,
            cell_count: grid.cell_count() as u32,
            clear_color: background.as_wgpu(),
        }
    }

    fn configure(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }
}

impl RenderStage<Buffer> for SurfaceRender {
    type Error = wgpu::SurfaceError;

    fn render(&mut self, id: BufferId, _generation: &Buffer) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("render encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.clear_color),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.cells_bind_groups[id.index()], &[]);
            render_pass.set_bind_group(1, &self.uniforms_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.draw(0..CELL_VERTICES.len() as u32, 0..self.cell_count);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
