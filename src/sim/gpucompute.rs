use std::sync::Arc;

use anyhow::anyhow;
use wgpu::{
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, Buffer, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    Device, Instance, PipelineLayoutDescriptor, Queue, ShaderStages, Surface,
    util::{BufferInitDescriptor, DeviceExt},
};

use super::driver::{ComputeStage, FrameDriver, RenderStage};
use super::grid::{CellStateBuffer, Grid, GridState};
use super::sequencer::{BufferId, Roles};

const WORKGROUP_SIZE: usize = 8;

/// Request an adapter (compatible with `surface` if given) and a device that
/// can run compute shaders.
pub async fn request_device(
    instance: &Instance,
    surface: Option<&Surface<'_>>,
) -> anyhow::Result<(Adapter, Device, Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: surface,
        })
        .await?;

    log::info!("Using adapter: {:?}", adapter.get_info());

    let downlevel_caps = adapter.get_downlevel_capabilities();
    if !downlevel_caps
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        return Err(anyhow!("adapter does not support compute shaders"));
    }

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("lifesim device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        })
        .await?;
    Ok((adapter, device, queue))
}

/// GPU compute stage. Owns both cell buffers on the device and one bind
/// group per role pair, so a dispatch can only ever read one buffer and
/// write the other.
pub struct GpuCompute {
    device: Arc<Device>,
    queue: Arc<Queue>,
    grid: Grid,
    buffers: [Buffer; 2],
    /// Indexed by the read buffer: `[A -> B, B -> A]`
    cells_bind_groups: [BindGroup; 2],
    grid_bind_group: BindGroup,
    pipeline: ComputePipeline,
}

impl GpuCompute {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, state: &GridState) -> Self {
        let grid = state.grid();
        let shader = device.create_shader_module(wgpu::include_wgsl!("./life.wgsl"));

        let make_buffer = |id: BufferId, label| {
            device.create_buffer_init(&BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&state.buffer(id).to_words()),
                usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            })
        };
        let buffers = [
            make_buffer(BufferId::A, "cell state A"),
            make_buffer(BufferId::B, "cell state B"),
        ];

        let cells_bg_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("cells bind group layout"),
            entries: &[
                storage_entry(0, ShaderStages::COMPUTE, true),
                storage_entry(1, ShaderStages::COMPUTE, false),
            ],
        });

        let cells_bind_group = |read: &Buffer, write: &Buffer, label| {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some(label),
                layout: &cells_bg_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: read.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: write.as_entire_binding(),
                    },
                ],
            })
        };
        let cells_bind_groups = [
            cells_bind_group(&buffers[0], &buffers[1], "cells bind group (A -> B)"),
            cells_bind_group(&buffers[1], &buffers[0], "cells bind group (B -> A)"),
        ];

        let grid_bg_layout = uniform_layout(&device, "grid size bind group layout", ShaderStages::COMPUTE);
        let grid_buf = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("grid size buffer"),
            contents: bytemuck::cast_slice(&[grid.width() as u32, grid.height() as u32]),
            usage: BufferUsages::UNIFORM,
        });
        let grid_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("grid size bind group"),
            layout: &grid_bg_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: grid_buf.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("life pipeline layout"),
            bind_group_layouts: &[&cells_bg_layout, &grid_bg_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("life compute pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            device,
            queue,
            grid,
            buffers,
            cells_bind_groups,
            grid_bind_group,
            pipeline,
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }
}

impl ComputeStage for GpuCompute {
    type Buffer = Buffer;

    /// Submits the dispatch on the shared queue. Anything submitted after it
    /// on the same queue observes the finished write.
    fn compute(&mut self, roles: Roles) {
        debug_assert_ne!(roles.read, roles.write);
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("compute encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("life step compute pass"),
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.cells_bind_groups[roles.read.index()], &[]);
            pass.set_bind_group(1, &self.grid_bind_group, &[]);
            pass.dispatch_workgroups(
                self.grid.width().div_ceil(WORKGROUP_SIZE) as u32,
                self.grid.height().div_ceil(WORKGROUP_SIZE) as u32,
                1,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn buffer(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.index()]
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    visibility: ShaderStages,
    read_only: bool,
) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_layout(
    device: &Device,
    label: &str,
    visibility: ShaderStages,
) -> BindGroupLayout {
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Render stage that copies each generation back into host memory.
pub struct Readback {
    device: Arc<Device>,
    queue: Arc<Queue>,
    staging: Buffer,
    latest: CellStateBuffer,
}

impl Readback {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, initial: CellStateBuffer) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging buffer"),
            size: (initial.grid().cell_count() * std::mem::size_of::<u32>()) as u64,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            device,
            queue,
            staging,
            latest: initial,
        }
    }

    pub fn latest(&self) -> &CellStateBuffer {
        &self.latest
    }
}

impl RenderStage<Buffer> for Readback {
    type Error = anyhow::Error;

    fn render(&mut self, _id: BufferId, generation: &Buffer) -> anyhow::Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(generation, 0, &self.staging, 0, generation.size());
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        pollster::block_on(rx.receive())
            .ok_or_else(|| anyhow!("buffer mapping was cancelled"))??;

        let words = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(view.as_ref()).to_vec()
        };
        self.staging.unmap();
        self.latest = CellStateBuffer::from_words(self.latest.grid(), &words)?;
        Ok(())
    }
}

/// Headless GPU simulation: GPU compute with every generation read back.
pub struct HeadlessGpu {
    _instance: Instance,
    driver: FrameDriver<GpuCompute, Readback>,
}

impl HeadlessGpu {
    pub async fn new(state: GridState) -> anyhow::Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let (_adapter, device, queue) = request_device(&instance, None).await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let compute = GpuCompute::new(device.clone(), queue.clone(), &state);
        let readback = Readback::new(device, queue, state.buffer(BufferId::A).clone());
        Ok(Self {
            _instance: instance,
            driver: FrameDriver::new(compute, readback),
        })
    }

    pub fn step(&mut self) -> anyhow::Result<()> {
        self.driver.step()
    }

    pub fn step_count(&self) -> u64 {
        self.driver.step_count()
    }

    pub fn latest(&self) -> &CellStateBuffer {
        self.driver.render_stage().latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::Discard;
    use crate::sim::{grid::FillPolicy, patterns::Pattern, rule::CpuCompute};

    /// `None` only when the machine has no adapter at all; any other setup
    /// failure fails the test.
    fn headless(state: GridState) -> Option<HeadlessGpu> {
        let _ = env_logger::builder().is_test(true).try_init();
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()));
        if let Err(e) = adapter {
            log::warn!("no GPU adapter ({e}), skipping");
            return None;
        }
        Some(pollster::block_on(HeadlessGpu::new(state)).unwrap())
    }

    fn assert_matches_cpu(state: GridState, steps: u64) {
        let Some(mut gpu) = headless(state.clone()) else {
            return;
        };
        let mut cpu = FrameDriver::new(CpuCompute::new(state), Discard);

        for step in 1..=steps {
            gpu.step().unwrap();
            cpu.step().unwrap();
            assert_eq!(gpu.latest(), cpu.latest(), "generation {step}");
        }
        assert_eq!(gpu.step_count(), steps);
    }

    #[test]
    fn gpu_generations_match_cpu() {
        let grid = Grid::new(37, 21).unwrap();
        let state = GridState::new(
            grid,
            &FillPolicy::Random {
                density: 0.4,
                seed: Some(42),
            },
        )
        .unwrap();
        assert_matches_cpu(state, 12);
    }

    #[test]
    fn gpu_wraps_a_glider_across_the_corner() {
        // 37x21 is not a power of two in either direction
        let grid = Grid::new(37, 21).unwrap();
        let glider = Pattern::by_name("glider").unwrap();
        let cells = glider
            .cells
            .iter()
            .map(|&(x, y)| ((x + 36) % 37, (y + 20) % 21))
            .collect::<Vec<_>>();
        assert!(cells.iter().any(|&(x, _)| x == 0));
        assert!(cells.iter().any(|&(_, y)| y == 0));

        let state = GridState::new(grid, &FillPolicy::Cells(cells)).unwrap();
        assert_matches_cpu(state, 8);
    }
}
