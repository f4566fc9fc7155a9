//! WebGPU implementation of the frame backend.
//!
//! The whole frame stays on the device: fields upload once, all sub-steps
//! run as compute dispatches in a single pass, and only the final fields
//! plus the listener trace come back. Pressure state ping-pongs between two
//! storage buffers; the buffer written by a sub-step's stencil holds the
//! previous field on entry, so no third buffer is needed.
//!
//! Per-sub-step data (step index, source span) lives in a dynamically
//! offset uniform buffer so one recorded pass can cover every sub-step.

use std::borrow::Cow;

use bytemuck::Zeroable;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::{Result, WaveError};

use super::gpu_backend::{FrameBackend, FrameRequest, FrameResult, SourceInjection};

/// Alignment stride for dynamically offset uniform entries.
const STEP_UNIFORM_STRIDE: u64 = 256;

/// WGSL kernels: injection, stencil, the two boundary passes and listener
/// capture. The formulas mirror the CPU sub-step exactly.
const WGSL_FRAME_SHADER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    rx0: u32,
    ry0: u32,
    rx1: u32,
    ry1: u32,
    listener_x: u32,
    listener_y: u32,
    alpha: f32,
    damping: f32,
    wall_reflection: f32,
    absorb_k: f32,
}

struct StepParams {
    step_index: u32,
    source_offset: u32,
    source_count: u32,
    pad: u32,
}

struct Source {
    x: u32,
    y: u32,
    pressure: f32,
    pad: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<uniform> step_params: StepParams;
@group(0) @binding(2) var<storage, read_write> p_cur: array<f32>;
@group(0) @binding(3) var<storage, read_write> p_next: array<f32>;
@group(0) @binding(4) var<storage, read> obstacles: array<u32>;
@group(0) @binding(5) var<storage, read> sources: array<Source>;
@group(0) @binding(6) var<storage, read_write> listener_trace: array<f32>;

// Add pre-sampled source values to the current field. Sources are merged
// per cell on the host, so no two threads write the same index.
@compute @workgroup_size(64)
fn inject_sources(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= step_params.source_count) {
        return;
    }
    let src = sources[step_params.source_offset + gid.x];
    let idx = src.y * params.width + src.x;
    p_cur[idx] = p_cur[idx] + src.pressure;
}

// Leapfrog update over the active interior. p_next holds the previous
// field on entry (ping-pong), which each thread reads before overwriting.
@compute @workgroup_size(16, 16)
fn stencil(@builtin(global_invocation_id) gid: vec3<u32>) {
    let x = gid.x;
    let y = gid.y;
    let w = params.width;
    let h = params.height;
    if (x < 1u || x >= w - 1u || y < 1u || y >= h - 1u) {
        return;
    }
    if (x < params.rx0 || x > params.rx1 || y < params.ry0 || y > params.ry1) {
        return;
    }
    let idx = y * w + x;
    if (obstacles[idx] != 0u) {
        p_next[idx] = 0.0;
        return;
    }
    let p_c = p_cur[idx];
    let laplacian = p_cur[idx + 1u] + p_cur[idx - 1u] + p_cur[idx + w] + p_cur[idx - w]
        - 4.0 * p_c;
    let p_prev = p_next[idx];
    p_next[idx] = 2.0 * params.damping * p_c - params.damping * p_prev
        + params.damping * params.alpha * laplacian;
}

// Top and bottom rows. Runs before the column pass so corner cells mirror
// already-updated edge values in the reflective regime.
@compute @workgroup_size(64)
fn boundary_rows(@builtin(global_invocation_id) gid: vec3<u32>) {
    let x = gid.x;
    let w = params.width;
    let h = params.height;
    if (x >= w) {
        return;
    }
    let bottom = (h - 1u) * w + x;
    if (params.wall_reflection < 0.1) {
        // One-way wave equation; corners are handled by the column pass.
        if (x < 1u || x >= w - 1u) {
            return;
        }
        if (obstacles[x] != 0u) {
            p_next[x] = 0.0;
        } else {
            p_next[x] = p_cur[x] - params.absorb_k * (p_cur[x] - p_cur[x + w]);
        }
        if (obstacles[bottom] != 0u) {
            p_next[bottom] = 0.0;
        } else {
            p_next[bottom] = p_cur[bottom] - params.absorb_k * (p_cur[bottom] - p_cur[bottom - w]);
        }
    } else {
        if (obstacles[x] != 0u) {
            p_next[x] = 0.0;
        } else {
            p_next[x] = p_next[w + x] * params.wall_reflection;
        }
        if (obstacles[bottom] != 0u) {
            p_next[bottom] = 0.0;
        } else {
            p_next[bottom] = p_next[bottom - w] * params.wall_reflection;
        }
    }
}

// Left and right columns, including corners.
@compute @workgroup_size(64)
fn boundary_cols(@builtin(global_invocation_id) gid: vec3<u32>) {
    let y = gid.x;
    let w = params.width;
    let h = params.height;
    if (y >= h) {
        return;
    }
    let left = y * w;
    let right = left + w - 1u;
    if (params.wall_reflection < 0.1) {
        if (y == 0u || y == h - 1u) {
            p_next[left] = 0.0;
            p_next[right] = 0.0;
            return;
        }
        if (obstacles[left] != 0u) {
            p_next[left] = 0.0;
        } else {
            p_next[left] = p_cur[left] - params.absorb_k * (p_cur[left] - p_cur[left + 1u]);
        }
        if (obstacles[right] != 0u) {
            p_next[right] = 0.0;
        } else {
            p_next[right] = p_cur[right] - params.absorb_k * (p_cur[right] - p_cur[right - 1u]);
        }
    } else {
        if (obstacles[left] != 0u) {
            p_next[left] = 0.0;
        } else {
            p_next[left] = p_next[left + 1u] * params.wall_reflection;
        }
        if (obstacles[right] != 0u) {
            p_next[right] = 0.0;
        } else {
            p_next[right] = p_next[right - 1u] * params.wall_reflection;
        }
    }
}

// One thread records the listener cell of the freshly computed field.
@compute @workgroup_size(1)
fn capture_listener() {
    let idx = params.listener_y * params.width + params.listener_x;
    listener_trace[step_params.step_index] = p_next[idx];
}
"#;

/// Fixed per-frame parameters; must match the WGSL `Params` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParams {
    width: u32,
    height: u32,
    rx0: u32,
    ry0: u32,
    rx1: u32,
    ry1: u32,
    listener_x: u32,
    listener_y: u32,
    alpha: f32,
    damping: f32,
    wall_reflection: f32,
    absorb_k: f32,
}

/// Per-sub-step parameters; one entry per sub-step at a 256-byte stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuStepParams {
    step_index: u32,
    source_offset: u32,
    source_count: u32,
    pad: u32,
}

/// One injection; must match the WGSL `Source` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuSource {
    x: u32,
    y: u32,
    pressure: f32,
    pad: u32,
}

/// Frame backend running on the first available WebGPU adapter.
pub struct WgpuFrameBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    pipeline_inject: wgpu::ComputePipeline,
    pipeline_stencil: wgpu::ComputePipeline,
    pipeline_rows: wgpu::ComputePipeline,
    pipeline_cols: wgpu::ComputePipeline,
    pipeline_capture: wgpu::ComputePipeline,
    bind_layout: wgpu::BindGroupLayout,

    field_a: wgpu::Buffer,
    field_b: wgpu::Buffer,
    obstacle_buf: wgpu::Buffer,
    params_buf: wgpu::Buffer,
    step_buf: wgpu::Buffer,
    source_buf: wgpu::Buffer,
    listener_buf: wgpu::Buffer,
    staging_a: wgpu::Buffer,
    staging_b: wgpu::Buffer,
    staging_listener: wgpu::Buffer,

    bind_groups: [wgpu::BindGroup; 2],

    width: u32,
    height: u32,
    step_capacity: u32,
    source_capacity: u32,
    last_error: Option<String>,
}

impl WgpuFrameBackend {
    /// Initialize the backend for a fixed grid size.
    ///
    /// Fails with [`WaveError::GpuUnavailable`] when no adapter or device
    /// can be acquired; the caller should continue on the CPU.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| WaveError::gpu_unavailable("no compatible adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("soundfield-frame-backend"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| WaveError::gpu_unavailable(format!("device request failed: {e}")))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("frame-kernels"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(WGSL_FRAME_SHADER)),
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
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("frame-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let make_pipeline = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: entry,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };
        let pipeline_inject = make_pipeline("inject_sources");
        let pipeline_stencil = make_pipeline("stencil");
        let pipeline_rows = make_pipeline("boundary_rows");
        let pipeline_cols = make_pipeline("boundary_cols");
        let pipeline_capture = make_pipeline("capture_listener");

        let field_bytes = (width as u64) * (height as u64) * 4;
        let field_usage =
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let make_buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let field_a = make_buffer("field-a", field_bytes, field_usage);
        let field_b = make_buffer("field-b", field_bytes, field_usage);
        let obstacle_buf = make_buffer(
            "obstacles",
            field_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame-params"),
            contents: bytemuck::bytes_of(&GpuParams::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let step_capacity = 2048u32;
        let source_capacity = 256u32;
        let step_buf = make_buffer(
            "step-params",
            step_capacity as u64 * STEP_UNIFORM_STRIDE,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let source_buf = make_buffer(
            "sources",
            source_capacity as u64 * std::mem::size_of::<GpuSource>() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let listener_buf = make_buffer("listener-trace", step_capacity as u64 * 4, field_usage);

        let staging_usage = wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;
        let staging_a = make_buffer("staging-a", field_bytes, staging_usage);
        let staging_b = make_buffer("staging-b", field_bytes, staging_usage);
        let staging_listener =
            make_buffer("staging-listener", step_capacity as u64 * 4, staging_usage);

        let bind_groups = Self::make_bind_groups(
            &device,
            &bind_layout,
            &params_buf,
            &step_buf,
            &field_a,
            &field_b,
            &obstacle_buf,
            &source_buf,
            &listener_buf,
        );

        info!(width, height, "wgpu frame backend initialized");
        Ok(Self {
            device,
            queue,
            pipeline_inject,
            pipeline_stencil,
            pipeline_rows,
            pipeline_cols,
            pipeline_capture,
            bind_layout,
            field_a,
            field_b,
            obstacle_buf,
            params_buf,
            step_buf,
            source_buf,
            listener_buf,
            staging_a,
            staging_b,
            staging_listener,
            bind_groups,
            width,
            height,
            step_capacity,
            source_capacity,
            last_error: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params_buf: &wgpu::Buffer,
        step_buf: &wgpu::Buffer,
        field_a: &wgpu::Buffer,
        field_b: &wgpu::Buffer,
        obstacle_buf: &wgpu::Buffer,
        source_buf: &wgpu::Buffer,
        listener_buf: &wgpu::Buffer,
    ) -> [wgpu::BindGroup; 2] {
        let step_binding = wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: step_buf,
            offset: 0,
            size: wgpu::BufferSize::new(std::mem::size_of::<GpuStepParams>() as u64),
        });
        let make = |cur: &wgpu::Buffer, next: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("frame-bindings"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: step_binding.clone(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: cur.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: next.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: obstacle_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: source_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: listener_buf.as_entire_binding(),
                    },
                ],
            })
        };
        [make(field_a, field_b), make(field_b, field_a)]
    }

    fn rebuild_bind_groups(&mut self) {
        self.bind_groups = Self::make_bind_groups(
            &self.device,
            &self.bind_layout,
            &self.params_buf,
            &self.step_buf,
            &self.field_a,
            &self.field_b,
            &self.obstacle_buf,
            &self.source_buf,
            &self.listener_buf,
        );
    }

    /// Grow the per-step and per-source buffers when a frame needs more.
    fn ensure_capacity(&mut self, substeps: u32, sources: u32) {
        let mut rebuilt = false;
        if substeps > self.step_capacity {
            let capacity = substeps.next_power_of_two();
            debug!(capacity, "growing step buffers");
            self.step_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("step-params"),
                size: capacity as u64 * STEP_UNIFORM_STRIDE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.listener_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("listener-trace"),
                size: capacity as u64 * 4,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            self.staging_listener = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("staging-listener"),
                size: capacity as u64 * 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.step_capacity = capacity;
            rebuilt = true;
        }
        if sources > self.source_capacity {
            let capacity = sources.next_power_of_two();
            debug!(capacity, "growing source buffer");
            self.source_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("sources"),
                size: capacity as u64 * std::mem::size_of::<GpuSource>() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.source_capacity = capacity;
            rebuilt = true;
        }
        if rebuilt {
            self.rebuild_bind_groups();
        }
    }

    /// Flatten per-step injections, merging duplicates per cell so the
    /// injection kernel never has two threads adding to one index.
    fn flatten_sources(
        steps: &[Vec<SourceInjection>],
    ) -> (Vec<GpuSource>, Vec<(u32, u32)>) {
        let mut flat: Vec<GpuSource> = Vec::new();
        let mut spans = Vec::with_capacity(steps.len());
        for step in steps {
            let offset = flat.len();
            for inj in step {
                let existing = flat[offset..]
                    .iter()
                    .position(|s| s.x == inj.x && s.y == inj.y);
                match existing {
                    Some(i) => flat[offset + i].pressure += inj.pressure,
                    None => flat.push(GpuSource {
                        x: inj.x,
                        y: inj.y,
                        pressure: inj.pressure,
                        pad: 0,
                    }),
                }
            }
            spans.push((offset as u32, (flat.len() - offset) as u32));
        }
        (flat, spans)
    }

    fn read_staging_f32(&self, staging: &wgpu::Buffer, count: usize) -> Result<Vec<f32>> {
        let slice = staging.slice(..(count as u64 * 4));
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| WaveError::gpu_unavailable("map callback dropped"))?
            .map_err(|e| WaveError::gpu_unavailable(format!("buffer map failed: {e}")))?;
        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }
}

impl FrameBackend for WgpuFrameBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn execute_frame(&mut self, request: &FrameRequest<'_>) -> Result<FrameResult> {
        if request.width != self.width || request.height != self.height {
            let err = WaveError::gpu_unavailable(format!(
                "grid {}x{} does not match backend {}x{}",
                request.width, request.height, self.width, self.height
            ));
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        let n = request.substeps;
        if n == 0 {
            return Ok(FrameResult {
                pressure: request.pressure.to_vec(),
                pressure_prev: request.pressure_prev.to_vec(),
                listener_samples: Vec::new(),
            });
        }
        if request.sources_per_step.len() != n as usize {
            let err = WaveError::gpu_unavailable(format!(
                "source plan covers {} sub-steps, frame has {}",
                request.sources_per_step.len(),
                n
            ));
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        let (flat_sources, spans) = Self::flatten_sources(request.sources_per_step);
        self.ensure_capacity(n, flat_sources.len().max(1) as u32);

        // Upload frame state.
        let (lx, ly) = request.listener.unwrap_or((0, 0));
        let params = GpuParams {
            width: self.width,
            height: self.height,
            rx0: request.region.0,
            ry0: request.region.1,
            rx1: request.region.2,
            ry1: request.region.3,
            listener_x: lx,
            listener_y: ly,
            alpha: request.c2_dt2_dx2,
            damping: request.damping,
            wall_reflection: request.wall_reflection,
            absorb_k: request.courant.min(1.0),
        };
        self.queue
            .write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
        self.queue
            .write_buffer(&self.field_a, 0, bytemuck::cast_slice(request.pressure));
        self.queue
            .write_buffer(&self.field_b, 0, bytemuck::cast_slice(request.pressure_prev));

        let obstacle_words: Vec<u32> = request.obstacles.iter().map(|&b| b as u32).collect();
        self.queue
            .write_buffer(&self.obstacle_buf, 0, bytemuck::cast_slice(&obstacle_words));

        if !flat_sources.is_empty() {
            self.queue
                .write_buffer(&self.source_buf, 0, bytemuck::cast_slice(&flat_sources));
        }
        let mut step_bytes = vec![0u8; n as usize * STEP_UNIFORM_STRIDE as usize];
        for (step, &(offset, count)) in spans.iter().enumerate() {
            let entry = GpuStepParams {
                step_index: step as u32,
                source_offset: offset,
                source_count: count,
                pad: 0,
            };
            let at = step * STEP_UNIFORM_STRIDE as usize;
            step_bytes[at..at + std::mem::size_of::<GpuStepParams>()]
                .copy_from_slice(bytemuck::bytes_of(&entry));
        }
        self.queue.write_buffer(&self.step_buf, 0, &step_bytes);

        // Record every sub-step into one compute pass; dispatch ordering
        // gives the same injection -> stencil -> boundary -> capture
        // sequencing as the CPU loop.
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("frame-pass"),
                timestamp_writes: None,
            });
            let groups_x = self.width.div_ceil(16);
            let groups_y = self.height.div_ceil(16);
            for step in 0..n {
                let parity = (step % 2) as usize;
                let offset = [step * STEP_UNIFORM_STRIDE as u32];
                let bind_group = &self.bind_groups[parity];

                let (_, count) = spans[step as usize];
                if count > 0 {
                    pass.set_pipeline(&self.pipeline_inject);
                    pass.set_bind_group(0, bind_group, &offset);
                    pass.dispatch_workgroups(count.div_ceil(64), 1, 1);
                }

                pass.set_pipeline(&self.pipeline_stencil);
                pass.set_bind_group(0, bind_group, &offset);
                pass.dispatch_workgroups(groups_x, groups_y, 1);

                pass.set_pipeline(&self.pipeline_rows);
                pass.set_bind_group(0, bind_group, &offset);
                pass.dispatch_workgroups(self.width.div_ceil(64), 1, 1);

                pass.set_pipeline(&self.pipeline_cols);
                pass.set_bind_group(0, bind_group, &offset);
                pass.dispatch_workgroups(self.height.div_ceil(64), 1, 1);

                if request.listener.is_some() {
                    pass.set_pipeline(&self.pipeline_capture);
                    pass.set_bind_group(0, bind_group, &offset);
                    pass.dispatch_workgroups(1, 1, 1);
                }
            }
        }

        // After an odd number of sub-steps the roles are swapped.
        let field_bytes = (self.width as u64) * (self.height as u64) * 4;
        let (final_cur, final_prev) = if n % 2 == 0 {
            (&self.field_a, &self.field_b)
        } else {
            (&self.field_b, &self.field_a)
        };
        encoder.copy_buffer_to_buffer(final_cur, 0, &self.staging_a, 0, field_bytes);
        encoder.copy_buffer_to_buffer(final_prev, 0, &self.staging_b, 0, field_bytes);
        if request.listener.is_some() {
            encoder.copy_buffer_to_buffer(
                &self.listener_buf,
                0,
                &self.staging_listener,
                0,
                n as u64 * 4,
            );
        }
        self.queue.submit(Some(encoder.finish()));

        let cells = (self.width * self.height) as usize;
        let pressure = self.read_staging_f32(&self.staging_a, cells)?;
        let pressure_prev = self.read_staging_f32(&self.staging_b, cells)?;
        let listener_samples = if request.listener.is_some() {
            self.read_staging_f32(&self.staging_listener, n as usize)?
        } else {
            Vec::new()
        };

        Ok(FrameResult {
            pressure,
            pressure_prev,
            listener_samples,
        })
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::solver::WaveSolver;

    // Backend construction needs an adapter; tests bail out quietly on
    // machines without one.
    fn backend(width: u32, height: u32) -> Option<WgpuFrameBackend> {
        WgpuFrameBackend::new(width, height).ok()
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(gpu) = backend(96, 64) else {
            return;
        };

        let dt_frame = 2e-4;
        let build = || {
            let mut solver = WaveSolver::new(96, 64);
            solver.add_obstacle_disk(60, 32, 4);
            solver.add_impulse(30, 32, 50.0, 2).unwrap();
            solver.set_listener(70, 32);
            solver.set_listener_enabled(true);
            solver
        };

        let mut cpu = build();
        cpu.update(dt_frame);
        let cpu_samples = cpu.drain_listener();

        let mut accel = build();
        accel.set_backend(Box::new(gpu));
        assert!(accel.gpu_enabled());
        accel.update(dt_frame);
        let gpu_samples = accel.drain_listener();

        let peak = cpu
            .pressure_view()
            .iter()
            .fold(0.0f32, |m, p| m.max(p.abs()))
            .max(1e-9);
        for (i, (a, b)) in cpu
            .pressure_view()
            .iter()
            .zip(accel.pressure_view())
            .enumerate()
        {
            assert!(
                (a - b).abs() <= peak * 1e-3,
                "field mismatch at cell {i}: cpu {a}, gpu {b}"
            );
        }

        assert_eq!(cpu_samples.len(), gpu_samples.len());
        for (a, b) in cpu_samples.iter().zip(&gpu_samples) {
            assert!((a - b).abs() <= peak * 1e-3);
        }
    }

    #[test]
    fn test_grid_mismatch_is_rejected() {
        let Some(gpu) = backend(32, 32) else {
            return;
        };
        let mut solver = WaveSolver::new(64, 64);
        solver.set_backend(Box::new(gpu));
        solver.update(2e-4);
        // The driver reverted to CPU and recorded the failure.
        assert!(!solver.gpu_enabled());
        assert!(solver.last_gpu_error().is_some());
    }
}
