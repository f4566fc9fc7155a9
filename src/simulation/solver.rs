//! The pressure-field solver and its per-frame driver.
//!
//! Three same-sized fields (`current`, `previous`, `next`) advance in a
//! leapfrog scheme; after each sub-step the buffers rotate so nothing is
//! copied. A host frame is split into CFL-stable sub-steps, audio sources
//! are pre-sampled once per frame, and the listener records one pressure
//! sample per sub-step.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audio::source::{AudioSource, SourceSet};
use crate::error::{Result, WaveError};

use super::active_region::ActiveRegion;
use super::gpu_backend::{FrameBackend, FrameRequest, SourceInjection};
use super::obstacles::ObstacleMask;
use super::physics::AcousticParams;
use super::presets::{DampingPreset, PresetKind};

/// Gaussian width relative to the impulse radius; keeps the injected disk
/// smooth without losing spatial localization.
const GAUSSIAN_WIDTH_FACTOR: f32 = 1.25;

/// Grids with either extent at or above this use the row-parallel stencil.
const PARALLEL_THRESHOLD: usize = 512;

/// Region expansion (cells) when an audio source is added.
const SOURCE_REGION_RADIUS: i32 = 10;

/// Virtual microphone: a grid cell sampled once per sub-step while enabled.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    x: usize,
    y: usize,
    enabled: bool,
}

impl Listener {
    /// Grid position.
    pub fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    /// Whether samples are being captured.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Snapshot of solver state for display.
#[derive(Debug, Clone, Copy)]
pub struct SolverStats {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Sub-steps executed by the most recent update.
    pub substeps_last_frame: usize,
    /// Largest absolute pressure in the current field.
    pub max_pressure: f32,
    /// Sum of squared pressures in the current field.
    pub total_energy: f32,
    /// Number of registered audio sources.
    pub source_count: usize,
    /// Whether the last frame ran on the GPU backend.
    pub gpu_active: bool,
}

/// 2D acoustic wave solver over a closed room.
pub struct WaveSolver {
    width: usize,
    height: usize,
    params: AcousticParams,
    damping: f32,
    wall_reflection: f32,
    preset: DampingPreset,

    pressure: Vec<f32>,
    pressure_prev: Vec<f32>,
    pressure_next: Vec<f32>,

    obstacles: ObstacleMask,
    active: ActiveRegion,

    listener: Listener,
    listener_samples: Vec<f32>,

    sources: SourceSet,

    use_gpu: bool,
    backend: Option<Box<dyn FrameBackend>>,
    last_gpu_error: Option<String>,
    substeps_last_frame: usize,
}

impl WaveSolver {
    /// Create a solver for a `width x height` grid with default physical
    /// parameters and the realistic environment preset.
    ///
    /// # Panics
    /// Panics if either extent is below 3 cells (the stencil needs an
    /// interior).
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width >= 3 && height >= 3, "grid must be at least 3x3");
        let size = width * height;
        let preset = DampingPreset::from_kind(PresetKind::Realistic);
        Self {
            width,
            height,
            params: AcousticParams::default(),
            damping: preset.damping(),
            wall_reflection: preset.wall_reflection(),
            preset,
            pressure: vec![0.0; size],
            pressure_prev: vec![0.0; size],
            pressure_next: vec![0.0; size],
            obstacles: ObstacleMask::new(width, height),
            active: ActiveRegion::new(width, height),
            listener: Listener {
                x: width / 2,
                y: height / 2,
                enabled: false,
            },
            listener_samples: Vec::new(),
            sources: SourceSet::new(),
            use_gpu: false,
            backend: None,
            last_gpu_error: None,
            substeps_last_frame: 0,
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    // ------------------------------------------------------------------
    // Frame driver
    // ------------------------------------------------------------------

    /// Advance the simulation by one host frame.
    ///
    /// The frame is split into CFL-stable sub-steps; all playing sources are
    /// pre-sampled for every sub-step, then the sub-steps run on the GPU
    /// backend when enabled, or on the CPU otherwise. The listener buffer is
    /// cleared at the start and afterwards holds exactly one sample per
    /// sub-step while the listener is enabled.
    pub fn update(&mut self, dt_frame: f32) {
        self.listener_samples.clear();
        if dt_frame <= 0.0 {
            self.substeps_last_frame = 0;
            return;
        }

        let (n, dt) = self.params.substeps_for(dt_frame);
        self.substeps_last_frame = n;

        // Playing sources keep injecting energy at their cell; make sure
        // the region covers them before it grows with the wavefront.
        let playing: Vec<(i32, i32)> = self
            .sources
            .iter()
            .filter(|s| s.is_playing())
            .map(|s| (s.x(), s.y()))
            .collect();
        for (x, y) in playing {
            self.active.expand(x, y, 2);
        }
        self.active
            .grow_for_frame(dt_frame, self.params.speed_of_sound, self.params.cell_size);

        let plan = self.sample_sources(n, dt);

        let mut backend = self.backend.take();
        let mut frame_done = false;
        if self.use_gpu {
            match backend.as_mut() {
                Some(bk) => {
                    let (rx0, ry0, rx1, ry1) = self.active.bounds_or_full();
                    let request = FrameRequest {
                        width: self.width as u32,
                        height: self.height as u32,
                        pressure: &self.pressure,
                        pressure_prev: &self.pressure_prev,
                        obstacles: self.obstacles.cells(),
                        sources_per_step: &plan,
                        listener: self
                            .listener
                            .enabled
                            .then_some((self.listener.x as u32, self.listener.y as u32)),
                        substeps: n as u32,
                        c2_dt2_dx2: self.params.stencil_coefficient(dt),
                        courant: self.params.courant_number(dt),
                        damping: self.damping,
                        wall_reflection: self.wall_reflection,
                        region: (rx0 as u32, ry0 as u32, rx1 as u32, ry1 as u32),
                    };
                    match bk.execute_frame(&request) {
                        Ok(result) => {
                            self.pressure = result.pressure;
                            self.pressure_prev = result.pressure_prev;
                            self.listener_samples.extend(result.listener_samples);
                            frame_done = true;
                        }
                        Err(e) => {
                            warn!(error = %e, "GPU frame failed, reverting to CPU");
                            self.last_gpu_error = Some(e.to_string());
                            self.use_gpu = false;
                        }
                    }
                }
                None => self.use_gpu = false,
            }
        }
        self.backend = backend;
        if frame_done {
            return;
        }

        for injections in &plan {
            self.step_once(dt, injections);
        }
    }

    /// Pre-compute the per-sub-step injection value of every playing source.
    ///
    /// Play-head transitions happen here, exactly once per frame, so the CPU
    /// and GPU paths inject identical values and a mid-frame fallback cannot
    /// advance a head twice.
    fn sample_sources(&mut self, n: usize, dt: f32) -> Vec<Vec<SourceInjection>> {
        let mut plan = vec![Vec::new(); n];
        if self.sources.is_empty() {
            return plan;
        }
        let (width, height) = (self.width as i32, self.height as i32);
        let obstacles = &self.obstacles;
        for step_plan in plan.iter_mut() {
            for source in self.sources.iter_mut() {
                if !source.is_playing() {
                    continue;
                }
                let value = source.next_pressure(dt);
                let (x, y) = (source.x(), source.y());
                if value != 0.0
                    && x > 0
                    && x < width - 1
                    && y > 0
                    && y < height - 1
                    && !obstacles.is_obstacle(x, y)
                {
                    step_plan.push(SourceInjection {
                        x: x as u32,
                        y: y as u32,
                        pressure: value,
                    });
                }
            }
        }
        plan
    }

    /// One CPU sub-step: inject, stencil, boundaries, rotate, capture.
    fn step_once(&mut self, dt: f32, injections: &[SourceInjection]) {
        let width = self.width;
        let height = self.height;

        // Source injection participates in this sub-step's propagation.
        for inj in injections {
            let idx = inj.y as usize * width + inj.x as usize;
            self.pressure[idx] += inj.pressure;
        }

        let alpha = self.params.stencil_coefficient(dt);
        let d = self.damping;

        // Stencil over the active interior only; everything outside the
        // region is zero in all three fields.
        let (rx0, ry0, rx1, ry1) = self.active.bounds_or_full();
        let x0 = rx0.max(1);
        let x1 = rx1.min(width - 2);
        let y0 = ry0.max(1);
        let y1 = ry1.min(height - 2);

        if x0 <= x1 && y0 <= y1 {
            let cur = &self.pressure;
            let prev = &self.pressure_prev;
            let obstacles = self.obstacles.cells();
            let row_op = move |y: usize, next_row: &mut [f32]| {
                let row = y * width;
                for x in x0..=x1 {
                    let idx = row + x;
                    if obstacles[idx] != 0 {
                        next_row[x] = 0.0;
                        continue;
                    }
                    let p_c = cur[idx];
                    let laplacian =
                        cur[idx + 1] + cur[idx - 1] + cur[idx + width] + cur[idx - width]
                            - 4.0 * p_c;
                    next_row[x] = 2.0 * d * p_c - d * prev[idx] + d * alpha * laplacian;
                }
            };

            let next_rows = &mut self.pressure_next[y0 * width..(y1 + 1) * width];
            if width >= PARALLEL_THRESHOLD || height >= PARALLEL_THRESHOLD {
                next_rows
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(i, row)| row_op(y0 + i, row));
            } else {
                for (i, row) in next_rows.chunks_mut(width).enumerate() {
                    row_op(y0 + i, row);
                }
            }
        }

        self.apply_boundaries(dt);

        // Rotate: previous <- current <- next, no copies.
        std::mem::swap(&mut self.pressure_prev, &mut self.pressure);
        std::mem::swap(&mut self.pressure, &mut self.pressure_next);

        if self.listener.enabled {
            let idx = self.listener.y * width + self.listener.x;
            self.listener_samples.push(self.pressure[idx]);
        }
    }

    /// Edge handling after the interior stencil.
    ///
    /// Below a reflection coefficient of 0.1 the walls switch to a one-way
    /// (Engquist-Majda) absorbing condition; otherwise they act as Neumann
    /// walls with per-reflection attenuation. Obstacle cells on the border
    /// stay pinned to zero in both regimes.
    fn apply_boundaries(&mut self, dt: f32) {
        let width = self.width;
        let height = self.height;
        let last_row = (height - 1) * width;
        let last_col = width - 1;
        let w = self.wall_reflection;
        let obstacles = self.obstacles.cells();

        if w < 0.1 {
            // One-way wave equation at each edge, corners pinned to zero.
            let k = self.params.courant_number(dt).min(1.0);
            let cur = &self.pressure;
            let next = &mut self.pressure_next;

            for x in 1..last_col {
                next[x] = if obstacles[x] != 0 {
                    0.0
                } else {
                    cur[x] - k * (cur[x] - cur[x + width])
                };
                let idx = last_row + x;
                next[idx] = if obstacles[idx] != 0 {
                    0.0
                } else {
                    cur[idx] - k * (cur[idx] - cur[idx - width])
                };
            }
            for y in 1..height - 1 {
                let row = y * width;
                next[row] = if obstacles[row] != 0 {
                    0.0
                } else {
                    cur[row] - k * (cur[row] - cur[row + 1])
                };
                let idx = row + last_col;
                next[idx] = if obstacles[idx] != 0 {
                    0.0
                } else {
                    cur[idx] - k * (cur[idx] - cur[idx - 1])
                };
            }

            next[0] = 0.0;
            next[last_col] = 0.0;
            next[last_row] = 0.0;
            next[last_row + last_col] = 0.0;
        } else {
            // Neumann walls with attenuation. The horizontal pass runs first
            // so the vertical pass mirrors corners from updated edge values.
            let next = &mut self.pressure_next;
            for x in 0..width {
                next[x] = if obstacles[x] != 0 {
                    0.0
                } else {
                    next[width + x] * w
                };
                let idx = last_row + x;
                next[idx] = if obstacles[idx] != 0 {
                    0.0
                } else {
                    next[last_row - width + x] * w
                };
            }
            for y in 0..height {
                let row = y * width;
                next[row] = if obstacles[row] != 0 {
                    0.0
                } else {
                    next[row + 1] * w
                };
                let idx = row + last_col;
                next[idx] = if obstacles[idx] != 0 {
                    0.0
                } else {
                    next[idx - 1] * w
                };
            }
        }
    }

    // ------------------------------------------------------------------
    // Impulses and obstacles
    // ------------------------------------------------------------------

    /// Inject a Gaussian pressure disk, like a hand clap at `(x, y)`.
    ///
    /// The amplitude magnitude must lie in `(0, 1000]` Pa (negative values
    /// inject rarefaction and are how destructive interference is set up)
    /// and `radius` in `[1, 50]` cells; out-of-range values are rejected
    /// without touching any state. An out-of-bounds centre is silently
    /// ignored.
    pub fn add_impulse(&mut self, x: i32, y: i32, amplitude: f32, radius: i32) -> Result<()> {
        if amplitude == 0.0 || !amplitude.is_finite() || amplitude.abs() > 1000.0 {
            warn!(amplitude, "rejected impulse: |amplitude| must be in (0, 1000] Pa");
            return Err(WaveError::invalid_argument(format!(
                "impulse amplitude {amplitude} Pa outside (0, 1000] magnitude range"
            )));
        }
        if !(1..=50).contains(&radius) {
            warn!(radius, "rejected impulse: radius must be in [1, 50] cells");
            return Err(WaveError::invalid_argument(format!(
                "impulse radius {radius} outside [1, 50]"
            )));
        }
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Ok(());
        }

        self.active.expand(x, y, radius * 2);

        let sigma = radius as f32 * GAUSSIAN_WIDTH_FACTOR;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let radius_sq = (radius * radius) as f32;

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let px = x + dx;
                let py = y + dy;
                if px <= 0
                    || py <= 0
                    || px >= self.width as i32 - 1
                    || py >= self.height as i32 - 1
                {
                    continue;
                }
                let r_sq = (dx * dx + dy * dy) as f32;
                if r_sq > radius_sq || self.obstacles.is_obstacle(px, py) {
                    continue;
                }
                let idx = py as usize * self.width + px as usize;
                self.pressure[idx] += amplitude * (-r_sq / two_sigma_sq).exp();
            }
        }
        Ok(())
    }

    /// Mark a disk of cells solid and zero their pressure in all fields.
    pub fn add_obstacle_disk(&mut self, x: i32, y: i32, radius: i32) {
        for idx in self.obstacles.add_disk(x, y, radius) {
            self.pressure[idx] = 0.0;
            self.pressure_prev[idx] = 0.0;
            self.pressure_next[idx] = 0.0;
        }
    }

    /// Clear a disk of cells back to fluid.
    pub fn remove_obstacle_disk(&mut self, x: i32, y: i32, radius: i32) {
        self.obstacles.remove_disk(x, y, radius);
    }

    /// Remove every obstacle.
    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    /// Replace the obstacle mask from a rasterized byte grid of exactly
    /// `width * height` cells; pressure is zeroed at the new solid cells.
    /// On size mismatch the current mask stays intact.
    pub fn load_obstacle_mask(&mut self, bytes: &[u8]) -> Result<()> {
        self.obstacles.load(bytes)?;
        for (idx, &flag) in self.obstacles.cells().iter().enumerate() {
            if flag != 0 {
                self.pressure[idx] = 0.0;
                self.pressure_prev[idx] = 0.0;
                self.pressure_next[idx] = 0.0;
            }
        }
        info!(solid = self.obstacles.solid_count(), "obstacle mask loaded");
        Ok(())
    }

    /// Whether the cell at `(x, y)` is solid. Out-of-bounds cells are fluid.
    pub fn is_obstacle(&self, x: i32, y: i32) -> bool {
        self.obstacles.is_obstacle(x, y)
    }

    /// Zero all pressure fields and reset the active region. Obstacles and
    /// sources stay.
    pub fn clear(&mut self) {
        self.pressure.fill(0.0);
        self.pressure_prev.fill(0.0);
        self.pressure_next.fill(0.0);
        self.active.clear();
    }

    // ------------------------------------------------------------------
    // Listener
    // ------------------------------------------------------------------

    /// Move the listener, clamping to the grid.
    pub fn set_listener(&mut self, x: i32, y: i32) {
        self.listener.x = x.clamp(0, self.width as i32 - 1) as usize;
        self.listener.y = y.clamp(0, self.height as i32 - 1) as usize;
    }

    /// Enable or disable listener capture. The sample buffer is not cleared.
    pub fn set_listener_enabled(&mut self, enabled: bool) {
        self.listener.enabled = enabled;
        debug!(
            enabled,
            x = self.listener.x,
            y = self.listener.y,
            "listener toggled"
        );
    }

    /// Listener position and enable state.
    pub fn listener(&self) -> Listener {
        self.listener
    }

    /// Take the listener samples collected since the last drain, leaving
    /// the buffer empty.
    pub fn drain_listener(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.listener_samples)
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Register an audio source and return its id.
    pub fn add_source(&mut self, source: AudioSource) -> u64 {
        self.active
            .expand(source.x(), source.y(), SOURCE_REGION_RADIUS);
        let (x, y) = (source.x(), source.y());
        let id = self.sources.add(source);
        info!(id, x, y, "audio source added");
        id
    }

    /// Remove a source by id. Returns whether it existed.
    pub fn remove_source(&mut self, id: u64) -> bool {
        let removed = self.sources.remove(id);
        if removed {
            info!(id, "audio source removed");
        }
        removed
    }

    /// Drop all sources.
    pub fn clear_sources(&mut self) {
        self.sources.clear();
    }

    /// Shared access to a source.
    pub fn source(&self, id: u64) -> Option<&AudioSource> {
        self.sources.get(id)
    }

    /// Mutable access to a source (reposition, volume, transport).
    pub fn source_mut(&mut self, id: u64) -> Option<&mut AudioSource> {
        self.sources.get_mut(id)
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Apply an environment preset. Only the damping and wall-reflection
    /// coefficients change; pressure fields and sources are untouched.
    pub fn apply_preset(&mut self, preset: &DampingPreset) {
        self.damping = preset.damping();
        self.wall_reflection = preset.wall_reflection();
        self.preset = preset.clone();
        info!(
            name = preset.name(),
            damping = self.damping,
            wall_reflection = self.wall_reflection,
            "preset applied"
        );
    }

    /// The most recently applied preset.
    pub fn preset(&self) -> &DampingPreset {
        &self.preset
    }

    /// Set the speed of sound (m/s, saturated at 1).
    pub fn set_wave_speed(&mut self, speed: f32) {
        self.params.speed_of_sound = speed.max(1.0);
    }

    /// Set the air damping coefficient, saturated into `(0, 1]`.
    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(f32::EPSILON, 1.0);
    }

    /// Set the wall reflection coefficient, saturated into `[0, 1]`.
    pub fn set_wall_reflection(&mut self, reflection: f32) {
        self.wall_reflection = reflection.clamp(0.0, 1.0);
    }

    /// Current air damping coefficient.
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Current wall reflection coefficient.
    pub fn wall_reflection(&self) -> f32 {
        self.wall_reflection
    }

    /// Physical grid parameters.
    pub fn params(&self) -> &AcousticParams {
        &self.params
    }

    // ------------------------------------------------------------------
    // GPU backend
    // ------------------------------------------------------------------

    /// Install a frame backend. If it reports itself available it is used
    /// starting with the next frame.
    pub fn set_backend(&mut self, backend: Box<dyn FrameBackend>) {
        if backend.is_available() {
            info!("GPU backend installed and enabled");
            self.use_gpu = true;
        } else {
            warn!("GPU backend installed but unavailable, staying on CPU");
            self.use_gpu = false;
        }
        self.backend = Some(backend);
    }

    /// Toggle GPU execution. Enabling without an available backend logs a
    /// warning and stays on the CPU.
    pub fn enable_gpu(&mut self, enabled: bool) {
        if enabled {
            let available = self
                .backend
                .as_ref()
                .map(|b| b.is_available())
                .unwrap_or(false);
            if available {
                self.use_gpu = true;
            } else {
                warn!("cannot enable GPU: no available backend");
                self.use_gpu = false;
            }
        } else {
            self.use_gpu = false;
        }
    }

    /// Whether an available GPU backend is installed.
    pub fn gpu_available(&self) -> bool {
        self.backend
            .as_ref()
            .map(|b| b.is_available())
            .unwrap_or(false)
    }

    /// Whether the next frame will run on the GPU.
    pub fn gpu_enabled(&self) -> bool {
        self.use_gpu
    }

    /// Description of the most recent GPU failure, if any.
    pub fn last_gpu_error(&self) -> Option<&str> {
        self.last_gpu_error.as_deref()
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    /// Grid width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Room width in metres.
    pub fn physical_width(&self) -> f32 {
        self.width as f32 * self.params.cell_size
    }

    /// Room height in metres.
    pub fn physical_height(&self) -> f32 {
        self.height as f32 * self.params.cell_size
    }

    /// Current pressure field, row-major.
    pub fn pressure_view(&self) -> &[f32] {
        &self.pressure
    }

    /// Obstacle flags, row-major.
    pub fn obstacle_view(&self) -> &[u8] {
        self.obstacles.cells()
    }

    /// Current active region.
    pub fn active_region(&self) -> &ActiveRegion {
        &self.active
    }

    /// Pressure at a cell, `None` out of bounds.
    pub fn pressure_at(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.pressure[self.index(x, y)])
    }

    /// Largest absolute pressure in the current field.
    pub fn max_pressure(&self) -> f32 {
        self.pressure.iter().fold(0.0f32, |a, p| a.max(p.abs()))
    }

    /// Sum of squared pressures in the current field.
    pub fn total_energy(&self) -> f32 {
        self.pressure.iter().map(|p| p * p).sum()
    }

    /// State snapshot for display.
    pub fn stats(&self) -> SolverStats {
        SolverStats {
            width: self.width,
            height: self.height,
            substeps_last_frame: self.substeps_last_frame,
            max_pressure: self.max_pressure(),
            total_energy: self.total_energy(),
            source_count: self.sources.len(),
            gpu_active: self.use_gpu,
        }
    }

    /// Sub-steps executed by the most recent update.
    pub fn substeps_last_frame(&self) -> usize {
        self.substeps_last_frame
    }
}
