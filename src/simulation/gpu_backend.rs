//! Backend contract for whole-frame device-side stepping.
//!
//! The CPU path and a GPU backend must be interchangeable per frame: given
//! identical inputs, both run the same stencil, boundary and injection
//! formulas and return the same listener trace (to float precision). The
//! frame driver pre-samples all audio sources, so a backend never touches
//! source state; it only adds the listed values at the listed cells.

use crate::error::Result;

/// One pre-sampled source injection: add `pressure` at cell `(x, y)` before
/// the stencil of the sub-step it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInjection {
    /// Grid x coordinate (interior, non-obstacle; validated by the driver).
    pub x: u32,
    /// Grid y coordinate.
    pub y: u32,
    /// Pressure to add in pascals.
    pub pressure: f32,
}

/// Everything a backend needs to run one frame of `substeps` sub-steps.
pub struct FrameRequest<'a> {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Current pressure field at frame start, row-major.
    pub pressure: &'a [f32],
    /// Previous pressure field at frame start.
    pub pressure_prev: &'a [f32],
    /// Obstacle flags (0 = fluid).
    pub obstacles: &'a [u8],
    /// Pre-sampled injections, one vector per sub-step.
    pub sources_per_step: &'a [Vec<SourceInjection>],
    /// Listener cell, or `None` when capture is disabled.
    pub listener: Option<(u32, u32)>,
    /// Number of sub-steps to run.
    pub substeps: u32,
    /// Stencil coefficient `(c*dt/dx)^2` for each sub-step.
    pub c2_dt2_dx2: f32,
    /// Courant number `c*dt/dx`, used by the absorbing boundary.
    pub courant: f32,
    /// Air damping per sub-step.
    pub damping: f32,
    /// Wall reflection coefficient; below 0.1 selects the absorbing regime.
    pub wall_reflection: f32,
    /// Active region `(min_x, min_y, max_x, max_y)`, already clipped.
    pub region: (u32, u32, u32, u32),
}

/// Fields and listener trace after a frame.
pub struct FrameResult {
    /// Final current pressure field.
    pub pressure: Vec<f32>,
    /// Final previous pressure field.
    pub pressure_prev: Vec<f32>,
    /// One listener sample per sub-step (empty when capture is disabled).
    pub listener_samples: Vec<f32>,
}

/// A device-side frame executor.
///
/// Implementations keep the pressure state on the device for the whole
/// frame and transfer only the initial upload and final readback.
pub trait FrameBackend: Send {
    /// Whether the backend can currently execute frames.
    fn is_available(&self) -> bool;

    /// Run `substeps` sub-steps and return the final state. An error makes
    /// the driver fall back to the CPU path with the same inputs.
    fn execute_frame(&mut self, request: &FrameRequest<'_>) -> Result<FrameResult>;

    /// Description of the most recent failure, if any.
    fn last_error(&self) -> Option<&str>;
}
