//! Simulation core: the FDTD pressure solver and its supporting pieces.

pub mod active_region;
pub mod gpu_backend;
pub mod obstacles;
pub mod physics;
pub mod presets;
pub mod solver;

#[cfg(feature = "gpu")]
pub mod wgpu_compute;

pub use active_region::ActiveRegion;
pub use gpu_backend::{FrameBackend, FrameRequest, FrameResult, SourceInjection};
pub use obstacles::ObstacleMask;
pub use physics::{
    pressure_to_db_spl, AcousticParams, CFL_SAFE, DEFAULT_CELL_SIZE, DEFAULT_SOUND_SPEED,
};
pub use presets::{for_realistic, for_testing, for_visualization, DampingPreset, PresetKind};
pub use solver::{Listener, SolverStats, WaveSolver};

#[cfg(feature = "gpu")]
pub use wgpu_compute::WgpuFrameBackend;
