//! # soundfield
//!
//! Real-time 2D acoustic wave simulation for closed rooms.
//!
//! A pressure field over a regular grid advances with an explicit FDTD
//! leapfrog stencil, split into CFL-stable sub-steps per host frame. Solid
//! obstacles pin pressure to zero, walls either reflect with attenuation or
//! absorb (Engquist-Majda), positioned audio sources feed PCM into the
//! field, and a virtual microphone records one pressure sample per sub-step
//! that the output ring resamples into a 48 kHz mono stream.
//!
//! ## Example
//!
//! ```
//! use soundfield::prelude::*;
//! use std::sync::Arc;
//!
//! let mut solver = WaveSolver::new(200, 100);
//! solver.apply_preset(&DampingPreset::from_kind(PresetKind::Realistic));
//! solver.set_listener(150, 50);
//! solver.set_listener_enabled(true);
//! solver.add_impulse(50, 50, 10.0, 2).unwrap();
//!
//! let ring = Arc::new(AudioOutputRing::new(48_000));
//! let mut engine = SimulationEngine::new(solver, ring);
//! engine.set_time_scale(0.01);
//! engine.tick(1.0 / 60.0);
//! ```
//!
//! ## Features
//!
//! - `gpu`: WebGPU frame backend that runs all sub-steps of a frame on the
//!   device and reads back only the final fields and listener trace.
//! - `playback`: cpal output stream draining the ring on the audio thread.

pub mod audio;
pub mod engine;
pub mod error;
pub mod simulation;

/// Convenient imports for typical hosts.
pub mod prelude {
    pub use crate::audio::{
        AudioOutputRing, AudioSample, AudioSource, SamplePresets, DEFAULT_SAMPLE_RATE,
    };
    pub use crate::engine::SimulationEngine;
    pub use crate::error::{Result, WaveError};
    pub use crate::simulation::{
        AcousticParams, DampingPreset, PresetKind, SolverStats, WaveSolver,
    };

    #[cfg(feature = "playback")]
    pub use crate::audio::AudioOutput;

    #[cfg(feature = "gpu")]
    pub use crate::simulation::WgpuFrameBackend;
}

pub use engine::SimulationEngine;
pub use error::{Result, WaveError};
pub use simulation::WaveSolver;
