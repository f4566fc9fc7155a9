//! Audio side of the simulation: PCM samples, positioned sources, and the
//! pressure-to-audio output ring.

pub mod output;
pub mod sample;
pub mod source;

#[cfg(feature = "playback")]
pub mod device;

pub use output::{AudioOutputRing, MAX_AMPLITUDE, SIMULATION_FPS};
pub use sample::{AudioSample, SamplePresets, DEFAULT_SAMPLE_RATE};
pub use source::{db_to_gain, gain_to_db, AudioSource, SourceSet, REFERENCE_PRESSURE};

#[cfg(feature = "playback")]
pub use device::AudioOutput;
