//! Real audio device output via cpal.
//!
//! Opens a mono f32 output stream at the ring's device rate; the stream
//! callback drains the [`AudioOutputRing`] without allocating.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::error::{Result, WaveError};

use super::output::AudioOutputRing;

/// Owns the cpal output stream feeding from a shared ring.
pub struct AudioOutput {
    stream: cpal::Stream,
    ring: Arc<AudioOutputRing>,
}

impl AudioOutput {
    /// Open the default output device at the ring's rate.
    pub fn new(ring: Arc<AudioOutputRing>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| WaveError::DeviceError("no default output device".into()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(ring.device_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let callback_ring = Arc::clone(&ring);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| callback_ring.fill(data),
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| WaveError::DeviceError(e.to_string()))?;

        info!(rate = ring.device_rate(), "audio output initialized");
        Ok(Self { stream, ring })
    }

    /// Start playback.
    pub fn start(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| WaveError::DeviceError(e.to_string()))
    }

    /// Pause playback.
    pub fn stop(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| WaveError::DeviceError(e.to_string()))
    }

    /// The ring this stream drains.
    pub fn ring(&self) -> &Arc<AudioOutputRing> {
        &self.ring
    }
}
