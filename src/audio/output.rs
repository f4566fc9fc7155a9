//! Pressure-to-audio output ring.
//!
//! The simulation thread submits one vector of listener pressure samples per
//! frame; the device callback (on the audio thread) pulls fixed-size chunks.
//! Each submission is resampled to exactly `device_rate / 60` ring samples so
//! the ring neither over- nor under-runs in steady state.
//!
//! Locking: a mutex guards the ring heads, held only for the copy in/out.
//! Mute and gain are atomics so the callback never waits on the writer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use super::source::REFERENCE_PRESSURE;

/// Hard clip applied to outgoing samples to prevent device clipping.
pub const MAX_AMPLITUDE: f32 = 0.95;

/// Host frame rate assumed for the per-frame resampling budget.
pub const SIMULATION_FPS: f32 = 60.0;

struct RingState {
    buffer: Vec<f32>,
    write: usize,
    read: usize,
    available: usize,
}

/// Single-writer single-reader audio ring with per-frame resampling.
pub struct AudioOutputRing {
    state: Mutex<RingState>,
    gain: AtomicU32,
    muted: AtomicBool,
    // Last pressure of the previous frame, anchor for interpolation.
    // Written only by the submitting thread.
    last_pressure: AtomicU32,
    device_rate: u32,
}

impl AudioOutputRing {
    /// Create a ring holding one second of audio at `device_rate`.
    pub fn new(device_rate: u32) -> Self {
        let capacity = device_rate.max(1) as usize;
        Self {
            state: Mutex::new(RingState {
                buffer: vec![0.0; capacity],
                write: 0,
                read: 0,
                available: 0,
            }),
            gain: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
            last_pressure: AtomicU32::new(0.0f32.to_bits()),
            device_rate,
        }
    }

    /// Device sample rate in Hz.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Ring samples produced per simulation frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.device_rate as f32 / SIMULATION_FPS).round() as usize
    }

    /// Output gain multiplier (>= 0).
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set the output gain multiplier.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }

    /// Whether output is muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Mute or unmute output. Takes effect within one device callback.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Number of queued samples (mainly for tests and diagnostics).
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    fn convert(&self, pressure: f32) -> f32 {
        (pressure / REFERENCE_PRESSURE * self.gain()).clamp(-MAX_AMPLITUDE, MAX_AMPLITUDE)
    }

    /// Submit one frame of listener pressure samples.
    ///
    /// The samples are resampled to exactly [`AudioOutputRing::samples_per_frame`]
    /// ring entries: linear interpolation when the frame carries fewer values,
    /// chunked averaging when it carries more. The previous frame's final
    /// pressure anchors the interpolation so frames join without steps.
    ///
    /// `time_scale` is accepted for symmetry with the simulation update but
    /// does not change the resampling ratio, which is fixed by the device
    /// rate and the host frame rate.
    pub fn submit_samples(&self, pressures: &[f32], _time_scale: f32) {
        let m = self.samples_per_frame();
        let len = pressures.len();
        let last = f32::from_bits(self.last_pressure.load(Ordering::Relaxed));

        // Resample and convert outside the lock; the callback must never
        // wait on allocation.
        let mut out = Vec::with_capacity(m);
        if len == 0 {
            out.resize(m, self.convert(last));
        } else if len < m {
            // Virtual sequence [last, p0 .. p_{len-1}] sampled at m points.
            let value_at = |idx: usize| -> f32 {
                if idx == 0 {
                    last
                } else {
                    pressures[(idx - 1).min(len - 1)]
                }
            };
            for i in 0..m {
                let x = (i + 1) as f32 * len as f32 / m as f32;
                let j = x.floor() as usize;
                let frac = x - j as f32;
                let value = if j >= len {
                    value_at(len)
                } else {
                    value_at(j) + frac * (value_at(j + 1) - value_at(j))
                };
                out.push(self.convert(value));
            }
        } else {
            for i in 0..m {
                let start = i * len / m;
                let end = ((i + 1) * len / m).max(start + 1);
                let sum: f32 = pressures[start..end].iter().sum();
                out.push(self.convert(sum / (end - start) as f32));
            }
        }

        if let Some(&p) = pressures.last() {
            self.last_pressure.store(p.to_bits(), Ordering::Relaxed);
        }

        let mut state = self.state.lock();
        let capacity = state.buffer.len();
        for sample in out {
            if state.available == capacity {
                // Writer caught the reader: drop the oldest sample.
                state.read = (state.read + 1) % capacity;
                state.available -= 1;
            }
            let w = state.write;
            state.buffer[w] = sample;
            state.write = (w + 1) % capacity;
            state.available += 1;
        }
    }

    /// Fill a device buffer from the ring. Called from the audio thread;
    /// does not allocate. Under-run is served as silence, and mute replaces
    /// the output with zeros while still draining the ring.
    pub fn fill(&self, out: &mut [f32]) {
        let muted = self.is_muted();
        let mut state = self.state.lock();
        let capacity = state.buffer.len();
        for slot in out.iter_mut() {
            let sample = if state.available > 0 {
                let r = state.read;
                let s = state.buffer[r];
                state.read = (r + 1) % capacity;
                state.available -= 1;
                s
            } else {
                0.0
            };
            *slot = if muted { 0.0 } else { sample };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_frame() {
        assert_eq!(AudioOutputRing::new(48_000).samples_per_frame(), 800);
        assert_eq!(AudioOutputRing::new(44_100).samples_per_frame(), 735);
    }

    #[test]
    fn test_underrun_is_silence() {
        let ring = AudioOutputRing::new(48_000);
        let mut out = [1.0f32; 64];
        ring.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_steady_state_one_second() {
        let ring = AudioOutputRing::new(48_000);
        // 60 frames of arbitrary sub-step counts: exactly one second enters.
        for i in 0..60 {
            let count = 100 + (i % 7) * 50;
            let frame = vec![0.5f32; count];
            ring.submit_samples(&frame, 1.0);
        }
        assert_eq!(ring.available(), 48_000);
    }

    #[test]
    fn test_drop_oldest_on_overrun() {
        let ring = AudioOutputRing::new(48_000);
        for _ in 0..75 {
            ring.submit_samples(&[1.0; 32], 1.0);
        }
        // Never exceeds capacity.
        assert_eq!(ring.available(), 48_000);
    }

    #[test]
    fn test_pressure_conversion_and_clamp() {
        let ring = AudioOutputRing::new(48_000);
        // Full reference pressure maps to 1.0, clipped to 0.95.
        ring.submit_samples(&vec![REFERENCE_PRESSURE; 1000], 1.0);
        let mut out = vec![0.0f32; 800];
        ring.fill(&mut out);
        assert!(out.iter().all(|&s| (s - MAX_AMPLITUDE).abs() < 1e-6));
    }

    #[test]
    fn test_gain_applies_at_submit() {
        let ring = AudioOutputRing::new(48_000);
        ring.set_gain(0.5);
        // Half reference pressure at half gain: 0.25.
        ring.submit_samples(&vec![REFERENCE_PRESSURE / 2.0; 1000], 1.0);
        let mut out = vec![0.0f32; 16];
        ring.fill(&mut out);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_mute_silences_but_drains() {
        let ring = AudioOutputRing::new(48_000);
        ring.submit_samples(&vec![REFERENCE_PRESSURE; 800], 1.0);
        ring.set_muted(true);
        let mut out = vec![1.0f32; 100];
        ring.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        // The ring kept draining while muted.
        assert_eq!(ring.available(), 700);
    }

    #[test]
    fn test_upsampling_ramps_between_frames() {
        let ring = AudioOutputRing::new(48_000);
        ring.submit_samples(&[0.0], 1.0);
        ring.submit_samples(&[REFERENCE_PRESSURE], 1.0);

        let mut out = vec![0.0f32; 1600];
        ring.fill(&mut out);

        // First frame is flat silence.
        assert!(out[..800].iter().all(|&s| s.abs() < 1e-6));
        // Second frame ramps from the previous anchor up to full scale.
        let second = &out[800..];
        assert!(second[0] < 0.01);
        assert!((second[799] - MAX_AMPLITUDE).abs() < 1e-6);
        for w in second.windows(2) {
            assert!(w[1] >= w[0] - 1e-6, "ramp must be monotonic");
        }
    }

    #[test]
    fn test_decimation_averages_chunks() {
        let ring = AudioOutputRing::new(48_000);
        // 1600 sub-step samples alternating around 10 Pa average.
        let frame: Vec<f32> = (0..1600)
            .map(|i| if i % 2 == 0 { 8.0 } else { 12.0 })
            .collect();
        ring.submit_samples(&frame, 1.0);
        let mut out = vec![0.0f32; 800];
        ring.fill(&mut out);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-6, "chunk average should be 10 Pa -> 0.5");
        }
    }
}
