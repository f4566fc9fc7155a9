//! PCM sample data and synthesized presets.

use std::f32::consts::PI;
use std::sync::Arc;

use rand::Rng;

use crate::error::{Result, WaveError};

/// Default synthesis sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Immutable mono PCM buffer with a sample rate and a label.
///
/// Values are nominally in `[-1, 1]` (not enforced). Samples are shared
/// between sources by handle (`Arc<AudioSample>`) because the same buffer
/// commonly backs several positioned sources.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    data: Vec<f32>,
    sample_rate: u32,
    name: String,
}

impl AudioSample {
    /// Create a sample from PCM data.
    ///
    /// Fails with [`WaveError::InvalidSample`] when `data` is empty or
    /// `sample_rate` is zero.
    pub fn new(data: Vec<f32>, sample_rate: u32, name: impl Into<String>) -> Result<Self> {
        if data.is_empty() {
            return Err(WaveError::invalid_sample("PCM data cannot be empty"));
        }
        if sample_rate == 0 {
            return Err(WaveError::invalid_sample("sample rate must be positive"));
        }
        Ok(Self {
            data,
            sample_rate,
            name: name.into(),
        })
    }

    /// PCM data in `[-1, 1]`.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Human-readable label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of PCM frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: empty samples cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        self.data.len() as f32 / self.sample_rate as f32
    }

    /// Sample at `index`, or 0 past the end.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }

    /// Wrap in a shared handle for use by sources.
    pub fn into_shared(self) -> Arc<AudioSample> {
        Arc::new(self)
    }
}

/// Factory for common synthesized test signals.
pub struct SamplePresets;

impl SamplePresets {
    /// Kick drum: 400 ms exponential pitch sweep from 150 Hz down to 50 Hz
    /// with an `exp(-t/0.3)` amplitude envelope and a short noisy click for
    /// the attack transient.
    pub fn kick(sample_rate: u32) -> AudioSample {
        let duration = 0.4;
        let n = (duration * sample_rate as f32) as usize;
        let mut rng = rand::thread_rng();

        let start_freq = 150.0;
        let end_freq = 50.0;
        let decay_time = 0.3;

        let mut data = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;

            let freq_ratio = (-t * 8.0).exp();
            let freq = end_freq + (start_freq - end_freq) * freq_ratio;
            let amplitude = (-t / decay_time).exp();
            let tone = amplitude * (2.0 * PI * freq * t).sin();

            let click = 0.3 * (-t * 100.0).exp() * rng.gen_range(-1.0f32..1.0);
            data.push((tone + click).clamp(-1.0, 1.0));
        }

        AudioSample::new(data, sample_rate, "Kick Drum").expect("kick synthesis is non-empty")
    }

    /// Snare drum: 200 ms of a 200 Hz head tone mixed 30/70 with white
    /// noise, shaped by an `exp(-t/0.15)` envelope.
    pub fn snare(sample_rate: u32) -> AudioSample {
        let duration = 0.2;
        let n = (duration * sample_rate as f32) as usize;
        let mut rng = rand::thread_rng();

        let tone_freq = 200.0;
        let decay_time = 0.15;

        let mut data = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-t / decay_time).exp();
            let tone = 0.3 * (2.0 * PI * tone_freq * t).sin();
            let noise = 0.7 * rng.gen_range(-1.0f32..1.0);
            data.push((envelope * (tone + noise)).clamp(-1.0, 1.0));
        }

        AudioSample::new(data, sample_rate, "Snare Drum").expect("snare synthesis is non-empty")
    }

    /// Pure sine tone with a short linear fade at both ends to avoid clicks.
    /// The fade is 10 ms or a quarter of the duration, whichever is smaller.
    pub fn tone(frequency: f32, duration: f32, sample_rate: u32) -> AudioSample {
        let n = ((duration * sample_rate as f32) as usize).max(1);
        let fade = ((0.01 * sample_rate as f32) as usize).min(n / 4);

        let mut data = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * frequency * t).sin();

            let envelope = if fade > 0 && i < fade {
                i as f32 / fade as f32
            } else if fade > 0 && i > n - fade {
                (n - i) as f32 / fade as f32
            } else {
                1.0
            };
            data.push(sample * envelope);
        }

        AudioSample::new(data, sample_rate, format!("Tone {frequency:.1} Hz"))
            .expect("tone synthesis is non-empty")
    }

    /// Gaussian impulse for room-response measurements: centred at half the
    /// duration with sigma of an eighth of it, normalised to peak 1.
    pub fn impulse(duration: f32, sample_rate: u32) -> AudioSample {
        let n = ((duration * sample_rate as f32) as usize).max(1);
        let center = n as f32 / 2.0;
        let width = n as f32 / 8.0;

        let mut data: Vec<f32> = (0..n)
            .map(|i| {
                let t = (i as f32 - center) / width;
                (-t * t).exp()
            })
            .collect();

        let peak = data.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            for s in &mut data {
                *s /= peak;
            }
        }

        AudioSample::new(data, sample_rate, "Impulse").expect("impulse synthesis is non-empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariants() {
        assert!(AudioSample::new(vec![], 48_000, "empty").is_err());
        assert!(AudioSample::new(vec![0.5], 0, "no rate").is_err());
        let s = AudioSample::new(vec![0.1, 0.2], 48_000, "ok").unwrap();
        assert_eq!(s.len(), 2);
        assert!((s.duration() - 2.0 / 48_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_past_end_is_zero() {
        let s = AudioSample::new(vec![0.5, -0.5], 48_000, "short").unwrap();
        assert_eq!(s.sample(0), 0.5);
        assert_eq!(s.sample(1), -0.5);
        assert_eq!(s.sample(2), 0.0);
        assert_eq!(s.sample(1_000_000), 0.0);
    }

    #[test]
    fn test_kick_shape() {
        let kick = SamplePresets::kick(DEFAULT_SAMPLE_RATE);
        assert_eq!(kick.len(), (0.4 * 48_000.0) as usize);
        assert!(kick.data().iter().all(|s| (-1.0..=1.0).contains(s)));
        // Strong attack, quiet tail.
        let head: f32 = kick.data()[..1000].iter().map(|s| s.abs()).sum();
        let tail: f32 = kick.data()[kick.len() - 1000..].iter().map(|s| s.abs()).sum();
        assert!(head > tail * 2.0, "head {head} should dominate tail {tail}");
    }

    #[test]
    fn test_snare_clipped_and_decaying() {
        let snare = SamplePresets::snare(DEFAULT_SAMPLE_RATE);
        assert_eq!(snare.len(), (0.2 * 48_000.0) as usize);
        assert!(snare.data().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_tone_fades() {
        let tone = SamplePresets::tone(440.0, 1.0, DEFAULT_SAMPLE_RATE);
        assert_eq!(tone.len(), 48_000);
        // Fade-in starts silent.
        assert_eq!(tone.sample(0), 0.0);
        // Mid-signal oscillates at nearly full scale.
        let peak = tone.data()[10_000..20_000]
            .iter()
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.9);
    }

    #[test]
    fn test_impulse_normalised() {
        let imp = SamplePresets::impulse(0.005, DEFAULT_SAMPLE_RATE);
        let peak = imp.data().iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
        // Energy is concentrated in the middle.
        let mid = imp.len() / 2;
        assert!(imp.sample(mid) > 0.9);
        assert!(imp.sample(0) < 0.01);
    }
}
