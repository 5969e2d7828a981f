//! In-memory mono PCM audio.

use std::time::Duration;

/// Decoded mono samples in `[-1.0, 1.0]` at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A zero-length buffer.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Digital silence lasting `duration_ms`.
    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        Self::new(vec![0.0; samples_for_ms(duration_ms, sample_rate)], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Number of samples covering `duration_ms` at `sample_rate` (truncating).
pub fn samples_for_ms(duration_ms: u64, sample_rate: u32) -> usize {
    (u64::from(sample_rate) * duration_ms / 1000) as usize
}
