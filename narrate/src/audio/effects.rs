//! Optional post-processing of assembled audio. Neither pass changes length.

use super::buffer::{AudioBuffer, samples_for_ms};

/// Headroom left below full scale when normalizing, in dB.
const NORMALIZE_HEADROOM_DB: f32 = 0.1;

/// Scale so the loudest sample peaks just below full scale.
pub fn normalize(buffer: AudioBuffer) -> AudioBuffer {
    let peak = buffer
        .samples()
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));

    if peak <= f32::EPSILON {
        return buffer;
    }

    let target = 10f32.powf(-NORMALIZE_HEADROOM_DB / 20.0);
    let gain = target / peak;
    let rate = buffer.sample_rate();
    let samples = buffer.into_samples().into_iter().map(|s| s * gain).collect();
    AudioBuffer::new(samples, rate)
}

/// Apply linear fade-in and fade-out ramps.
///
/// Ramps longer than the buffer are clamped to its length.
pub fn fade(buffer: AudioBuffer, fade_in_ms: u64, fade_out_ms: u64) -> AudioBuffer {
    let rate = buffer.sample_rate();
    let mut samples = buffer.into_samples();
    let len = samples.len();

    let fade_in = samples_for_ms(fade_in_ms, rate).min(len);
    for (i, sample) in samples.iter_mut().take(fade_in).enumerate() {
        *sample *= i as f32 / fade_in as f32;
    }

    let fade_out = samples_for_ms(fade_out_ms, rate).min(len);
    for i in 0..fade_out {
        let idx = len - fade_out + i;
        samples[idx] *= (fade_out - 1 - i) as f32 / fade_out as f32;
    }

    AudioBuffer::new(samples, rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_peak() {
        let buffer = AudioBuffer::new(vec![0.25, -0.5, 0.1], 1000);
        let normalized = normalize(buffer);
        let peak = normalized
            .samples()
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - 0.98855).abs() < 1e-3);
        assert_eq!(normalized.len(), 3);
    }

    #[test]
    fn test_normalize_silence_untouched() {
        let buffer = AudioBuffer::silence(10, 1000);
        assert_eq!(normalize(buffer.clone()), buffer);
    }

    #[test]
    fn test_fade_ramps() {
        let buffer = AudioBuffer::new(vec![1.0; 10], 1000);
        let faded = fade(buffer, 4, 4);
        let s = faded.samples();
        assert_eq!(faded.len(), 10);
        assert_eq!(s[0], 0.0);
        assert_eq!(s[2], 0.5);
        assert_eq!(s[5], 1.0);
        assert_eq!(s[9], 0.0);
    }

    #[test]
    fn test_fade_longer_than_buffer() {
        let buffer = AudioBuffer::new(vec![1.0; 3], 1000);
        let faded = fade(buffer, 100, 0);
        assert_eq!(faded.len(), 3);
        assert_eq!(faded.samples()[0], 0.0);
    }
}
