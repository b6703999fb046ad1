//! Audio augmentation
//!
//! [`OlaAugmenter`] implements both transforms in the time domain:
//! - time stretch: Hann-windowed overlap-add with the synthesis hop scaled by
//!   the stretch rate, normalized by the summed window
//! - pitch shift: time stretch by `2^(semitones/12)` followed by linear
//!   resampling back to the original length
//!
//! OLA smears phase across overlapping frames, which is acceptable for
//! transcription robustness checks but not for listening.

use super::Transform;
use crate::error::ConsensusError;
use crate::io::AudioStem;

/// Window-sum floor below which output samples are left silent
const NORM_EPSILON: f32 = 1e-6;

/// Produces a transformed copy of a stem
pub trait AudioAugmenter: Send + Sync {
    /// Apply a transform
    fn apply(&self, stem: &AudioStem, transform: &Transform) -> Result<AudioStem, ConsensusError>;
}

/// Overlap-add augmenter
#[derive(Debug, Clone)]
pub struct OlaAugmenter {
    frame_size: usize,
    hop_size: usize,
}

impl Default for OlaAugmenter {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
        }
    }
}

impl OlaAugmenter {
    /// Create an augmenter with the given frame size and analysis hop
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if the hop is zero or exceeds the frame.
    pub fn new(frame_size: usize, hop_size: usize) -> Result<Self, ConsensusError> {
        if frame_size < 2 || hop_size == 0 || hop_size > frame_size {
            return Err(ConsensusError::InvalidConfig(format!(
                "OLA needs frame_size >= 2 and 0 < hop_size <= frame_size, got {}/{}",
                frame_size, hop_size
            )));
        }
        Ok(Self {
            frame_size,
            hop_size,
        })
    }

    /// Stretch samples so the output is `rate` times as long
    pub fn time_stretch(&self, samples: &[f32], rate: f64) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let target_len = ((samples.len() as f64 * rate).round() as usize).max(1);
        let synthesis_hop = ((self.hop_size as f64 * rate).round() as usize).max(1);
        let n_frames = samples.len().div_ceil(self.hop_size);

        let window = hann(self.frame_size);
        let out_len = (n_frames - 1) * synthesis_hop + self.frame_size;
        let mut output = vec![0.0f32; out_len.max(target_len)];
        let mut norm = vec![0.0f32; output.len()];

        for frame in 0..n_frames {
            let in_start = frame * self.hop_size;
            let out_start = frame * synthesis_hop;
            for (i, &w) in window.iter().enumerate() {
                let sample = samples.get(in_start + i).copied().unwrap_or(0.0);
                output[out_start + i] += sample * w;
                norm[out_start + i] += w;
            }
        }

        for (sample, &weight) in output.iter_mut().zip(norm.iter()) {
            *sample = if weight > NORM_EPSILON { *sample / weight } else { 0.0 };
        }
        output.truncate(target_len);
        output
    }

    /// Shift pitch by `semitones`, preserving length
    pub fn pitch_shift(&self, samples: &[f32], semitones: i32) -> Vec<f32> {
        if samples.is_empty() || semitones == 0 {
            return samples.to_vec();
        }
        let factor = 2f64.powf(f64::from(semitones) / 12.0);
        let stretched = self.time_stretch(samples, factor);
        resample_linear(&stretched, factor, samples.len())
    }
}

impl AudioAugmenter for OlaAugmenter {
    fn apply(&self, stem: &AudioStem, transform: &Transform) -> Result<AudioStem, ConsensusError> {
        let samples = match *transform {
            Transform::Identity => return Ok(stem.clone()),
            Transform::PitchShift { semitones } => self.pitch_shift(stem.samples(), semitones),
            Transform::TimeStretch { rate } => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(ConsensusError::AugmentationFailed(format!(
                        "Invalid stretch rate {}",
                        rate
                    )));
                }
                self.time_stretch(stem.samples(), rate)
            }
        };
        Ok(stem.with_samples(samples))
    }
}

fn hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        .collect()
}

/// Read `len` samples from `input` at positions `i * step`
fn resample_linear(input: &[f32], step: f64, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(&a), Some(&b)) => a + (b - a) * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}
