//! Mono stem buffer

use crate::error::ConsensusError;

/// Mono audio stem (one separated source) with its sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStem {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioStem {
    /// Wrap mono samples, normalized to [-1.0, 1.0]
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidInput` if the sample rate is zero.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, ConsensusError> {
        if sample_rate == 0 {
            return Err(ConsensusError::InvalidInput(
                "Invalid sample rate".to_string(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Sample data
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the stem holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Root-mean-square level over the whole stem (0.0 when empty)
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }

    /// Overlapping analysis windows of `frame_size` samples every `hop_size` samples
    ///
    /// Trailing samples that do not fill a whole window are skipped. Yields
    /// nothing if either size is zero or the stem is shorter than one window.
    pub fn frames(&self, frame_size: usize, hop_size: usize) -> impl Iterator<Item = &[f32]> + '_ {
        let num_frames = if frame_size == 0 || hop_size == 0 || self.samples.len() < frame_size {
            0
        } else {
            (self.samples.len() - frame_size) / hop_size + 1
        };
        (0..num_frames).map(move |i| {
            let start = i * hop_size;
            &self.samples[start..start + frame_size]
        })
    }

    /// New stem with the same sample rate and different samples
    pub fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}
