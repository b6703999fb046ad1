//! Separated-stem quality check
//!
//! Poor source separation silently yields near-silent or wrong-timbre stems.
//! A specialist model run on such a stem hallucinates a few notes or none,
//! so the stem is checked before the specialist is invoked:
//!
//! 1. RMS level must reach an absolute floor
//! 2. Mean spectral centroid must lie in the expected timbre band
//!
//! # Example
//!
//! ```
//! use note_consensus::{AudioStem, StemValidationConfig, StemValidator};
//!
//! let samples: Vec<f32> = (0..44100)
//!     .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin() * 0.5)
//!     .collect();
//! let stem = AudioStem::new(samples, 44100)?;
//! let report = StemValidator::new(StemValidationConfig::default()).validate(&stem);
//! assert!(report.is_trusted());
//! # Ok::<(), note_consensus::ConsensusError>(())
//! ```

use crate::config::StemValidationConfig;
use crate::io::AudioStem;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Verdict on a stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StemVerdict {
    /// Stem looks like the expected instrument
    Accepted,
    /// RMS below the floor (silent or near-silent separation)
    TooQuiet,
    /// Spectral centroid outside the expected band
    WrongTimbre,
}

/// Measured statistics and verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemReport {
    /// RMS level (linear)
    pub rms: f32,
    /// Mean spectral centroid in Hz (None when not computed)
    pub spectral_centroid_hz: Option<f32>,
    /// Verdict
    pub verdict: StemVerdict,
}

impl StemReport {
    /// True if the specialist may be run on this stem
    pub fn is_trusted(&self) -> bool {
        self.verdict == StemVerdict::Accepted
    }
}

/// Pre-transcription stem validator
#[derive(Debug, Clone)]
pub struct StemValidator {
    config: StemValidationConfig,
}

impl StemValidator {
    /// Create a validator
    pub fn new(config: StemValidationConfig) -> Self {
        Self { config }
    }

    /// Measure a stem and decide whether to trust it
    pub fn validate(&self, stem: &AudioStem) -> StemReport {
        let rms = stem.rms();
        log::debug!(
            "Validating stem: {} samples at {} Hz, rms={:.5}",
            stem.len(),
            stem.sample_rate(),
            rms
        );

        if stem.is_empty() || rms < self.config.min_rms {
            log::warn!(
                "Stem rejected: rms {:.5} below floor {:.5}",
                rms,
                self.config.min_rms
            );
            return StemReport {
                rms,
                spectral_centroid_hz: None,
                verdict: StemVerdict::TooQuiet,
            };
        }

        let centroid = spectral_centroid(stem, self.config.frame_size, self.config.hop_size);
        let verdict = match centroid {
            Some(c) if c >= self.config.min_centroid_hz && c <= self.config.max_centroid_hz => {
                StemVerdict::Accepted
            }
            Some(c) => {
                log::warn!(
                    "Stem rejected: spectral centroid {:.1} Hz outside {:.1}-{:.1} Hz",
                    c,
                    self.config.min_centroid_hz,
                    self.config.max_centroid_hz
                );
                StemVerdict::WrongTimbre
            }
            None => {
                log::warn!("Stem rejected: no frame with measurable spectrum");
                StemVerdict::TooQuiet
            }
        };

        StemReport {
            rms,
            spectral_centroid_hz: centroid,
            verdict,
        }
    }
}

/// Mean spectral centroid over Hann-windowed frames, in Hz
///
/// Stems shorter than one frame are zero-padded to a single frame. Frames
/// with no spectral energy are skipped; returns `None` if every frame is
/// silent.
pub fn spectral_centroid(stem: &AudioStem, frame_size: usize, hop_size: usize) -> Option<f32> {
    if stem.is_empty() || frame_size < 2 || hop_size == 0 {
        return None;
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);

    let window: Vec<f32> = (0..frame_size)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (frame_size - 1) as f32).cos()
        })
        .collect();
    let bin_hz = stem.sample_rate() as f32 / frame_size as f32;

    let padded;
    let frames: Vec<&[f32]> = if stem.len() < frame_size {
        let mut buf = stem.samples().to_vec();
        buf.resize(frame_size, 0.0);
        padded = buf;
        vec![padded.as_slice()]
    } else {
        stem.frames(frame_size, hop_size).collect()
    };

    let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];
    let mut centroid_sum = 0.0f64;
    let mut counted = 0usize;

    for frame in frames {
        for ((slot, &sample), &w) in buffer.iter_mut().zip(frame.iter()).zip(window.iter()) {
            *slot = Complex::new(sample * w, 0.0);
        }
        fft.process(&mut buffer);

        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        for (k, bin) in buffer.iter().take(frame_size / 2 + 1).enumerate() {
            let magnitude = bin.norm();
            weighted += k as f32 * bin_hz * magnitude;
            total += magnitude;
        }

        if total > EPSILON {
            centroid_sum += f64::from(weighted / total);
            counted += 1;
        }
    }

    if counted == 0 {
        return None;
    }
    Some((centroid_sum / counted as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> AudioStem {
        let n = (seconds * sample_rate as f32) as usize;
        let samples = (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * amplitude)
            .collect();
        AudioStem::new(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_tonal_stem_accepted() {
        let report = StemValidator::new(StemValidationConfig::default()).validate(&sine(440.0, 0.5, 1.0, 44100));
        assert_eq!(report.verdict, StemVerdict::Accepted);
        assert!((report.rms - 0.3535).abs() < 0.01);
        let centroid = report.spectral_centroid_hz.unwrap();
        assert!(centroid > 300.0 && centroid < 800.0, "centroid {}", centroid);
    }

    #[test]
    fn test_silent_stem_rejected() {
        let stem = AudioStem::new(vec![0.0; 44100], 44100).unwrap();
        let report = StemValidator::new(StemValidationConfig::default()).validate(&stem);
        assert_eq!(report.verdict, StemVerdict::TooQuiet);
        assert!(report.spectral_centroid_hz.is_none());

        let empty = AudioStem::new(vec![], 44100).unwrap();
        assert!(!StemValidator::new(StemValidationConfig::default()).validate(&empty).is_trusted());
    }

    #[test]
    fn test_near_silent_stem_rejected() {
        let report = StemValidator::new(StemValidationConfig::default()).validate(&sine(440.0, 0.001, 1.0, 44100));
        assert_eq!(report.verdict, StemVerdict::TooQuiet);
    }

    #[test]
    fn test_wrong_timbre_rejected() {
        let validator = StemValidator::new(StemValidationConfig::default());
        let hiss = validator.validate(&sine(12000.0, 0.5, 1.0, 44100));
        assert_eq!(hiss.verdict, StemVerdict::WrongTimbre);

        let rumble = validator.validate(&sine(40.0, 0.5, 1.0, 44100));
        assert_eq!(rumble.verdict, StemVerdict::WrongTimbre);
    }

    #[test]
    fn test_short_stem_is_padded() {
        let stem = sine(1000.0, 0.5, 0.01, 44100);
        assert!(stem.len() < 2048);
        let centroid = spectral_centroid(&stem, 2048, 1024).unwrap();
        assert!(centroid > 0.0 && centroid < 22050.0, "centroid {}", centroid);
    }
}
