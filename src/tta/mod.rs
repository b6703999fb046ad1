//! Test-time augmentation (TTA)
//!
//! Transcribes several perturbed copies of a stem, maps every variant's notes
//! back into the original pitch space and timeline, and re-votes across the
//! variants. Errors from one augmentation are not hidden behind a partial
//! result: the whole run fails and the caller decides how to fall back.
//!
//! Algorithm:
//! 1. Build the variant list (untransformed original first, weight 1.0)
//! 2. For each variant: apply the transform, transcribe, reverse the transform
//! 3. Re-vote with a wider onset tolerance, keeping buckets that at least
//!    `min_votes` variants agree on
//!
//! With the `parallel` feature the per-variant transcriptions run on rayon.

pub mod augment;
pub mod revote;

pub use augment::{AudioAugmenter, OlaAugmenter};
pub use revote::{reverse_transform, revote, VariantNotes};

use crate::config::TtaConfig;
use crate::error::ConsensusError;
use crate::io::AudioStem;
use crate::note::{Matcher, Note};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Largest pitch shift accepted, in semitones
const MAX_SHIFT_SEMITONES: i32 = 24;

/// Audio transform applied to produce a variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Untransformed original
    Identity,
    /// Pitch shift by whole semitones (positive = up)
    PitchShift {
        /// Shift in semitones
        semitones: i32,
    },
    /// Time stretch; `rate` scales durations (1.05 = 5% longer)
    TimeStretch {
        /// Duration scale factor
        rate: f64,
    },
}

/// One configured augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSpec {
    /// Name used in logs and reports
    pub name: String,
    /// Transform to apply
    pub transform: Transform,
    /// Vote weight relative to the original (1.0)
    pub weight: f32,
}

impl AugmentationSpec {
    /// Create a spec
    pub fn new(name: impl Into<String>, transform: Transform, weight: f32) -> Self {
        Self {
            name: name.into(),
            transform,
            weight,
        }
    }

    /// The untransformed original with weight 1.0
    pub fn original() -> Self {
        Self::new("original", Transform::Identity, 1.0)
    }

    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ConsensusError::InvalidConfig(format!(
                "Augmentation '{}' weight must be >= 0, got {}",
                self.name, self.weight
            )));
        }
        match self.transform {
            Transform::Identity => Ok(()),
            Transform::PitchShift { semitones } => {
                if semitones.abs() > MAX_SHIFT_SEMITONES {
                    return Err(ConsensusError::InvalidConfig(format!(
                        "Augmentation '{}' shift {} exceeds ±{} semitones",
                        self.name, semitones, MAX_SHIFT_SEMITONES
                    )));
                }
                Ok(())
            }
            Transform::TimeStretch { rate } => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(ConsensusError::InvalidConfig(format!(
                        "Augmentation '{}' stretch rate must be > 0, got {}",
                        self.name, rate
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Per-augmentation note count of a TTA run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationCount {
    /// Augmentation name
    pub name: String,
    /// Vote weight
    pub weight: f32,
    /// Notes transcribed from the variant (after reversal)
    pub note_count: usize,
}

/// Result of a TTA run
#[derive(Debug, Clone, PartialEq)]
pub struct TtaOutcome {
    /// Consensus notes, sorted by onset
    pub notes: Vec<Note>,
    /// Note counts per augmentation, in run order
    pub per_augmentation: Vec<AugmentationCount>,
}

/// Runs augmentation, transcription, reversal and re-voting
pub struct TtaOrchestrator<'a> {
    config: TtaConfig,
    augmenter: &'a dyn AudioAugmenter,
    matcher: Matcher,
}

impl<'a> TtaOrchestrator<'a> {
    /// Create an orchestrator
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if the TTA configuration is invalid.
    pub fn new(config: TtaConfig, augmenter: &'a dyn AudioAugmenter) -> Result<Self, ConsensusError> {
        config.validate()?;
        let matcher = Matcher::new(config.onset_tolerance)?;
        Ok(Self {
            config,
            augmenter,
            matcher,
        })
    }

    /// Augmentations to run: the original first, then the configured ones
    ///
    /// Configured identity transforms are dropped since the original is always present.
    pub fn augmentations(&self) -> Vec<AugmentationSpec> {
        std::iter::once(AugmentationSpec::original())
            .chain(
                self.config
                    .augmentations
                    .iter()
                    .filter(|spec| spec.transform != Transform::Identity)
                    .cloned(),
            )
            .collect()
    }

    /// Run TTA over a stem
    ///
    /// `transcribe` is the non-TTA transcription pipeline; it is invoked once
    /// per variant with the augmentation that produced it.
    ///
    /// # Errors
    ///
    /// Returns the first augmentation or transcription error. No partial
    /// consensus is produced.
    pub fn run<F>(&self, stem: &AudioStem, transcribe: F) -> Result<TtaOutcome, ConsensusError>
    where
        F: Fn(&AugmentationSpec, &AudioStem) -> Result<Vec<Note>, ConsensusError> + Sync,
    {
        let specs = self.augmentations();
        log::debug!(
            "Running TTA with {} variants, tolerance={:.3}s, min_votes={}",
            specs.len(),
            self.config.onset_tolerance,
            self.config.min_votes
        );

        #[cfg(feature = "parallel")]
        let variants: Vec<VariantNotes> = specs
            .par_iter()
            .map(|spec| self.transcribe_variant(stem, spec, &transcribe))
            .collect::<Result<_, _>>()?;

        #[cfg(not(feature = "parallel"))]
        let variants: Vec<VariantNotes> = specs
            .iter()
            .map(|spec| self.transcribe_variant(stem, spec, &transcribe))
            .collect::<Result<_, _>>()?;

        let per_augmentation = variants
            .iter()
            .map(|v| AugmentationCount {
                name: v.name.clone(),
                weight: v.weight,
                note_count: v.notes.len(),
            })
            .collect();

        let notes = revote(&variants, &self.matcher, self.config.min_votes);
        log::debug!("TTA consensus: {} notes from {} variants", notes.len(), variants.len());

        Ok(TtaOutcome {
            notes,
            per_augmentation,
        })
    }

    fn transcribe_variant<F>(
        &self,
        stem: &AudioStem,
        spec: &AugmentationSpec,
        transcribe: &F,
    ) -> Result<VariantNotes, ConsensusError>
    where
        F: Fn(&AugmentationSpec, &AudioStem) -> Result<Vec<Note>, ConsensusError> + Sync,
    {
        let variant = self.augmenter.apply(stem, &spec.transform)?;
        let notes = transcribe(spec, &variant)?;
        let reversed = reverse_transform(&notes, &spec.transform);
        log::debug!(
            "TTA variant '{}': {} notes ({} after reversal)",
            spec.name,
            notes.len(),
            reversed.len()
        );
        Ok(VariantNotes {
            name: spec.name.clone(),
            weight: spec.weight,
            notes: reversed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Augmenter that encodes the transform in the first sample so the fake
    /// transcriber can produce a consistent, transformed note list.
    struct TaggingAugmenter;

    impl AudioAugmenter for TaggingAugmenter {
        fn apply(&self, stem: &AudioStem, transform: &Transform) -> Result<AudioStem, ConsensusError> {
            let tag = match transform {
                Transform::Identity => 0.0,
                Transform::PitchShift { semitones } => *semitones as f32,
                Transform::TimeStretch { rate } => 100.0 + *rate as f32,
            };
            let mut samples = stem.samples().to_vec();
            samples[0] = tag;
            Ok(stem.with_samples(samples))
        }
    }

    fn tagged_transcription(stem: &AudioStem) -> Result<Vec<Note>, ConsensusError> {
        let tag = stem.samples()[0];
        let (shift, rate) = if tag >= 100.0 {
            (0, f64::from(tag - 100.0))
        } else {
            (tag as i32, 1.0)
        };
        let base = [(60u8, 1.0), (64, 2.0), (67, 3.0)];
        Ok(base
            .iter()
            .map(|&(p, t)| {
                Note::new((p as i32 + shift) as u8, t * rate, (t + 0.5) * rate, 80).unwrap()
            })
            .collect())
    }

    #[test]
    fn test_augmentations_always_include_original() {
        let augmenter = TaggingAugmenter;
        let mut config = TtaConfig::default();
        config.augmentations.push(AugmentationSpec::new("dup", Transform::Identity, 0.5));
        let tta = TtaOrchestrator::new(config, &augmenter).unwrap();
        let specs = tta.augmentations();
        assert_eq!(specs[0], AugmentationSpec::original());
        assert_eq!(specs.iter().filter(|s| s.transform == Transform::Identity).count(), 1);
        assert_eq!(specs.len(), 5);
    }

    #[test]
    fn test_consistent_variants_recover_original() {
        let augmenter = TaggingAugmenter;
        let tta = TtaOrchestrator::new(TtaConfig::default(), &augmenter).unwrap();
        let stem = AudioStem::new(vec![0.0; 1024], 44100).unwrap();

        let outcome = tta.run(&stem, |_, variant| tagged_transcription(variant)).unwrap();

        assert_eq!(outcome.notes.len(), 3);
        assert_eq!(outcome.per_augmentation.len(), 5);
        for (note, (pitch, onset)) in outcome.notes.iter().zip([(60u8, 1.0), (64, 2.0), (67, 3.0)]) {
            assert_eq!(note.pitch(), pitch);
            assert!((note.onset() - onset).abs() < 1e-3);
            assert!((note.confidence() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_error_aborts_run() {
        let augmenter = TaggingAugmenter;
        let tta = TtaOrchestrator::new(TtaConfig::default(), &augmenter).unwrap();
        let stem = AudioStem::new(vec![0.0; 1024], 44100).unwrap();
        let calls = AtomicUsize::new(0);

        let result = tta.run(&stem, |_, variant| {
            calls.fetch_add(1, Ordering::SeqCst);
            if variant.samples()[0] == 1.0 {
                Err(ConsensusError::TranscriptionFailed("model crashed".to_string()))
            } else {
                tagged_transcription(variant)
            }
        });

        assert!(matches!(result, Err(ConsensusError::TranscriptionFailed(_))));
        #[cfg(not(feature = "parallel"))]
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_augmentation_rejected() {
        let augmenter = TaggingAugmenter;
        let mut config = TtaConfig::default();
        config.augmentations = vec![AugmentationSpec::new("bad", Transform::TimeStretch { rate: 0.0 }, 1.0)];
        assert!(TtaOrchestrator::new(config, &augmenter).is_err());
    }
}
