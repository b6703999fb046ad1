//! Configuration parameters for the consensus engine
//!
//! Every component receives its own immutable config value at construction.
//! All structs deserialize from partial JSON (missing fields take defaults).

use crate::error::ConsensusError;
use crate::key::MinorScale;
use crate::tta::{AugmentationSpec, Transform};
use crate::voting::VotingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Model-to-model voting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Voting strategy (default: Weighted)
    pub strategy: VotingStrategy,

    /// Per-model vote weights keyed by model name
    /// (default: generalist 0.6, specialist 0.4)
    pub model_weights: BTreeMap<String, f32>,

    /// Weight for models missing from `model_weights` (default: 0.5)
    pub default_model_weight: f32,

    /// Minimum summed `weight * confidence` for a weighted group to survive (default: 0.6)
    pub confidence_threshold: f32,

    /// Onset tolerance in seconds for cross-model matching (default: 0.05)
    pub onset_tolerance: f64,

    /// Model whose raw values are kept by the intersection strategy
    /// (default: None = first model supplied)
    pub authoritative_model: Option<String>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        let mut model_weights = BTreeMap::new();
        model_weights.insert("generalist".to_string(), 0.6);
        model_weights.insert("specialist".to_string(), 0.4);
        Self {
            strategy: VotingStrategy::Weighted,
            model_weights,
            default_model_weight: 0.5,
            confidence_threshold: 0.6,
            onset_tolerance: 0.05,
            authoritative_model: None,
        }
    }
}

impl VotingConfig {
    /// Weight of a model, falling back to `default_model_weight`
    pub fn weight_for(&self, model: &str) -> f32 {
        self.model_weights
            .get(model)
            .copied()
            .unwrap_or(self.default_model_weight)
    }

    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_positive("voting.onset_tolerance", self.onset_tolerance)?;
        check_non_negative("voting.confidence_threshold", f64::from(self.confidence_threshold))?;
        check_non_negative("voting.default_model_weight", f64::from(self.default_model_weight))?;
        for (model, weight) in &self.model_weights {
            check_non_negative(&format!("voting.model_weights.{}", model), f64::from(*weight))?;
        }
        Ok(())
    }
}

/// Test-time augmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtaConfig {
    /// Run TTA instead of a single model vote (default: false)
    pub enabled: bool,

    /// Augmentations to transcribe; the untransformed original is always added
    /// (default: pitch ±1 semitone at 0.8, stretch 0.95/1.05 at 0.9)
    pub augmentations: Vec<AugmentationSpec>,

    /// Onset tolerance in seconds for re-voting across augmentations (default: 0.1)
    pub onset_tolerance: f64,

    /// Minimum number of augmentations that must agree on a note (default: 2)
    pub min_votes: usize,
}

impl Default for TtaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            augmentations: vec![
                AugmentationSpec::new("pitch_down_1", Transform::PitchShift { semitones: -1 }, 0.8),
                AugmentationSpec::new("pitch_up_1", Transform::PitchShift { semitones: 1 }, 0.8),
                AugmentationSpec::new("stretch_0.95", Transform::TimeStretch { rate: 0.95 }, 0.9),
                AugmentationSpec::new("stretch_1.05", Transform::TimeStretch { rate: 1.05 }, 0.9),
            ],
            onset_tolerance: 0.1,
            min_votes: 2,
        }
    }
}

impl TtaConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_positive("tta.onset_tolerance", self.onset_tolerance)?;
        if self.min_votes == 0 {
            return Err(ConsensusError::InvalidConfig(
                "tta.min_votes must be >= 1".to_string(),
            ));
        }
        for spec in &self.augmentations {
            spec.validate()?;
        }
        Ok(())
    }
}

/// Pre-transcription stem sanity check parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemValidationConfig {
    /// Validate the stem before invoking the specialist (default: true)
    pub enabled: bool,

    /// Absolute RMS floor (linear amplitude) (default: 0.005, about -46 dBFS)
    pub min_rms: f32,

    /// Lowest acceptable mean spectral centroid in Hz (default: 150.0)
    pub min_centroid_hz: f32,

    /// Highest acceptable mean spectral centroid in Hz (default: 5000.0)
    pub max_centroid_hz: f32,

    /// FFT frame size for the centroid (default: 2048)
    pub frame_size: usize,

    /// Hop between centroid frames (default: 1024)
    pub hop_size: usize,
}

impl Default for StemValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rms: 0.005,
            min_centroid_hz: 150.0,
            max_centroid_hz: 5000.0,
            frame_size: 2048,
            hop_size: 1024,
        }
    }
}

impl StemValidationConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_non_negative("stem_validation.min_rms", f64::from(self.min_rms))?;
        check_non_negative("stem_validation.min_centroid_hz", f64::from(self.min_centroid_hz))?;
        if self.max_centroid_hz <= self.min_centroid_hz {
            return Err(ConsensusError::InvalidConfig(format!(
                "stem_validation.max_centroid_hz ({}) must exceed min_centroid_hz ({})",
                self.max_centroid_hz, self.min_centroid_hz
            )));
        }
        if self.frame_size < 2 || self.hop_size == 0 {
            return Err(ConsensusError::InvalidConfig(
                "stem_validation frame_size must be >= 2 and hop_size >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Post-transcription specialist failure gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureDetectionConfig {
    /// Minimum specialist note count (default: 50)
    #[serde(alias = "bytedance_min_notes_threshold")]
    pub specialist_min_notes: usize,

    /// Minimum specialist/generalist note-count ratio (default: 0.1)
    pub specialist_min_ratio: f32,
}

impl Default for FailureDetectionConfig {
    fn default() -> Self {
        Self {
            specialist_min_notes: 50,
            specialist_min_ratio: 0.1,
        }
    }
}

impl FailureDetectionConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_non_negative(
            "failure_detection.specialist_min_ratio",
            f64::from(self.specialist_min_ratio),
        )
    }
}

/// Confidence filter thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceFilterConfig {
    /// Apply the filter (default: true)
    pub enabled: bool,

    /// Minimum confidence (default: 0.3)
    pub confidence_threshold: f32,

    /// Minimum velocity (default: 20)
    pub velocity_threshold: u8,

    /// Minimum duration in seconds (default: 0.05)
    pub duration_threshold: f64,

    /// Onset window for approximate confidence lookup in seconds (default: 0.05)
    pub match_tolerance: f64,
}

impl Default for ConfidenceFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.3,
            velocity_threshold: 20,
            duration_threshold: 0.05,
            match_tolerance: 0.05,
        }
    }
}

impl ConfidenceFilterConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_non_negative("confidence_filter.duration_threshold", self.duration_threshold)?;
        check_non_negative("confidence_filter.match_tolerance", self.match_tolerance)?;
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConsensusError::InvalidConfig(format!(
                "confidence_filter.confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Key-aware filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFilterConfig {
    /// Apply the filter when a key is known (default: true)
    pub enabled: bool,

    /// Neighbour search window before and after a note in seconds (default: 0.5)
    pub isolation_window: f64,

    /// Keep short out-of-key notes that connect two in-key neighbours (default: true)
    pub allow_passing_tones: bool,

    /// Passing tones must be shorter than this, in seconds (default: 0.25)
    pub passing_tone_max_duration: f64,

    /// Smallest step to a neighbour in semitones (default: 1)
    pub passing_tone_min_step: u8,

    /// Largest step to a neighbour in semitones (default: 3)
    pub passing_tone_max_step: u8,

    /// Scale used for minor keys (default: Natural)
    pub minor_scale: MinorScale,
}

impl Default for KeyFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            isolation_window: 0.5,
            allow_passing_tones: true,
            passing_tone_max_duration: 0.25,
            passing_tone_min_step: 1,
            passing_tone_max_step: 3,
            minor_scale: MinorScale::Natural,
        }
    }
}

impl KeyFilterConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_non_negative("key_filter.isolation_window", self.isolation_window)?;
        check_non_negative("key_filter.passing_tone_max_duration", self.passing_tone_max_duration)?;
        if self.passing_tone_min_step > self.passing_tone_max_step {
            return Err(ConsensusError::InvalidConfig(format!(
                "key_filter passing tone step range {}..={} is empty",
                self.passing_tone_min_step, self.passing_tone_max_step
            )));
        }
        Ok(())
    }
}

/// Playability reduction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayabilityConfig {
    /// Apply the filter (default: false)
    pub enabled: bool,

    /// Stage 1: minimum velocity (default: 20)
    pub min_velocity: u8,

    /// Stage 1: minimum duration in seconds (default: 0.03)
    pub min_duration: f64,

    /// Stage 2: same-pitch re-strikes within this window collapse to the loudest (default: 0.15)
    pub repeat_window: f64,

    /// Stage 3: pitches at or above this use `max_duration_high` (default: 72, C5)
    pub high_pitch_threshold: u8,

    /// Stage 3: pitches below this use `max_duration_low` (default: 48, C3)
    pub low_pitch_threshold: u8,

    /// Stage 3: sustain cap for the high register in seconds (default: 1.5)
    pub max_duration_high: f64,

    /// Stage 3: sustain cap for the middle register in seconds (default: 3.0)
    pub max_duration_mid: f64,

    /// Stage 3: sustain cap for the low register in seconds (default: 5.0)
    pub max_duration_low: f64,

    /// Stage 4: onset window for simultaneity clusters in seconds (default: 0.03)
    pub cluster_window: f64,

    /// Stage 4: maximum simultaneous notes per cluster (default: 4)
    pub max_polyphony: usize,

    /// Stage 4: always keep the highest pitch of a cluster (default: true)
    pub melody_priority: bool,

    /// Stage 4: always keep the lowest pitch of a cluster (default: true)
    pub bass_priority: bool,
}

impl Default for PlayabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_velocity: 20,
            min_duration: 0.03,
            repeat_window: 0.15,
            high_pitch_threshold: 72,
            low_pitch_threshold: 48,
            max_duration_high: 1.5,
            max_duration_mid: 3.0,
            max_duration_low: 5.0,
            cluster_window: 0.03,
            max_polyphony: 4,
            melody_priority: true,
            bass_priority: true,
        }
    }
}

impl PlayabilityConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), ConsensusError> {
        check_non_negative("playability.min_duration", self.min_duration)?;
        check_non_negative("playability.repeat_window", self.repeat_window)?;
        check_positive("playability.max_duration_high", self.max_duration_high)?;
        check_positive("playability.max_duration_mid", self.max_duration_mid)?;
        check_positive("playability.max_duration_low", self.max_duration_low)?;
        check_positive("playability.cluster_window", self.cluster_window)?;
        if self.low_pitch_threshold > self.high_pitch_threshold {
            return Err(ConsensusError::InvalidConfig(format!(
                "playability.low_pitch_threshold ({}) exceeds high_pitch_threshold ({})",
                self.low_pitch_threshold, self.high_pitch_threshold
            )));
        }
        if self.max_polyphony == 0 {
            return Err(ConsensusError::InvalidConfig(
                "playability.max_polyphony must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete ensemble configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Model-to-model voting
    pub voting: VotingConfig,

    /// Test-time augmentation
    pub tta: TtaConfig,

    /// Pre-transcription stem check
    pub stem_validation: StemValidationConfig,

    /// Post-transcription specialist gate
    pub failure_detection: FailureDetectionConfig,

    /// Confidence filter
    pub confidence_filter: ConfidenceFilterConfig,

    /// Key-aware filter
    pub key_filter: KeyFilterConfig,

    /// Playability filter
    pub playability: PlayabilityConfig,

    /// Derive note confidence from model frame curves when available (default: false)
    pub use_frame_confidence: bool,
}

impl EnsembleConfig {
    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        self.voting.validate()?;
        self.tta.validate()?;
        self.stem_validation.validate()?;
        self.failure_detection.validate()?;
        self.confidence_filter.validate()?;
        self.key_filter.validate()?;
        self.playability.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration document
    ///
    /// Unknown voting strategy names are rejected here, not defaulted.
    ///
    /// # Example
    ///
    /// ```
    /// use note_consensus::{EnsembleConfig, VotingStrategy};
    ///
    /// let config = EnsembleConfig::from_json_str(r#"{"voting": {"strategy": "majority"}}"#)?;
    /// assert_eq!(config.voting.strategy, VotingStrategy::Majority);
    ///
    /// assert!(EnsembleConfig::from_json_str(r#"{"voting": {"strategy": "plurality"}}"#).is_err());
    /// # Ok::<(), note_consensus::ConsensusError>(())
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConsensusError> {
        let config: EnsembleConfig = serde_json::from_str(json)
            .map_err(|e| ConsensusError::InvalidConfig(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConsensusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConsensusError::InvalidConfig(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConsensusError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConsensusError::InvalidConfig(format!(
            "{} must be > 0, got {}",
            field, value
        )));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConsensusError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConsensusError::InvalidConfig(format!(
            "{} must be >= 0, got {}",
            field, value
        )));
    }
    Ok(())
}
