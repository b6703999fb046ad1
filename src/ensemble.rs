//! Ensemble controller
//!
//! Sequences one stem through the models and the consensus stages:
//!
//! ```text
//! stem → generalist ─────────────────────────────┐
//!      → [StemValidator] → specialist → [FailureDetector] → VotingEngine → notes
//! ```
//!
//! With TTA enabled, the whole sequence above runs once per augmentation and
//! the results are re-voted. Any problem on the specialist or TTA path
//! (rejected stem, note-count failure, model error) degrades to the
//! generalist's unmodified output with a warning. Only configuration errors
//! and failures of the generalist itself reach the caller.

use crate::config::EnsembleConfig;
use crate::error::ConsensusError;
use crate::io::AudioStem;
use crate::note::Note;
use crate::result::{EnsembleFlag, EnsembleMetadata, EnsembleResult, FallbackReason};
use crate::transcriber::{transcribe_scored, Transcriber};
use crate::tta::{AudioAugmenter, OlaAugmenter, TtaOrchestrator};
use crate::validation::{FailureDetector, StemValidator};
use crate::voting::{ModelNotes, VotingEngine};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Voting role of the broad, robust model
pub const GENERALIST_ROLE: &str = "generalist";

/// Voting role of the specialised model
pub const SPECIALIST_ROLE: &str = "specialist";

/// Top-level ensemble sequencer
pub struct EnsembleController<'a> {
    config: EnsembleConfig,
    generalist: &'a dyn Transcriber,
    specialist: Option<&'a dyn Transcriber>,
    augmenter: Box<dyn AudioAugmenter>,
    engine: VotingEngine,
    stem_validator: StemValidator,
    failure_detector: FailureDetector,
}

impl<'a> EnsembleController<'a> {
    /// Create a controller
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if any section of the configuration is invalid.
    pub fn new(
        config: EnsembleConfig,
        generalist: &'a dyn Transcriber,
        specialist: Option<&'a dyn Transcriber>,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;
        let engine = VotingEngine::new(config.voting.clone())?;
        let stem_validator = StemValidator::new(config.stem_validation.clone());
        let failure_detector = FailureDetector::new(config.failure_detection.clone());

        Ok(Self {
            config,
            generalist,
            specialist,
            augmenter: Box::new(OlaAugmenter::default()),
            engine,
            stem_validator,
            failure_detector,
        })
    }

    /// Replace the audio augmenter used for TTA
    pub fn with_augmenter(mut self, augmenter: Box<dyn AudioAugmenter>) -> Self {
        self.augmenter = augmenter;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Transcribe a stem with the ensemble
    ///
    /// # Errors
    ///
    /// Returns the generalist model's error if it fails; every other failure
    /// falls back to the generalist's notes.
    pub fn transcribe(&self, stem: &AudioStem) -> Result<EnsembleResult, ConsensusError> {
        let start_time = Instant::now();
        log::debug!(
            "Ensemble transcription: {:.2}s stem at {} Hz, strategy={}, tta={}",
            stem.duration_seconds(),
            stem.sample_rate(),
            self.engine.strategy(),
            self.config.tta.enabled
        );

        let mut metadata = EnsembleMetadata::new(self.engine.strategy());
        if self.config.use_frame_confidence {
            metadata.flags.push(EnsembleFlag::FrameConfidence);
        }

        let notes = if self.config.tta.enabled {
            self.transcribe_tta(stem, &mut metadata)?
        } else {
            self.consensus(stem, &mut metadata)?
        };

        metadata.processing_time_ms = start_time.elapsed().as_secs_f32() * 1000.0;
        log::debug!(
            "Ensemble produced {} notes in {:.1} ms (fallback: {})",
            notes.len(),
            metadata.processing_time_ms,
            metadata.fallback.is_some()
        );

        Ok(EnsembleResult {
            notes,
            metadata,
            refinement: None,
        })
    }

    fn transcribe_tta(&self, stem: &AudioStem, metadata: &mut EnsembleMetadata) -> Result<Vec<Note>, ConsensusError> {
        let orchestrator = TtaOrchestrator::new(self.config.tta.clone(), self.augmenter.as_ref())?;
        let strategy = self.engine.strategy();
        let variant_runs: Mutex<Vec<(String, EnsembleMetadata)>> = Mutex::new(Vec::new());
        let outcome = orchestrator.run(stem, |spec, variant| {
            let mut scratch = EnsembleMetadata::new(strategy);
            let notes = self.consensus(variant, &mut scratch)?;
            variant_runs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((spec.name.clone(), scratch));
            Ok(notes)
        });

        match outcome {
            Ok(outcome) => {
                metadata.flags.push(EnsembleFlag::TtaConsensus);
                let mut runs = variant_runs.into_inner().unwrap_or_else(PoisonError::into_inner);
                let order: Vec<String> = orchestrator.augmentations().into_iter().map(|s| s.name).collect();
                runs.sort_by_key(|(name, _)| order.iter().position(|n| n == name));
                self.merge_variant_runs(runs, metadata);
                metadata.tta = Some(outcome.per_augmentation);
                Ok(outcome.notes)
            }
            Err(e) => {
                metadata.record_fallback(
                    FallbackReason::TtaError(e.to_string()),
                    format!("TTA failed ({}), falling back to {}", e, self.generalist.name()),
                );
                self.generalist_only(stem, metadata)
            }
        }
    }

    /// Fold per-variant metadata into the run's metadata
    ///
    /// Note counts and the stem verdict come from the unaugmented pass. The
    /// specialist is listed as used only if it voted in at least one variant;
    /// if it voted in none, the first variant's fallback reason becomes the
    /// run's. Variant warnings are kept, grouped by message.
    fn merge_variant_runs(&self, runs: Vec<(String, EnsembleMetadata)>, metadata: &mut EnsembleMetadata) {
        if let Some((_, original)) = runs.first() {
            metadata.note_counts = original.note_counts.clone();
            metadata.stem_verdict = original.stem_verdict.clone();
        }

        let specialist_voted = runs.iter().any(|(_, run)| run.fallback.is_none());
        metadata.models_used = vec![self.generalist.name().to_string()];
        if let (Some(specialist), true) = (self.specialist, specialist_voted) {
            metadata.models_used.push(specialist.name().to_string());
        }

        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (name, run) in &runs {
            for warning in &run.warnings {
                match grouped.iter_mut().find(|entry| entry.0 == *warning) {
                    Some((_, names)) => names.push(name.clone()),
                    None => grouped.push((warning.clone(), vec![name.clone()])),
                }
            }
        }
        for (warning, names) in grouped {
            metadata
                .warnings
                .push(format!("TTA variants [{}]: {}", names.join(", "), warning));
        }

        if !specialist_voted {
            if let Some(reason) = runs.into_iter().find_map(|(_, run)| run.fallback) {
                log::warn!("Specialist voted in no TTA variant, consensus is single-model");
                metadata.fallback = Some(reason);
                if !metadata.flags.contains(&EnsembleFlag::SingleModelFallback) {
                    metadata.flags.push(EnsembleFlag::SingleModelFallback);
                }
            }
        }
    }

    /// Single-pass consensus (no TTA)
    fn consensus(&self, stem: &AudioStem, metadata: &mut EnsembleMetadata) -> Result<Vec<Note>, ConsensusError> {
        let generalist_notes = self.generalist_only(stem, metadata)?;

        let Some(specialist) = self.specialist else {
            metadata.record_fallback(
                FallbackReason::NoSpecialist,
                format!("No specialist model configured, using {} only", self.generalist.name()),
            );
            return Ok(generalist_notes);
        };

        if self.config.stem_validation.enabled {
            let report = self.stem_validator.validate(stem);
            metadata.stem_verdict = Some(report.verdict.clone());
            if !report.is_trusted() {
                metadata.record_fallback(
                    FallbackReason::StemRejected(report.verdict),
                    format!(
                        "Stem rejected (rms={:.5}), skipping {} and using {} only",
                        report.rms,
                        specialist.name(),
                        self.generalist.name()
                    ),
                );
                return Ok(generalist_notes);
            }
        }

        let specialist_notes = match transcribe_scored(specialist, stem, self.config.use_frame_confidence) {
            Ok(notes) => notes,
            Err(e) => {
                metadata.record_fallback(
                    FallbackReason::SpecialistError(e.to_string()),
                    format!("{} failed ({}), using {} only", specialist.name(), e, self.generalist.name()),
                );
                return Ok(generalist_notes);
            }
        };
        metadata
            .note_counts
            .insert(specialist.name().to_string(), specialist_notes.len());

        let verdict = self
            .failure_detector
            .check(specialist_notes.len(), generalist_notes.len());
        if verdict.is_failure() {
            metadata.record_fallback(
                FallbackReason::SpecialistFailure(verdict),
                format!(
                    "{} produced {} notes against {} from {}, using {} only",
                    specialist.name(),
                    specialist_notes.len(),
                    generalist_notes.len(),
                    self.generalist.name(),
                    self.generalist.name()
                ),
            );
            return Ok(generalist_notes);
        }

        metadata.models_used = vec![
            self.generalist.name().to_string(),
            specialist.name().to_string(),
        ];
        let generalist_tag = self.vote_tag(self.generalist.name(), GENERALIST_ROLE);
        let specialist_tag = self.vote_tag(specialist.name(), SPECIALIST_ROLE);

        Ok(self.engine.vote(&[
            ModelNotes::new(generalist_tag, &generalist_notes),
            ModelNotes::new(specialist_tag, &specialist_notes),
        ]))
    }

    fn generalist_only(&self, stem: &AudioStem, metadata: &mut EnsembleMetadata) -> Result<Vec<Note>, ConsensusError> {
        let notes = transcribe_scored(self.generalist, stem, self.config.use_frame_confidence)?;
        metadata
            .note_counts
            .insert(self.generalist.name().to_string(), notes.len());
        metadata.models_used = vec![self.generalist.name().to_string()];
        Ok(notes)
    }

    /// Name a model is voted under: its own name when the voting configuration
    /// mentions it, otherwise its role
    fn vote_tag<'n>(&'n self, name: &'n str, role: &'n str) -> &'n str {
        let voting = &self.config.voting;
        if voting.model_weights.contains_key(name) || voting.authoritative_model.as_deref() == Some(name) {
            name
        } else {
            role
        }
    }
}
