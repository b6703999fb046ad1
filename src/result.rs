//! Ensemble result types

use crate::note::Note;
use crate::refinement::playability::PlayabilityReport;
use crate::tta::AugmentationCount;
use crate::validation::{FailureVerdict, StemVerdict};
use crate::voting::VotingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the ensemble degraded to the generalist's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// No specialist model was supplied
    NoSpecialist,
    /// Stem validation rejected the stem before the specialist ran
    StemRejected(StemVerdict),
    /// Specialist output failed the note-count gate
    SpecialistFailure(FailureVerdict),
    /// Specialist transcription returned an error
    SpecialistError(String),
    /// TTA returned an error
    TtaError(String),
}

/// Ensemble flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnsembleFlag {
    /// Output is the generalist's unmodified notes
    SingleModelFallback,
    /// Consensus came from test-time augmentation
    TtaConsensus,
    /// Note confidence was derived from model frame curves
    FrameConfidence,
    /// Key-aware filtering was enabled but no key was available
    KeyUnavailable,
}

/// Input/output counts of one refinement stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    /// Notes in
    pub input_notes: usize,
    /// Notes out
    pub output_notes: usize,
}

/// Per-stage counts of a refinement run (`None` = stage skipped)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Confidence filter
    pub confidence: Option<StageCounts>,
    /// Key-aware filter
    pub key_aware: Option<StageCounts>,
    /// Playability filter
    pub playability: Option<PlayabilityReport>,
}

/// Ensemble run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    /// Models whose output reached the final vote, in vote order
    pub models_used: Vec<String>,

    /// Voting strategy configured
    pub strategy: VotingStrategy,

    /// Set when the ensemble fell back to the generalist
    pub fallback: Option<FallbackReason>,

    /// Flags
    pub flags: Vec<EnsembleFlag>,

    /// Human-readable warnings (fallbacks, skipped stages)
    pub warnings: Vec<String>,

    /// Note count per model before voting (the unaugmented pass under TTA)
    pub note_counts: BTreeMap<String, usize>,

    /// Stem validation verdict, when validation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem_verdict: Option<StemVerdict>,

    /// Per-augmentation note counts, when TTA ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tta: Option<Vec<AugmentationCount>>,

    /// Processing time in milliseconds
    pub processing_time_ms: f32,

    /// Crate version that produced the result
    pub algorithm_version: String,
}

impl EnsembleMetadata {
    pub(crate) fn new(strategy: VotingStrategy) -> Self {
        Self {
            models_used: Vec::new(),
            strategy,
            fallback: None,
            flags: Vec::new(),
            warnings: Vec::new(),
            note_counts: BTreeMap::new(),
            stem_verdict: None,
            tta: None,
            processing_time_ms: 0.0,
            algorithm_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Record a fallback, its flag and a warning
    pub(crate) fn record_fallback(&mut self, reason: FallbackReason, warning: String) {
        log::warn!("{}", warning);
        self.fallback = Some(reason);
        if !self.flags.contains(&EnsembleFlag::SingleModelFallback) {
            self.flags.push(EnsembleFlag::SingleModelFallback);
        }
        self.warnings.push(warning);
    }
}

/// Consensus notes plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Final notes, sorted by onset
    pub notes: Vec<Note>,

    /// Run metadata
    pub metadata: EnsembleMetadata,

    /// Refinement counts, when refinement ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementReport>,
}

impl EnsembleResult {
    /// True if the output is the generalist's unmodified notes
    pub fn is_fallback(&self) -> bool {
        self.metadata.fallback.is_some()
    }
}
