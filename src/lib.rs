//! # Note Consensus
//!
//! Multi-model note consensus and refinement for music transcription. Turns
//! the noisy note lists of several transcription models, and of several
//! augmented re-transcriptions of the same stem, into one note sequence ready
//! for notation.
//!
//! ## Features
//!
//! - **Voting**: weighted, intersection, union and majority consensus over onset buckets
//! - **Failure handling**: stem validation and specialist note-count gating with
//!   deterministic fallback to the generalist model
//! - **TTA**: pitch-shift / time-stretch augmentation with transform reversal and re-voting
//! - **Refinement**: confidence, key-aware and playability filters
//!
//! ## Quick Start
//!
//! ```no_run
//! use note_consensus::{process_stem, decode_stem, EnsembleConfig, Key, Transcriber};
//! # fn models() -> (Box<dyn Transcriber>, Box<dyn Transcriber>) { unimplemented!() }
//!
//! let (generalist, specialist) = models();
//! let stem = decode_stem("piano.wav")?;
//!
//! let result = process_stem(
//!     &stem,
//!     generalist.as_ref(),
//!     Some(specialist.as_ref()),
//!     Key::from_name("C major"),
//!     EnsembleConfig::default(),
//! )?;
//!
//! println!("{} notes (fallback: {})", result.notes.len(), result.is_fallback());
//! # Ok::<(), note_consensus::ConsensusError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! stem → [StemValidator] → models → [FailureDetector] → VotingEngine / TTA
//!      → ConfidenceFilter → KeyAwareFilter → PlayabilityFilter → notes
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ensemble;
pub mod error;
pub mod io;
pub mod key;
pub mod note;
pub mod refinement;
pub mod result;
pub mod transcriber;
pub mod tta;
pub mod validation;
pub mod voting;

// Re-export main types
pub use config::{
    ConfidenceFilterConfig, EnsembleConfig, FailureDetectionConfig, KeyFilterConfig, PlayabilityConfig,
    StemValidationConfig, TtaConfig, VotingConfig,
};
pub use ensemble::EnsembleController;
pub use error::ConsensusError;
pub use io::{decode_stem, AudioStem};
pub use key::{Key, MinorScale};
pub use note::{is_sorted_by_onset, sorted_by_onset, Matcher, Note, Track};
pub use refinement::{ConfidenceFilter, ConfidenceMap, KeyAwareFilter, PlayabilityFilter, RefinementPipeline};
pub use result::{EnsembleFlag, EnsembleMetadata, EnsembleResult, FallbackReason, RefinementReport};
pub use transcriber::{FrameConfidence, Transcriber};
pub use tta::{AugmentationSpec, OlaAugmenter, Transform, TtaOrchestrator};
pub use validation::{FailureDetector, FailureVerdict, StemValidator, StemVerdict};
pub use voting::{ModelNotes, VotingEngine, VotingStrategy};

/// Main entry point
///
/// Runs the ensemble on one stem and refines the consensus.
///
/// # Arguments
///
/// * `stem` - Separated mono stem
/// * `generalist` - Robust model; its output is the fallback
/// * `specialist` - Optional specialised model
/// * `key` - Key detected upstream, used by the key-aware filter
/// * `config` - Ensemble configuration
///
/// # Errors
///
/// Returns `ConsensusError` for invalid configuration or a failing generalist.
/// Specialist and TTA failures fall back instead of erroring.
pub fn process_stem(
    stem: &AudioStem,
    generalist: &dyn Transcriber,
    specialist: Option<&dyn Transcriber>,
    key: Option<Key>,
    config: EnsembleConfig,
) -> Result<EnsembleResult, ConsensusError> {
    let pipeline = RefinementPipeline::new(&config, key)?;
    let controller = EnsembleController::new(config, generalist, specialist)?;

    let mut result = controller.transcribe(stem)?;

    let (notes, report) = pipeline.refine(&result.notes, None);
    if pipeline.key_unavailable() {
        result.metadata.flags.push(EnsembleFlag::KeyUnavailable);
        result
            .metadata
            .warnings
            .push("Key-aware filter skipped: no key detected".to_string());
    }
    log::debug!(
        "Refined {} consensus notes to {}",
        result.notes.len(),
        notes.len()
    );

    result.notes = notes;
    result.refinement = Some(report);
    Ok(result)
}
