//! Error types for the note consensus engine

use std::fmt;

/// Errors that can occur while building a note consensus
///
/// Only `InvalidConfig` and `UnknownStrategy` are expected to reach callers of
/// the ensemble in normal operation. Model and augmentation failures are
/// absorbed by the generalist fallback inside
/// [`EnsembleController`](crate::ensemble::EnsembleController).
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// Invalid input data (malformed notes, empty audio, etc.)
    InvalidInput(String),

    /// Configuration value out of range or inconsistent
    InvalidConfig(String),

    /// Voting strategy name not recognised
    UnknownStrategy(String),

    /// External transcription model failed
    TranscriptionFailed(String),

    /// Audio augmentation could not be produced
    AugmentationFailed(String),

    /// Audio decoding error
    DecodingError(String),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            ConsensusError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            ConsensusError::UnknownStrategy(name) => {
                write!(f, "Unknown voting strategy: '{}'", name)
            }
            ConsensusError::TranscriptionFailed(msg) => write!(f, "Transcription failed: {}", msg),
            ConsensusError::AugmentationFailed(msg) => write!(f, "Augmentation failed: {}", msg),
            ConsensusError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
        }
    }
}

impl std::error::Error for ConsensusError {}

impl ConsensusError {
    /// True for errors that must surface to the caller instead of triggering
    /// the single-model fallback
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConsensusError::InvalidConfig(_) | ConsensusError::UnknownStrategy(_)
        )
    }
}
