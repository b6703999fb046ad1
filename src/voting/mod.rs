//! Multi-model note voting
//!
//! Merges one note list per model into a single consensus list under one of
//! four strategies:
//! - **Weighted**: sum of `model_weight * confidence` per bucket must clear a threshold
//! - **Intersection**: keep the authoritative model's notes that every other model matched
//! - **Union**: keep every bucket, confidence = agreement ratio
//! - **Majority**: keep buckets matched by at least half of the models
//!
//! Every strategy returns notes sorted by onset with at most one note per
//! bucket (intersection keeps the authoritative model's notes verbatim).

pub mod agreement;
pub mod intersection;
pub mod weighted;

use crate::config::VotingConfig;
use crate::error::ConsensusError;
use crate::note::{Matcher, Note};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    /// Confidence-weighted sum against a threshold
    #[default]
    Weighted,
    /// Notes present in every model
    Intersection,
    /// Notes present in any model
    Union,
    /// Notes present in at least half of the models
    Majority,
}

impl VotingStrategy {
    /// Lowercase strategy name
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingStrategy::Weighted => "weighted",
            VotingStrategy::Intersection => "intersection",
            VotingStrategy::Union => "union",
            VotingStrategy::Majority => "majority",
        }
    }
}

impl fmt::Display for VotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VotingStrategy {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(VotingStrategy::Weighted),
            "intersection" => Ok(VotingStrategy::Intersection),
            "union" => Ok(VotingStrategy::Union),
            "majority" => Ok(VotingStrategy::Majority),
            _ => Err(ConsensusError::UnknownStrategy(s.to_string())),
        }
    }
}

/// One model's transcription, tagged with the model name for weight lookup
#[derive(Debug, Clone, Copy)]
pub struct ModelNotes<'a> {
    /// Model name
    pub model: &'a str,
    /// Notes produced by the model
    pub notes: &'a [Note],
}

impl<'a> ModelNotes<'a> {
    /// Tag a note list with its model name
    pub fn new(model: &'a str, notes: &'a [Note]) -> Self {
        Self { model, notes }
    }
}

/// Voting engine bound to one validated configuration
#[derive(Debug, Clone)]
pub struct VotingEngine {
    config: VotingConfig,
    matcher: Matcher,
}

impl VotingEngine {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if the configuration is out of range.
    pub fn new(config: VotingConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        let matcher = Matcher::new(config.onset_tolerance)?;
        Ok(Self { config, matcher })
    }

    /// Active strategy
    pub fn strategy(&self) -> VotingStrategy {
        self.config.strategy
    }

    /// Configuration in use
    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Merge per-model note lists into one consensus list
    ///
    /// Zero models, or models with only empty lists, produce an empty list.
    ///
    /// # Example
    ///
    /// ```
    /// use note_consensus::{ModelNotes, Note, VotingConfig, VotingEngine, VotingStrategy};
    ///
    /// let a = vec![Note::new(60, 1.000, 1.5, 80)?];
    /// let b = vec![Note::new(60, 1.020, 1.5, 80)?];
    ///
    /// let config = VotingConfig { strategy: VotingStrategy::Union, ..Default::default() };
    /// let engine = VotingEngine::new(config)?;
    /// let merged = engine.vote(&[ModelNotes::new("a", &a), ModelNotes::new("b", &b)]);
    /// assert_eq!(merged.len(), 1);
    /// # Ok::<(), note_consensus::ConsensusError>(())
    /// ```
    pub fn vote(&self, inputs: &[ModelNotes<'_>]) -> Vec<Note> {
        let total_notes: usize = inputs.iter().map(|m| m.notes.len()).sum();
        log::debug!(
            "Voting ({}) on {} notes from {} models, tolerance={:.3}s",
            self.config.strategy,
            total_notes,
            inputs.len(),
            self.config.onset_tolerance
        );

        if total_notes == 0 {
            return Vec::new();
        }

        let merged = match self.config.strategy {
            VotingStrategy::Weighted => weighted::vote_weighted(inputs, &self.config, &self.matcher),
            VotingStrategy::Intersection => intersection::vote_intersection(
                inputs,
                self.config.authoritative_model.as_deref(),
                &self.matcher,
            ),
            VotingStrategy::Union => agreement::vote_union(inputs, &self.matcher),
            VotingStrategy::Majority => agreement::vote_majority(inputs, &self.matcher),
        };

        log::debug!(
            "Voting ({}) kept {} of {} notes",
            self.config.strategy,
            merged.len(),
            total_notes
        );
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::is_sorted_by_onset;

    fn note(pitch: u8, onset: f64, velocity: u8) -> Note {
        Note::new(pitch, onset, onset + 0.4, velocity).unwrap()
    }

    fn engine(strategy: VotingStrategy) -> VotingEngine {
        VotingEngine::new(VotingConfig {
            strategy,
            ..Default::default()
        })
        .unwrap()
    }

    const ALL: [VotingStrategy; 4] = [
        VotingStrategy::Weighted,
        VotingStrategy::Intersection,
        VotingStrategy::Union,
        VotingStrategy::Majority,
    ];

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("weighted".parse::<VotingStrategy>().unwrap(), VotingStrategy::Weighted);
        assert_eq!(" Union ".parse::<VotingStrategy>().unwrap(), VotingStrategy::Union);
        assert!(matches!(
            "plurality".parse::<VotingStrategy>(),
            Err(ConsensusError::UnknownStrategy(_))
        ));
        for s in ALL {
            assert_eq!(s.to_string().parse::<VotingStrategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_empty_inputs_return_empty() {
        let empty: Vec<Note> = vec![];
        for s in ALL {
            let e = engine(s);
            assert!(e.vote(&[]).is_empty());
            assert!(e
                .vote(&[ModelNotes::new("a", &empty), ModelNotes::new("b", &empty)])
                .is_empty());
        }
    }

    #[test]
    fn test_outputs_sorted_by_onset() {
        let a = vec![note(64, 2.0, 80), note(60, 0.5, 80), note(67, 1.0, 80)];
        let b = vec![note(67, 1.0, 70), note(60, 0.5, 70), note(64, 2.0, 70)];
        for s in ALL {
            let out = engine(s).vote(&[ModelNotes::new("generalist", &a), ModelNotes::new("specialist", &b)]);
            assert_eq!(out.len(), 3, "strategy {}", s);
            assert!(is_sorted_by_onset(&out), "strategy {}", s);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VotingConfig {
            onset_tolerance: -1.0,
            ..Default::default()
        };
        assert!(VotingEngine::new(config).is_err());
    }
}
