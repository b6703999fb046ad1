//! Musically-informed refinement of consensus notes
//!
//! Filters run in a fixed order, each on the previous one's output:
//! 1. [`ConfidenceFilter`] - drop low-confidence, quiet and very short notes
//! 2. [`KeyAwareFilter`] - drop isolated out-of-key notes (needs a detected key)
//! 3. [`PlayabilityFilter`] - optional reduction to a playable part
//!
//! Drum tracks pass through every stage untouched.

pub mod confidence;
pub mod key_aware;
pub mod playability;

pub use confidence::{ConfidenceFilter, ConfidenceLookup, ConfidenceMap};
pub use key_aware::{KeyAwareFilter, KeyDecision};
pub use playability::{PlayabilityFilter, PlayabilityReport};

use crate::config::EnsembleConfig;
use crate::error::ConsensusError;
use crate::key::Key;
use crate::note::{sorted_by_onset, Note, Track};
use crate::result::{RefinementReport, StageCounts};

/// The configured refinement stages
#[derive(Debug, Clone)]
pub struct RefinementPipeline {
    confidence: Option<ConfidenceFilter>,
    key_filter: Option<KeyAwareFilter>,
    playability: Option<PlayabilityFilter>,
    key_unavailable: bool,
}

impl RefinementPipeline {
    /// Build the stages enabled in `config`
    ///
    /// The key-aware stage is skipped, with a warning, when it is enabled but
    /// `key` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if a stage's configuration is invalid.
    pub fn new(config: &EnsembleConfig, key: Option<Key>) -> Result<Self, ConsensusError> {
        config.confidence_filter.validate()?;
        config.key_filter.validate()?;

        let confidence = config
            .confidence_filter
            .enabled
            .then(|| ConfidenceFilter::new(config.confidence_filter.clone()));

        let key_unavailable = config.key_filter.enabled && key.is_none();
        if key_unavailable {
            log::warn!("Key-aware filter enabled but no key was detected; skipping it");
        }
        let key_filter = match key {
            Some(key) if config.key_filter.enabled => Some(KeyAwareFilter::new(key, config.key_filter.clone())),
            _ => None,
        };

        let playability = if config.playability.enabled {
            Some(PlayabilityFilter::new(config.playability.clone())?)
        } else {
            None
        };

        Ok(Self {
            confidence,
            key_filter,
            playability,
            key_unavailable,
        })
    }

    /// True if the key-aware stage was requested but skipped for lack of a key
    pub fn key_unavailable(&self) -> bool {
        self.key_unavailable
    }

    /// Refine a single pitched note list
    pub fn refine(&self, notes: &[Note], map: Option<&ConfidenceMap>) -> (Vec<Note>, RefinementReport) {
        let (mut tracks, report) = self.refine_tracks(&[Track::new(0, notes.to_vec())], map);
        let notes = tracks.pop().map(|t| t.notes).unwrap_or_default();
        (sorted_by_onset(notes), report)
    }

    /// Refine a multi-track transcription
    pub fn refine_tracks(
        &self,
        tracks: &[Track],
        map: Option<&ConfidenceMap>,
    ) -> (Vec<Track>, RefinementReport) {
        let mut report = RefinementReport::default();
        let mut current = tracks.to_vec();

        if let Some(filter) = &self.confidence {
            let input_notes = note_count(&current);
            current = filter.filter_tracks(&current, map);
            report.confidence = Some(StageCounts {
                input_notes,
                output_notes: note_count(&current),
            });
        }

        if let Some(filter) = &self.key_filter {
            let input_notes = note_count(&current);
            current = filter.filter_tracks(&current);
            report.key_aware = Some(StageCounts {
                input_notes,
                output_notes: note_count(&current),
            });
        }

        if let Some(filter) = &self.playability {
            let mut total = PlayabilityReport::default();
            current = current
                .iter()
                .map(|track| {
                    if track.is_drum {
                        return track.clone();
                    }
                    let (notes, r) = filter.apply(&track.notes);
                    total.input_notes += r.input_notes;
                    total.after_threshold += r.after_threshold;
                    total.after_repeats += r.after_repeats;
                    total.truncated += r.truncated;
                    total.output_notes += r.output_notes;
                    track.with_notes(notes)
                })
                .collect();
            report.playability = Some(total);
        }

        log::debug!(
            "Refinement: {} -> {} notes across {} tracks",
            note_count(tracks),
            note_count(&current),
            tracks.len()
        );
        (current, report)
    }
}

fn note_count(tracks: &[Track]) -> usize {
    tracks.iter().map(|t| t.notes.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayabilityConfig;

    fn note(pitch: u8, onset: f64, duration: f64, velocity: u8) -> Note {
        Note::new(pitch, onset, onset + duration, velocity).unwrap()
    }

    #[test]
    fn test_stages_run_in_order_and_report() {
        let config = EnsembleConfig {
            playability: PlayabilityConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = RefinementPipeline::new(&config, Some(Key::Major(0))).unwrap();
        let notes = vec![
            note(60, 0.0, 0.5, 80),
            note(61, 0.02, 0.01, 80),
            note(66, 3.0, 0.5, 80),
            note(84, 5.0, 4.0, 80),
        ];

        let (out, report) = pipeline.refine(&notes, None);

        assert_eq!(report.confidence, Some(StageCounts { input_notes: 4, output_notes: 3 }));
        assert_eq!(report.key_aware, Some(StageCounts { input_notes: 3, output_notes: 2 }));
        let playability = report.playability.unwrap();
        assert_eq!(playability.input_notes, 2);
        assert_eq!(playability.truncated, 1);
        assert_eq!(out.len(), 2);
        assert!((out[1].duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_key_skips_key_stage() {
        let pipeline = RefinementPipeline::new(&EnsembleConfig::default(), None).unwrap();
        assert!(pipeline.key_unavailable());
        let notes = vec![note(66, 3.0, 0.5, 80)];
        let (out, report) = pipeline.refine(&notes, None);
        assert_eq!(out, notes);
        assert!(report.key_aware.is_none());
        assert!(report.playability.is_none());
    }

    #[test]
    fn test_drum_tracks_pass_through_all_stages() {
        let config = EnsembleConfig {
            playability: PlayabilityConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = RefinementPipeline::new(&config, Some(Key::Major(0))).unwrap();
        let drums = Track::drums(vec![note(37, 0.0, 0.01, 5), note(42, 0.0, 9.0, 5)]);
        let (out, _) = pipeline.refine_tracks(std::slice::from_ref(&drums), None);
        assert_eq!(out[0], drums);
    }
}
