//! Confidence-based note filtering
//!
//! A note is kept iff its confidence, velocity and duration all reach their
//! thresholds. Confidence is resolved through an ordered cascade of lookups,
//! first hit wins:
//!
//! - with a caller-supplied [`ConfidenceMap`]: exact match (onset to the
//!   millisecond and pitch), then nearest same-pitch entry within the match
//!   tolerance, then 1.0
//! - without a map: a heuristic that scales the note's own confidence down for
//!   very short and very quiet notes
//!
//! Missing evidence resolves to 1.0 (keep). Drum tracks pass through.

use crate::config::ConfidenceFilterConfig;
use crate::note::{Note, Track};
use std::collections::HashMap;

/// Heuristic duration factors: (upper bound in seconds, multiplier)
const SHORT_NOTE_FACTORS: [(f64, f32); 2] = [(0.05, 0.5), (0.1, 0.8)];

/// Heuristic velocity factors: (upper bound, multiplier)
const QUIET_NOTE_FACTORS: [(u8, f32); 2] = [(30, 0.6), (50, 0.85)];

/// Confidence used when no lookup produced a value
const DEFAULT_CONFIDENCE: f32 = 1.0;

/// Explicit per-note confidence supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ConfidenceMap {
    exact: HashMap<(i64, u8), f32>,
    by_pitch: HashMap<u8, Vec<(f64, f32)>>,
}

impl ConfidenceMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Map built from the confidence carried by each note
    pub fn from_notes(notes: &[Note]) -> Self {
        let mut map = Self::new();
        for note in notes {
            map.insert(note.onset(), note.pitch(), note.confidence());
        }
        map
    }

    /// Record the confidence of the note at `onset` with `pitch`
    pub fn insert(&mut self, onset: f64, pitch: u8, confidence: f32) {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            DEFAULT_CONFIDENCE
        };
        self.exact.insert((onset_millis(onset), pitch), confidence);
        self.by_pitch.entry(pitch).or_default().push((onset, confidence));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    /// True if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    fn exact(&self, note: &Note) -> Option<f32> {
        self.exact.get(&(onset_millis(note.onset()), note.pitch())).copied()
    }

    fn nearest(&self, note: &Note, tolerance: f64) -> Option<f32> {
        self.by_pitch
            .get(&note.pitch())?
            .iter()
            .map(|&(onset, confidence)| ((onset - note.onset()).abs(), confidence))
            .filter(|&(distance, _)| distance <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, confidence)| confidence)
    }
}

fn onset_millis(onset: f64) -> i64 {
    (onset * 1000.0).round() as i64
}

/// One step of the confidence lookup cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLookup {
    /// Map entry with the same millisecond onset and pitch
    Exact,
    /// Nearest same-pitch map entry within the match tolerance
    Approximate,
    /// Note confidence scaled down for short and quiet notes
    Heuristic,
    /// No evidence: keep
    Default,
}

/// Cascade used when the caller supplied a map
const MAP_CASCADE: [ConfidenceLookup; 3] = [
    ConfidenceLookup::Exact,
    ConfidenceLookup::Approximate,
    ConfidenceLookup::Default,
];

/// Cascade used without a map
const HEURISTIC_CASCADE: [ConfidenceLookup; 2] = [ConfidenceLookup::Heuristic, ConfidenceLookup::Default];

impl ConfidenceLookup {
    fn resolve(&self, note: &Note, map: Option<&ConfidenceMap>, tolerance: f64) -> Option<f32> {
        match self {
            ConfidenceLookup::Exact => map?.exact(note),
            ConfidenceLookup::Approximate => map?.nearest(note, tolerance),
            ConfidenceLookup::Heuristic => Some(heuristic_confidence(note)),
            ConfidenceLookup::Default => Some(DEFAULT_CONFIDENCE),
        }
    }
}

/// Note confidence scaled by duration and velocity penalties
pub fn heuristic_confidence(note: &Note) -> f32 {
    let duration_factor = SHORT_NOTE_FACTORS
        .iter()
        .find(|(bound, _)| note.duration() < *bound)
        .map_or(1.0, |(_, factor)| *factor);
    let velocity_factor = QUIET_NOTE_FACTORS
        .iter()
        .find(|(bound, _)| note.velocity() < *bound)
        .map_or(1.0, |(_, factor)| *factor);
    note.confidence() * duration_factor * velocity_factor
}

/// Threshold filter on confidence, velocity and duration
#[derive(Debug, Clone)]
pub struct ConfidenceFilter {
    config: ConfidenceFilterConfig,
}

impl ConfidenceFilter {
    /// Create a filter
    pub fn new(config: ConfidenceFilterConfig) -> Self {
        Self { config }
    }

    /// Lookups tried, in order, for the given map
    pub fn cascade(map: Option<&ConfidenceMap>) -> &'static [ConfidenceLookup] {
        match map {
            Some(_) => &MAP_CASCADE,
            None => &HEURISTIC_CASCADE,
        }
    }

    /// Resolve a note's confidence and the lookup that produced it
    pub fn score(&self, note: &Note, map: Option<&ConfidenceMap>) -> (f32, ConfidenceLookup) {
        Self::cascade(map)
            .iter()
            .find_map(|lookup| {
                lookup
                    .resolve(note, map, self.config.match_tolerance)
                    .map(|c| (c, *lookup))
            })
            .unwrap_or((DEFAULT_CONFIDENCE, ConfidenceLookup::Default))
    }

    /// Keep notes that clear every threshold
    ///
    /// Kept notes carry the resolved confidence.
    pub fn filter(&self, notes: &[Note], map: Option<&ConfidenceMap>) -> Vec<Note> {
        let kept: Vec<Note> = notes
            .iter()
            .filter_map(|note| {
                let (confidence, _) = self.score(note, map);
                let keep = confidence >= self.config.confidence_threshold
                    && note.velocity() >= self.config.velocity_threshold
                    && note.duration() >= self.config.duration_threshold;
                keep.then(|| note.with_confidence(confidence))
            })
            .collect();

        log::debug!(
            "Confidence filter kept {} of {} notes (threshold={:.2}, map={})",
            kept.len(),
            notes.len(),
            self.config.confidence_threshold,
            map.is_some()
        );
        kept
    }

    /// Filter every pitched track; drum tracks are returned unchanged
    pub fn filter_tracks(&self, tracks: &[Track], map: Option<&ConfidenceMap>) -> Vec<Track> {
        tracks
            .iter()
            .map(|track| {
                if track.is_drum {
                    track.clone()
                } else {
                    track.with_notes(self.filter(&track.notes, map))
                }
            })
            .collect()
    }
}
