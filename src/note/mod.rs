//! Note representation shared by every consensus stage
//!
//! - [`Note`]: immutable, validated note event
//! - [`Track`]: notes of one instrument (program + drum flag)
//! - [`matcher`]: onset-tolerance bucketing used for cross-source identity

pub mod matcher;
pub mod track;

pub use matcher::{BucketKey, Matcher};
pub use track::Track;

use crate::error::ConsensusError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Highest MIDI pitch / velocity value
pub const MIDI_MAX: u8 = 127;

/// A single transcribed note
///
/// Notes are value objects: every transformation returns a new `Note`.
/// Invariants checked on construction (and on deserialization):
/// - `onset >= 0` and finite
/// - `offset > onset` and finite
/// - `pitch <= 127`, `velocity <= 127`
/// - `confidence` in `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNote")]
pub struct Note {
    pitch: u8,
    onset: f64,
    offset: f64,
    velocity: u8,
    confidence: f32,
}

/// Unvalidated wire form of a [`Note`]
#[derive(Debug, Clone, Deserialize)]
struct RawNote {
    pitch: u8,
    onset: f64,
    offset: f64,
    velocity: u8,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl TryFrom<RawNote> for Note {
    type Error = ConsensusError;

    fn try_from(raw: RawNote) -> Result<Self, Self::Error> {
        Note::new(raw.pitch, raw.onset, raw.offset, raw.velocity)?.try_with_confidence(raw.confidence)
    }
}

impl Note {
    /// Create a note with full confidence (1.0)
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidInput` if any invariant is violated.
    ///
    /// # Example
    ///
    /// ```
    /// use note_consensus::Note;
    ///
    /// let note = Note::new(60, 1.0, 1.5, 80)?;
    /// assert!((note.duration() - 0.5).abs() < 1e-9);
    /// assert_eq!(note.confidence(), 1.0);
    /// # Ok::<(), note_consensus::ConsensusError>(())
    /// ```
    pub fn new(pitch: u8, onset: f64, offset: f64, velocity: u8) -> Result<Self, ConsensusError> {
        if pitch > MIDI_MAX {
            return Err(ConsensusError::InvalidInput(format!(
                "Pitch {} outside MIDI range 0-127",
                pitch
            )));
        }
        if velocity > MIDI_MAX {
            return Err(ConsensusError::InvalidInput(format!(
                "Velocity {} outside MIDI range 0-127",
                velocity
            )));
        }
        if !onset.is_finite() || onset < 0.0 {
            return Err(ConsensusError::InvalidInput(format!(
                "Onset must be finite and >= 0, got {}",
                onset
            )));
        }
        if !offset.is_finite() || offset <= onset {
            return Err(ConsensusError::InvalidInput(format!(
                "Offset must be finite and > onset ({}), got {}",
                onset, offset
            )));
        }

        Ok(Self {
            pitch,
            onset,
            offset,
            velocity,
            confidence: 1.0,
        })
    }

    /// MIDI pitch (0-127)
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// Onset time in seconds
    pub fn onset(&self) -> f64 {
        self.onset
    }

    /// Offset time in seconds
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// MIDI velocity (0-127)
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Confidence (0.0-1.0)
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Duration in seconds (`offset - onset`)
    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }

    /// Pitch class (0 = C, ..., 11 = B)
    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    /// Copy of this note with the confidence replaced, clamped to `[0.0, 1.0]`
    ///
    /// Non-finite values fall back to 1.0.
    pub fn with_confidence(&self, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self { confidence, ..*self }
    }

    /// Copy of this note with the confidence replaced, rejecting out-of-range values
    pub fn try_with_confidence(&self, confidence: f32) -> Result<Self, ConsensusError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ConsensusError::InvalidInput(format!(
                "Confidence must be in [0.0, 1.0], got {}",
                confidence
            )));
        }
        Ok(Self { confidence, ..*self })
    }

    /// Copy of this note shortened to at most `max_duration` seconds
    ///
    /// Non-positive caps leave the note unchanged.
    pub fn truncated(&self, max_duration: f64) -> Self {
        if max_duration > 0.0 && self.duration() > max_duration {
            Self {
                offset: self.onset + max_duration,
                ..*self
            }
        } else {
            *self
        }
    }

    /// Copy of this note shifted by `semitones`, or `None` if the result leaves 0-127
    pub fn transposed(&self, semitones: i32) -> Option<Self> {
        let pitch = i32::from(self.pitch) + semitones;
        if !(0..=i32::from(MIDI_MAX)).contains(&pitch) {
            return None;
        }
        Some(Self {
            pitch: pitch as u8,
            ..*self
        })
    }

    /// Copy of this note with onset and offset multiplied by `factor`
    ///
    /// Returns `None` for non-positive or non-finite factors.
    pub fn time_scaled(&self, factor: f64) -> Option<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return None;
        }
        let onset = self.onset * factor;
        let offset = self.offset * factor;
        if offset <= onset {
            return None;
        }
        Some(Self {
            onset,
            offset,
            ..*self
        })
    }
}

/// Ordering by onset, then pitch, then offset
pub fn compare_by_onset(a: &Note, b: &Note) -> Ordering {
    a.onset
        .total_cmp(&b.onset)
        .then(a.pitch.cmp(&b.pitch))
        .then(a.offset.total_cmp(&b.offset))
}

/// Sort notes in place by onset (ties broken by pitch)
pub fn sort_by_onset(notes: &mut [Note]) {
    notes.sort_by(compare_by_onset);
}

/// Consume a note list and return it sorted by onset
pub fn sorted_by_onset(mut notes: Vec<Note>) -> Vec<Note> {
    sort_by_onset(&mut notes);
    notes
}

/// Check the note-list ordering invariant (non-decreasing onset)
pub fn is_sorted_by_onset(notes: &[Note]) -> bool {
    notes.windows(2).all(|w| w[0].onset <= w[1].onset)
}

/// Round and clamp an averaged velocity back into MIDI range
pub(crate) fn velocity_from_mean(mean: f64) -> u8 {
    if !mean.is_finite() {
        return 0;
    }
    mean.round().clamp(0.0, f64::from(MIDI_MAX)) as u8
}
