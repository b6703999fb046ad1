//! Instrument tracks

use super::Note;
use serde::{Deserialize, Serialize};

/// Notes of a single instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// General MIDI program number (0 = acoustic grand piano)
    pub program: u8,

    /// Percussion track (MIDI channel 10); refinement filters leave these untouched
    #[serde(default)]
    pub is_drum: bool,

    /// Notes, ordered by onset
    pub notes: Vec<Note>,
}

impl Track {
    /// Pitched track for the given program
    pub fn new(program: u8, notes: Vec<Note>) -> Self {
        Self {
            program,
            is_drum: false,
            notes,
        }
    }

    /// Percussion track
    pub fn drums(notes: Vec<Note>) -> Self {
        Self {
            program: 0,
            is_drum: true,
            notes,
        }
    }

    /// General MIDI instrument family (8 programs per family)
    pub fn family(&self) -> u8 {
        self.program / 8
    }

    /// Same track kind with different notes
    pub fn with_notes(&self, notes: Vec<Note>) -> Self {
        Self {
            program: self.program,
            is_drum: self.is_drum,
            notes,
        }
    }

    /// Same or adjacent instrument: pitched tracks of the same GM family
    pub fn is_adjacent_to(&self, other: &Track) -> bool {
        !self.is_drum && !other.is_drum && self.family() == other.family()
    }
}
