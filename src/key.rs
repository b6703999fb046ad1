//! Musical key and scale membership
//!
//! The key is detected upstream; this module only parses it and answers
//! "is this pitch class in the key's scale?".

use crate::error::ConsensusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const MAJOR_STEPS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR_STEPS: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];
const HARMONIC_MINOR_STEPS: [u8; 7] = [0, 2, 3, 5, 7, 8, 11];

/// Musical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Major key (0 = C, 1 = C#, ..., 11 = B)
    Major(u32),
    /// Minor key (0 = C, 1 = C#, ..., 11 = B)
    Minor(u32),
}

/// Scale used for minor keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinorScale {
    /// Aeolian (flat 7th)
    #[default]
    Natural,
    /// Raised 7th (leading tone counts as in-key)
    Harmonic,
}

impl Key {
    /// Tonic pitch class (0-11)
    pub fn tonic(&self) -> u8 {
        match self {
            Key::Major(i) | Key::Minor(i) => (*i % 12) as u8,
        }
    }

    /// Get key name in musical notation (e.g., "C", "Am", "F#", "D#m")
    ///
    /// # Example
    ///
    /// ```
    /// use note_consensus::Key;
    ///
    /// assert_eq!(Key::Major(6).name(), "F#");
    /// assert_eq!(Key::Minor(9).name(), "Am");
    /// ```
    pub fn name(&self) -> String {
        let tonic = NOTE_NAMES[self.tonic() as usize];
        match self {
            Key::Major(_) => tonic.to_string(),
            Key::Minor(_) => format!("{}m", tonic),
        }
    }

    /// Parse a key name as produced by common key detectors
    ///
    /// Accepts "C major", "F# minor", "Bb", "Am", "Ebm", "c# MINOR", "A-minor".
    ///
    /// # Example
    ///
    /// ```
    /// use note_consensus::Key;
    ///
    /// assert_eq!(Key::from_name("C major"), Some(Key::Major(0)));
    /// assert_eq!(Key::from_name("Bb minor"), Some(Key::Minor(10)));
    /// assert_eq!(Key::from_name("F#m"), Some(Key::Minor(6)));
    /// assert_eq!(Key::from_name("H major"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let base: i32 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let rest = chars.as_str();
        let (accidental, rest) = match rest.chars().next() {
            Some('#') | Some('♯') => (1, &rest[rest.chars().next().map_or(0, char::len_utf8)..]),
            Some('b') | Some('♭') => (-1, &rest[rest.chars().next().map_or(0, char::len_utf8)..]),
            _ => (0, rest),
        };
        let tonic = (base + accidental).rem_euclid(12) as u32;

        let mode = rest
            .trim()
            .trim_start_matches(['-', '_'])
            .trim()
            .to_ascii_lowercase();
        match mode.as_str() {
            "" | "major" | "maj" | "ionian" => Some(Key::Major(tonic)),
            "m" | "min" | "minor" | "aeolian" => Some(Key::Minor(tonic)),
            _ => None,
        }
    }

    /// Pitch classes of the key's scale
    pub fn scale_pitch_classes(&self, minor_scale: MinorScale) -> [u8; 7] {
        let steps = match (self, minor_scale) {
            (Key::Major(_), _) => MAJOR_STEPS,
            (Key::Minor(_), MinorScale::Natural) => NATURAL_MINOR_STEPS,
            (Key::Minor(_), MinorScale::Harmonic) => HARMONIC_MINOR_STEPS,
        };
        let tonic = self.tonic();
        steps.map(|s| (tonic + s) % 12)
    }

    /// True if a MIDI pitch belongs to the key's scale
    pub fn contains_pitch(&self, pitch: u8, minor_scale: MinorScale) -> bool {
        self.scale_pitch_classes(minor_scale).contains(&(pitch % 12))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tonic = NOTE_NAMES[self.tonic() as usize];
        match self {
            Key::Major(_) => write!(f, "{} major", tonic),
            Key::Minor(_) => write!(f, "{} minor", tonic),
        }
    }
}

impl FromStr for Key {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_name(s)
            .ok_or_else(|| ConsensusError::InvalidInput(format!("Unrecognised key name: '{}'", s)))
    }
}
