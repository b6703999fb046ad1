//! Onset-tolerance bucketing
//!
//! Two notes are the same musical event iff they share a bucket key
//! `(round(onset / tolerance), pitch)`. Bucketing is O(n) and applied
//! identically by every component, so all stages share the same boundary
//! behaviour: notes straddling a bucket edge do not match even when closer
//! than `tolerance`.
//!
//! # Example
//!
//! ```
//! use note_consensus::{Matcher, Note};
//!
//! let matcher = Matcher::new(0.05)?;
//! let a = Note::new(60, 1.000, 1.5, 80)?;
//! let b = Note::new(60, 1.020, 1.5, 80)?;
//! assert!(matcher.matches(&a, &b));
//! # Ok::<(), note_consensus::ConsensusError>(())
//! ```

use super::Note;
use crate::error::ConsensusError;
use std::collections::{BTreeMap, HashSet};

/// Grouping key: (onset bucket index, pitch)
pub type BucketKey = (i64, u8);

/// Onset bucket index for a time in seconds
///
/// `tolerance` must be positive; callers go through [`Matcher::new`].
pub fn time_bucket(onset: f64, tolerance: f64) -> i64 {
    (onset / tolerance).round() as i64
}

/// Tolerance-window matcher
///
/// Onsets closer than `tolerance / 2` share a bucket only when no bucket edge
/// (an odd multiple of `tolerance / 2`) lies between them. Across an edge,
/// two onsets can be arbitrarily close and still not match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    tolerance: f64,
}

impl Matcher {
    /// Create a matcher with the given onset tolerance in seconds
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if the tolerance is not a
    /// positive finite number.
    pub fn new(tolerance: f64) -> Result<Self, ConsensusError> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ConsensusError::InvalidConfig(format!(
                "Onset tolerance must be > 0, got {}",
                tolerance
            )));
        }
        Ok(Self { tolerance })
    }

    /// Tolerance window in seconds
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Onset bucket index (pitch-agnostic), used for simultaneity grouping
    pub fn onset_bucket(&self, onset: f64) -> i64 {
        time_bucket(onset, self.tolerance)
    }

    /// Full bucket key of a note
    pub fn key(&self, note: &Note) -> BucketKey {
        (self.onset_bucket(note.onset()), note.pitch())
    }

    /// True if both notes fall in the same bucket
    pub fn matches(&self, a: &Note, b: &Note) -> bool {
        self.key(a) == self.key(b)
    }

    /// Set of bucket keys present in a note list
    pub fn key_set(&self, notes: &[Note]) -> HashSet<BucketKey> {
        notes.iter().map(|n| self.key(n)).collect()
    }

    /// Group arbitrary items by the bucket key of the note they carry
    ///
    /// Items keep their input order within a group; groups are ordered by key.
    pub fn group<T, F>(&self, items: impl IntoIterator<Item = T>, note_of: F) -> BTreeMap<BucketKey, Vec<T>>
    where
        F: Fn(&T) -> &Note,
    {
        let mut groups: BTreeMap<BucketKey, Vec<T>> = BTreeMap::new();
        for item in items {
            let key = self.key(note_of(&item));
            groups.entry(key).or_default().push(item);
        }
        groups
    }

    /// Group items by onset bucket only (ignoring pitch)
    pub fn group_by_onset<T, F>(&self, items: impl IntoIterator<Item = T>, note_of: F) -> BTreeMap<i64, Vec<T>>
    where
        F: Fn(&T) -> &Note,
    {
        let mut groups: BTreeMap<i64, Vec<T>> = BTreeMap::new();
        for item in items {
            let bucket = self.onset_bucket(note_of(&item).onset());
            groups.entry(bucket).or_default().push(item);
        }
        groups
    }
}
