//! Key-aware stray-note removal
//!
//! In-key notes are always kept. An out-of-key note is kept when it is a
//! short chromatic passing tone between two in-key neighbours, dropped when
//! no other note of the same or an adjacent instrument starts within the
//! isolation window around it, and kept otherwise (an accidental surrounded
//! by activity is assumed intentional).

use crate::config::KeyFilterConfig;
use crate::key::Key;
use crate::note::{sorted_by_onset, Note, Track};

/// Why an out-of-key note survived or was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    /// Pitch class is in the scale
    InKey,
    /// Short stepwise connection between in-key neighbours
    PassingTone,
    /// Other activity nearby
    Accidental,
    /// Nothing else nearby: removed
    Isolated,
}

impl KeyDecision {
    /// True if the note is kept
    pub fn keeps(&self) -> bool {
        !matches!(self, KeyDecision::Isolated)
    }
}

/// Removes isolated out-of-key notes
#[derive(Debug, Clone)]
pub struct KeyAwareFilter {
    key: Key,
    config: KeyFilterConfig,
}

impl KeyAwareFilter {
    /// Create a filter for a detected key
    pub fn new(key: Key, config: KeyFilterConfig) -> Self {
        Self { key, config }
    }

    /// Key in use
    pub fn key(&self) -> Key {
        self.key
    }

    /// Filter a single pitched note list
    pub fn filter(&self, notes: &[Note]) -> Vec<Note> {
        let track = Track::new(0, notes.to_vec());
        self.filter_tracks(std::slice::from_ref(&track))
            .pop()
            .map(|t| t.notes)
            .unwrap_or_default()
    }

    /// Filter every pitched track; drum tracks are returned unchanged
    ///
    /// Isolation is judged against the note's own track and every adjacent
    /// (same instrument family) pitched track.
    pub fn filter_tracks(&self, tracks: &[Track]) -> Vec<Track> {
        let sorted: Vec<Vec<Note>> = tracks
            .iter()
            .map(|t| sorted_by_onset(t.notes.clone()))
            .collect();

        let mut removed = 0usize;
        let out: Vec<Track> = tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                if track.is_drum {
                    return track.clone();
                }

                let mut nearby: Vec<f64> = tracks
                    .iter()
                    .enumerate()
                    .filter(|(j, other)| *j == i || track.is_adjacent_to(other))
                    .flat_map(|(j, _)| sorted[j].iter().map(Note::onset))
                    .collect();
                nearby.sort_by(f64::total_cmp);

                let kept: Vec<Note> = sorted[i]
                    .iter()
                    .enumerate()
                    .filter(|&(idx, _)| self.decide(&sorted[i], idx, &nearby).keeps())
                    .map(|(_, note)| *note)
                    .collect();
                removed += sorted[i].len() - kept.len();
                track.with_notes(kept)
            })
            .collect();

        log::debug!("Key-aware filter ({}) removed {} isolated notes", self.key, removed);
        out
    }

    /// Classify `notes[idx]`; `notes` is one track sorted by onset and
    /// `nearby_onsets` holds every onset of that track and its adjacent tracks, sorted
    pub fn decide(&self, notes: &[Note], idx: usize, nearby_onsets: &[f64]) -> KeyDecision {
        let note = &notes[idx];
        if self.in_key(note.pitch()) {
            return KeyDecision::InKey;
        }
        if self.config.allow_passing_tones && self.is_passing_tone(notes, idx) {
            return KeyDecision::PassingTone;
        }

        let window = self.config.isolation_window;
        let lo = nearby_onsets.partition_point(|&t| t < note.onset() - window);
        let hi = nearby_onsets.partition_point(|&t| t <= note.onset() + window);
        // The note's own onset is always in range
        if hi - lo > 1 {
            KeyDecision::Accidental
        } else {
            KeyDecision::Isolated
        }
    }

    fn in_key(&self, pitch: u8) -> bool {
        self.key.contains_pitch(pitch, self.config.minor_scale)
    }

    fn is_passing_tone(&self, notes: &[Note], idx: usize) -> bool {
        let note = &notes[idx];
        if note.duration() >= self.config.passing_tone_max_duration {
            return false;
        }
        let (Some(prev), Some(next)) = (self.previous_neighbour(notes, idx), self.next_neighbour(notes, idx)) else {
            return false;
        };
        if !self.in_key(prev.pitch()) || !self.in_key(next.pitch()) {
            return false;
        }

        let pitch = i32::from(note.pitch());
        let (from, to) = (i32::from(prev.pitch()), i32::from(next.pitch()));
        let steps = i32::from(self.config.passing_tone_min_step)..=i32::from(self.config.passing_tone_max_step);
        let between = (from < pitch && pitch < to) || (to < pitch && pitch < from);

        between && steps.contains(&(pitch - from).abs()) && steps.contains(&(to - pitch).abs())
    }

    /// Latest earlier onset within the window; ties go to the closest pitch
    fn previous_neighbour<'n>(&self, notes: &'n [Note], idx: usize) -> Option<&'n Note> {
        let note = &notes[idx];
        notes
            .iter()
            .filter(|n| n.onset() < note.onset() && note.onset() - n.onset() <= self.config.isolation_window)
            .max_by(|a, b| {
                a.onset()
                    .total_cmp(&b.onset())
                    .then(pitch_distance(note, b).cmp(&pitch_distance(note, a)))
            })
    }

    /// Earliest later onset within the window; ties go to the closest pitch
    fn next_neighbour<'n>(&self, notes: &'n [Note], idx: usize) -> Option<&'n Note> {
        let note = &notes[idx];
        notes
            .iter()
            .filter(|n| n.onset() > note.onset() && n.onset() - note.onset() <= self.config.isolation_window)
            .min_by(|a, b| {
                a.onset()
                    .total_cmp(&b.onset())
                    .then(pitch_distance(note, a).cmp(&pitch_distance(note, b)))
            })
    }
}

fn pitch_distance(a: &Note, b: &Note) -> u8 {
    a.pitch().abs_diff(b.pitch())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, onset: f64, duration: f64) -> Note {
        Note::new(pitch, onset, onset + duration, 80).unwrap()
    }

    fn c_major() -> KeyAwareFilter {
        KeyAwareFilter::new(Key::Major(0), KeyFilterConfig::default())
    }

    #[test]
    fn test_isolated_out_of_key_note_removed() {
        let notes = vec![note(60, 0.0, 0.4), note(66, 2.0, 0.5), note(64, 4.0, 0.4)];
        let out = c_major().filter(&notes);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.pitch() != 66));
    }

    #[test]
    fn test_out_of_key_note_with_neighbour_kept() {
        let notes = vec![note(60, 1.8, 0.4), note(66, 2.0, 0.5)];
        let out = c_major().filter(&notes);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_in_key_notes_always_kept() {
        let notes = vec![note(60, 0.0, 0.1), note(67, 10.0, 0.1)];
        assert_eq!(c_major().filter(&notes), notes);
    }

    #[test]
    fn test_chromatic_passing_tone() {
        // F - F# - G, F# short
        let notes = vec![note(65, 1.0, 0.2), note(66, 1.2, 0.15), note(67, 1.4, 0.3)];
        let filter = c_major();
        let onsets: Vec<f64> = notes.iter().map(Note::onset).collect();
        assert_eq!(filter.decide(&notes, 1, &onsets), KeyDecision::PassingTone);
    }

    #[test]
    fn test_long_or_non_stepwise_note_is_not_passing_tone() {
        let filter = c_major();

        let long = vec![note(65, 1.0, 0.2), note(66, 1.2, 0.3), note(67, 1.5, 0.3)];
        let onsets: Vec<f64> = long.iter().map(Note::onset).collect();
        assert_eq!(filter.decide(&long, 1, &onsets), KeyDecision::Accidental);

        // C - F# - G: leap of 6 from below
        let leap = vec![note(60, 1.0, 0.2), note(66, 1.2, 0.1), note(67, 1.4, 0.3)];
        let onsets: Vec<f64> = leap.iter().map(Note::onset).collect();
        assert_eq!(filter.decide(&leap, 1, &onsets), KeyDecision::Accidental);

        // G - F# - G: not strictly between
        let turn = vec![note(67, 1.0, 0.2), note(66, 1.2, 0.1), note(67, 1.4, 0.3)];
        let onsets: Vec<f64> = turn.iter().map(Note::onset).collect();
        assert_eq!(filter.decide(&turn, 1, &onsets), KeyDecision::Accidental);
    }

    #[test]
    fn test_adjacent_track_breaks_isolation() {
        let filter = c_major();
        let piano = Track::new(0, vec![note(66, 2.0, 0.5)]);
        let epiano = Track::new(4, vec![note(60, 2.3, 0.5)]);
        let strings = Track::new(48, vec![note(60, 2.1, 0.5)]);

        let with_adjacent = filter.filter_tracks(&[piano.clone(), epiano]);
        assert_eq!(with_adjacent[0].notes.len(), 1);

        let with_unrelated = filter.filter_tracks(&[piano, strings]);
        assert!(with_unrelated[0].notes.is_empty());
    }

    #[test]
    fn test_drum_tracks_untouched() {
        let drums = Track::drums(vec![note(37, 0.0, 0.1)]);
        let out = c_major().filter_tracks(std::slice::from_ref(&drums));
        assert_eq!(out[0], drums);
    }

    #[test]
    fn test_harmonic_minor_leading_tone() {
        let lone_g_sharp = vec![note(68, 5.0, 0.5)];
        let natural = KeyAwareFilter::new(Key::Minor(9), KeyFilterConfig::default());
        assert!(natural.filter(&lone_g_sharp).is_empty());

        let harmonic = KeyAwareFilter::new(
            Key::Minor(9),
            KeyFilterConfig {
                minor_scale: crate::key::MinorScale::Harmonic,
                ..Default::default()
            },
        );
        assert_eq!(harmonic.filter(&lone_g_sharp).len(), 1);
    }
}
