//! Playability reduction
//!
//! Four stages, each consuming the previous stage's output:
//! 1. Velocity/duration floor
//! 2. Same-pitch re-strikes within the repeat window collapse to the loudest
//! 3. Register-dependent sustain cap
//! 4. Polyphony cap per onset cluster (melody, then bass, then by velocity)

use crate::config::PlayabilityConfig;
use crate::error::ConsensusError;
use crate::note::{sorted_by_onset, Matcher, Note};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Note counts through the four stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayabilityReport {
    /// Notes in
    pub input_notes: usize,
    /// After the velocity/duration floor
    pub after_threshold: usize,
    /// After repeated-note collapse
    pub after_repeats: usize,
    /// Notes shortened by the sustain cap
    pub truncated: usize,
    /// Notes out (after polyphony reduction)
    pub output_notes: usize,
}

/// Physical playability filter
#[derive(Debug, Clone)]
pub struct PlayabilityFilter {
    config: PlayabilityConfig,
    cluster_matcher: Matcher,
}

impl PlayabilityFilter {
    /// Create a filter
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidConfig` if the configuration is out of range.
    pub fn new(config: PlayabilityConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        let cluster_matcher = Matcher::new(config.cluster_window)?;
        Ok(Self {
            config,
            cluster_matcher,
        })
    }

    /// Run all four stages
    pub fn apply(&self, notes: &[Note]) -> (Vec<Note>, PlayabilityReport) {
        let mut report = PlayabilityReport {
            input_notes: notes.len(),
            ..Default::default()
        };

        let stage = self.threshold(notes);
        report.after_threshold = stage.len();

        let stage = self.collapse_repeats(stage);
        report.after_repeats = stage.len();

        let (stage, truncated) = self.cap_durations(stage);
        report.truncated = truncated;

        let out = self.reduce_polyphony(stage);
        report.output_notes = out.len();

        log::debug!(
            "Playability: {} -> {} notes (threshold {}, repeats {}, truncated {})",
            report.input_notes,
            report.output_notes,
            report.after_threshold,
            report.after_repeats,
            report.truncated
        );
        (out, report)
    }

    fn threshold(&self, notes: &[Note]) -> Vec<Note> {
        notes
            .iter()
            .filter(|n| n.velocity() >= self.config.min_velocity && n.duration() >= self.config.min_duration)
            .copied()
            .collect()
    }

    /// A run of same-pitch notes, each starting within the window of the
    /// run's first onset, is replaced by its loudest note (earliest on ties)
    fn collapse_repeats(&self, notes: Vec<Note>) -> Vec<Note> {
        let mut by_pitch: BTreeMap<u8, Vec<Note>> = BTreeMap::new();
        for note in notes {
            by_pitch.entry(note.pitch()).or_default().push(note);
        }

        let mut out = Vec::new();
        for (_, run) in by_pitch {
            let run = sorted_by_onset(run);
            let mut start = 0;
            while start < run.len() {
                let window_end = run[start].onset() + self.config.repeat_window;
                let end = start + run[start..].partition_point(|n| n.onset() < window_end);
                let loudest = run[start..end]
                    .iter()
                    .reduce(|best, n| if n.velocity() > best.velocity() { n } else { best });
                if let Some(note) = loudest {
                    out.push(*note);
                }
                start = end.max(start + 1);
            }
        }
        sorted_by_onset(out)
    }

    fn max_duration_for(&self, pitch: u8) -> f64 {
        if pitch >= self.config.high_pitch_threshold {
            self.config.max_duration_high
        } else if pitch < self.config.low_pitch_threshold {
            self.config.max_duration_low
        } else {
            self.config.max_duration_mid
        }
    }

    fn cap_durations(&self, notes: Vec<Note>) -> (Vec<Note>, usize) {
        let mut truncated = 0;
        let out = notes
            .into_iter()
            .map(|n| {
                let capped = n.truncated(self.max_duration_for(n.pitch()));
                if capped != n {
                    truncated += 1;
                }
                capped
            })
            .collect();
        (out, truncated)
    }

    fn reduce_polyphony(&self, notes: Vec<Note>) -> Vec<Note> {
        let clusters = self.cluster_matcher.group_by_onset(notes, |n| n);
        let mut out = Vec::new();
        for (_, cluster) in clusters {
            if cluster.len() <= self.config.max_polyphony {
                out.extend(cluster);
            } else {
                out.extend(self.select_voices(cluster));
            }
        }
        sorted_by_onset(out)
    }

    fn select_voices(&self, mut cluster: Vec<Note>) -> Vec<Note> {
        let limit = self.config.max_polyphony;
        let mut chosen = Vec::with_capacity(limit);

        let highest = cluster
            .iter()
            .enumerate()
            .max_by_key(|(_, n)| (n.pitch(), n.velocity()))
            .map(|(i, _)| i);
        if self.config.melody_priority {
            if let Some(i) = highest {
                chosen.push(cluster.swap_remove(i));
            }
        }

        if self.config.bass_priority && chosen.len() < limit {
            let lowest = cluster
                .iter()
                .enumerate()
                .min_by_key(|(_, n)| (n.pitch(), std::cmp::Reverse(n.velocity())))
                .map(|(i, _)| i);
            if let Some(i) = lowest {
                chosen.push(cluster.swap_remove(i));
            }
        }

        cluster.sort_by(|a, b| b.velocity().cmp(&a.velocity()).then(b.pitch().cmp(&a.pitch())));
        let remaining = limit - chosen.len();
        chosen.extend(cluster.into_iter().take(remaining));
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, onset: f64, duration: f64, velocity: u8) -> Note {
        Note::new(pitch, onset, onset + duration, velocity).unwrap()
    }

    fn filter(config: PlayabilityConfig) -> PlayabilityFilter {
        PlayabilityFilter::new(config).unwrap()
    }

    #[test]
    fn test_polyphony_keeps_melody_and_bass() {
        let cluster = vec![
            note(40, 1.0, 0.5, 30),
            note(55, 1.0, 0.5, 90),
            note(60, 1.0, 0.5, 100),
            note(64, 1.0, 0.5, 50),
            note(67, 1.0, 0.5, 95),
            note(84, 1.0, 0.5, 25),
        ];
        let (out, report) = filter(PlayabilityConfig::default()).apply(&cluster);

        assert_eq!(out.len(), 4);
        let pitches: Vec<u8> = out.iter().map(|n| n.pitch()).collect();
        assert!(pitches.contains(&84));
        assert!(pitches.contains(&40));
        assert!(pitches.contains(&60));
        assert!(pitches.contains(&67));
        assert_eq!(report.input_notes, 6);
        assert_eq!(report.output_notes, 4);
    }

    #[test]
    fn test_polyphony_by_velocity_without_priorities() {
        let cluster: Vec<Note> = (0..6).map(|i| note(60 + i, 1.0, 0.5, 30 + i * 10)).collect();
        let config = PlayabilityConfig {
            max_polyphony: 2,
            melody_priority: false,
            bass_priority: false,
            ..Default::default()
        };
        let (out, _) = filter(config).apply(&cluster);
        let pitches: Vec<u8> = out.iter().map(|n| n.pitch()).collect();
        assert_eq!(pitches, vec![64, 65]);
    }

    #[test]
    fn test_duration_caps_by_register() {
        let notes = vec![
            note(84, 0.0, 10.0, 80),
            note(60, 1.0, 10.0, 80),
            note(36, 2.0, 10.0, 80),
            note(72, 3.0, 1.0, 80),
        ];
        let (out, report) = filter(PlayabilityConfig::default()).apply(&notes);
        assert_eq!(report.truncated, 3);
        assert!((out[0].duration() - 1.5).abs() < 1e-9);
        assert!((out[1].duration() - 3.0).abs() < 1e-9);
        assert!((out[2].duration() - 5.0).abs() < 1e-9);
        assert!((out[3].duration() - 1.0).abs() < 1e-9);

        let config = PlayabilityConfig::default();
        for n in out.iter().filter(|n| n.pitch() >= config.high_pitch_threshold) {
            assert!(n.duration() <= config.max_duration_high + 1e-9);
        }
    }

    #[test]
    fn test_repeats_collapse_to_loudest() {
        let notes = vec![
            note(60, 1.00, 0.1, 50),
            note(60, 1.05, 0.1, 90),
            note(60, 1.10, 0.1, 70),
            note(60, 2.00, 0.1, 60),
            note(62, 1.05, 0.1, 40),
        ];
        let (out, report) = filter(PlayabilityConfig::default()).apply(&notes);
        assert_eq!(report.after_repeats, 3);
        let c: Vec<&Note> = out.iter().filter(|n| n.pitch() == 60).collect();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].velocity(), 90);
        assert!((c[1].onset() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_stage() {
        let notes = vec![note(60, 0.0, 0.5, 10), note(62, 1.0, 0.01, 80), note(64, 2.0, 0.5, 80)];
        let (out, report) = filter(PlayabilityConfig::default()).apply(&notes);
        assert_eq!(report.after_threshold, 1);
        assert_eq!(out[0].pitch(), 64);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PlayabilityConfig {
            max_polyphony: 0,
            ..Default::default()
        };
        assert!(PlayabilityFilter::new(config).is_err());
    }
}
