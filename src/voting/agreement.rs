//! Agreement-count voting (union and majority)
//!
//! All notes are pooled and grouped by bucket. Every group is merged by plain
//! averaging of onset, offset and velocity, and its confidence is the share
//! of models that contributed to it. Union keeps every group; majority keeps
//! groups contributed to by at least half of the models.

use super::weighted::{merge_weighted, WeightedNote};
use super::ModelNotes;
use crate::note::{sorted_by_onset, Matcher, Note};
use std::collections::BTreeSet;

/// Keep every bucket (highest recall)
pub fn vote_union(inputs: &[ModelNotes<'_>], matcher: &Matcher) -> Vec<Note> {
    vote_by_agreement(inputs, matcher, 1)
}

/// Keep buckets that at least half of the models agree on
pub fn vote_majority(inputs: &[ModelNotes<'_>], matcher: &Matcher) -> Vec<Note> {
    let min_models = inputs.len().div_ceil(2).max(1);
    vote_by_agreement(inputs, matcher, min_models)
}

fn vote_by_agreement(inputs: &[ModelNotes<'_>], matcher: &Matcher, min_models: usize) -> Vec<Note> {
    let n_models = inputs.len();
    if n_models == 0 {
        return Vec::new();
    }

    let items = inputs.iter().enumerate().flat_map(|(source, model)| {
        model.notes.iter().map(move |&note| WeightedNote {
            source,
            weight: 1.0,
            note,
        })
    });

    let groups = matcher.group(items, |w| &w.note);
    let mut merged = Vec::with_capacity(groups.len());

    for group in groups.values() {
        let agreeing: BTreeSet<usize> = group.iter().map(|w| w.source).collect();
        if agreeing.len() < min_models {
            continue;
        }
        if let Some(note) = merge_weighted(group) {
            merged.push(note.with_confidence(agreeing.len() as f32 / n_models as f32));
        }
    }

    sorted_by_onset(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, onset: f64, velocity: u8) -> Note {
        Note::new(pitch, onset, onset + 0.5, velocity).unwrap()
    }

    #[test]
    fn test_union_keeps_everything_with_agreement_ratio() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.0, 80), note(64, 2.0, 80)];
        let b = vec![note(60, 1.02, 60)];

        let out = vote_union(&[ModelNotes::new("a", &a), ModelNotes::new("b", &b)], &matcher);
        assert_eq!(out.len(), 2);
        assert!((out[0].onset() - 1.01).abs() < 1e-9);
        assert_eq!(out[0].velocity(), 70);
        assert!((out[0].confidence() - 1.0).abs() < 1e-6);
        assert!((out[1].confidence() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_majority_requires_half() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.0, 80), note(64, 2.0, 80), note(67, 3.0, 80)];
        let b = vec![note(60, 1.0, 80), note(64, 2.0, 80)];
        let c = vec![note(60, 1.0, 80)];

        let inputs = [ModelNotes::new("a", &a), ModelNotes::new("b", &b), ModelNotes::new("c", &c)];
        let out = vote_majority(&inputs, &matcher);
        // 3 models: need 2 votes
        assert_eq!(out.iter().map(|n| n.pitch()).collect::<Vec<_>>(), vec![60, 64]);

        // 2 models: one vote is half
        let out = vote_majority(&inputs[1..], &matcher);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_self_vote_is_identity() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 0.5, 64), note(62, 1.0, 72), note(64, 1.5, 90), note(60, 2.0, 33)];

        for out in [
            vote_union(&[ModelNotes::new("a", &a), ModelNotes::new("a", &a)], &matcher),
            vote_majority(&[ModelNotes::new("a", &a), ModelNotes::new("a", &a)], &matcher),
        ] {
            assert_eq!(out.len(), a.len());
            for (got, want) in out.iter().zip(a.iter()) {
                assert_eq!(got.pitch(), want.pitch());
                assert_eq!(got.velocity(), want.velocity());
                assert!((got.onset() - want.onset()).abs() < 1e-12);
                assert!((got.offset() - want.offset()).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_duplicate_notes_from_one_model_count_once() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.0, 80), note(60, 1.01, 80)];
        let b: Vec<Note> = vec![note(72, 3.0, 80)];
        let c: Vec<Note> = vec![note(74, 4.0, 80)];

        let out = vote_majority(
            &[ModelNotes::new("a", &a), ModelNotes::new("b", &b), ModelNotes::new("c", &c)],
            &matcher,
        );
        assert!(out.is_empty());
    }
}
