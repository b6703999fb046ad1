//! Intersection voting
//!
//! The authoritative model's notes are the candidates; a candidate survives
//! only if every other model has a note in the same bucket. Survivors keep
//! the authoritative model's exact values. Highest precision, lowest recall.

use super::ModelNotes;
use crate::note::{sorted_by_onset, BucketKey, Matcher, Note};
use std::collections::HashSet;

/// Keep the authoritative model's notes confirmed by all other models
///
/// `authoritative` names the model whose values are kept. When it is `None`
/// or names no supplied model, the first model is used.
pub fn vote_intersection(
    inputs: &[ModelNotes<'_>],
    authoritative: Option<&str>,
    matcher: &Matcher,
) -> Vec<Note> {
    let Some(lead) = authoritative_index(inputs, authoritative) else {
        return Vec::new();
    };

    let others: Vec<HashSet<BucketKey>> = inputs
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != lead)
        .map(|(_, model)| matcher.key_set(model.notes))
        .collect();

    let kept: Vec<Note> = inputs[lead]
        .notes
        .iter()
        .filter(|note| {
            let key = matcher.key(note);
            others.iter().all(|keys| keys.contains(&key))
        })
        .copied()
        .collect();

    sorted_by_onset(kept)
}

fn authoritative_index(inputs: &[ModelNotes<'_>], authoritative: Option<&str>) -> Option<usize> {
    if inputs.is_empty() {
        return None;
    }
    match authoritative {
        Some(name) => match inputs.iter().position(|m| m.model == name) {
            Some(idx) => Some(idx),
            None => {
                log::warn!(
                    "Authoritative model '{}' not among voters, using '{}'",
                    name,
                    inputs[0].model
                );
                Some(0)
            }
        },
        None => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, onset: f64, velocity: u8) -> Note {
        Note::new(pitch, onset, onset + 0.3, velocity).unwrap()
    }

    fn keys(notes: &[Note], matcher: &Matcher) -> Vec<BucketKey> {
        let mut k: Vec<BucketKey> = notes.iter().map(|n| matcher.key(n)).collect();
        k.sort();
        k
    }

    #[test]
    fn test_only_shared_notes_survive() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.0, 80), note(64, 2.0, 80), note(67, 3.0, 80)];
        let b = vec![note(60, 1.01, 70), note(67, 3.0, 70)];
        let c = vec![note(67, 2.99, 60), note(60, 0.99, 60), note(72, 4.0, 60)];

        let out = vote_intersection(
            &[ModelNotes::new("a", &a), ModelNotes::new("b", &b), ModelNotes::new("c", &c)],
            None,
            &matcher,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], a[0]);
        assert_eq!(out[1], a[2]);
    }

    #[test]
    fn test_swap_changes_values_not_keys() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.000, 80), note(64, 2.0, 80), note(67, 3.010, 90)];
        let b = vec![note(60, 1.015, 60), note(67, 2.995, 50), note(71, 5.0, 50)];

        let ab = vote_intersection(&[ModelNotes::new("a", &a), ModelNotes::new("b", &b)], None, &matcher);
        let ba = vote_intersection(&[ModelNotes::new("b", &b), ModelNotes::new("a", &a)], None, &matcher);

        assert_eq!(keys(&ab, &matcher), keys(&ba, &matcher));
        assert_eq!(ab[0].velocity(), 80);
        assert_eq!(ba[0].velocity(), 60);
    }

    #[test]
    fn test_authoritative_model_overrides_order() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(60, 1.000, 80)];
        let b = vec![note(60, 1.015, 60)];

        let out = vote_intersection(
            &[ModelNotes::new("a", &a), ModelNotes::new("b", &b)],
            Some("b"),
            &matcher,
        );
        assert_eq!(out, b);

        // Unknown name falls back to the first model
        let out = vote_intersection(
            &[ModelNotes::new("a", &a), ModelNotes::new("b", &b)],
            Some("missing"),
            &matcher,
        );
        assert_eq!(out, a);
    }

    #[test]
    fn test_single_model_passes_through() {
        let matcher = Matcher::new(0.05).unwrap();
        let a = vec![note(64, 2.0, 80), note(60, 1.0, 80)];
        let out = vote_intersection(&[ModelNotes::new("a", &a)], None, &matcher);
        assert_eq!(out, vec![a[1], a[0]]);
    }
}
