//! Reversal and re-voting of augmented transcriptions

use super::Transform;
use crate::note::{sorted_by_onset, Matcher, Note};
use crate::voting::weighted::{merge_weighted, WeightedNote};
use std::collections::BTreeSet;

/// Notes of one augmentation, already mapped back to the original audio
#[derive(Debug, Clone, PartialEq)]
pub struct VariantNotes {
    /// Augmentation name
    pub name: String,
    /// Vote weight of the augmentation
    pub weight: f32,
    /// Reversed notes
    pub notes: Vec<Note>,
}

/// Map notes transcribed from a transformed stem back to the original
///
/// Pitch shifts are undone by transposing in the opposite direction; notes
/// that would leave the MIDI range are dropped. Time stretches are undone by
/// dividing onset and offset by the stretch rate.
pub fn reverse_transform(notes: &[Note], transform: &Transform) -> Vec<Note> {
    match *transform {
        Transform::Identity => notes.to_vec(),
        Transform::PitchShift { semitones } => notes
            .iter()
            .filter_map(|n| n.transposed(-semitones))
            .collect(),
        Transform::TimeStretch { rate } => notes
            .iter()
            .filter_map(|n| n.time_scaled(1.0 / rate))
            .collect(),
    }
}

/// Re-vote reversed variants
///
/// A bucket survives when at least `min_votes` distinct variants contributed
/// to it. Notes are merged with weight `variant_weight * confidence`; the
/// merged confidence is the summed weight of the agreeing variants over the
/// summed weight of all variants.
pub fn revote(variants: &[VariantNotes], matcher: &Matcher, min_votes: usize) -> Vec<Note> {
    let total_weight: f32 = variants.iter().map(|v| v.weight.max(0.0)).sum();

    let items = variants.iter().enumerate().flat_map(|(source, variant)| {
        variant.notes.iter().map(move |&note| WeightedNote {
            source,
            weight: variant.weight.max(0.0) * note.confidence(),
            note,
        })
    });

    let groups = matcher.group(items, |w| &w.note);
    let mut merged = Vec::with_capacity(groups.len());

    for group in groups.values() {
        let agreeing: BTreeSet<usize> = group.iter().map(|w| w.source).collect();
        if agreeing.len() < min_votes {
            continue;
        }
        let confidence = if total_weight > 0.0 {
            agreeing.iter().map(|&i| variants[i].weight.max(0.0)).sum::<f32>() / total_weight
        } else {
            agreeing.len() as f32 / variants.len() as f32
        };
        if let Some(note) = merge_weighted(group) {
            merged.push(note.with_confidence(confidence));
        }
    }

    sorted_by_onset(merged)
}
