//! Confidence-weighted voting
//!
//! Each note votes with `model_weight * note.confidence`. A model votes once
//! per bucket, with its strongest note; a bucket survives when the summed
//! votes reach the configured threshold. Survivors are merged by vote-weighted
//! averaging of onset, offset and velocity over every note in the bucket. A model without
//! native confidence contributes confidence 1.0, so its vote is its weight.

use super::ModelNotes;
use crate::config::VotingConfig;
use crate::note::{sorted_by_onset, velocity_from_mean, Matcher, Note};
use std::collections::BTreeMap;

/// Slack for float accumulation when comparing vote sums against thresholds
pub(crate) const VOTE_EPSILON: f32 = 1e-6;

/// A note carrying its vote and the index of the source that produced it
#[derive(Debug, Clone, Copy)]
pub(crate) struct WeightedNote {
    pub source: usize,
    pub weight: f32,
    pub note: Note,
}

/// Vote with confidence-weighted sums
///
/// Merged confidence is the summed vote, capped at 1.0.
pub fn vote_weighted(inputs: &[ModelNotes<'_>], config: &VotingConfig, matcher: &Matcher) -> Vec<Note> {
    let items = inputs.iter().enumerate().flat_map(|(source, model)| {
        let model_weight = config.weight_for(model.model);
        model.notes.iter().map(move |&note| WeightedNote {
            source,
            weight: model_weight * note.confidence(),
            note,
        })
    });

    let groups = matcher.group(items, |w| &w.note);
    let mut merged = Vec::with_capacity(groups.len());

    for group in groups.values() {
        let total = bucket_vote(group);
        if total + VOTE_EPSILON < config.confidence_threshold {
            continue;
        }
        if let Some(note) = merge_weighted(group) {
            merged.push(note.with_confidence(total.min(1.0)));
        }
    }

    sorted_by_onset(merged)
}

/// Summed vote of a bucket, counting each source once at its strongest note
fn bucket_vote(group: &[WeightedNote]) -> f32 {
    let mut best: BTreeMap<usize, f32> = BTreeMap::new();
    for w in group {
        let vote = best.entry(w.source).or_insert(w.weight);
        *vote = vote.max(w.weight);
    }
    best.values().sum()
}

/// Merge one bucket into a single note
///
/// Onset, offset and velocity are averaged with the items' weights, or
/// plainly averaged when all weights are zero. The result keeps confidence
/// 1.0; callers set the confidence their strategy defines. Returns `None`
/// for an empty group.
pub(crate) fn merge_weighted(group: &[WeightedNote]) -> Option<Note> {
    let first = group.first()?;
    let total: f64 = group.iter().map(|w| f64::from(w.weight.max(0.0))).sum();

    let (onset, offset, velocity) = if total > 0.0 {
        let mut onset = 0.0;
        let mut offset = 0.0;
        let mut velocity = 0.0;
        for w in group {
            let weight = f64::from(w.weight.max(0.0));
            onset += w.note.onset() * weight;
            offset += w.note.offset() * weight;
            velocity += f64::from(w.note.velocity()) * weight;
        }
        (onset / total, offset / total, velocity / total)
    } else {
        let n = group.len() as f64;
        (
            group.iter().map(|w| w.note.onset()).sum::<f64>() / n,
            group.iter().map(|w| w.note.offset()).sum::<f64>() / n,
            group.iter().map(|w| f64::from(w.note.velocity())).sum::<f64>() / n,
        )
    };

    match Note::new(first.note.pitch(), onset, offset, velocity_from_mean(velocity)) {
        Ok(note) => Some(note),
        Err(e) => {
            log::warn!("Dropping unmergeable group at pitch {}: {}", first.note.pitch(), e);
            None
        }
    }
}
