//! Transcription model boundary
//!
//! Pretrained models are external collaborators. They are plugged in through
//! the [`Transcriber`] trait; models that expose frame-level onset/offset
//! probabilities can also return [`FrameConfidence`] curves, from which a
//! per-note confidence is derived.

use crate::error::ConsensusError;
use crate::io::AudioStem;
use crate::note::Note;

/// Half-width (in frames) of the window searched around a note boundary
const CURVE_WINDOW_FRAMES: i64 = 2;

/// Confidence used when a boundary window falls outside the curve
const EMPTY_WINDOW_CONFIDENCE: f32 = 0.5;

/// A transcription model mapping an audio stem to notes
pub trait Transcriber: Send + Sync {
    /// Model name, used for voting-weight lookup
    fn name(&self) -> &str;

    /// Transcribe a stem into notes
    fn transcribe(&self, stem: &AudioStem) -> Result<Vec<Note>, ConsensusError>;

    /// Transcribe a stem and also return frame-level probability curves
    ///
    /// Models without native confidence return `Ok(None)` (the default).
    fn transcribe_with_confidence(
        &self,
        _stem: &AudioStem,
    ) -> Result<Option<(Vec<Note>, FrameConfidence)>, ConsensusError> {
        Ok(None)
    }
}

/// Frame-level onset/offset probability curves of one transcription
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfidence {
    frame_rate: f64,
    onset_probs: Vec<f32>,
    offset_probs: Vec<f32>,
}

impl FrameConfidence {
    /// Wrap probability curves produced at `frame_rate` frames per second
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::InvalidInput` if the frame rate is not positive.
    pub fn new(
        frame_rate: f64,
        onset_probs: Vec<f32>,
        offset_probs: Vec<f32>,
    ) -> Result<Self, ConsensusError> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(ConsensusError::InvalidInput(format!(
                "Frame rate must be > 0, got {}",
                frame_rate
            )));
        }
        Ok(Self {
            frame_rate,
            onset_probs,
            offset_probs,
        })
    }

    /// Frames per second of the producing model
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Confidence of one note: `sqrt(onset_conf * offset_conf)`
    ///
    /// Each factor is the maximum probability within ±2 frames of the note's
    /// onset (resp. offset) frame, or 0.5 when that window is empty.
    pub fn note_confidence(&self, note: &Note) -> f32 {
        let onset_frame = (note.onset() * self.frame_rate).round() as i64;
        let offset_frame = (note.offset() * self.frame_rate).round() as i64;

        let onset_conf = window_max(&self.onset_probs, onset_frame).unwrap_or(EMPTY_WINDOW_CONFIDENCE);
        let offset_conf =
            window_max(&self.offset_probs, offset_frame).unwrap_or(EMPTY_WINDOW_CONFIDENCE);

        (onset_conf.max(0.0) * offset_conf.max(0.0)).sqrt()
    }

    /// Attach curve-derived confidence to every note
    pub fn score_notes(&self, notes: &[Note]) -> Vec<Note> {
        notes
            .iter()
            .map(|n| n.with_confidence(self.note_confidence(n)))
            .collect()
    }
}

fn window_max(curve: &[f32], center: i64) -> Option<f32> {
    let start = (center - CURVE_WINDOW_FRAMES).max(0);
    let end = (center + CURVE_WINDOW_FRAMES + 1).min(curve.len() as i64);
    if start >= end {
        return None;
    }
    curve[start as usize..end as usize]
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .reduce(f32::max)
}

/// Transcribe with a model, attaching frame confidence when requested and available
pub fn transcribe_scored(
    model: &dyn Transcriber,
    stem: &AudioStem,
    use_frame_confidence: bool,
) -> Result<Vec<Note>, ConsensusError> {
    if use_frame_confidence {
        if let Some((notes, curves)) = model.transcribe_with_confidence(stem)? {
            log::debug!(
                "{}: scoring {} notes from frame curves at {:.1} fps",
                model.name(),
                notes.len(),
                curves.frame_rate()
            );
            return Ok(curves.score_notes(&notes));
        }
    }
    model.transcribe(stem)
}
