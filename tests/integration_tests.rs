//! Integration tests for the consensus engine

use note_consensus::{
    decode_stem, is_sorted_by_onset, process_stem, AudioStem, ConsensusError, EnsembleConfig, EnsembleController,
    EnsembleFlag, FallbackReason, FrameConfidence, Key, Note, PlayabilityConfig, StemValidationConfig,
    StemValidator, Transcriber, TtaConfig, VotingStrategy,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Model returning a fixed note list and counting its invocations
struct MockModel {
    name: &'static str,
    notes: Vec<Note>,
    calls: AtomicUsize,
}

impl MockModel {
    fn new(name: &'static str, notes: Vec<Note>) -> Self {
        Self {
            name,
            notes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Transcriber for MockModel {
    fn name(&self) -> &str {
        self.name
    }

    fn transcribe(&self, _stem: &AudioStem) -> Result<Vec<Note>, ConsensusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.notes.clone())
    }
}

/// Model exposing frame curves: high onset probability everywhere except
/// around 2.0 s
struct CurveModel {
    notes: Vec<Note>,
}

impl Transcriber for CurveModel {
    fn name(&self) -> &str {
        "curve-model"
    }

    fn transcribe(&self, _stem: &AudioStem) -> Result<Vec<Note>, ConsensusError> {
        Ok(self.notes.clone())
    }

    fn transcribe_with_confidence(
        &self,
        _stem: &AudioStem,
    ) -> Result<Option<(Vec<Note>, FrameConfidence)>, ConsensusError> {
        let mut onsets = vec![0.9f32; 500];
        for p in onsets.iter_mut().take(205).skip(195) {
            *p = 0.01;
        }
        let offsets = vec![0.9f32; 500];
        Ok(Some((self.notes.clone(), FrameConfidence::new(100.0, onsets, offsets)?)))
    }
}

/// C major scale run with a stray F# far from everything else
fn scale_with_stray(count: usize) -> Vec<Note> {
    const SCALE: [u8; 7] = [60, 62, 64, 65, 67, 69, 71];
    let mut notes: Vec<Note> = (0..count)
        .map(|i| {
            let onset = i as f64 * 0.25;
            Note::new(SCALE[i % 7], onset, onset + 0.2, 80).unwrap()
        })
        .collect();
    let end = count as f64 * 0.25 + 5.0;
    notes.push(Note::new(66, end, end + 0.5, 80).unwrap());
    notes
}

fn tone(freq: f32, seconds: f32) -> AudioStem {
    let n = (seconds * 44100.0) as usize;
    let samples = (0..n)
        .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / 44100.0).sin() * 0.5)
        .collect();
    AudioStem::new(samples, 44100).unwrap()
}

#[test]
fn test_specialist_collapse_returns_generalist_exactly() {
    let generalist = MockModel::new("generalist", scale_with_stray(800));
    let specialist = MockModel::new("specialist", scale_with_stray(8));
    let controller = EnsembleController::new(EnsembleConfig::default(), &generalist, Some(&specialist)).unwrap();

    let result = controller.transcribe(&tone(440.0, 1.0)).unwrap();

    assert_eq!(result.notes.len(), 801);
    assert_eq!(result.notes, generalist.notes);
    assert!(result.metadata.flags.contains(&EnsembleFlag::SingleModelFallback));
    assert!(matches!(result.metadata.fallback, Some(FallbackReason::SpecialistFailure(_))));
    assert!(!result.metadata.warnings.is_empty());
}

#[test]
fn test_process_stem_votes_and_refines() {
    let generalist = MockModel::new("generalist", scale_with_stray(200));
    let specialist = MockModel::new("specialist", scale_with_stray(200));

    let result = process_stem(
        &tone(440.0, 1.0),
        &generalist,
        Some(&specialist),
        Key::from_name("C major"),
        EnsembleConfig::default(),
    )
    .unwrap();

    assert!(!result.is_fallback());
    assert_eq!(result.notes.len(), 200);
    assert!(result.notes.iter().all(|n| n.pitch() != 66));
    assert!(is_sorted_by_onset(&result.notes));

    let report = result.refinement.unwrap();
    assert_eq!(report.key_aware.unwrap().input_notes, 201);
    assert_eq!(report.key_aware.unwrap().output_notes, 200);
    assert!(report.playability.is_none());
}

#[test]
fn test_process_stem_without_key_flags_it() {
    let generalist = MockModel::new("generalist", scale_with_stray(100));
    let result = process_stem(&tone(440.0, 1.0), &generalist, None, None, EnsembleConfig::default()).unwrap();

    assert!(result.metadata.flags.contains(&EnsembleFlag::KeyUnavailable));
    assert_eq!(result.metadata.fallback, Some(FallbackReason::NoSpecialist));
    assert_eq!(result.notes.len(), 101);
}

#[test]
fn test_playability_enabled_caps_polyphony() {
    let chord: Vec<Note> = [36u8, 48, 55, 60, 64, 67, 72, 76]
        .iter()
        .map(|&p| Note::new(p, 1.0, 2.0, 90).unwrap())
        .collect();
    let generalist = MockModel::new("generalist", chord);
    let config = EnsembleConfig {
        playability: PlayabilityConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let result = process_stem(&tone(440.0, 1.0), &generalist, None, Some(Key::Major(0)), config).unwrap();

    assert_eq!(result.notes.len(), 4);
    let pitches: Vec<u8> = result.notes.iter().map(|n| n.pitch()).collect();
    assert!(pitches.contains(&36));
    assert!(pitches.contains(&76));
    let report = result.refinement.unwrap().playability.unwrap();
    assert_eq!(report.input_notes, 8);
    assert_eq!(report.output_notes, 4);
}

#[test]
fn test_tta_transcribes_every_variant() {
    let generalist = MockModel::new("generalist", scale_with_stray(100));
    let specialist = MockModel::new("specialist", scale_with_stray(100));
    let config = EnsembleConfig {
        tta: TtaConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let controller = EnsembleController::new(config, &generalist, Some(&specialist)).unwrap();

    let result = controller.transcribe(&tone(440.0, 2.0)).unwrap();

    // original + 4 default augmentations
    assert_eq!(generalist.calls.load(Ordering::SeqCst), 5);
    assert_eq!(specialist.calls.load(Ordering::SeqCst), 5);
    assert!(result.metadata.flags.contains(&EnsembleFlag::TtaConsensus));
    assert_eq!(result.metadata.tta.as_ref().map(Vec::len), Some(5));
    assert!(is_sorted_by_onset(&result.notes));
    assert!(!result.notes.is_empty());
}

#[test]
fn test_frame_confidence_down_weights_uncertain_notes() {
    let notes = vec![
        Note::new(60, 1.0, 1.5, 80).unwrap(),
        Note::new(62, 2.0, 2.5, 80).unwrap(),
    ];
    let generalist = CurveModel { notes };
    let config = EnsembleConfig {
        use_frame_confidence: true,
        ..Default::default()
    };

    let result = process_stem(&tone(440.0, 1.0), &generalist, None, Some(Key::Major(0)), config).unwrap();

    // sqrt(0.01 * 0.9) = 0.095 < 0.3
    assert_eq!(result.notes.len(), 1);
    assert_eq!(result.notes[0].pitch(), 60);
    assert!((result.notes[0].confidence() - 0.9).abs() < 1e-5);
    assert!(result.metadata.flags.contains(&EnsembleFlag::FrameConfidence));
}

#[test]
fn test_config_file_drives_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ensemble.json");
    std::fs::write(
        &path,
        r#"{
            "voting": {"strategy": "intersection"},
            "failure_detection": {"bytedance_min_notes_threshold": 5}
        }"#,
    )
    .unwrap();
    let config = EnsembleConfig::load(&path).unwrap();
    assert_eq!(config.voting.strategy, VotingStrategy::Intersection);
    assert_eq!(config.failure_detection.specialist_min_notes, 5);

    let generalist = MockModel::new("generalist", scale_with_stray(20));
    let specialist = MockModel::new("specialist", scale_with_stray(10));
    let controller = EnsembleController::new(config, &generalist, Some(&specialist)).unwrap();
    let result = controller.transcribe(&tone(440.0, 1.0)).unwrap();

    // First 10 scale notes are shared; the strays sit at different times
    assert_eq!(result.notes.len(), 10);
    assert!(!result.is_fallback());
}

#[test]
fn test_unknown_strategy_is_a_config_error() {
    let err = EnsembleConfig::from_json_str(r#"{"voting": {"strategy": "plurality"}}"#).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_decoded_wav_passes_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("piano.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..44100 {
        let s = (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin() * 0.5;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();

    let stem = decode_stem(&path).unwrap();
    assert_eq!(stem.sample_rate(), 44100);
    assert_eq!(stem.len(), 44100);

    let report = StemValidator::new(StemValidationConfig::default()).validate(&stem);
    assert!(report.is_trusted(), "{:?}", report);
}
