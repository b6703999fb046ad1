//! Example: Vote per-model note lists stored as JSON
//!
//! Usage:
//!   cargo run --example vote_files -- [--strategy S] [--config ensemble.json] [--key "C major"] <model1.json> <model2.json> ...
//!
//! Each input file holds a JSON array of notes
//! (`{"pitch": 60, "onset": 1.0, "offset": 1.5, "velocity": 80, "confidence": 0.9}`).
//! The model name used for weight lookup is the file stem. The consensus is
//! refined and printed to stdout as JSON.

use note_consensus::{EnsembleConfig, Key, ModelNotes, Note, RefinementPipeline, VotingEngine, VotingStrategy};
use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut config = EnsembleConfig::default();
    let mut strategy: Option<VotingStrategy> = None;
    let mut key: Option<Key> = None;
    let mut files: Vec<String> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--strategy" => strategy = Some(args.next().ok_or("--strategy needs a value")?.parse()?),
            "--config" => config = EnsembleConfig::load(args.next().ok_or("--config needs a path")?)?,
            "--key" => {
                let name = args.next().ok_or("--key needs a value")?;
                key = Some(name.parse()?);
            }
            _ => files.push(arg),
        }
    }
    if let Some(strategy) = strategy {
        config.voting.strategy = strategy;
    }
    if files.len() < 2 {
        return Err("need at least two note files".into());
    }

    let mut models: Vec<(String, Vec<Note>)> = Vec::with_capacity(files.len());
    for file in &files {
        let name = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file)
            .to_string();
        let notes: Vec<Note> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
        eprintln!("{}: {} notes", name, notes.len());
        models.push((name, notes));
    }

    let engine = VotingEngine::new(config.voting.clone())?;
    let inputs: Vec<ModelNotes> = models
        .iter()
        .map(|(name, notes)| ModelNotes::new(name, notes))
        .collect();
    let merged = engine.vote(&inputs);

    let pipeline = RefinementPipeline::new(&config, key)?;
    let (refined, report) = pipeline.refine(&merged, None);

    eprintln!(
        "{} voting: {} notes, {} after refinement",
        engine.strategy(),
        merged.len(),
        refined.len()
    );
    eprintln!("{}", serde_json::to_string(&report)?);
    println!("{}", serde_json::to_string_pretty(&refined)?);

    Ok(())
}
