//! Example: Check separated stems before running a specialist model
//!
//! Usage:
//!   cargo run --example validate_stem -- [--json] <stem1.wav> <stem2.flac> ...

use note_consensus::{decode_stem, StemValidationConfig, StemValidator};
use std::env;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut json = false;
    let mut files = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            files.push(arg);
        }
    }
    if files.is_empty() {
        return Err("usage: validate_stem [--json] <files...>".into());
    }

    let validator = StemValidator::new(StemValidationConfig::default());

    for file in &files {
        let start = Instant::now();
        let stem = match decode_stem(file) {
            Ok(stem) => stem,
            Err(e) => {
                eprintln!("{}: {}", file, e);
                continue;
            }
        };
        let report = validator.validate(&stem);
        let elapsed_ms = start.elapsed().as_secs_f32() * 1000.0;

        if json {
            println!("{}", serde_json::json!({ "file": file, "report": report, "elapsed_ms": elapsed_ms }));
        } else {
            println!("{}:", file);
            println!("  Duration: {:.2} s at {} Hz", stem.duration_seconds(), stem.sample_rate());
            println!("  RMS: {:.5}", report.rms);
            match report.spectral_centroid_hz {
                Some(c) => println!("  Spectral centroid: {:.1} Hz", c),
                None => println!("  Spectral centroid: n/a"),
            }
            println!("  Verdict: {:?} ({:.1} ms)", report.verdict, elapsed_ms);
        }
    }

    Ok(())
}
