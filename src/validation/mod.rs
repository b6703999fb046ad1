//! Ensemble sanity checks
//!
//! - [`stem`]: pre-transcription check of the separated stem (RMS + spectral centroid)
//! - [`failure`]: post-transcription check of the specialist's note count
//!
//! Both produce verdicts, not errors: a failed check triggers the
//! single-model fallback in the ensemble controller.

pub mod failure;
pub mod stem;

pub use failure::{FailureDetector, FailureVerdict};
pub use stem::{StemReport, StemValidator, StemVerdict};
