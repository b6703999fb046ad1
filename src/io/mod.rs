//! Audio input
//!
//! Stem buffers handed over by the source-separation stage, and decoding of
//! stem files using Symphonia.

pub mod decoder;
pub mod stem;

pub use decoder::decode_stem;
pub use stem::AudioStem;
