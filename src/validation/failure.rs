//! Specialist catastrophic-failure detection
//!
//! A specialist that returns a handful of notes where the generalist found
//! hundreds has failed on this audio. Such output must never reach the vote,
//! where sparse disagreement would read as high precision.

use crate::config::FailureDetectionConfig;
use serde::{Deserialize, Serialize};

/// Outcome of the note-count gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureVerdict {
    /// Specialist output is usable
    Healthy,
    /// Specialist produced fewer than the absolute minimum
    TooFewNotes {
        /// Specialist note count
        count: usize,
        /// Configured minimum
        min_notes: usize,
    },
    /// Specialist/generalist count ratio below the configured minimum
    RatioTooLow {
        /// Observed ratio
        ratio: f32,
        /// Configured minimum ratio
        min_ratio: f32,
    },
}

impl FailureVerdict {
    /// True if the specialist failed
    pub fn is_failure(&self) -> bool {
        !matches!(self, FailureVerdict::Healthy)
    }
}

/// Note-count gate between transcription and voting
#[derive(Debug, Clone)]
pub struct FailureDetector {
    config: FailureDetectionConfig,
}

impl FailureDetector {
    /// Create a detector
    pub fn new(config: FailureDetectionConfig) -> Self {
        Self { config }
    }

    /// Compare the specialist's note count against the generalist's
    ///
    /// The ratio check is skipped when the generalist found no notes.
    pub fn check(&self, specialist_count: usize, generalist_count: usize) -> FailureVerdict {
        if specialist_count < self.config.specialist_min_notes {
            log::warn!(
                "Specialist produced {} notes (minimum {}), treating as failure",
                specialist_count,
                self.config.specialist_min_notes
            );
            return FailureVerdict::TooFewNotes {
                count: specialist_count,
                min_notes: self.config.specialist_min_notes,
            };
        }

        if generalist_count > 0 {
            let ratio = specialist_count as f32 / generalist_count as f32;
            if ratio < self.config.specialist_min_ratio {
                log::warn!(
                    "Specialist/generalist note ratio {:.3} ({} / {}) below {:.3}, treating as failure",
                    ratio,
                    specialist_count,
                    generalist_count,
                    self.config.specialist_min_ratio
                );
                return FailureVerdict::RatioTooLow {
                    ratio,
                    min_ratio: self.config.specialist_min_ratio,
                };
            }
        }

        log::debug!(
            "Specialist healthy: {} notes vs generalist {}",
            specialist_count,
            generalist_count
        );
        FailureVerdict::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(min_notes: usize, min_ratio: f32) -> FailureDetector {
        FailureDetector::new(FailureDetectionConfig {
            specialist_min_notes: min_notes,
            specialist_min_ratio: min_ratio,
        })
    }

    #[test]
    fn test_catastrophic_undercount() {
        let verdict = detector(50, 0.1).check(9, 800);
        assert_eq!(
            verdict,
            FailureVerdict::TooFewNotes {
                count: 9,
                min_notes: 50
            }
        );
        assert!(verdict.is_failure());
    }

    #[test]
    fn test_ratio_failure() {
        let verdict = detector(50, 0.1).check(60, 1000);
        assert!(matches!(verdict, FailureVerdict::RatioTooLow { .. }));
    }

    #[test]
    fn test_healthy() {
        assert_eq!(detector(50, 0.1).check(700, 800), FailureVerdict::Healthy);
        // Ratio skipped when the generalist found nothing
        assert_eq!(detector(0, 0.5).check(10, 0), FailureVerdict::Healthy);
    }
}
